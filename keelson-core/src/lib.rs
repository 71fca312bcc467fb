//! Core types for Keelson: messages, state snapshots, tools and errors.

pub mod agent_event;
pub mod checkpoint;
mod error;
pub mod identity;
mod llm;
pub mod state;
mod tool;
pub mod widget;

pub use agent_event::AgentEvent;
pub use checkpoint::{
    Checkpoint, CheckpointMetadata, Checkpointer, HistoryCheckpointer, InMemoryCheckpointer,
};
pub use error::{ErrorCategory, KeelsonError};
pub use identity::{UserContext, UserRole};
pub use llm::{ChatCompletion, Message, Role};
pub use serde_json::Value;
pub use state::StateSchema;
pub use tool::{Tool, ToolError};
pub use widget::{Widget, WidgetKind};
