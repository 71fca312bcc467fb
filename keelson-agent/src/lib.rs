//! Checkpointed plan → query → validate → refine agent loop.
//!
//! ```no_run
//! use keelson_agent::{AgentLoop, RunRequest, ToolRegistry};
//! use keelson_core::{ChatCompletion, KeelsonError, Message, UserContext};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ChatCompletion for Echo {
//!     async fn complete(&self, messages: Vec<Message>) -> Result<String, KeelsonError> {
//!         Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
//!     }
//! }
//!
//! # async fn demo() -> Result<(), KeelsonError> {
//! let agent = AgentLoop::builder()
//!     .with_planner(Echo)
//!     .with_tools(ToolRegistry::new())
//!     .build()?;
//! let user = UserContext::new("u-1", "u@example.com", None)?;
//! let response = agent.run(RunRequest::new("hello", user)).await?;
//! println!("{}", response.message);
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod locks;
mod planner;
mod policy;
pub mod prompts;
mod registry;
pub mod sse;
mod stages;
mod state;

pub use config::LoopConfig;
pub use engine::{
    AgentLoop, AgentLoopBuilder, RunRequest, RunResponse, ThreadSummary, INPUT_NODE, NO_RESPONSE,
    TITLE_CHARS,
};
pub use locks::{ThreadGuard, ThreadLocks};
pub use planner::{ToolSelection, INVALID_PLANNER_OUTPUT, NO_TOOL};
pub use policy::{route_after_validate, RefineDecision, RefinePolicy, ToolPresencePolicy};
pub use registry::{FnTool, ToolRegistry, ToolRegistryError, NO_TOOLS_AVAILABLE};
pub use stages::{PlanStage, QueryStage, RefineStage, Stage, StageContext, ValidateStage};
pub use state::{AgentState, Step, ToolRecord, DEFAULT_MAX_ITERATIONS};
pub use tokio_util::sync::CancellationToken;
