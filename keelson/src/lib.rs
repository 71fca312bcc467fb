//! Keelson: a checkpointed plan → query → validate → refine loop for
//! tool-using LLM assistants.
//!
//! This crate re-exports the workspace crates behind feature flags and adds
//! [`CheckpointBackend`] for choosing a store from configuration.

mod backend;

pub use backend::{
    BackendKind, CheckpointBackend, DEFAULT_POSTGRES_MAX_CONNECTIONS, DEFAULT_REDIS_NAMESPACE,
};

pub use keelson_core::{
    AgentEvent, ChatCompletion, Checkpoint, CheckpointMetadata, Checkpointer, ErrorCategory,
    HistoryCheckpointer, InMemoryCheckpointer, KeelsonError, Message, Role, StateSchema, Tool,
    ToolError, UserContext, UserRole, Value, Widget, WidgetKind,
};

pub use keelson_agent::{
    sse, AgentLoop, AgentLoopBuilder, AgentState, CancellationToken, FnTool, LoopConfig,
    RefineDecision, RefinePolicy, RunRequest, RunResponse, Stage, StageContext, Step, ToolRecord,
    ThreadSummary, ToolPresencePolicy, ToolRegistry, ToolRegistryError, DEFAULT_MAX_ITERATIONS,
};

#[cfg(feature = "llm")]
pub use keelson_llm as llm;

#[cfg(feature = "redis")]
pub use keelson_checkpoint_redis::RedisCheckpointer;

#[cfg(feature = "postgres")]
pub use keelson_checkpoint_postgres::PostgresCheckpointer;

#[cfg(feature = "sqlite")]
pub use keelson_checkpoint_sqlite::SqliteCheckpointer;
