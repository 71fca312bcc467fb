use crate::{UserContext, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A named capability the planner can select, at most once per cycle.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Argument schema shown to the planner.
    fn schema(&self) -> Option<Value> {
        None
    }

    /// A worked example shown to the planner.
    fn examples(&self) -> Option<&str> {
        None
    }

    async fn invoke(&self, args: Value, user: &UserContext) -> Result<Value, ToolError>;
}
