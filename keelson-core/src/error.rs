use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeelsonError {
    #[error("LLM provider failed: {0}")]
    LlmProvider(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Checkpoint failed: {0}")]
    CheckpointFailed(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Loop invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Operation was cancelled")]
    Cancelled,
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

/// Coarse classification surfaced to callers alongside the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Validation,
    UpstreamUnavailable,
    Configuration,
    Cancelled,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Validation => "validation",
            ErrorCategory::UpstreamUnavailable => "upstream_unavailable",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl KeelsonError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            KeelsonError::LlmProvider(_)
            | KeelsonError::Timeout(_)
            | KeelsonError::CheckpointFailed(_) => ErrorCategory::UpstreamUnavailable,
            KeelsonError::Authentication(_) => ErrorCategory::Authentication,
            KeelsonError::InvalidRequest(_) => ErrorCategory::Validation,
            KeelsonError::InvalidConfig(_) => ErrorCategory::Configuration,
            KeelsonError::Cancelled => ErrorCategory::Cancelled,
            KeelsonError::InvariantViolation(_)
            | KeelsonError::Serde(_)
            | KeelsonError::Custom(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code, finer grained than [`ErrorCategory`].
    pub fn code(&self) -> &'static str {
        match self {
            KeelsonError::LlmProvider(_) => "LLM_ERROR",
            KeelsonError::Timeout(_) => "TIMEOUT",
            KeelsonError::CheckpointFailed(_) => "CHECKPOINT_ERROR",
            KeelsonError::Authentication(_) => "AUTH_ERROR",
            KeelsonError::InvalidRequest(_) => "VALIDATION_ERROR",
            KeelsonError::InvalidConfig(_) => "CONFIG_ERROR",
            KeelsonError::Cancelled => "CANCELLED",
            KeelsonError::InvariantViolation(_)
            | KeelsonError::Serde(_)
            | KeelsonError::Custom(_) => "INTERNAL_ERROR",
        }
    }
}
