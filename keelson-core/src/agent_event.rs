use serde::{Deserialize, Serialize};

use crate::{ErrorCategory, KeelsonError};

/// Progress emitted while a run is in flight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    StageCompleted {
        stage: String,
        current_step: String,
        iteration: u32,
        thread_id: String,
    },
    ToolCall {
        tool_name: String,
        input: serde_json::Value,
        iteration: u32,
    },
    Observation {
        tool_name: String,
        output: serde_json::Value,
        is_error: bool,
        iteration: u32,
    },
    Final {
        content: String,
        iteration: u32,
    },
    Widget {
        widget_type: String,
        widget_data: serde_json::Value,
    },
    Done {
        thread_id: String,
    },
    Error {
        category: ErrorCategory,
        code: String,
        message: String,
    },
}

impl AgentEvent {
    pub fn error(err: &KeelsonError) -> Self {
        Self::Error {
            category: err.category(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn iteration(&self) -> Option<u32> {
        match self {
            Self::StageCompleted { iteration, .. }
            | Self::ToolCall { iteration, .. }
            | Self::Observation { iteration, .. }
            | Self::Final { iteration, .. } => Some(*iteration),
            Self::Widget { .. } | Self::Done { .. } | Self::Error { .. } => None,
        }
    }

    /// `Done` and `Error` close a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
