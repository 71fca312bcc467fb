use reqwest::StatusCode;
use thiserror::Error;

use keelson_core::KeelsonError;

#[derive(Debug, Error)]
pub enum LlmClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http error {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("token endpoint returned {status}: {body}")]
    OAuth { status: StatusCode, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<LlmClientError> for KeelsonError {
    fn from(err: LlmClientError) -> Self {
        match err {
            LlmClientError::InvalidConfig(message) => KeelsonError::InvalidConfig(message),
            other => KeelsonError::LlmProvider(other.to_string()),
        }
    }
}
