//! OpenAI-compatible chat completion client used as the planner and responder.

mod client;
mod error;
mod oauth;
pub mod types;

pub use client::{
    OAuthConfig, OpenAiCompatibleClient, OpenAiCompatibleClientBuilder, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT,
};
pub use error::LlmClientError;
pub use oauth::OAuthTokenProvider;
pub use secrecy::SecretString;
