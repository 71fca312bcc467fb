use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::sleep;
use url::Url;

use keelson_core::{ChatCompletion, KeelsonError, Message};

use crate::oauth::OAuthTokenProvider;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::LlmClientError;

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
enum Auth {
    None,
    Bearer(SecretString),
    OAuth(Arc<OAuthTokenProvider>),
}

impl Auth {
    async fn token(&self) -> Result<Option<SecretString>, LlmClientError> {
        match self {
            Auth::None => Ok(None),
            Auth::Bearer(token) => Ok(Some(token.clone())),
            Auth::OAuth(provider) => provider.access_token().await.map(Some),
        }
    }
}

/// Client-credentials settings for providers fronted by an OAuth token endpoint.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
}

/// Chat client for any endpoint speaking the OpenAI chat completions format.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: Client,
    api_url: Url,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    max_attempts: u32,
    auth: Auth,
}

impl OpenAiCompatibleClient {
    pub fn builder() -> OpenAiCompatibleClientBuilder {
        OpenAiCompatibleClientBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one non-streaming completion and returns the first choice's text.
    pub async fn chat(&self, messages: &[Message]) -> Result<String, LlmClientError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            stream: false,
        };

        let mut attempt = 0;
        let mut backoff = Duration::from_millis(200);

        loop {
            attempt += 1;
            tracing::info!(
                model = %self.model,
                messages_count = messages.len(),
                attempt,
                "LLM request"
            );

            let mut builder = self.http.post(self.api_url.clone()).json(&request);
            if let Some(token) = self.auth.token().await? {
                builder = builder.bearer_auth(token.expose_secret());
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    let body: ChatCompletionResponse = response.json().await?;
                    return first_choice(body);
                }
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::UNAUTHORIZED {
                        if let Auth::OAuth(provider) = &self.auth {
                            provider.invalidate().await;
                        }
                    }
                    if self.should_retry(status) && attempt < self.max_attempts {
                        tracing::warn!(status = %status, attempt, "LLM request failed, retrying");
                        sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    tracing::error!(status = %status, "LLM API request failed");
                    return Err(LlmClientError::Http { status, body });
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && attempt < self.max_attempts {
                        tracing::warn!(error = %err, attempt, "LLM transport error, retrying");
                        sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                        continue;
                    }
                    tracing::error!(error = %err, "LLM API request failed");
                    return Err(LlmClientError::Request(err));
                }
            }
        }
    }

    fn should_retry(&self, status: StatusCode) -> bool {
        status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::UNAUTHORIZED && matches!(self.auth, Auth::OAuth(_)))
    }
}

fn first_choice(body: ChatCompletionResponse) -> Result<String, LlmClientError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmClientError::InvalidResponse("response has no choices".to_string()))?;
    tracing::info!(finish_reason = ?choice.finish_reason, "LLM response received");
    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait::async_trait]
impl ChatCompletion for OpenAiCompatibleClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<String, KeelsonError> {
        match self.chat(&messages).await {
            Ok(content) => Ok(content),
            Err(LlmClientError::Request(err)) if err.is_timeout() => {
                Err(KeelsonError::Timeout(self.timeout))
            }
            Err(err) => Err(err.into()),
        }
    }
}

pub struct OpenAiCompatibleClientBuilder {
    api_url: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    max_attempts: u32,
    bearer: Option<SecretString>,
    oauth: Option<OAuthConfig>,
}

impl Default for OpenAiCompatibleClientBuilder {
    fn default() -> Self {
        Self {
            api_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: 3,
            bearer: None,
            oauth: None,
        }
    }
}

impl OpenAiCompatibleClientBuilder {
    /// Full URL of the chat completions endpoint.
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn bearer_token(mut self, token: SecretString) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn oauth(mut self, config: OAuthConfig) -> Self {
        self.oauth = Some(config);
        self
    }

    pub fn build(self) -> Result<OpenAiCompatibleClient, LlmClientError> {
        let api_url = self
            .api_url
            .ok_or_else(|| LlmClientError::InvalidConfig("api_url is required".to_string()))?;
        let api_url = parse_url("api_url", &api_url)?;
        if self.model.trim().is_empty() {
            return Err(LlmClientError::InvalidConfig("model must not be empty".to_string()));
        }

        let http = Client::builder().timeout(self.timeout).build()?;

        let auth = match (self.oauth, self.bearer) {
            (Some(_), Some(_)) => {
                return Err(LlmClientError::InvalidConfig(
                    "configure either OAuth or a bearer token, not both".to_string(),
                ))
            }
            (Some(oauth), None) => {
                if oauth.client_id.trim().is_empty() {
                    return Err(LlmClientError::InvalidConfig(
                        "OAuth client_id must not be empty".to_string(),
                    ));
                }
                let token_url = parse_url("token_url", &oauth.token_url)?;
                Auth::OAuth(Arc::new(OAuthTokenProvider::new(
                    http.clone(),
                    token_url,
                    oauth.client_id,
                    oauth.client_secret,
                )))
            }
            (None, Some(token)) => Auth::Bearer(token),
            (None, None) => Auth::None,
        };

        Ok(OpenAiCompatibleClient {
            http,
            api_url,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
            max_attempts: self.max_attempts,
            auth,
        })
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, LlmClientError> {
    Url::parse(value.trim())
        .map_err(|err| LlmClientError::InvalidConfig(format!("{field} '{value}' is invalid: {err}")))
}
