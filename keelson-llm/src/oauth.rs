use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use url::Url;

use crate::types::TokenResponse;
use crate::LlmClientError;

const DEFAULT_EXPIRES_IN: u64 = 3600;
const EXPIRY_MARGIN: u64 = 60;

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

/// Client-credentials token source. Tokens are cached until shortly before
/// they expire; concurrent refreshes collapse into one request.
pub struct OAuthTokenProvider {
    http: Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    cache: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
}

impl OAuthTokenProvider {
    pub fn new(http: Client, token_url: Url, client_id: String, client_secret: SecretString) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            cache: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub async fn access_token(&self) -> Result<SecretString, LlmClientError> {
        if let Some(token) = self.cached().await {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;
        if let Some(token) = self.cached().await {
            return Ok(token);
        }

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
            ])
            .send()
            .await
            .map_err(|err| {
                tracing::error!(error = %err, token_url = %self.token_url, "OAuth token refresh failed");
                LlmClientError::Request(err)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, token_url = %self.token_url, "OAuth token refresh rejected");
            return Err(LlmClientError::OAuth { status, body });
        }

        let token: TokenResponse = response.json().await?;
        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let lifetime = Duration::from_secs(expires_in.saturating_sub(EXPIRY_MARGIN));
        let value = SecretString::new(token.access_token);

        *self.cache.write().await = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::info!(expires_in, "OAuth token refreshed");

        Ok(value)
    }

    /// Drops the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn cached(&self) -> Option<SecretString> {
        let guard = self.cache.read().await;
        guard
            .as_ref()
            .filter(|token| Instant::now() < token.expires_at)
            .map(|token| token.value.clone())
    }
}
