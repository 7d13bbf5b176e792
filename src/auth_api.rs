//! Auth API seam — the refresh endpoint.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::AuthError;

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Some servers rotate the refresh token; absent means keep the old one.
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds; absent means use the default TTL.
    pub expires_in: Option<u64>,
}

/// The authentication API consumed by the refresh coordinator.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange a refresh token for a new token grant.
    ///
    /// Fails with [`AuthError::Unauthorized`] when the refresh token is
    /// invalid or expired.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, AuthError>;
}

/// HTTP implementation posting to `{base_url}/auth/refresh`.
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAuthApi {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, AuthError> {
        let url = format!("{}/auth/refresh", self.base_url);
        debug!(%url, "Calling refresh endpoint");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "refresh_token": refresh_token.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AuthError::Request(format!(
                "refresh endpoint returned status {status}"
            )));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}
