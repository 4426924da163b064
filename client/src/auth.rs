use async_trait::async_trait;
use cinepick_protocol::{ErrorCode, ErrorPayload};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::client::RealtimeClient;

#[derive(Error, Debug)]
pub enum RefreshError {
    /// The refresh credential itself was rejected
    #[error("Refresh rejected: {0}")]
    Unauthorized(String),

    #[error("Refresh endpoint returned {0}")]
    Status(u16),

    #[error("Refresh request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("No token refresher configured")]
    Unavailable,
}

impl RefreshError {
    /// Authorization-class failures clear credentials; the rest are recoverable
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Fresh credentials returned by a refresh
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh credential for a new access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// `refresh_token` is `None` when the credential is out of band (cookie)
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshedTokens, RefreshError>;
}

/// `POST`s to a refresh endpoint
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenRefresher {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Use a preconfigured client, e.g. one carrying the session cookie
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshedTokens, RefreshError> {
        let request = self.client.post(&self.url);
        let request = match refresh_token {
            Some(token) => request.json(&json!({ "refreshToken": token })),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Unauthorized(if body.is_empty() {
                status.to_string()
            } else {
                body
            }));
        }

        if !status.is_success() {
            return Err(RefreshError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_refresh_response(&body)
    }
}

impl RealtimeClient {
    /// Get a new access token and reconnect with it.
    ///
    /// Uses the stored refresh credential when there is one, otherwise the
    /// refresher's out-of-band credential. On success the auth lock is
    /// lifted and `connect()` is called. An authorization-class failure
    /// clears every credential and invokes the auth-failure handler; any
    /// other failure is published as a `REFRESH_FAILED` error and changes
    /// nothing else.
    pub async fn refresh_token(&self) -> Result<(), RefreshError> {
        let refresh_token = self.inner.credentials.refresh_token();
        self.refresh_with(refresh_token).await
    }

    pub(crate) async fn refresh_with(&self, refresh_token: Option<String>) -> Result<(), RefreshError> {
        let Some(refresher) = self.inner.refresher.clone() else {
            tracing::warn!("Token refresh requested but no refresher is configured");
            return Err(RefreshError::Unavailable);
        };

        match refresher.refresh(refresh_token.as_deref()).await {
            Ok(tokens) => {
                self.inner.credentials.set_access_token(tokens.access_token);
                if let Some(refresh_token) = tokens.refresh_token {
                    self.inner.credentials.set_refresh_token(refresh_token);
                }

                {
                    let mut session = self.session();
                    session.policy.unlock();
                    self.publish_state(&session);
                }

                tracing::info!("Access token refreshed; reconnecting");
                self.connect();
                Ok(())
            }
            Err(e) if e.is_unauthorized() => {
                tracing::warn!(error = %e, "Refresh credential rejected");
                self.inner.credentials.clear();
                self.inner.auth_handler.on_auth_failure(&e.to_string());
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                self.emit_error(&ErrorPayload::new(ErrorCode::RefreshFailed, e.to_string()));
                Err(e)
            }
        }
    }
}

/// Accepts `{accessToken, refreshToken?}`, optionally wrapped in `data`
fn parse_refresh_response(body: &str) -> Result<RefreshedTokens, RefreshError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

    let tokens = json.get("data").filter(|d| d.is_object()).unwrap_or(&json);

    serde_json::from_value(tokens.clone())
        .map_err(|_| RefreshError::InvalidResponse("missing accessToken".to_string()))
}
