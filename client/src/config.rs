use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::state::Backoff;

/// Resolves the realtime endpoint base URL. Consulted on every `connect()`.
#[derive(Clone)]
pub struct EndpointResolver(Arc<dyn Fn() -> String + Send + Sync>);

impl EndpointResolver {
    pub fn fixed(url: impl Into<String>) -> Self {
        let url = url.into();
        Self(Arc::new(move || url.clone()))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn resolve(&self) -> String {
        (self.0)()
    }
}

impl fmt::Debug for EndpointResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointResolver").finish_non_exhaustive()
    }
}

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: EndpointResolver,
    /// Token refresh endpoint; enables the built-in HTTP refresher
    pub refresh_url: Option<String>,
    pub namespace: String,
    pub socket_path: String,
    /// Failed attempts after which a terminal error is reported
    pub max_reconnect_attempts: u32,
    /// Value the auth error counter jumps to when the client locks
    pub max_auth_errors: u32,
    /// Maximum chat message length, in characters
    pub max_message_len: usize,
    /// How long `join_room` waits for a connection
    pub join_timeout: Duration,
    pub with_credentials: bool,
    /// Try one token refresh on the first auth failure before giving up
    pub refresh_on_auth_failure: bool,
    pub backoff: Backoff,
}

impl ClientConfig {
    pub fn new(endpoint: EndpointResolver) -> Self {
        Self {
            endpoint,
            refresh_url: None,
            namespace: "/".to_string(),
            socket_path: "/socket.io/".to_string(),
            max_reconnect_attempts: 5,
            max_auth_errors: 3,
            max_message_len: 1000,
            join_timeout: Duration::from_secs(5),
            with_credentials: true,
            refresh_on_auth_failure: true,
            backoff: Backoff::default(),
        }
    }

    /// Build from `CINEPICK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `CINEPICK_WS_URL` is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("CINEPICK_WS_URL").ok_or_else(|| anyhow!("CINEPICK_WS_URL is not set"))?;
        let mut config = Self::new(EndpointResolver::fixed(url));

        config.refresh_url = lookup("CINEPICK_REFRESH_URL");

        if let Some(namespace) = lookup("CINEPICK_WS_NAMESPACE") {
            config.namespace = namespace;
        }

        if let Some(timeout) = lookup("CINEPICK_JOIN_TIMEOUT_MS") {
            let millis: u64 = timeout
                .parse()
                .with_context(|| format!("Invalid CINEPICK_JOIN_TIMEOUT_MS: {}", timeout))?;
            config.join_timeout = Duration::from_millis(millis);
        }

        if let Some(attempts) = lookup("CINEPICK_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = attempts
                .parse()
                .with_context(|| format!("Invalid CINEPICK_MAX_RECONNECT_ATTEMPTS: {}", attempts))?;
        }

        Ok(config)
    }
}
