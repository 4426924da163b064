/// Called when the credentials are definitively rejected.
///
/// Implementations typically send the user to a sign-in surface. Closures
/// taking the failure reason implement this trait.
///
/// # Example
///
/// ```ignore
/// let client = RealtimeClient::builder(config)
///     .on_auth_failure(|reason: &str| router.redirect("/sign-in", reason))
///     .build();
/// ```
pub trait AuthFailureHandler: Send + Sync {
    fn on_auth_failure(&self, reason: &str);
}

impl<F> AuthFailureHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_auth_failure(&self, reason: &str) {
        self(reason)
    }
}

/// Default handler: log and do nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuthFailure;

impl AuthFailureHandler for LogAuthFailure {
    fn on_auth_failure(&self, reason: &str) {
        tracing::warn!(reason, "Authentication failed; sign-in required");
    }
}
