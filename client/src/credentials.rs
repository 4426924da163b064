use std::sync::{PoisonError, RwLock};

/// Where the access and refresh credentials live
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    /// A refresh credential this layer can see. Usually `None` in browsers,
    /// where it sits in an HTTP-only cookie.
    fn refresh_token(&self) -> Option<String>;

    fn set_access_token(&self, token: String);

    fn set_refresh_token(&self, token: String);

    /// Forget every stored credential
    fn clear(&self);
}

#[derive(Debug, Default)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

/// Process-memory credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<Tokens>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: Option<String>, refresh: Option<String>) -> Self {
        Self {
            tokens: RwLock::new(Tokens { access, refresh }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tokens> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tokens> {
        self.tokens.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.read().access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.read().refresh.clone()
    }

    fn set_access_token(&self, token: String) {
        self.write().access = Some(token);
    }

    fn set_refresh_token(&self, token: String) {
        self.write().refresh = Some(token);
    }

    fn clear(&self) {
        *self.write() = Tokens::default();
    }
}
