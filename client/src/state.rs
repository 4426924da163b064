use std::fmt;
use std::time::Duration;

use cinepick_protocol::ErrorCode;

/// Connection lifecycle.
///
/// `AuthLocked` is absorbing: only a successful token refresh leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    AuthLocked,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_auth_locked(&self) -> bool {
        matches!(self, Self::AuthLocked)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::AuthLocked => "auth-locked",
        };
        f.write_str(name)
    }
}

/// Delay schedule for caller-driven reconnects
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// Delay before reconnect attempt number `attempt` (0-based).
    ///
    /// A multiplier that yields a negative, infinite or NaN delay gives `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(32) as i32);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// What the client has to do after feeding an event to the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    None,
    /// Recoverable failure; the caller may reconnect
    TransientError { attempt: u32 },
    /// Attempt ceiling reached. Still not locked: a caller may keep trying.
    MaxAttemptsReached { attempts: u32 },
    /// Credentials rejected: tear down, clear tokens, stop reconnecting
    LockAuth,
}

/// Reconnection and auth-failure bookkeeping for one connection
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    state: ConnectionState,
    reconnect_attempts: u32,
    auth_error_count: u32,
    max_reconnect_attempts: u32,
    max_auth_errors: u32,
}

impl ReconnectPolicy {
    pub fn new(max_reconnect_attempts: u32, max_auth_errors: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            auth_error_count: 0,
            max_reconnect_attempts,
            max_auth_errors,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn auth_error_count(&self) -> u32 {
        self.auth_error_count
    }

    pub fn is_auth_locked(&self) -> bool {
        self.state.is_auth_locked()
    }

    /// Only a disconnected, unlocked client may start a new attempt
    pub fn can_connect(&self) -> bool {
        self.state == ConnectionState::Disconnected
    }

    /// Disconnected -> Connecting. Returns false when refused.
    pub fn begin_connect(&mut self) -> bool {
        if !self.can_connect() {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    pub fn on_connected(&mut self) {
        if self.is_auth_locked() {
            return;
        }
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.auth_error_count = 0;
    }

    pub fn on_transport_error(&mut self, is_auth: bool) -> PolicyAction {
        if is_auth {
            self.lock_auth();
            return PolicyAction::LockAuth;
        }
        if self.is_auth_locked() {
            return PolicyAction::None;
        }

        self.state = ConnectionState::Disconnected;
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);

        if self.reconnect_attempts >= self.max_reconnect_attempts {
            PolicyAction::MaxAttemptsReached {
                attempts: self.reconnect_attempts,
            }
        } else {
            PolicyAction::TransientError {
                attempt: self.reconnect_attempts,
            }
        }
    }

    /// Server-pushed `error` event
    pub fn on_server_error(&mut self, code: ErrorCode) -> PolicyAction {
        if code.is_auth_failure() {
            self.lock_auth();
            PolicyAction::LockAuth
        } else {
            PolicyAction::None
        }
    }

    /// Transport went away. Never schedules a reconnect, least of all when locked.
    pub fn on_disconnected(&mut self) {
        if !self.is_auth_locked() {
            self.state = ConnectionState::Disconnected;
        }
    }

    pub fn lock_auth(&mut self) {
        self.state = ConnectionState::AuthLocked;
        self.auth_error_count = self.max_auth_errors;
    }

    /// Token refresh succeeded
    pub fn unlock(&mut self) {
        if self.is_auth_locked() {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Explicit disconnect: drop per-connection counters, keep the auth lock
    pub fn reset(&mut self) {
        self.reconnect_attempts = 0;
        if !self.is_auth_locked() {
            self.state = ConnectionState::Disconnected;
        }
    }
}
