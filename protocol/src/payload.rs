use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Machine-readable error code carried by `error` events.
///
/// The first six are sent by the server; the rest are produced locally by
/// the client so that subscribers can tell connection problems apart from
/// rejected operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    BadRequest,
    NotFound,
    RateLimited,
    InternalError,
    NotConnected,
    ConnectionError,
    MaxReconnectAttempts,
    RefreshFailed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotConnected => "NOT_CONNECTED",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::MaxReconnectAttempts => "MAX_RECONNECT_ATTEMPTS",
            Self::RefreshFailed => "REFRESH_FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether the code means the credentials themselves were rejected
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl FromStr for ErrorCode {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the `error` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default)]
    pub code: ErrorCode,
    /// Outbound event the error belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Seconds until the operation may be retried (sent with RATE_LIMITED)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            event: None,
            retry_after: None,
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Payload of the `tokenRefreshed` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshedPayload {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `joinRoom` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub public_code: String,
    pub user_id: String,
}

/// Payload naming a single room, used by `leaveRoom` and `getRoom`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: String,
}

/// `sendMessage` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub room_id: String,
    pub message: String,
}

/// `chooseMovie` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChooseMoviePayload {
    pub room_id: String,
    pub movie_id: String,
}

/// A 6-digit human-shareable room code, as opposed to the internal room id
pub fn is_public_room_code(value: &str) -> bool {
    value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit())
}

const AUTH_ERROR_MARKERS: [&str; 6] = [
    "unauthorized",
    "authentication",
    "invalid token",
    "token expired",
    "jwt",
    "not authorized",
];

/// Classify a `connect_error` message as an authentication failure
pub fn is_auth_error_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    AUTH_ERROR_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Extract the room id from an opaque room payload.
///
/// Looks at `id`/`roomId` on the payload itself, then on a nested `room`.
pub fn room_id_of(payload: &Value) -> Option<String> {
    fn direct(value: &Value) -> Option<String> {
        value
            .get("roomId")
            .or_else(|| value.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    payload
        .get("room")
        .and_then(direct)
        .or_else(|| direct(payload))
}
