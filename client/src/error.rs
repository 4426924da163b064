use cinepick_protocol::{ErrorCode, ErrorPayload, OutboundEvent};
use thiserror::Error;

/// A command rejected before (or instead of) reaching the server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{event} failed ({code}): {message}")]
pub struct CommandError {
    pub code: ErrorCode,
    pub event: OutboundEvent,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, event: OutboundEvent, message: impl Into<String>) -> Self {
        Self {
            code,
            event,
            message: message.into(),
        }
    }

    pub fn bad_request(event: OutboundEvent, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, event, message)
    }

    pub fn not_connected(event: OutboundEvent) -> Self {
        Self::new(ErrorCode::NotConnected, event, "Not connected to the realtime server")
    }

    /// The `error` event payload published for this failure
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload::new(self.code, self.message.clone()).with_event(self.event.as_str())
    }
}
