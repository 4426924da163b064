//! Inbound side: drains one transport and drives policy, session state and
//! listener fan-out.

use std::time::Duration;

use cinepick_protocol::{
    ErrorCode, ErrorPayload, InboundEvent, OutboundEvent, TokenRefreshedPayload,
    is_auth_error_message, room_id_of,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::RealtimeClient;
use crate::state::PolicyAction;
use crate::transport::TransportEvent;

/// Deliver events from transport `generation` until it closes or is replaced
pub(crate) async fn pump(
    client: RealtimeClient,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = inbound.recv().await {
        if !client.session().is_current(generation) {
            return;
        }
        client.handle_transport_event(generation, event);
    }

    // Transport task ended without reporting why
    if client.session().is_current(generation) {
        client.handle_transport_event(
            generation,
            TransportEvent::Disconnected("transport close".to_string()),
        );
    }
}

impl RealtimeClient {
    pub(crate) fn handle_transport_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_transport_connected(generation),
            TransportEvent::Disconnected(reason) => self.on_transport_disconnected(generation, reason),
            TransportEvent::ConnectError { message, code } => {
                self.on_connect_error(generation, message, code)
            }
            TransportEvent::Event { name, payload } => self.on_server_event(&name, payload),
        }
    }

    fn on_transport_connected(&self, generation: u64) {
        {
            let mut session = self.session();
            if !session.is_current(generation) {
                return;
            }
            session.policy.on_connected();
            self.publish_state(&session);
        }

        tracing::info!(generation, "Realtime connection established");
        self.emit(InboundEvent::Connect.as_str(), &Value::Null);
    }

    fn on_transport_disconnected(&self, generation: u64, reason: String) {
        {
            let mut session = self.session();
            if !session.is_current(generation) {
                return;
            }
            session.release_link(generation);
            session.policy.on_disconnected();
            self.publish_state(&session);
        }

        tracing::info!(reason = %reason, "Realtime connection lost");
        self.emit(InboundEvent::Disconnect.as_str(), &Value::String(reason));
    }

    fn on_connect_error(&self, generation: u64, message: String, code: Option<String>) {
        // A recognised code decides on its own; the message is only a fallback
        let is_auth = match code.as_deref().map(str::parse::<ErrorCode>) {
            Some(Ok(code)) if code != ErrorCode::Unknown => code.is_auth_failure(),
            _ => is_auth_error_message(&message),
        };

        let (action, first_failure) = {
            let mut session = self.session();
            if !session.is_current(generation) {
                return;
            }
            let first_failure = session.policy.auth_error_count() == 0;
            let action = session.policy.on_transport_error(is_auth);
            if action != PolicyAction::LockAuth {
                // With library reconnection off, a failed handshake ends the transport
                session.release_link(generation);
            }
            self.publish_state(&session);
            (action, first_failure)
        };

        self.emit(
            InboundEvent::ConnectError.as_str(),
            &json!({ "message": message, "code": code }),
        );

        match action {
            PolicyAction::LockAuth => {
                self.enforce_auth_lock(&message, first_failure);
                self.emit_error(&ErrorPayload::new(ErrorCode::Unauthorized, message));
            }
            PolicyAction::TransientError { attempt } => {
                tracing::warn!(attempt, error = %message, "Realtime connection attempt failed");
                self.emit_error(&ErrorPayload::new(
                    ErrorCode::ConnectionError,
                    format!("Connection failed: {}", message),
                ));
            }
            PolicyAction::MaxAttemptsReached { attempts } => {
                tracing::error!(attempts, error = %message, "Realtime connection attempts exhausted");
                self.emit_error(&ErrorPayload::new(
                    ErrorCode::ConnectionError,
                    format!("Connection failed: {}", message),
                ));
                self.emit_error(&ErrorPayload::new(
                    ErrorCode::MaxReconnectAttempts,
                    format!("Failed to connect after {} attempts", attempts),
                ));
            }
            PolicyAction::None => {}
        }
    }

    fn on_server_event(&self, name: &str, payload: Value) {
        match name.parse::<InboundEvent>() {
            Ok(InboundEvent::Error) => self.on_server_error(payload),
            Ok(InboundEvent::TokenRefreshed) => {
                match serde_json::from_value::<TokenRefreshedPayload>(payload.clone()) {
                    Ok(refreshed) => {
                        self.inner.credentials.set_access_token(refreshed.access_token);
                        tracing::info!("Access token refreshed by server");
                    }
                    Err(e) => tracing::warn!(error = %e, "Malformed tokenRefreshed payload"),
                }
                self.emit(name, &payload);
            }
            Ok(InboundEvent::JoinedRoom) => {
                match room_id_of(&payload) {
                    Some(room_id) => {
                        tracing::debug!(room_id = %room_id, "Joined room");
                        self.session().current_room_id = Some(room_id);
                    }
                    None => tracing::warn!("joinedRoom payload without a room id"),
                }
                self.emit(name, &payload);
            }
            Ok(InboundEvent::LeftRoom) => {
                let left = room_id_of(&payload);
                {
                    let mut session = self.session();
                    if left.is_none() || session.current_room_id == left {
                        session.current_room_id = None;
                    }
                }
                self.emit(name, &payload);
            }
            _ => self.emit(name, &payload),
        }
    }

    /// Server errors are forwarded verbatim; UNAUTHORIZED also trips the breaker
    fn on_server_error(&self, payload: Value) {
        let error = serde_json::from_value::<ErrorPayload>(payload.clone()).unwrap_or_else(|_| {
            let message = payload.as_str().unwrap_or("Unknown server error");
            ErrorPayload::new(ErrorCode::Unknown, message)
        });

        tracing::debug!(code = %error.code, event = ?error.event, message = %error.message, "Server error");

        if error.code == ErrorCode::RateLimited
            && error.event.as_deref() == Some(OutboundEvent::SendMessage.as_str())
            && let Some(seconds) = error.retry_after
        {
            self.session().muted_until = Some(Instant::now() + Duration::from_secs(seconds));
        }

        let (action, first_failure) = {
            let mut session = self.session();
            let first_failure = session.policy.auth_error_count() == 0;
            (session.policy.on_server_error(error.code), first_failure)
        };

        if action == PolicyAction::LockAuth {
            self.enforce_auth_lock(&error.message, first_failure);
        }

        self.emit(InboundEvent::Error.as_str(), &payload);
    }
}
