//! Outbound commands.
//!
//! Every command validates locally first. Failures are returned and also
//! published as an `error` event carrying the code and the outbound event
//! name, so subscribers can render them without wrapping each call.
//! Success only means the event was handed to the transport: the server
//! confirms with its own events (`joinedRoom`, `roomUpdate`, ...).

use cinepick_protocol::{
    ChooseMoviePayload, ErrorCode, JoinRoomPayload, OutboundEvent, RoomRef, SendMessagePayload,
    is_public_room_code,
};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::client::RealtimeClient;
use crate::error::CommandError;
use crate::state::ConnectionState;
use crate::transport::OutboundPacket;

impl RealtimeClient {
    /// Send a chat message to a room (by room id, not public code)
    pub fn send_message(&self, room_id: &str, text: &str) -> Result<(), CommandError> {
        let event = OutboundEvent::SendMessage;
        let message = text.trim();

        if message.is_empty() {
            return self.reject(CommandError::bad_request(event, "Message cannot be empty"));
        }

        let max_len = self.inner.config.max_message_len;
        if message.chars().count() > max_len {
            return self.reject(CommandError::bad_request(
                event,
                format!("Message is too long (max {} characters)", max_len),
            ));
        }

        self.check_room_id(event, room_id)?;

        if self.is_muted() {
            return self.reject(CommandError::new(
                ErrorCode::RateLimited,
                event,
                "You are muted in this room",
            ));
        }

        let payload = self.payload(
            event,
            &SendMessagePayload {
                room_id: room_id.to_string(),
                message: message.to_string(),
            },
        )?;
        self.send(event, Some(payload))
    }

    /// Join a room by its 6-digit public code.
    ///
    /// When not connected this starts a connection and waits up to
    /// `join_timeout` for it. The join is emitted at most once; if the
    /// connection does not come up in time a `NOT_CONNECTED` error is
    /// reported instead.
    pub async fn join_room(&self, public_code: &str, user_id: &str) -> Result<(), CommandError> {
        let event = OutboundEvent::JoinRoom;
        let public_code = public_code.trim();

        if !is_public_room_code(public_code) {
            return self.reject(CommandError::bad_request(
                event,
                "Room code must be exactly 6 digits",
            ));
        }
        if user_id.trim().is_empty() {
            return self.reject(CommandError::bad_request(event, "User id is required"));
        }

        let payload = self.payload(
            event,
            &JoinRoomPayload {
                public_code: public_code.to_string(),
                user_id: user_id.to_string(),
            },
        )?;

        if !self.is_connected() && !self.wait_for_connection().await {
            tracing::warn!(public_code, "Gave up joining room: no connection");
            return self.reject(CommandError::new(
                ErrorCode::NotConnected,
                event,
                "Timed out waiting for the realtime connection",
            ));
        }

        self.send(event, Some(payload))
    }

    pub fn leave_room(&self, room_id: &str) -> Result<(), CommandError> {
        let event = OutboundEvent::LeaveRoom;
        self.check_room_id(event, room_id)?;
        let payload = self.payload(event, &RoomRef { room_id: room_id.to_string() })?;
        self.send(event, Some(payload))
    }

    pub fn choose_movie(&self, room_id: &str, movie_id: &str) -> Result<(), CommandError> {
        let event = OutboundEvent::ChooseMovie;
        self.check_room_id(event, room_id)?;
        if movie_id.trim().is_empty() {
            return self.reject(CommandError::bad_request(event, "Movie id is required"));
        }

        let payload = self.payload(
            event,
            &ChooseMoviePayload {
                room_id: room_id.to_string(),
                movie_id: movie_id.to_string(),
            },
        )?;
        self.send(event, Some(payload))
    }

    pub fn get_room(&self, room_id: &str) -> Result<(), CommandError> {
        let event = OutboundEvent::GetRoom;
        self.check_room_id(event, room_id)?;
        let payload = self.payload(event, &RoomRef { room_id: room_id.to_string() })?;
        self.send(event, Some(payload))
    }

    pub fn get_my_rooms(&self) -> Result<(), CommandError> {
        self.send(OutboundEvent::GetMyRooms, None)
    }

    /// Create a room. The settings object is passed through as-is.
    pub fn create_room(&self, settings: Value) -> Result<(), CommandError> {
        let event = OutboundEvent::CreateRoom;
        if !settings.is_object() {
            return self.reject(CommandError::bad_request(
                event,
                "Room settings must be a JSON object",
            ));
        }
        self.send(event, Some(settings))
    }

    /// Whether a server-confirmed mute is still in force
    pub fn is_muted(&self) -> bool {
        let mut session = self.session();
        match session.muted_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                session.muted_until = None;
                false
            }
            None => false,
        }
    }

    /// Room ids are internal ids; a public code here is a caller mistake
    fn check_room_id(&self, event: OutboundEvent, room_id: &str) -> Result<(), CommandError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return self.reject(CommandError::bad_request(event, "Room id is required"));
        }
        if is_public_room_code(room_id) {
            return self.reject(CommandError::bad_request(
                event,
                "Expected a room id but got a 6-digit public room code",
            ));
        }
        Ok(())
    }

    fn payload<T: Serialize>(&self, event: OutboundEvent, payload: &T) -> Result<Value, CommandError> {
        serde_json::to_value(payload)
            .or_else(|e| self.reject(CommandError::bad_request(event, e.to_string())))
    }

    /// Start connecting if needed and wait for the outcome of that attempt
    async fn wait_for_connection(&self) -> bool {
        let mut state = self.subscribe_state();
        if self.state() != ConnectionState::Connecting {
            self.connect();
        }

        let settled = state.wait_for(|s| *s != ConnectionState::Connecting);
        let connected = match tokio::time::timeout(self.inner.config.join_timeout, settled).await {
            Ok(Ok(settled)) => settled.is_connected(),
            _ => false,
        };
        connected
    }

    pub(crate) fn send(&self, event: OutboundEvent, payload: Option<Value>) -> Result<(), CommandError> {
        let sent = {
            let session = self.session();
            session.outbound().map(|outbound| {
                outbound
                    .send(OutboundPacket::Event {
                        name: event.as_str().to_string(),
                        payload,
                    })
                    .is_ok()
            })
        };

        if sent == Some(true) {
            tracing::debug!(event = %event, "Emitted");
            Ok(())
        } else {
            self.reject(CommandError::not_connected(event))
        }
    }

    fn reject<T>(&self, error: CommandError) -> Result<T, CommandError> {
        tracing::debug!(event = %error.event, code = %error.code, message = %error.message, "Command rejected");
        self.emit_error(&error.to_payload());
        Err(error)
    }
}
