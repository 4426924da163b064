//! Room and chat state mirrored from realtime events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cinepick_protocol::{ErrorPayload, InboundEvent, room_id_of};
use serde_json::Value;

use crate::client::RealtimeClient;
use crate::registry::Subscription;

/// What a room screen needs to render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSnapshot {
    pub room: Option<Value>,
    pub messages: Vec<Value>,
    pub my_rooms: Vec<Value>,
    pub last_error: Option<ErrorPayload>,
    pub connected: bool,
}

impl RoomSnapshot {
    pub fn room_id(&self) -> Option<String> {
        self.room.as_ref().and_then(room_id_of)
    }

    fn apply(&mut self, event: InboundEvent, payload: &Value) {
        match event {
            InboundEvent::Connect => self.connected = true,
            InboundEvent::Disconnect => self.connected = false,
            InboundEvent::JoinedRoom | InboundEvent::RoomCreated => {
                let room = payload.get("room").unwrap_or(payload).clone();
                if self.room_id() != room_id_of(&room) {
                    self.messages.clear();
                }
                self.room = Some(room);
            }
            InboundEvent::RoomUpdate | InboundEvent::RoomData => {
                let room = payload.get("room").unwrap_or(payload);
                let current = self.room_id();
                if current.is_none() || current == room_id_of(room) {
                    self.room = Some(room.clone());
                }
            }
            InboundEvent::LeftRoom => {
                let left = room_id_of(payload);
                if left.is_none() || left == self.room_id() {
                    self.room = None;
                    self.messages.clear();
                }
            }
            InboundEvent::ChatHistory => {
                if self.concerns_current_room(payload) {
                    self.messages = list_of(payload, "messages");
                }
            }
            InboundEvent::NewMessage => {
                let message = payload.get("message").filter(|m| m.is_object()).unwrap_or(payload);
                if self.concerns_current_room(message) {
                    self.messages.push(message.clone());
                }
            }
            InboundEvent::MyRooms => self.my_rooms = list_of(payload, "rooms"),
            InboundEvent::Error => match serde_json::from_value::<ErrorPayload>(payload.clone()) {
                Ok(error) => {
                    // An auth lock drops the transport without a disconnect event
                    if error.code.is_auth_failure() {
                        self.connected = false;
                    }
                    self.last_error = Some(error);
                }
                Err(e) => tracing::debug!(error = %e, "Unrecognised error payload"),
            },
            InboundEvent::ConnectError | InboundEvent::TokenRefreshed => {}
        }
    }

    /// Payloads without a room id are taken to be about the current room
    fn concerns_current_room(&self, payload: &Value) -> bool {
        match payload.get("roomId").and_then(|v| v.as_str()) {
            Some(id) => self.room_id().as_deref() == Some(id),
            None => true,
        }
    }
}

/// A bare array, or an array under `key`
fn list_of(payload: &Value, key: &str) -> Vec<Value> {
    payload
        .as_array()
        .or_else(|| payload.get(key).and_then(|v| v.as_array()))
        .cloned()
        .unwrap_or_default()
}

/// Keeps a [`RoomSnapshot`] current by listening on a client.
///
/// Listeners are removed when the tracker is dropped.
pub struct RoomTracker {
    snapshot: Arc<Mutex<RoomSnapshot>>,
    subscriptions: Vec<Subscription>,
}

impl RoomTracker {
    pub fn attach(client: &RealtimeClient) -> Self {
        let snapshot = Arc::new(Mutex::new(RoomSnapshot {
            connected: client.is_connected(),
            ..RoomSnapshot::default()
        }));

        let subscriptions = InboundEvent::ALL
            .iter()
            .copied()
            .filter(|event| {
                !matches!(event, InboundEvent::ConnectError | InboundEvent::TokenRefreshed)
            })
            .map(|event| {
                let snapshot = Arc::clone(&snapshot);
                client.on(event.as_str(), move |payload| {
                    lock(&snapshot).apply(event, payload);
                })
            })
            .collect();

        Self {
            snapshot,
            subscriptions,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        lock(&self.snapshot).clone()
    }

    pub fn room_id(&self) -> Option<String> {
        lock(&self.snapshot).room_id()
    }
}

impl Drop for RoomTracker {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

fn lock(snapshot: &Mutex<RoomSnapshot>) -> MutexGuard<'_, RoomSnapshot> {
    snapshot.lock().unwrap_or_else(PoisonError::into_inner)
}
