//! Realtime client for the cinepick room server.
//!
//! One [`RealtimeClient`] owns at most one Socket.IO connection, fans
//! server events out to listeners, validates and sends room commands, and
//! stops reconnecting once authentication has failed until a token refresh
//! succeeds.
//!
//! ```no_run
//! # async fn run() {
//! use cinepick_client::{ClientConfig, EndpointResolver, RealtimeClient};
//!
//! let config = ClientConfig::new(EndpointResolver::fixed("https://api.example.com"));
//! let client = RealtimeClient::builder(config).build();
//! client.on("newMessage", |message| println!("{message}"));
//! client.connect();
//! let _ = client.join_room("123456", "user-1").await;
//! # }
//! ```

mod auth;
mod client;
mod config;
mod connection;
mod credentials;
mod error;
mod handler;
mod receiver;
pub mod registry;
pub mod room;
mod sender;
mod state;
pub mod transport;

#[cfg(test)]
mod tests;

pub use cinepick_protocol::{ErrorCode, ErrorPayload, InboundEvent, OutboundEvent};

pub use auth::{HttpTokenRefresher, RefreshError, RefreshedTokens, TokenRefresher};
pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use config::{ClientConfig, EndpointResolver};
pub use connection::{WsConnector, socket_url};
pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use error::CommandError;
pub use handler::{AuthFailureHandler, LogAuthFailure};
pub use registry::{EventRegistry, Listener, Subscription, listener};
pub use room::{RoomSnapshot, RoomTracker};
pub use state::{Backoff, ConnectionState, PolicyAction, ReconnectPolicy};
pub use transport::{ConnectOptions, Connector, TransportEvent, TransportLink};
