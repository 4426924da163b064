//! Seam between the client and the socket library.

use serde_json::Value;
use tokio::sync::mpsc;

/// Everything a transport needs to open one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Realtime endpoint base URL, e.g. `https://api.example.com`
    pub url: String,
    pub namespace: String,
    /// Engine.IO path, usually `/socket.io/`
    pub path: String,
    /// Sent as `{"token": ..}` in the namespace handshake
    pub auth_token: Option<String>,
    /// Never fall back to long-polling
    pub websocket_only: bool,
    /// Library-level reconnection. Always off: reconnects go through the client policy.
    pub reconnection: bool,
    /// Pass cross-origin credentials (cookies) with the handshake
    pub with_credentials: bool,
}

/// Something that happened on the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected(String),
    ConnectError {
        message: String,
        code: Option<String>,
    },
    Event {
        name: String,
        payload: Value,
    },
}

/// Something the client wants the transport to do
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPacket {
    Event { name: String, payload: Option<Value> },
    Close,
}

/// Channels of one open transport.
///
/// Dropping `outbound` closes the transport; dropping `inbound` tells the
/// transport nobody is listening any more.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<OutboundPacket>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Create a link and the transport-side ends of its channels
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<OutboundPacket>,
        mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let link = Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
        };
        (link, outbound_rx, inbound_tx)
    }
}

/// Opens transports. Must be called from within a tokio runtime.
///
/// `open` returns immediately; the outcome of the handshake arrives as
/// `Connected` or `ConnectError` on the link's inbound channel.
pub trait Connector: Send + Sync {
    fn open(&self, options: ConnectOptions) -> TransportLink;
}
