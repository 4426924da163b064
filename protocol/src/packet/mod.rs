//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only what a websocket-only client needs is covered: binary attachments
//! and acknowledgements are rejected on parse and never produced.

mod tests;

use std::iter;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ParseError;

/// Handshake data sent by the server in the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds to wait for a ping before the link is considered dead
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// Transport-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn to_wire_format(&self) -> String {
        match self {
            Self::Open(info) => format!(
                "0{}",
                serde_json::to_string(info).unwrap_or_else(|_| "{}".to_string())
            ),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Message(packet) => format!("4{}", packet.to_wire_format()),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Namespace-level packet carried inside an Engine.IO message
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Build an event packet with a single optional argument
    pub fn event(namespace: &str, name: &str, payload: Option<Value>) -> Self {
        Self::Event {
            namespace: namespace.to_string(),
            name: name.to_string(),
            args: payload.into_iter().collect(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Serialize to wire format: TYPE[NAMESPACE,][JSON]
    pub fn to_wire_format(&self) -> String {
        let (kind, data) = match self {
            Self::Connect { data, .. } => ('0', data.as_ref().map(Value::to_string)),
            Self::Disconnect { .. } => ('1', None),
            Self::Event { name, args, .. } => {
                let items = iter::once(Value::String(name.clone()))
                    .chain(args.iter().cloned())
                    .collect();
                ('2', Some(Value::Array(items).to_string()))
            }
            Self::ConnectError { data, .. } => ('4', data.as_ref().map(Value::to_string)),
        };

        let mut wire = String::new();
        wire.push(kind);

        let namespace = self.namespace();
        if !namespace.is_empty() && namespace != "/" {
            wire.push_str(namespace);
            wire.push(',');
        }

        if let Some(data) = data {
            wire.push_str(&data);
        }

        wire
    }
}

/// Parse a complete websocket text frame into an Engine.IO packet
pub fn parse_engine_packet(frame: &str) -> Result<EnginePacket> {
    let kind = frame.chars().next().ok_or(ParseError::EmptyPacket)?;
    let body = &frame[kind.len_utf8()..];

    match kind {
        '0' => parse_open(body),
        '1' => Ok(EnginePacket::Close),
        // Ping and pong may carry a "probe" body, which only matters during
        // a polling-to-websocket upgrade
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => parse_socket_packet(body).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(ParseError::UnknownPacketType(other).into()),
    }
}

fn parse_open(body: &str) -> Result<EnginePacket> {
    if body.is_empty() {
        return Err(ParseError::MissingField("open handshake".to_string()).into());
    }

    let info: OpenInfo = serde_json::from_str(body)
        .map_err(|e| ParseError::InvalidFormat(format!("open handshake: {}", e)))?;

    Ok(EnginePacket::Open(info))
}

/// Parse the Socket.IO part of an Engine.IO message
pub fn parse_socket_packet(input: &str) -> Result<SocketPacket> {
    let kind = input.chars().next().ok_or(ParseError::EmptyPacket)?;
    let mut rest = &input[kind.len_utf8()..];

    match kind {
        '0' | '1' | '2' | '4' => {}
        '3' => return Err(ParseError::Unsupported("ack".to_string()).into()),
        '5' | '6' => return Err(ParseError::Unsupported("binary packet".to_string()).into()),
        other => return Err(ParseError::UnknownPacketType(other).into()),
    }

    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => {
                let namespace = &rest[..idx];
                rest = &rest[idx + 1..];
                namespace
            }
            None => std::mem::take(&mut rest),
        }
    } else {
        "/"
    }
    .to_string();

    // Ack id: digits right before the JSON body. Tolerated, not used.
    let ack_digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    rest = &rest[ack_digits..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(rest)
                .map_err(|e| ParseError::InvalidFormat(format!("packet data: {}", e)))?,
        )
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '4' => Ok(SocketPacket::ConnectError { namespace, data }),
        _ => parse_event(namespace, data),
    }
}

fn parse_event(namespace: String, data: Option<Value>) -> Result<SocketPacket> {
    let Some(Value::Array(mut items)) = data else {
        return Err(ParseError::MissingField("event array".to_string()).into());
    };

    if items.is_empty() {
        return Err(ParseError::MissingField("event name".to_string()).into());
    }

    let name = match items.remove(0) {
        Value::String(name) => name,
        _ => {
            return Err(ParseError::InvalidFormat("event name must be a string".to_string()).into());
        }
    };

    Ok(SocketPacket::Event {
        namespace,
        name,
        args: items,
    })
}
