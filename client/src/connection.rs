//! Websocket transport speaking Engine.IO v4 / Socket.IO v5.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use cinepick_protocol::{EnginePacket, OpenInfo, SocketPacket, parse_engine_packet};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

use crate::transport::{ConnectOptions, Connector, OutboundPacket, TransportEvent, TransportLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Upper bound on the server-announced heartbeat window
const MAX_HEARTBEAT: Duration = Duration::from_secs(24 * 60 * 60);

/// Opens websocket-only Socket.IO connections.
///
/// There is no library-level reconnection: when the socket dies the link
/// reports it and stays dead.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    cookie: Option<String>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cookie header sent with the handshake when credentials are enabled
    pub fn with_cookie(cookie: impl Into<String>) -> Self {
        Self {
            cookie: Some(cookie.into()),
        }
    }
}

impl Connector for WsConnector {
    fn open(&self, options: ConnectOptions) -> TransportLink {
        let (link, outbound, inbound) = TransportLink::pair();
        let cookie = if options.with_credentials {
            self.cookie.clone()
        } else {
            None
        };

        tokio::spawn(run(options, cookie, outbound, inbound));
        link
    }
}

/// Websocket URL for a realtime endpoint base URL
pub fn socket_url(base: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid realtime endpoint {}", base))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("Unsupported realtime endpoint scheme: {}", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot use scheme {} for {}", scheme, base))?;

    url.set_path(path);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");

    Ok(url)
}

async fn run(
    options: ConnectOptions,
    cookie: Option<String>,
    outbound: mpsc::UnboundedReceiver<OutboundPacket>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
) {
    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&options, cookie.as_deref()));
    let (ws, open) = match handshake.await {
        Ok(Ok(established)) => established,
        Ok(Err(e)) => {
            tracing::warn!(url = %options.url, error = %e, "Realtime handshake failed");
            let _ = inbound.send(TransportEvent::ConnectError {
                message: format!("{:#}", e),
                code: None,
            });
            return;
        }
        Err(_) => {
            tracing::warn!(url = %options.url, "Realtime handshake timed out");
            let _ = inbound.send(TransportEvent::ConnectError {
                message: "timeout".to_string(),
                code: None,
            });
            return;
        }
    };

    tracing::debug!(sid = %open.sid, "Engine.IO session opened");

    if let Some(reason) = serve(ws, &open, &options.namespace, outbound, &inbound).await {
        let _ = inbound.send(TransportEvent::Disconnected(reason));
    }
}

/// Open the websocket, read the Engine.IO open packet and request the namespace
async fn handshake(options: &ConnectOptions, cookie: Option<&str>) -> Result<(WsStream, OpenInfo)> {
    let url = socket_url(&options.url, &options.path)?;

    let mut request = url
        .as_str()
        .into_client_request()
        .context("Invalid websocket request")?;
    if let Some(cookie) = cookie {
        request.headers_mut().insert(
            COOKIE,
            HeaderValue::from_str(cookie).context("Invalid cookie header")?,
        );
    }

    let (mut ws, _response) = connect_async(request)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    let open = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => match parse_engine_packet(&text)? {
                EnginePacket::Open(info) => break info,
                other => tracing::debug!(packet = ?other, "Ignoring packet before open"),
            },
            Some(Ok(Message::Ping(data))) => ws.send(Message::Pong(data)).await?,
            Some(Ok(Message::Close(_))) | None => bail!("Connection closed during handshake"),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e).context("WebSocket error during handshake"),
        }
    };

    let connect = SocketPacket::Connect {
        namespace: options.namespace.clone(),
        data: options.auth_token.as_ref().map(|token| json!({ "token": token })),
    };
    ws.send(Message::Text(EnginePacket::Message(connect).to_wire_format()))
        .await
        .context("Failed to send namespace connect")?;

    Ok((ws, open))
}

/// Shuttle packets until the connection ends.
///
/// Returns the disconnect reason, or `None` when nothing more should be
/// reported (client hung up, or the namespace connect was refused).
async fn serve(
    mut ws: WsStream,
    open: &OpenInfo,
    namespace: &str,
    mut outbound: mpsc::UnboundedReceiver<OutboundPacket>,
    inbound: &mpsc::UnboundedSender<TransportEvent>,
) -> Option<String> {
    let heartbeat = heartbeat_window(open);
    let mut deadline = Instant::now() + heartbeat;
    let mut connected = false;

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let packet = match parse_engine_packet(&text) {
                        Ok(packet) => packet,
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping malformed packet");
                            continue;
                        }
                    };

                    match packet {
                        EnginePacket::Ping => {
                            deadline = Instant::now() + heartbeat;
                            let pong = Message::Text(EnginePacket::Pong.to_wire_format());
                            if ws.send(pong).await.is_err() {
                                return ended(connected, "transport error", inbound);
                            }
                        }
                        EnginePacket::Close => return ended(connected, "transport close", inbound),
                        EnginePacket::Message(ref socket) if socket.namespace() != namespace => {
                            tracing::debug!(namespace = socket.namespace(), "Ignoring packet for other namespace");
                        }
                        EnginePacket::Message(SocketPacket::Connect { .. }) => {
                            connected = true;
                            if inbound.send(TransportEvent::Connected).is_err() {
                                return None;
                            }
                        }
                        EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                            let (message, code) = connect_error_details(data);
                            let _ = inbound.send(TransportEvent::ConnectError { message, code });
                            return None;
                        }
                        EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
                            return ended(connected, "io server disconnect", inbound);
                        }
                        EnginePacket::Message(SocketPacket::Event { name, args, .. }) => {
                            let payload = args.into_iter().next().unwrap_or(Value::Null);
                            if inbound.send(TransportEvent::Event { name, payload }).is_err() {
                                return None;
                            }
                        }
                        _ => {}
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return ended(connected, "transport close", inbound);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WebSocket error");
                    return ended(connected, "transport close", inbound);
                }
            },
            packet = outbound.recv() => match packet {
                Some(OutboundPacket::Event { name, payload }) => {
                    let wire = EnginePacket::Message(SocketPacket::event(namespace, &name, payload))
                        .to_wire_format();
                    if let Err(e) = ws.send(Message::Text(wire)).await {
                        tracing::warn!(event = %name, error = %e, "Failed to send event");
                        return ended(connected, "transport error", inbound);
                    }
                }
                Some(OutboundPacket::Close) | None => {
                    let goodbye = SocketPacket::Disconnect { namespace: namespace.to_string() };
                    let _ = ws.send(Message::Text(EnginePacket::Message(goodbye).to_wire_format())).await;
                    let _ = ws.close(None).await;
                    return None;
                }
            },
            _ = inbound.closed() => {
                let _ = ws.close(None).await;
                return None;
            }
            _ = sleep_until(deadline) => {
                tracing::warn!("No ping from server within heartbeat window");
                return ended(connected, "ping timeout", inbound);
            }
        }
    }
}

/// The connection ended for `reason`. Before the namespace connect that is
/// a failed connection attempt rather than a disconnect.
fn ended(
    connected: bool,
    reason: &str,
    inbound: &mpsc::UnboundedSender<TransportEvent>,
) -> Option<String> {
    if connected {
        return Some(reason.to_string());
    }
    let _ = inbound.send(TransportEvent::ConnectError {
        message: reason.to_string(),
        code: None,
    });
    None
}

/// Silence allowed between server pings before the link is considered dead
fn heartbeat_window(open: &OpenInfo) -> Duration {
    Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout)).min(MAX_HEARTBEAT)
}

/// `{message, data: {code}}` as sent with a refused namespace connect
fn connect_error_details(data: Option<Value>) -> (String, Option<String>) {
    let Some(data) = data else {
        return ("Connection refused".to_string(), None);
    };

    let message = data
        .get("message")
        .and_then(|v| v.as_str())
        .or_else(|| data.as_str())
        .unwrap_or("Connection refused")
        .to_string();

    let code = data
        .get("data")
        .and_then(|d| d.get("code"))
        .or_else(|| data.get("code"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    (message, code)
}
