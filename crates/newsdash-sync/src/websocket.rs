//! WebSocket connector built on tokio-tungstenite
//!
//! Established links enforce a heartbeat. Socket.IO servers ping the client
//! every `pingInterval` and the link is dropped after
//! `pingInterval + pingTimeout` without one. With the JSON framing the link
//! sends WebSocket pings itself and expects to hear from the server within
//! the same window.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use newsdash_core::{Framing, RawMessage, TransportError};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Inbound, EIO_PONG, SIO_CONNECT, SIO_DISCONNECT};
use crate::link::{Connector, Link};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn ws_error(error: WsError) -> TransportError {
    TransportError::WebSocket {
        reason: error.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Heartbeat
// ----------------------------------------------------------------------------

/// Liveness window of an established link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Expected period between pings
    pub interval: Duration,
    /// Grace after a missed ping
    pub timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(25_000),
            timeout: Duration::from_millis(20_000),
        }
    }
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Silence after which the link is declared dead
    pub fn window(&self) -> Duration {
        self.interval + self.timeout
    }

    /// Values announced in an Engine.IO open packet; fields the server left
    /// out keep their current value
    fn announced(self, params: &Value) -> Self {
        let millis = |key: &str, fallback: Duration| {
            params
                .get(key)
                .and_then(Value::as_u64)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };
        Self {
            interval: millis("pingInterval", self.interval),
            timeout: millis("pingTimeout", self.timeout),
        }
    }
}

// ----------------------------------------------------------------------------
// Connector
// ----------------------------------------------------------------------------

/// Opens WebSocket links speaking the configured framing
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector {
    framing: Framing,
    heartbeat: Heartbeat,
}

impl WebSocketConnector {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            heartbeat: Heartbeat::default(),
        }
    }

    /// Heartbeat used when the server announces none
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn heartbeat(&self) -> Heartbeat {
        self.heartbeat
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Link>, TransportError> {
        let url = codec::websocket_url(endpoint, self.framing)?;
        debug!(%url, framing = ?self.framing, "Opening WebSocket");

        let (mut stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;

        let heartbeat = match self.framing {
            Framing::SocketIo => socketio_handshake(&mut stream, endpoint, self.heartbeat).await?,
            Framing::Json => self.heartbeat,
        };

        info!(endpoint, window_ms = heartbeat.window().as_millis() as u64, "WebSocket link established");
        Ok(Box::new(WebSocketLink::new(stream, self.framing, heartbeat)))
    }
}

/// Wait for the Engine.IO open packet, join the default namespace and wait
/// for the server's acknowledgement. Returns the heartbeat the server
/// announced.
async fn socketio_handshake(
    stream: &mut WsStream,
    endpoint: &str,
    fallback: Heartbeat,
) -> Result<Heartbeat, TransportError> {
    let heartbeat = loop {
        let frame = next_text(stream).await?;
        match codec::decode_socketio(&frame)? {
            Inbound::Open(params) => {
                debug!(%params, "Engine.IO session opened");
                break fallback.announced(&params);
            }
            Inbound::Ping => send_text(stream, EIO_PONG).await?,
            Inbound::Close => return Err(TransportError::closed("closed before open packet")),
            other => trace!(?other, "Ignoring frame before open packet"),
        }
    };

    send_text(stream, SIO_CONNECT).await?;

    loop {
        let frame = next_text(stream).await?;
        match codec::decode_socketio(&frame)? {
            Inbound::Connected => return Ok(heartbeat),
            Inbound::ConnectError(reason) => {
                return Err(TransportError::ConnectionFailed {
                    endpoint: endpoint.to_string(),
                    reason,
                })
            }
            Inbound::Ping => send_text(stream, EIO_PONG).await?,
            Inbound::Close => {
                return Err(TransportError::closed("closed during namespace connect"))
            }
            other => trace!(?other, "Ignoring frame before namespace ack"),
        }
    }
}

async fn next_text(stream: &mut WsStream) -> Result<String, TransportError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::closed("server closed during handshake"))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ws_error(e)),
        }
    }
}

async fn send_text(stream: &mut WsStream, text: &str) -> Result<(), TransportError> {
    stream
        .send(Message::Text(text.to_string()))
        .await
        .map_err(ws_error)
}

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

/// Established WebSocket link
///
/// Control frames owed to the server are recorded before they are written,
/// so a `recv` dropped mid-write leaves them queued for the next call.
pub struct WebSocketLink {
    stream: WsStream,
    framing: Framing,
    heartbeat: Heartbeat,
    /// The server must be heard from before this instant
    deadline: Instant,
    /// When the next client ping is due (JSON framing only)
    next_ping: Option<Instant>,
    pending_pongs: usize,
    ping_due: bool,
}

impl WebSocketLink {
    fn new(stream: WsStream, framing: Framing, heartbeat: Heartbeat) -> Self {
        let now = Instant::now();
        let next_ping = match framing {
            Framing::SocketIo => None,
            Framing::Json => Some(now + heartbeat.interval),
        };
        Self {
            stream,
            framing,
            heartbeat,
            deadline: now + heartbeat.window(),
            next_ping,
            pending_pongs: 0,
            ping_due: false,
        }
    }

    fn server_alive(&mut self) {
        self.deadline = Instant::now() + self.heartbeat.window();
    }

    /// Write owed pongs and pings. Counters only drop once a frame is
    /// written; a cancelled write is retried, never lost.
    async fn flush_control(&mut self) -> Result<(), TransportError> {
        while self.pending_pongs > 0 {
            send_text(&mut self.stream, EIO_PONG).await?;
            self.pending_pongs -= 1;
        }
        if self.ping_due {
            self.stream
                .send(Message::Ping(Vec::new()))
                .await
                .map_err(ws_error)?;
            self.ping_due = false;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebSocketLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketLink")
            .field("framing", &self.framing)
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Link for WebSocketLink {
    async fn recv(&mut self) -> Option<Result<RawMessage, TransportError>> {
        loop {
            if let Err(e) = self.flush_control().await {
                return Some(Err(e));
            }

            let deadline = self.deadline;
            let ping_at = self.next_ping;
            let next = tokio::select! {
                biased;
                next = self.stream.next() => next,
                _ = sleep_until(deadline) => {
                    let silent_ms = self.heartbeat.window().as_millis() as u64;
                    warn!(silent_ms, "Server heartbeat missed; dropping link");
                    return Some(Err(TransportError::HeartbeatTimeout { silent_ms }));
                }
                _ = sleep_until(ping_at.unwrap_or(deadline)), if ping_at.is_some() => {
                    self.ping_due = true;
                    self.next_ping = Some(Instant::now() + self.heartbeat.interval);
                    continue;
                }
            };

            let frame = match next {
                Some(Ok(message)) => {
                    if self.framing == Framing::Json {
                        self.server_alive();
                    }
                    match message {
                        Message::Text(text) => text,
                        Message::Close(frame) => {
                            debug!(?frame, "Server sent close frame");
                            return None;
                        }
                        _ => continue,
                    }
                }
                Some(Err(e)) => return Some(Err(ws_error(e))),
                None => return None,
            };

            match codec::decode(self.framing, &frame) {
                Ok(Inbound::Event(message)) => return Some(Ok(message)),
                Ok(Inbound::Ping) => {
                    self.server_alive();
                    self.pending_pongs += 1;
                }
                Ok(Inbound::Close) => return None,
                Ok(Inbound::ConnectError(reason)) => {
                    return Some(Err(TransportError::protocol(format!(
                        "namespace error after connect: {}",
                        reason
                    ))))
                }
                Ok(other) => trace!(?other, "Ignoring control frame"),
                Err(e) => warn!(error = %e, "Dropping undecodable frame"),
            }
        }
    }

    async fn send(&mut self, message: RawMessage) -> Result<(), TransportError> {
        self.flush_control().await?;
        let text = codec::encode(self.framing, &message);
        trace!(event = %message.event, "Sending frame");
        send_text(&mut self.stream, &text).await
    }

    async fn close(&mut self) {
        if self.framing == Framing::SocketIo {
            if let Err(e) = send_text(&mut self.stream, SIO_DISCONNECT).await {
                debug!(error = %e, "Namespace disconnect not delivered");
            }
        }
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}
