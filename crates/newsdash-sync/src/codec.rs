//! Text-frame codecs for the push channel
//!
//! Two framings are supported:
//! - Socket.IO v4 on top of Engine.IO v4, which is what the news backend
//!   serves. Only the text subset is handled; binary attachments are
//!   ignored.
//! - A plain JSON envelope, one `{"event": ..., "data": ...}` per frame.

use newsdash_core::{Framing, RawMessage, TransportError};
use serde_json::{json, Value};
use url::Url;

/// Engine.IO pong reply
pub const EIO_PONG: &str = "3";
/// Socket.IO connect request for the default namespace
pub const SIO_CONNECT: &str = "40";
/// Socket.IO disconnect for the default namespace
pub const SIO_DISCONNECT: &str = "41";

// ----------------------------------------------------------------------------
// Decoded Frames
// ----------------------------------------------------------------------------

/// What a single inbound text frame means to the link
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Engine.IO open packet with the server's session parameters
    Open(Value),
    /// Socket.IO namespace connect acknowledgement
    Connected,
    /// Socket.IO namespace connect refused
    ConnectError(String),
    /// Named event for the router
    Event(RawMessage),
    /// Engine.IO ping; must be answered with a pong
    Ping,
    /// Server is going away (Engine.IO close or Socket.IO disconnect)
    Close,
    /// Valid frame with nothing for us (pong, noop, ack, binary header)
    Ignored,
}

// ----------------------------------------------------------------------------
// Endpoint Rewriting
// ----------------------------------------------------------------------------

/// Turn a configured endpoint into the WebSocket URL for `framing`
pub fn websocket_url(endpoint: &str, framing: Framing) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme `{}`", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch scheme to `{}`", scheme)))?;

    if framing == Framing::SocketIo {
        if url.path().is_empty() || url.path() == "/" {
            url.set_path("/socket.io/");
        }
        url.set_query(Some("EIO=4&transport=websocket"));
    }
    Ok(url)
}

// ----------------------------------------------------------------------------
// Socket.IO
// ----------------------------------------------------------------------------

/// Decode one Engine.IO/Socket.IO text frame
pub fn decode_socketio(frame: &str) -> Result<Inbound, TransportError> {
    let mut chars = frame.chars();
    let engine_type = chars
        .next()
        .ok_or_else(|| TransportError::protocol("empty Engine.IO frame"))?;
    let body = chars.as_str();

    match engine_type {
        '0' => serde_json::from_str(body)
            .map(Inbound::Open)
            .map_err(|e| TransportError::protocol(format!("bad open packet: {}", e))),
        '1' => Ok(Inbound::Close),
        '2' => Ok(Inbound::Ping),
        '3' | '5' | '6' => Ok(Inbound::Ignored),
        '4' => decode_socketio_packet(body),
        other => Err(TransportError::protocol(format!(
            "unknown Engine.IO packet type `{}`",
            other
        ))),
    }
}

fn decode_socketio_packet(packet: &str) -> Result<Inbound, TransportError> {
    let mut chars = packet.chars();
    let packet_type = chars
        .next()
        .ok_or_else(|| TransportError::protocol("empty Socket.IO packet"))?;
    let rest = skip_namespace_and_ack(chars.as_str());

    match packet_type {
        '0' => Ok(Inbound::Connected),
        '1' => Ok(Inbound::Close),
        '2' => decode_event(rest).map(Inbound::Event),
        '4' => {
            let reason = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| rest.to_string());
            Ok(Inbound::ConnectError(reason))
        }
        '3' | '5' | '6' => Ok(Inbound::Ignored),
        other => Err(TransportError::protocol(format!(
            "unknown Socket.IO packet type `{}`",
            other
        ))),
    }
}

/// Strip an optional `/namespace,` prefix and an optional numeric ack id
fn skip_namespace_and_ack(rest: &str) -> &str {
    let rest = if rest.starts_with('/') {
        match rest.find(',') {
            Some(comma) => &rest[comma + 1..],
            None => "",
        }
    } else {
        rest
    };
    rest.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn decode_event(body: &str) -> Result<RawMessage, TransportError> {
    let args: Vec<Value> = serde_json::from_str(body)
        .map_err(|e| TransportError::protocol(format!("bad event packet: {}", e)))?;
    let mut args = args.into_iter();
    let event = match args.next() {
        Some(Value::String(name)) => name,
        _ => return Err(TransportError::protocol("event packet without a name")),
    };
    Ok(RawMessage::new(event, args.next().unwrap_or(Value::Null)))
}

/// Encode an outbound event as `42["name",payload]`
pub fn encode_socketio_event(message: &RawMessage) -> String {
    let args = if message.payload.is_null() {
        json!([message.event])
    } else {
        json!([message.event, message.payload])
    };
    format!("42{}", args)
}

// ----------------------------------------------------------------------------
// JSON Envelope
// ----------------------------------------------------------------------------

/// Decode a `{"event": ..., "data": ...}` frame
pub fn decode_envelope(frame: &str) -> Result<Inbound, TransportError> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|e| TransportError::protocol(format!("bad JSON frame: {}", e)))?;
    let event = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::protocol("JSON frame without an `event` string"))?
        .to_string();
    let payload = value.get("data").cloned().unwrap_or(Value::Null);
    Ok(Inbound::Event(RawMessage::new(event, payload)))
}

pub fn encode_envelope(message: &RawMessage) -> String {
    json!({"event": message.event, "data": message.payload}).to_string()
}

/// Decode a frame according to `framing`
pub fn decode(framing: Framing, frame: &str) -> Result<Inbound, TransportError> {
    match framing {
        Framing::SocketIo => decode_socketio(frame),
        Framing::Json => decode_envelope(frame),
    }
}

/// Encode an outbound message according to `framing`
pub fn encode(framing: Framing, message: &RawMessage) -> String {
    match framing {
        Framing::SocketIo => encode_socketio_event(message),
        Framing::Json => encode_envelope(message),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socketio_url_rewrite() {
        let url = websocket_url("http://localhost:5000", Framing::SocketIo).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5000/socket.io/?EIO=4&transport=websocket");

        let url = websocket_url("https://news.example/realtime", Framing::SocketIo).unwrap();
        assert_eq!(url.as_str(), "wss://news.example/realtime?EIO=4&transport=websocket");
    }

    #[test]
    fn test_json_url_keeps_path_and_query() {
        let url = websocket_url("ws://feed:9000/events?tenant=a", Framing::Json).unwrap();
        assert_eq!(url.as_str(), "ws://feed:9000/events?tenant=a");
    }

    #[test]
    fn test_invalid_endpoints() {
        assert!(matches!(
            websocket_url("ftp://feed", Framing::Json),
            Err(TransportError::InvalidEndpoint { .. })
        ));
        assert!(websocket_url("not a url", Framing::SocketIo).is_err());
    }

    #[test]
    fn test_decode_engineio_control_frames() {
        assert!(matches!(
            decode_socketio(r#"0{"sid":"abc","pingInterval":25000,"pingTimeout":20000}"#).unwrap(),
            Inbound::Open(v) if v["sid"] == "abc"
        ));
        assert_eq!(decode_socketio("2").unwrap(), Inbound::Ping);
        assert_eq!(decode_socketio("1").unwrap(), Inbound::Close);
        assert_eq!(decode_socketio("6").unwrap(), Inbound::Ignored);
        assert!(decode_socketio("").is_err());
        assert!(decode_socketio("9").is_err());
    }

    #[test]
    fn test_decode_socketio_packets() {
        assert_eq!(decode_socketio(r#"40{"sid":"xyz"}"#).unwrap(), Inbound::Connected);
        assert_eq!(decode_socketio("41").unwrap(), Inbound::Close);
        assert_eq!(
            decode_socketio(r#"44{"message":"Not authorized"}"#).unwrap(),
            Inbound::ConnectError("Not authorized".to_string())
        );
    }

    #[test]
    fn test_decode_events_with_namespace_and_ack() {
        let expected = Inbound::Event(RawMessage::new("stats_update", json!({"a": 1})));
        assert_eq!(decode_socketio(r#"42["stats_update",{"a":1}]"#).unwrap(), expected);
        assert_eq!(decode_socketio(r#"42/admin,["stats_update",{"a":1}]"#).unwrap(), expected);
        assert_eq!(decode_socketio(r#"4212["stats_update",{"a":1}]"#).unwrap(), expected);
        assert_eq!(
            decode_socketio(r#"42["ping_me"]"#).unwrap(),
            Inbound::Event(RawMessage::new("ping_me", Value::Null))
        );
        assert!(decode_socketio(r#"42[17]"#).is_err());
        assert!(decode_socketio(r#"42{"nope":true}"#).is_err());
    }

    #[test]
    fn test_encode_socketio_event() {
        let msg = RawMessage::new("request_stats", Value::Null);
        assert_eq!(encode_socketio_event(&msg), r#"42["request_stats"]"#);

        let msg = RawMessage::new("ack", json!({"id": 3}));
        assert_eq!(encode(Framing::SocketIo, &msg), r#"42["ack",{"id":3}]"#);
    }

    #[test]
    fn test_envelope_codec() {
        assert_eq!(
            decode(Framing::Json, r#"{"event":"alert","data":{"x":1}}"#).unwrap(),
            Inbound::Event(RawMessage::new("alert", json!({"x": 1})))
        );
        assert!(decode(Framing::Json, r#"{"data":1}"#).is_err());

        let encoded = encode(Framing::Json, &RawMessage::new("request_stats", Value::Null));
        let back: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, json!({"event": "request_stats", "data": null}));
    }
}
