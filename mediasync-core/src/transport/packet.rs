//! Engine.IO v4 / Socket.IO v5 text framing
//!
//! Only what the playback channel needs: the open handshake, heartbeats, the
//! default-namespace connect/disconnect and JSON events. Binary attachments
//! and acknowledgements are passed through undecoded.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Engine.IO ping interval used when the server omits it (ms)
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;

/// Engine.IO ping timeout used when the server omits it (ms)
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

#[derive(Debug, Error, PartialEq)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet type: {0}")]
    UnknownType(char),

    #[error("malformed packet: {0}")]
    Malformed(String),
}

/// Payload of the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

/// One decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// `0{...}` server handshake
    Open(OpenInfo),
    /// `1`
    Close,
    /// `2`
    Ping,
    /// `3`
    Pong,
    /// `6` (and `5` upgrade, which a WebSocket-only client ignores)
    Noop,
    /// `40` / `40{"sid":...}`
    Connect { sid: Option<String> },
    /// `41`
    Disconnect,
    /// `42["name", data]`
    Event { name: String, data: Value },
    /// `44{"message":...}`
    ConnectError(String),
    /// Any other Socket.IO packet, raw text after the Engine.IO type
    Message(String),
}

impl Packet {
    /// Build an event packet
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Packet::Event {
            name: name.into(),
            data,
        }
    }

    /// Decode one WebSocket text frame
    pub fn decode(frame: &str) -> Result<Packet, PacketError> {
        let (kind, rest) = split_type(frame)?;
        match kind {
            '0' => serde_json::from_str(rest)
                .map(Packet::Open)
                .map_err(|e| PacketError::Malformed(format!("open payload: {}", e))),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket(rest),
            '5' | '6' => Ok(Packet::Noop),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    /// Encode as a WebSocket text frame
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(info) => format!("0{}", serde_json::to_string(info).unwrap_or_default()),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { sid: None } => "40".to_string(),
            Packet::Connect { sid: Some(sid) } => format!("40{}", json!({ "sid": sid })),
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, data } => {
                let args = if data.is_null() {
                    json!([name])
                } else {
                    json!([name, data])
                };
                format!("42{}", args)
            }
            Packet::ConnectError(message) => format!("44{}", json!({ "message": message })),
            Packet::Message(raw) => format!("4{}", raw),
        }
    }
}

fn split_type(frame: &str) -> Result<(char, &str), PacketError> {
    let first = frame.chars().next().ok_or(PacketError::Empty)?;
    if !first.is_ascii() {
        return Err(PacketError::UnknownType(first));
    }
    Ok((first, &frame[1..]))
}

fn decode_socket(body: &str) -> Result<Packet, PacketError> {
    let (kind, rest) = split_type(body)?;
    let rest = strip_ack_id(strip_namespace(rest));

    match kind {
        '0' => {
            let sid = if rest.is_empty() {
                None
            } else {
                let value: Value = serde_json::from_str(rest)
                    .map_err(|e| PacketError::Malformed(format!("connect payload: {}", e)))?;
                value.get("sid").and_then(Value::as_str).map(str::to_string)
            };
            Ok(Packet::Connect { sid })
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let args: Vec<Value> = serde_json::from_str(rest)
                .map_err(|e| PacketError::Malformed(format!("event payload: {}", e)))?;
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => return Err(PacketError::Malformed("event without a name".to_string())),
            };
            Ok(Packet::Event {
                name,
                data: args.next().unwrap_or(Value::Null),
            })
        }
        '4' => {
            let message = serde_json::from_str::<Value>(rest)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| rest.to_string());
            Ok(Packet::ConnectError(message))
        }
        '3' | '5' | '6' => Ok(Packet::Message(body.to_string())),
        other => Err(PacketError::UnknownType(other)),
    }
}

/// Drop a `/namespace,` prefix
fn strip_namespace(rest: &str) -> &str {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => &rest[idx + 1..],
            None => "",
        }
    } else {
        rest
    }
}

/// Drop a numeric ack id
fn strip_ack_id(rest: &str) -> &str {
    rest.trim_start_matches(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_open() {
        let packet = Packet::decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#).unwrap();
        match packet {
            Packet::Open(info) => {
                assert_eq!(info.sid, "abc");
                assert_eq!(info.ping_interval, 25000);
                assert_eq!(info.ping_timeout, 5000);
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_decode_heartbeats_and_control() {
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping);
        assert_eq!(Packet::decode("3").unwrap(), Packet::Pong);
        assert_eq!(Packet::decode("1").unwrap(), Packet::Close);
        assert_eq!(Packet::decode("6").unwrap(), Packet::Noop);
        assert_eq!(Packet::decode("41").unwrap(), Packet::Disconnect);
    }

    #[test]
    fn test_decode_connect_ack() {
        assert_eq!(Packet::decode("40").unwrap(), Packet::Connect { sid: None });
        assert_eq!(
            Packet::decode(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Connect { sid: Some("xyz".to_string()) }
        );
    }

    #[test]
    fn test_decode_event() {
        let packet = Packet::decode(r#"42["resp",{"playListId":"p","isPlaying":true}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::event("resp", json!({"playListId": "p", "isPlaying": true}))
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = Packet::decode(r#"42/media,17["resp",{"a":1}]"#).unwrap();
        assert_eq!(packet, Packet::event("resp", json!({"a": 1})));

        let bare = Packet::decode(r#"42["ping"]"#).unwrap();
        assert_eq!(bare, Packet::event("ping", Value::Null));
    }

    #[test]
    fn test_decode_connect_error() {
        assert_eq!(
            Packet::decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::ConnectError("Not authorized".to_string())
        );
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(Packet::decode(""), Err(PacketError::Empty));
        assert_eq!(Packet::decode("9"), Err(PacketError::UnknownType('9')));
        assert!(matches!(Packet::decode("42{}"), Err(PacketError::Malformed(_))));
        assert!(matches!(Packet::decode("42[1,2]"), Err(PacketError::Malformed(_))));
    }

    #[test]
    fn test_encode() {
        assert_eq!(Packet::Pong.encode(), "3");
        assert_eq!(Packet::Connect { sid: None }.encode(), "40");
        assert_eq!(
            Packet::event("sub", json!({"playListId": "p"})).encode(),
            r#"42["sub",{"playListId":"p"}]"#
        );
    }
}
