//! Playback channel transports
//!
//! A [`Transport`] opens a bidirectional channel to the service of record and
//! reports everything it receives through an [`EventSink`]. Opening never
//! blocks: the handshake result arrives later as `Connected` or
//! `ConnectFailed` on the dispatch queue.

mod loopback;
mod packet;
mod websocket;

pub use loopback::{LoopbackTransport, SentEvent};
pub use packet::{OpenInfo, Packet, PacketError};
pub use websocket::WebSocketTransport;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::dispatch::{EventSink, InboundEvent};
use crate::sync::{events, PlaybackSnapshot};

/// Transport-level errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Invalid channel address: {0}")]
    InvalidAddress(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Channel is not open")]
    NotOpen,

    #[error("Channel task closed")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Connection lifecycle state as seen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Opens channels. One transport can open many channels over its lifetime.
pub trait Transport: Send {
    /// Start opening a channel to `url`; inbound traffic goes to `sink`
    fn open(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Channel>, TransportError>;
}

/// An open (or opening) channel
pub trait Channel: Send {
    /// Send one event. Fails fast when the channel is not open.
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError>;

    /// Begin closing the channel. Idempotent.
    fn close(&mut self);

    /// Whether the handshake completed and the channel has not closed since
    fn is_open(&self) -> bool;
}

/// Route one inbound Socket.IO event to the dispatch queue
pub(crate) fn route_event(sink: &EventSink, name: &str, data: Value) {
    match name {
        events::RESP => match serde_json::from_value::<PlaybackSnapshot>(data) {
            Ok(snapshot) => {
                debug!(
                    "Snapshot for {}: media={} playing={} position={:.2}",
                    snapshot.playlist_id, snapshot.media_id, snapshot.is_playing, snapshot.position
                );
                sink.push(InboundEvent::Snapshot(snapshot));
            }
            Err(e) => warn!("Dropping undecodable {} payload: {}", name, e),
        },
        other => debug!("Ignoring unknown event: {}", other),
    }
}
