//! In-memory transport
//!
//! Records everything emitted and lets the caller play the server's part:
//! accept or reject the handshake, push events, drop the connection. Used by
//! the test suite and by hosts that want to drive a client without a server.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::{route_event, Channel, Transport, TransportError};
use crate::dispatch::{EventSink, InboundEvent};
use crate::sync::{events, PlaybackSnapshot};

/// One event emitted by the client
#[derive(Debug, Clone, PartialEq)]
pub struct SentEvent {
    pub event: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
struct LoopbackState {
    /// Sink of the most recently opened channel
    sink: Option<EventSink>,
    /// Whether that channel completed its handshake and is still up
    open: bool,
    sent: Vec<SentEvent>,
    urls: Vec<String>,
}

/// Shared handle: clone one into the client and keep one to play the server
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete the handshake of the latest channel
    pub fn accept(&self) {
        let mut state = self.state.lock();
        if let Some(sink) = state.sink.clone() {
            state.open = true;
            sink.push(InboundEvent::Connected);
        }
    }

    /// Fail the handshake of the latest channel
    pub fn reject(&self, reason: &str) {
        let mut state = self.state.lock();
        if let Some(sink) = state.sink.take() {
            state.open = false;
            sink.push(InboundEvent::ConnectFailed {
                reason: reason.to_string(),
            });
        }
    }

    /// Push an authoritative snapshot as the server would
    pub fn push_snapshot(&self, snapshot: &PlaybackSnapshot) {
        match serde_json::to_value(snapshot) {
            Ok(data) => self.push_event(events::RESP, data),
            Err(e) => debug!("Could not encode snapshot: {}", e),
        }
    }

    /// Push a raw inbound event through the same routing as the WebSocket transport
    pub fn push_event(&self, name: &str, data: Value) {
        let state = self.state.lock();
        if let Some(sink) = state.sink.as_ref().filter(|_| state.open) {
            route_event(sink, name, data);
        }
    }

    /// Simulate the server going away
    pub fn drop_connection(&self, reason: &str) {
        let mut state = self.state.lock();
        if let Some(sink) = state.sink.take() {
            state.open = false;
            sink.push(InboundEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    /// Everything emitted so far, in order
    pub fn sent(&self) -> Vec<SentEvent> {
        self.state.lock().sent.clone()
    }

    /// Payloads emitted under one event name
    pub fn sent_events(&self, event: &str) -> Vec<Value> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|s| s.event == event)
            .map(|s| s.payload.clone())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    /// Number of channels opened over the transport's lifetime
    pub fn open_count(&self) -> usize {
        self.state.lock().urls.len()
    }

    /// URL passed to the latest `open`
    pub fn last_url(&self) -> Option<String> {
        self.state.lock().urls.last().cloned()
    }

    /// Whether the latest channel is up
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

impl Transport for LoopbackTransport {
    fn open(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Channel>, TransportError> {
        let mut state = self.state.lock();
        state.urls.push(url.to_string());
        state.sink = Some(sink);
        state.open = false;
        let generation = state.urls.len();
        drop(state);

        Ok(Box::new(LoopbackChannel {
            state: Arc::clone(&self.state),
            generation,
            closed: false,
        }))
    }
}

struct LoopbackChannel {
    state: Arc<Mutex<LoopbackState>>,
    /// Which `open` call produced this channel
    generation: usize,
    closed: bool,
}

impl LoopbackChannel {
    fn is_current(&self, state: &LoopbackState) -> bool {
        !self.closed && state.urls.len() == self.generation
    }
}

impl Channel for LoopbackChannel {
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !self.is_current(&state) || !state.open {
            return Err(TransportError::NotOpen);
        }
        state.sent.push(SentEvent {
            event: event.to_string(),
            payload,
        });
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        let mut state = self.state.lock();
        if self.is_current(&state) {
            state.open = false;
            state.sink = None;
        }
        self.closed = true;
    }

    fn is_open(&self) -> bool {
        let state = self.state.lock();
        self.is_current(&state) && state.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EventDispatchQueue;
    use serde_json::json;

    fn drain(queue: &EventDispatchQueue) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        queue.drain(|_, event| events.push(event));
        events
    }

    #[test]
    fn test_emit_requires_accept() {
        let queue = EventDispatchQueue::new();
        let mut transport = LoopbackTransport::new();
        let channel = transport.open("ws://test", queue.sink(1)).unwrap();

        assert_eq!(channel.emit("play", json!({})), Err(TransportError::NotOpen));
        transport.accept();
        assert!(channel.is_open());
        channel.emit("play", json!({"playListId": "p"})).unwrap();

        assert_eq!(transport.sent_events("play"), vec![json!({"playListId": "p"})]);
        assert_eq!(drain(&queue), vec![InboundEvent::Connected]);
    }

    #[test]
    fn test_reject_and_drop_report_through_queue() {
        let queue = EventDispatchQueue::new();
        let mut transport = LoopbackTransport::new();
        let _channel = transport.open("ws://test", queue.sink(1)).unwrap();
        transport.reject("refused");

        let _channel = transport.open("ws://test", queue.sink(2)).unwrap();
        transport.accept();
        transport.drop_connection("gone");

        let events = drain(&queue);
        assert_eq!(
            events,
            vec![
                InboundEvent::ConnectFailed { reason: "refused".into() },
                InboundEvent::Connected,
                InboundEvent::Disconnected { reason: "gone".into() },
            ]
        );
        assert_eq!(transport.open_count(), 2);
    }

    #[test]
    fn test_old_channel_goes_dead_on_reopen() {
        let queue = EventDispatchQueue::new();
        let mut transport = LoopbackTransport::new();
        let first = transport.open("ws://test", queue.sink(1)).unwrap();
        transport.accept();
        let second = transport.open("ws://test", queue.sink(2)).unwrap();
        transport.accept();

        assert!(!first.is_open());
        assert!(second.is_open());
        assert_eq!(first.emit("play", json!({})), Err(TransportError::NotOpen));
    }

    #[test]
    fn test_close_stops_delivery() {
        let queue = EventDispatchQueue::new();
        let mut transport = LoopbackTransport::new();
        let mut channel = transport.open("ws://test", queue.sink(1)).unwrap();
        transport.accept();
        drain(&queue);

        channel.close();
        transport.push_event("resp", json!({"playListId": "p"}));
        assert!(queue.is_empty());
        assert!(!transport.is_open());
    }
}
