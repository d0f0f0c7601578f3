//! Event Dispatch Queue
//!
//! Hand-off from producer threads (the transport I/O task, catalog calls) to
//! the single consumer tick. Strict FIFO; a drain only processes what was
//! queued when it started, so a busy channel cannot stall the host's tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::trace;

use crate::catalog::CatalogChange;
use crate::sync::PlaybackSnapshot;

/// Events delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Transport handshake completed
    Connected,
    /// Transport could not be established
    ConnectFailed { reason: String },
    /// Established transport went away
    Disconnected { reason: String },
    /// Authoritative state push
    Snapshot(PlaybackSnapshot),
    /// Catalog REST call succeeded
    CatalogChanged(CatalogChange),
}

/// Queue item. `generation` ties connection-scoped events to the channel that produced them.
#[derive(Debug)]
struct Envelope {
    generation: Option<u64>,
    event: InboundEvent,
}

/// Producer handle. Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<Envelope>,
    generation: Option<u64>,
    attached: Arc<AtomicBool>,
}

impl EventSink {
    /// Enqueue an event. Returns false once the sink is detached.
    pub fn push(&self, event: InboundEvent) -> bool {
        if !self.attached.load(Ordering::Acquire) {
            trace!("Dropping event on detached sink: {:?}", event);
            return false;
        }
        self.tx
            .send(Envelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Stop accepting events (shared by every clone of this sink)
    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

/// Consumer side of the dispatch queue
#[derive(Debug)]
pub struct EventDispatchQueue {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl Default for EventDispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatchQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Producer bound to one connection generation
    pub fn sink(&self, generation: u64) -> EventSink {
        self.make_sink(Some(generation))
    }

    /// Producer whose events are never considered stale
    pub fn unscoped_sink(&self) -> EventSink {
        self.make_sink(None)
    }

    fn make_sink(&self, generation: Option<u64>) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
            generation,
            attached: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Items currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Process the items queued at the time of the call, in order.
    /// `handle` receives each event with its generation. Returns the count processed.
    pub fn drain<F>(&self, mut handle: F) -> usize
    where
        F: FnMut(Option<u64>, InboundEvent),
    {
        let queued = self.rx.len();
        let mut processed = 0;
        for _ in 0..queued {
            match self.rx.try_recv() {
                Ok(envelope) => {
                    handle(envelope.generation, envelope.event);
                    processed += 1;
                }
                Err(_) => break,
            }
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(media_id: &str) -> InboundEvent {
        InboundEvent::Snapshot(PlaybackSnapshot {
            media_id: media_id.to_string(),
            playlist_id: "p".to_string(),
            is_playing: false,
            file_path: String::new(),
            position: 0.0,
            volume: 1.0,
            duration: 0.0,
        })
    }

    fn media_id(event: &InboundEvent) -> &str {
        match event {
            InboundEvent::Snapshot(s) => &s.media_id,
            _ => "",
        }
    }

    #[test]
    fn test_fifo_across_producers() {
        let queue = EventDispatchQueue::new();
        let a = queue.sink(1);
        let b = a.clone();

        a.push(snapshot("third"));
        b.push(snapshot("first"));
        a.push(snapshot("second"));

        let mut seen = Vec::new();
        queue.drain(|_, event| seen.push(media_id(&event).to_string()));
        assert_eq!(seen, vec!["third", "first", "second"]);
    }

    #[test]
    fn test_drain_is_bounded_by_queue_at_start() {
        let queue = EventDispatchQueue::new();
        let sink = queue.sink(1);
        sink.push(snapshot("a"));
        sink.push(snapshot("b"));

        let mut seen = 0;
        let processed = queue.drain(|_, _| {
            seen += 1;
            // Arrivals during the drain wait for the next one
            sink.push(snapshot("late"));
        });

        assert_eq!(processed, 2);
        assert_eq!(seen, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_drain_empty_queue_returns_immediately() {
        let queue = EventDispatchQueue::new();
        assert_eq!(queue.drain(|_, _| panic!("nothing queued")), 0);
    }

    #[test]
    fn test_detached_sink_drops_events() {
        let queue = EventDispatchQueue::new();
        let sink = queue.sink(3);
        let clone = sink.clone();

        sink.detach();
        assert!(!clone.push(InboundEvent::Connected));
        assert!(!clone.is_attached());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_generation_travels_with_event() {
        let queue = EventDispatchQueue::new();
        queue.sink(7).push(InboundEvent::Connected);
        queue.unscoped_sink().push(InboundEvent::Disconnected { reason: "x".into() });

        let mut generations = Vec::new();
        queue.drain(|generation, _| generations.push(generation));
        assert_eq!(generations, vec![Some(7), None]);
    }

    #[test]
    fn test_sinks_work_across_threads() {
        let queue = EventDispatchQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sink = queue.sink(1);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        sink.push(InboundEvent::Connected);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.drain(|_, _| {}), 100);
    }
}
