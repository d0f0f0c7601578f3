//! Sync client
//!
//! Owns one connection to the service of record together with the
//! subscription registry, the playback state cache and every attached player
//! binding. All of it is driven from the host's tick: transports only ever
//! push into the dispatch queue, and [`SyncClient::tick`] is the single place
//! where queued events touch client state.

use std::collections::BTreeMap;
use std::time::Instant;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::catalog::CatalogChange;
use crate::config::{ConfigError, ServiceConfig};
use crate::dispatch::{EventDispatchQueue, EventSink, InboundEvent};
use crate::reconcile::{MediaWidget, PlayerBinding};
use crate::sync::{Command, PlaybackSnapshot, PlaybackStateCache, SubscriptionRegistry};
use crate::transport::{Channel, ConnectionState, Transport, TransportError, WebSocketTransport};

/// Errors returned by client operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not connected")]
    NotConnected,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What happened during a tick, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    ConnectFailed { reason: String },
    Disconnected { reason: String },
    /// A snapshot was cached and applied to matching players
    Snapshot(PlaybackSnapshot),
    CatalogChanged(CatalogChange),
}

/// Handle to an attached player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(u64);

impl PlayerId {
    /// Rebuild a handle from [`PlayerId::value`] (ids crossing the FFI boundary)
    pub fn from_value(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

pub struct SyncClient {
    config: ServiceConfig,
    transport: Box<dyn Transport>,
    queue: EventDispatchQueue,
    state: ConnectionState,
    /// Increments on every connect; events from older channels are dropped
    generation: u64,
    channel: Option<Box<dyn Channel>>,
    sink: Option<EventSink>,
    registry: SubscriptionRegistry,
    cache: PlaybackStateCache,
    players: BTreeMap<PlayerId, PlayerBinding>,
    next_player_id: u64,
}

impl SyncClient {
    pub fn new(config: ServiceConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Box::new(transport),
            queue: EventDispatchQueue::new(),
            state: ConnectionState::Disconnected,
            generation: 0,
            channel: None,
            sink: None,
            registry: SubscriptionRegistry::new(),
            cache: PlaybackStateCache::new(),
            players: BTreeMap::new(),
            next_player_id: 1,
        }
    }

    /// Client over Socket.IO, with channel tasks on `runtime`
    pub fn with_websocket(config: ServiceConfig, runtime: Handle) -> Self {
        Self::new(config, WebSocketTransport::new(runtime))
    }

    // ========== Connection ==========

    /// Open a fresh connection, tearing down any existing one first.
    ///
    /// Returns once the channel is opening; the handshake result arrives
    /// through [`SyncClient::tick`] as `Connected` or `ConnectFailed`.
    pub fn connect(&mut self) -> Result<(), SyncError> {
        self.disconnect();
        self.cache.clear();

        let url = self.config.socket_url()?;
        self.generation += 1;
        let sink = self.queue.sink(self.generation);

        info!("Connecting to {} (generation {})", url, self.generation);
        match self.transport.open(&url, sink.clone()) {
            Ok(channel) => {
                self.channel = Some(channel);
                self.sink = Some(sink);
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            Err(e) => {
                sink.detach();
                warn!("Failed to open channel: {}", e);
                Err(e.into())
            }
        }
    }

    /// Close the connection. Subscriptions are kept for the next connect.
    pub fn disconnect(&mut self) {
        // Stop inbound delivery before the channel goes away
        if let Some(sink) = self.sink.take() {
            sink.detach();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        if self.state != ConnectionState::Disconnected {
            info!("Disconnected (generation {})", self.generation);
            self.registry.connection_lost();
            self.state = ConnectionState::Disconnected;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ========== Subscriptions ==========

    /// Ask for pushes about a playlist. Offline requests are kept and
    /// replayed on the next connect; repeats are no-ops on the wire.
    pub fn subscribe(&mut self, playlist_id: &str) -> Result<(), SyncError> {
        let command = Command::Subscribe {
            playlist_id: playlist_id.to_string(),
        };
        command.validate().map_err(SyncError::InvalidCommand)?;

        if self.state != ConnectionState::Connected {
            if self.registry.defer(playlist_id) {
                debug!("Not connected, subscription to {} pending", playlist_id);
            }
            return Ok(());
        }

        if self.registry.activate(playlist_id) {
            if let Err(e) = self.emit(&command) {
                warn!("Subscribe to {} failed, keeping it pending: {}", playlist_id, e);
                self.registry.demote(playlist_id);
            }
        }
        Ok(())
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    // ========== Commands ==========

    pub fn play(&mut self, playlist_id: &str) -> Result<(), SyncError> {
        self.send(Command::Play {
            playlist_id: playlist_id.to_string(),
        })
    }

    pub fn pause(&mut self, playlist_id: &str) -> Result<(), SyncError> {
        self.send(Command::Pause {
            playlist_id: playlist_id.to_string(),
        })
    }

    pub fn stop(&mut self, playlist_id: &str) -> Result<(), SyncError> {
        self.send(Command::Stop {
            playlist_id: playlist_id.to_string(),
        })
    }

    pub fn seek(&mut self, playlist_id: &str, time: f64) -> Result<(), SyncError> {
        self.send(Command::Seek {
            playlist_id: playlist_id.to_string(),
            time,
        })
    }

    pub fn set_volume(&mut self, playlist_id: &str, volume: f32) -> Result<(), SyncError> {
        self.send(Command::SetVolume {
            playlist_id: playlist_id.to_string(),
            volume,
        })
    }

    pub fn switch_media(&mut self, playlist_id: &str, media_id: &str) -> Result<(), SyncError> {
        self.send(Command::Switch {
            playlist_id: playlist_id.to_string(),
            media_id: media_id.to_string(),
        })
    }

    /// Validate and emit a state-mutating command. At most once, never queued.
    pub fn send(&mut self, command: Command) -> Result<(), SyncError> {
        command.validate().map_err(SyncError::InvalidCommand)?;
        if self.state != ConnectionState::Connected {
            return Err(SyncError::NotConnected);
        }
        self.emit(&command)
    }

    fn emit(&self, command: &Command) -> Result<(), SyncError> {
        let channel = self.channel.as_ref().ok_or(SyncError::NotConnected)?;
        let payload = command.payload(self.config.user_token.as_deref());
        debug!("-> {} {}", command.kind().event_name(), payload);
        channel.emit(command.kind().event_name(), payload)?;
        Ok(())
    }

    // ========== Tick ==========

    /// Drain the dispatch queue and poll preparing players.
    /// Only events queued before the call are processed.
    pub fn tick(&mut self) -> Vec<ClientEvent> {
        let mut inbound = Vec::new();
        self.queue.drain(|generation, event| inbound.push((generation, event)));

        let mut events = Vec::with_capacity(inbound.len());
        for (generation, event) in inbound {
            if let Some(generation) = generation {
                if generation != self.generation || self.sink.is_none() {
                    trace!("Dropping stale event from generation {}: {:?}", generation, event);
                    continue;
                }
            }
            if let Some(event) = self.handle_inbound(event) {
                events.push(event);
            }
        }

        for binding in self.players.values_mut() {
            binding.poll_ready();
        }

        events
    }

    fn handle_inbound(&mut self, event: InboundEvent) -> Option<ClientEvent> {
        match event {
            InboundEvent::Connected => {
                if self.state != ConnectionState::Connecting {
                    debug!("Ignoring Connected in state {:?}", self.state);
                    return None;
                }
                self.state = ConnectionState::Connected;
                info!("Connected (generation {})", self.generation);
                self.replay_pending();
                Some(ClientEvent::Connected)
            }

            InboundEvent::ConnectFailed { reason } => {
                warn!("Connection failed: {}", reason);
                self.connection_lost();
                Some(ClientEvent::ConnectFailed { reason })
            }

            InboundEvent::Disconnected { reason } => {
                warn!("Connection lost: {}", reason);
                self.connection_lost();
                Some(ClientEvent::Disconnected { reason })
            }

            InboundEvent::Snapshot(snapshot) => {
                self.cache.update(snapshot.clone());
                let now = Instant::now();
                for binding in self.players.values_mut() {
                    binding.apply_snapshot(&snapshot, now);
                }
                Some(ClientEvent::Snapshot(snapshot))
            }

            InboundEvent::CatalogChanged(change) => {
                debug!("Catalog changed: {:?}", change);
                Some(ClientEvent::CatalogChanged(change))
            }
        }
    }

    /// Emit `sub` for everything recorded while offline, once, in order
    fn replay_pending(&mut self) {
        for playlist_id in self.registry.take_pending() {
            let command = Command::Subscribe {
                playlist_id: playlist_id.clone(),
            };
            match self.emit(&command) {
                Ok(()) => debug!("Replayed subscription to {}", playlist_id),
                Err(e) => {
                    warn!("Replaying subscription to {} failed: {}", playlist_id, e);
                    self.registry.demote(&playlist_id);
                }
            }
        }
    }

    fn connection_lost(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.detach();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.registry.connection_lost();
        self.state = ConnectionState::Disconnected;
    }

    // ========== State ==========

    /// Last authoritative snapshot for a playlist
    pub fn snapshot(&self, playlist_id: &str) -> Option<&PlaybackSnapshot> {
        self.cache.get(playlist_id)
    }

    pub fn cache(&self) -> &PlaybackStateCache {
        &self.cache
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Producer for catalog notifications; survives reconnects
    pub fn catalog_sink(&self) -> EventSink {
        self.queue.unscoped_sink()
    }

    // ========== Players ==========

    /// Bind a widget to a playlist. Subscribes to it and, when a snapshot is
    /// already cached, reconciles right away.
    pub fn attach_player(&mut self, playlist_id: &str, widget: Box<dyn MediaWidget>) -> Result<PlayerId, SyncError> {
        self.subscribe(playlist_id)?;

        let mut binding = PlayerBinding::new(
            playlist_id,
            self.config.base_address(),
            self.config.reconcile,
            widget,
        );
        if let Some(snapshot) = self.cache.get(playlist_id) {
            binding.apply_snapshot(snapshot, Instant::now());
        }

        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        info!("Attached {} player {} to {}", binding.backend(), id.0, playlist_id);
        self.players.insert(id, binding);
        Ok(id)
    }

    /// Remove a binding, handing the widget back
    pub fn detach_player(&mut self, id: PlayerId) -> Option<Box<dyn MediaWidget>> {
        let binding = self.players.remove(&id)?;
        info!("Detached player {} from {}", id.0, binding.playlist_id());
        Some(binding.into_widget())
    }

    /// The host's widget finished preparing
    pub fn notify_prepared(&mut self, id: PlayerId) -> bool {
        self.players
            .get_mut(&id)
            .map(PlayerBinding::on_prepared)
            .unwrap_or(false)
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerBinding> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = (PlayerId, &PlayerBinding)> {
        self.players.iter().map(|(id, binding)| (*id, binding))
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
