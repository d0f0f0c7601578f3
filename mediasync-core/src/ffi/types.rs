//! FFI types exposed via uniffi

use crate::catalog::{CatalogChange, CatalogError};
use crate::client::SyncError;
use crate::config::{ReconcilePolicy, ServiceConfig};
use crate::reconcile::WidgetBackend;
use crate::sync::{MediaItem, PlaybackSnapshot};
use crate::transport::ConnectionState;

/// Error types exposed via FFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreError {
    #[error("Not connected")]
    NotConnected,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<SyncError> for CoreError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotConnected => CoreError::NotConnected,
            SyncError::InvalidCommand(msg) => CoreError::InvalidCommand(msg),
            SyncError::Transport(e) => CoreError::TransportError(e.to_string()),
            SyncError::Config(e) => CoreError::ConfigError(e.to_string()),
        }
    }
}

impl From<CatalogError> for CoreError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Network(e) => CoreError::NetworkError(e.to_string()),
            CatalogError::Http { status, body } => CoreError::HttpError(format!("{}: {}", status, body)),
            CatalogError::UnsupportedMedia(ext) => CoreError::UnsupportedMedia(ext),
            CatalogError::MissingCredential(name) => CoreError::MissingCredential(name.to_string()),
            CatalogError::Io(e) => CoreError::NetworkError(e.to_string()),
            CatalogError::InvalidAddress(address) => CoreError::ConfigError(address),
        }
    }
}

/// Session settings passed from the host
#[derive(Debug, Clone, uniffi::Record)]
pub struct SessionConfig {
    pub service_address: String,
    pub secret_key: Option<String>,
    pub user_token: Option<String>,
    pub resync_threshold_secs: f64,
    pub stopped_position_secs: f64,
    pub prepare_timeout_secs: f64,
}

impl From<SessionConfig> for ServiceConfig {
    fn from(c: SessionConfig) -> Self {
        let mut config = ServiceConfig::new(c.service_address).with_reconcile_policy(ReconcilePolicy {
            resync_threshold_secs: c.resync_threshold_secs,
            stopped_position_secs: c.stopped_position_secs,
            prepare_timeout_secs: c.prepare_timeout_secs,
        });
        config.secret_key = c.secret_key.filter(|s| !s.is_empty());
        config.user_token = c.user_token.filter(|s| !s.is_empty());
        config
    }
}

/// Authoritative playback state exposed via FFI
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct SnapshotRecord {
    pub media_id: String,
    pub playlist_id: String,
    pub is_playing: bool,
    pub file_path: String,
    pub position: f64,
    pub volume: f32,
    pub duration: f64,
}

impl From<&PlaybackSnapshot> for SnapshotRecord {
    fn from(s: &PlaybackSnapshot) -> Self {
        Self {
            media_id: s.media_id.clone(),
            playlist_id: s.playlist_id.clone(),
            is_playing: s.is_playing,
            file_path: s.file_path.clone(),
            position: s.position,
            volume: s.volume,
            duration: s.duration,
        }
    }
}

/// Catalog entry exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct MediaItemRecord {
    pub id: String,
    pub playlist_id: String,
    pub file_path: String,
    pub duration: f64,
    pub sort_order: i32,
}

impl From<MediaItem> for MediaItemRecord {
    fn from(m: MediaItem) -> Self {
        Self {
            id: m.id,
            playlist_id: m.playlist_id,
            file_path: m.file_path,
            duration: m.duration,
            sort_order: m.sort_order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl From<ConnectionState> for ConnectionStatus {
    fn from(s: ConnectionState) -> Self {
        match s {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connecting => ConnectionStatus::Connecting,
            ConnectionState::Connected => ConnectionStatus::Connected,
        }
    }
}

/// Kind of native surface being attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SurfaceKind {
    Video,
    Audio,
    Custom,
}

impl From<SurfaceKind> for WidgetBackend {
    fn from(k: SurfaceKind) -> Self {
        match k {
            SurfaceKind::Video => WidgetBackend::Video,
            SurfaceKind::Audio => WidgetBackend::Audio,
            SurfaceKind::Custom => WidgetBackend::Custom,
        }
    }
}

/// Catalog mutation exposed via FFI
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum CatalogEvent {
    UserAdded { user_token: String },
    UserRemoved { user_token: String },
    Uploaded { playlist_id: String },
    Deleted { media_id: String },
}

impl From<CatalogChange> for CatalogEvent {
    fn from(c: CatalogChange) -> Self {
        match c {
            CatalogChange::UserAdded { user_token } => CatalogEvent::UserAdded { user_token },
            CatalogChange::UserRemoved { user_token } => CatalogEvent::UserRemoved { user_token },
            CatalogChange::Uploaded { playlist_id } => CatalogEvent::Uploaded { playlist_id },
            CatalogChange::Deleted { media_id } => CatalogEvent::Deleted { media_id },
        }
    }
}

/// Callback interface for session events
#[uniffi::export(callback_interface)]
pub trait SessionCallback: Send + Sync {
    fn on_connected(&self);
    fn on_connect_failed(&self, reason: String);
    fn on_disconnected(&self, reason: String);
    fn on_snapshot(&self, snapshot: SnapshotRecord);
    fn on_catalog_changed(&self, event: CatalogEvent);
}

/// A native playback surface (video view, audio player) driven by the core.
/// Called with the session locked: report readiness through
/// `Session::surface_prepared` and make no other session calls from here.
#[uniffi::export(callback_interface)]
pub trait MediaSurface: Send + Sync {
    fn load(&self, url: String);
    fn seek(&self, position_secs: f64);
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn set_volume(&self, volume: f32);
    fn is_ready(&self) -> bool;
    fn position(&self) -> f64;
}
