//! Mediasync - Core Library
//!
//! Keeps independent playback surfaces in lock-step with a server-authoritative
//! "now playing" state per playlist: connection lifecycle with resubscription,
//! a per-playlist state cache, a cross-thread event queue drained by the
//! host's tick, and a reconciliation state machine per surface.

pub mod catalog;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod ffi;
pub mod reconcile;
pub mod sync;
pub mod transport;

// Re-exports for convenience
pub use catalog::{CatalogChange, CatalogClient, CatalogError};
pub use client::{ClientEvent, PlayerId, SyncClient, SyncError};
pub use config::{ReconcilePolicy, ServiceConfig};
pub use reconcile::{HeadlessWidget, MediaWidget, PlayerBinding, WidgetBackend};
pub use sync::{MediaItem, PlaybackSnapshot};
pub use transport::{ConnectionState, LoopbackTransport, WebSocketTransport};

// Setup uniffi scaffolding
uniffi::setup_scaffolding!();
