//! Session implementation for FFI

use std::sync::{Arc, Once};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::catalog::CatalogClient;
use crate::client::{PlayerId, SyncClient};
use crate::transport::{Transport, WebSocketTransport};
use crate::config::{ReconcilePolicy, ServiceConfig, DEFAULT_SERVICE_ADDRESS};

use super::handlers::{forward_events, SurfaceWidget};
use super::types::*;

static TRACING_INIT: Once = Once::new();

/// Install the stderr subscriber once per process
pub(crate) fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let mut filter = tracing_subscriber::EnvFilter::from_default_env();
        for directive in [
            "mediasync_core=debug",
            "tungstenite=info",
            "tokio_tungstenite=info",
            "hyper_util=off",
            "reqwest=off",
            "hyper=off",
        ] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }

        // Another subscriber may already be installed by the host
        let _ = tracing_subscriber::fmt()
            .with_ansi(false) // Disable colors for IDE consoles
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Main session interface
///
/// [`MediaSurface`] methods run while the session is locked. From inside them
/// a host may only call [`Session::surface_prepared`]; anything else on the
/// session deadlocks.
#[derive(uniffi::Object)]
pub struct Session {
    runtime: Runtime,
    client: Mutex<SyncClient>,
    catalog: CatalogClient,
    callback: RwLock<Option<Arc<dyn SessionCallback>>>,
    /// Surfaces reported ready, applied on the next tick
    prepared: Mutex<Vec<PlayerId>>,
}

#[uniffi::export]
impl Session {
    /// Create a new session
    #[uniffi::constructor]
    pub fn new(config: SessionConfig) -> Result<Arc<Self>, CoreError> {
        init_tracing();
        info!("Initializing mediasync session for {}", config.service_address);

        let runtime = Runtime::new().map_err(|e| CoreError::RuntimeError(e.to_string()))?;
        let transport = WebSocketTransport::new(runtime.handle().clone());
        Self::build(ServiceConfig::from(config), transport, runtime)
    }

    /// Set the event callback
    pub fn set_callback(&self, callback: Box<dyn SessionCallback>) {
        *self.callback.write() = Some(Arc::from(callback));
    }

    // ========== Connection ==========

    /// Start connecting; the result arrives through `tick`
    pub fn connect(&self) -> Result<(), CoreError> {
        self.client.lock().connect().map_err(CoreError::from)
    }

    pub fn disconnect(&self) {
        self.client.lock().disconnect();
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.client.lock().state().into()
    }

    /// Process queued events and report them to the callback.
    /// Returns the number of events reported.
    pub fn tick(&self) -> u32 {
        let prepared = std::mem::take(&mut *self.prepared.lock());
        let events = {
            let mut client = self.client.lock();
            for id in prepared {
                client.notify_prepared(id);
            }
            client.tick()
        };
        let count = events.len() as u32;
        // Lock released: callbacks may call back into the session
        forward_events(events, &self.callback);
        count
    }

    // ========== Sync ==========

    pub fn subscribe(&self, playlist_id: String) -> Result<(), CoreError> {
        self.client.lock().subscribe(&playlist_id).map_err(CoreError::from)
    }

    pub fn play(&self, playlist_id: String) -> Result<(), CoreError> {
        self.client.lock().play(&playlist_id).map_err(CoreError::from)
    }

    pub fn pause(&self, playlist_id: String) -> Result<(), CoreError> {
        self.client.lock().pause(&playlist_id).map_err(CoreError::from)
    }

    pub fn stop(&self, playlist_id: String) -> Result<(), CoreError> {
        self.client.lock().stop(&playlist_id).map_err(CoreError::from)
    }

    pub fn seek(&self, playlist_id: String, time: f64) -> Result<(), CoreError> {
        self.client.lock().seek(&playlist_id, time).map_err(CoreError::from)
    }

    pub fn set_volume(&self, playlist_id: String, volume: f32) -> Result<(), CoreError> {
        self.client.lock().set_volume(&playlist_id, volume).map_err(CoreError::from)
    }

    pub fn switch_media(&self, playlist_id: String, media_id: String) -> Result<(), CoreError> {
        self.client
            .lock()
            .switch_media(&playlist_id, &media_id)
            .map_err(CoreError::from)
    }

    /// Last authoritative state for a playlist
    pub fn snapshot(&self, playlist_id: String) -> Option<SnapshotRecord> {
        self.client.lock().snapshot(&playlist_id).map(SnapshotRecord::from)
    }

    // ========== Surfaces ==========

    /// Bind a native surface to a playlist. Returns the surface handle.
    pub fn attach_surface(
        &self,
        playlist_id: String,
        surface: Box<dyn MediaSurface>,
        kind: SurfaceKind,
    ) -> Result<u64, CoreError> {
        let widget = SurfaceWidget::new(surface, kind.into());
        let id = self.client.lock().attach_player(&playlist_id, Box::new(widget))?;
        Ok(id.value())
    }

    pub fn detach_surface(&self, surface_id: u64) -> bool {
        self.client.lock().detach_player(PlayerId::from_value(surface_id)).is_some()
    }

    /// The native surface finished preparing its source.
    /// Applied on the next `tick`; safe to call from inside a surface method.
    pub fn surface_prepared(&self, surface_id: u64) {
        debug!("Surface {} prepared", surface_id);
        self.prepared.lock().push(PlayerId::from_value(surface_id));
    }

    /// Extrapolated seek-bar position for a surface
    pub fn display_position(&self, surface_id: u64) -> Option<f64> {
        self.client
            .lock()
            .player(PlayerId::from_value(surface_id))
            .map(|binding| binding.display_position(Instant::now()))
    }

    // ========== Catalog ==========

    pub fn add_user(&self, user_token: String) -> Result<(), CoreError> {
        self.runtime
            .block_on(self.catalog.add_user(&user_token))
            .map_err(CoreError::from)
    }

    pub fn remove_user(&self, user_token: String) -> Result<(), CoreError> {
        self.runtime
            .block_on(self.catalog.remove_user(&user_token))
            .map_err(CoreError::from)
    }

    /// Upload `mp4` or `wav` bytes to a playlist
    pub fn upload(&self, playlist_id: String, bytes: Vec<u8>, extension: String) -> Result<(), CoreError> {
        debug!("Uploading {} bytes ({}) to {}", bytes.len(), extension, playlist_id);
        let result = self
            .runtime
            .block_on(self.catalog.upload(&playlist_id, bytes, &extension));
        if let Err(e) = &result {
            warn!("Upload failed: {}", e);
        }
        result.map_err(CoreError::from)
    }

    pub fn delete_media(&self, media_id: String) -> Result<(), CoreError> {
        self.runtime
            .block_on(self.catalog.delete(&media_id))
            .map_err(CoreError::from)
    }

    pub fn list_media(&self, playlist_id: String) -> Result<Vec<MediaItemRecord>, CoreError> {
        let items = self.runtime.block_on(self.catalog.list(&playlist_id))?;
        Ok(items.into_iter().map(MediaItemRecord::from).collect())
    }
}

impl Session {
    fn build(
        config: ServiceConfig,
        transport: impl Transport + 'static,
        runtime: Runtime,
    ) -> Result<Arc<Self>, CoreError> {
        config
            .socket_url()
            .map_err(|e| CoreError::ConfigError(e.to_string()))?;

        let client = SyncClient::new(config.clone(), transport);
        let catalog = CatalogClient::new(&config)?.with_notifier(client.catalog_sink());

        Ok(Arc::new(Self {
            runtime,
            client: Mutex::new(client),
            catalog,
            callback: RwLock::new(None),
            prepared: Mutex::new(Vec::new()),
        }))
    }
}

/// Default session settings for hosts that only know the address
#[uniffi::export]
pub fn default_session_config() -> SessionConfig {
    let policy = ReconcilePolicy::default();
    SessionConfig {
        service_address: DEFAULT_SERVICE_ADDRESS.to_string(),
        secret_key: None,
        user_token: None,
        resync_threshold_secs: policy.resync_threshold_secs,
        stopped_position_secs: policy.stopped_position_secs,
        prepare_timeout_secs: policy.prepare_timeout_secs,
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.client.lock().disconnect();
    }
}
