//! Sync loop for the remote: owns the client, the simulated surface and the catalog

use crate::metrics::{LogLevel, Metrics};
use mediasync_core::reconcile::HeadlessWidget;
use mediasync_core::{
    CatalogChange, CatalogClient, ClientEvent, MediaItem, PlayerId, ServiceConfig, SyncClient, SyncError,
};
use parking_lot::RwLock;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Runtime settings assembled from the command line
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: ServiceConfig,
    pub playlist_id: String,
    pub upload: Option<PathBuf>,
    pub tick: Duration,
    pub prepare_delay: Duration,
    /// Delay before reconnecting after a drop (None disables)
    pub reconnect_after: Option<Duration>,
}

/// User intents, sent from the dashboard or the signal handler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    TogglePlay,
    Stop,
    SeekBy(f64),
    VolumeBy(f32),
    Next,
    Previous,
    Refresh,
    DeleteCurrent,
    Reconnect,
    Quit,
}

/// Results of catalog requests running off the sync loop
#[derive(Debug)]
enum CatalogReply {
    Listed(Vec<MediaItem>),
    Done(String),
    Failed(String),
}

/// Remote engine state
struct Remote {
    client: SyncClient,
    catalog: CatalogClient,
    surface: HeadlessWidget,
    player: PlayerId,
    playlist_id: String,
    metrics: Arc<RwLock<Metrics>>,
    replies: mpsc::UnboundedSender<CatalogReply>,
    reconnect_after: Option<Duration>,
    reconnect_at: Option<Instant>,
}

impl Remote {
    fn start(
        settings: &Settings,
        metrics: Arc<RwLock<Metrics>>,
        replies: mpsc::UnboundedSender<CatalogReply>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut client = SyncClient::with_websocket(settings.config.clone(), Handle::current());
        let catalog = CatalogClient::new(&settings.config)?.with_notifier(client.catalog_sink());

        let surface = HeadlessWidget::with_prepare_delay(settings.prepare_delay);
        let player = client.attach_player(&settings.playlist_id, Box::new(surface.clone()))?;

        let remote = Self {
            client,
            catalog,
            surface,
            player,
            playlist_id: settings.playlist_id.clone(),
            metrics,
            replies,
            reconnect_after: settings.reconnect_after,
            reconnect_at: None,
        };

        remote.log(
            LogLevel::Info,
            format!(
                "Following playlist {} on {}",
                remote.playlist_id,
                settings.config.base_address()
            ),
        );
        Ok(remote)
    }

    /// Log to tracing and to the dashboard
    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Error => error!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            _ => info!("{}", message),
        }
        self.metrics.write().log(level, message);
    }

    fn connect(&mut self) {
        self.reconnect_at = None;
        match self.client.connect() {
            Ok(()) => self.log(LogLevel::Connection, "Connecting...".to_string()),
            Err(e) => {
                self.log(LogLevel::Error, format!("Cannot connect: {}", e));
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if let Some(delay) = self.reconnect_after {
            self.reconnect_at = Some(Instant::now() + delay);
            debug!("Reconnecting in {:?}", delay);
        }
    }

    /// Drain the client and refresh the shared view
    fn tick(&mut self) {
        let now = Instant::now();
        if self.reconnect_at.is_some_and(|at| now >= at) {
            self.connect();
        }

        let mut refresh = false;
        for event in self.client.tick() {
            match event {
                ClientEvent::Connected => {
                    self.metrics.write().connects += 1;
                    self.log(LogLevel::Connection, "Connected".to_string());
                    refresh = true;
                }
                ClientEvent::ConnectFailed { reason } => {
                    self.metrics.write().disconnects += 1;
                    self.log(LogLevel::Error, format!("Connection failed: {}", reason));
                    self.schedule_reconnect();
                }
                ClientEvent::Disconnected { reason } => {
                    self.metrics.write().disconnects += 1;
                    self.log(LogLevel::Warning, format!("Disconnected: {}", reason));
                    self.schedule_reconnect();
                }
                ClientEvent::Snapshot(snapshot) => {
                    if snapshot.playlist_id != self.playlist_id {
                        continue;
                    }
                    let switched = {
                        let mut m = self.metrics.write();
                        m.snapshots_received += 1;
                        let switched = m.snapshot.as_ref().map(|s| s.media_id.as_str()) != Some(snapshot.media_id.as_str());
                        m.snapshot = Some(snapshot.clone());
                        switched
                    };
                    if switched {
                        let now_playing = if snapshot.has_media() {
                            format!("Now playing {} ({})", snapshot.media_id, snapshot.file_path)
                        } else {
                            "Nothing loaded".to_string()
                        };
                        self.log(LogLevel::Sync, now_playing);
                    }
                }
                ClientEvent::CatalogChanged(change) => {
                    refresh |= change.affects_media();
                    self.log(LogLevel::Catalog, describe_change(&change));
                }
            }
        }

        if refresh {
            self.refresh_media();
        }

        let binding = self.client.player(self.player).map(|b| (b.state(), b.display_position(now)));
        let mut m = self.metrics.write();
        m.connection = self.client.state();
        m.surface = Some(self.surface.status());
        if let Some((state, position)) = binding {
            m.binding = Some(state);
            m.display_position = position;
        }
    }

    fn handle_action(&mut self, action: Action) {
        let playlist_id = self.playlist_id.clone();
        let (name, result) = match action {
            Action::TogglePlay => {
                let playing = self.client.snapshot(&playlist_id).is_some_and(|s| s.is_playing);
                if playing {
                    ("pause", self.client.pause(&playlist_id))
                } else {
                    ("play", self.client.play(&playlist_id))
                }
            }
            Action::Stop => ("stop", self.client.stop(&playlist_id)),
            Action::SeekBy(delta) => {
                let (position, duration) = {
                    let m = self.metrics.read();
                    (m.display_position, m.snapshot.as_ref().map_or(0.0, |s| s.duration))
                };
                let target = seek_target(position, delta, duration);
                ("seek", self.client.seek(&playlist_id, target))
            }
            Action::VolumeBy(delta) => {
                let current = self.client.snapshot(&playlist_id).map_or(1.0, |s| s.volume);
                ("volume", self.client.set_volume(&playlist_id, volume_target(current, delta)))
            }
            Action::Next | Action::Previous => {
                let target = {
                    let m = self.metrics.read();
                    let current = m.snapshot.as_ref().map(|s| s.media_id.as_str());
                    adjacent_media(&m.media, current, action == Action::Next).map(|item| item.id.clone())
                };
                match target {
                    Some(media_id) => ("switch", self.client.switch_media(&playlist_id, &media_id)),
                    None => {
                        self.log(LogLevel::Warning, "Playlist has no media".to_string());
                        return;
                    }
                }
            }
            Action::Refresh => {
                self.refresh_media();
                return;
            }
            Action::DeleteCurrent => {
                self.delete_current();
                return;
            }
            Action::Reconnect => {
                self.connect();
                return;
            }
            Action::Quit => return,
        };

        if let Err(e) = &result {
            warn!("{} failed: {}", name, e);
        }
        self.metrics.write().command_result(name, result.map_err(|e: SyncError| e.to_string()));
    }

    fn refresh_media(&self) {
        let catalog = self.catalog.clone();
        let playlist_id = self.playlist_id.clone();
        let replies = self.replies.clone();
        tokio::spawn(async move {
            let reply = match catalog.list(&playlist_id).await {
                Ok(items) => CatalogReply::Listed(items),
                Err(e) => CatalogReply::Failed(format!("Listing media failed: {}", e)),
            };
            let _ = replies.send(reply);
        });
    }

    fn delete_current(&self) {
        let Some(media_id) = self
            .client
            .snapshot(&self.playlist_id)
            .filter(|s| !s.media_id.is_empty())
            .map(|s| s.media_id.clone())
        else {
            self.log(LogLevel::Warning, "Nothing selected to delete".to_string());
            return;
        };

        let catalog = self.catalog.clone();
        let replies = self.replies.clone();
        tokio::spawn(async move {
            let reply = match catalog.delete(&media_id).await {
                Ok(()) => CatalogReply::Done(format!("Deleted {}", media_id)),
                Err(e) => CatalogReply::Failed(format!("Deleting {} failed: {}", media_id, e)),
            };
            let _ = replies.send(reply);
        });
    }

    fn upload(&self, path: PathBuf) {
        let catalog = self.catalog.clone();
        let playlist_id = self.playlist_id.clone();
        let replies = self.replies.clone();
        tokio::spawn(async move {
            let reply = match catalog.upload_file(&playlist_id, &path).await {
                Ok(()) => CatalogReply::Done(format!("Uploaded {}", path.display())),
                Err(e) => CatalogReply::Failed(format!("Uploading {} failed: {}", path.display(), e)),
            };
            let _ = replies.send(reply);
        });
    }

    fn handle_reply(&mut self, reply: CatalogReply) {
        match reply {
            CatalogReply::Listed(items) => {
                debug!("Playlist {} has {} media items", self.playlist_id, items.len());
                self.metrics.write().set_media(items);
            }
            CatalogReply::Done(message) => self.log(LogLevel::Catalog, message),
            CatalogReply::Failed(message) => self.log(LogLevel::Error, message),
        }
    }

    fn shutdown(mut self) {
        self.client.disconnect();
        self.client.detach_player(self.player);
        self.metrics.write().connection = self.client.state();
        info!("Remote stopped");
    }
}

/// Run the sync loop until `Quit` arrives or every action sender is gone
pub async fn run(
    settings: Settings,
    metrics: Arc<RwLock<Metrics>>,
    mut actions: mpsc::UnboundedReceiver<Action>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (reply_tx, mut replies) = mpsc::unbounded_channel();
    let mut remote = Remote::start(&settings, metrics, reply_tx)?;
    remote.connect();

    if let Some(path) = settings.upload.clone() {
        remote.upload(path);
    }

    let mut ticker = tokio::time::interval(settings.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => remote.tick(),
            action = actions.recv() => match action {
                Some(Action::Quit) | None => break,
                Some(action) => remote.handle_action(action),
            },
            Some(reply) = replies.recv() => remote.handle_reply(reply),
        }
    }

    remote.shutdown();
    Ok(())
}

/// Run with plain logging (no dashboard)
pub async fn run_with_logging(
    settings: Settings,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    // Initialize tracing for logging mode
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mediasync_remote=info".parse()?)
                .add_directive("mediasync_core=info".parse()?),
        )
        .init();

    let (action_tx, action_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = action_tx.send(Action::Quit);
        }
    });

    run(settings, metrics, action_rx).await
}

/// Neighbour of `current` in a sort-ordered media list, wrapping at both ends
pub fn adjacent_media<'a>(media: &'a [MediaItem], current: Option<&str>, forward: bool) -> Option<&'a MediaItem> {
    if media.is_empty() {
        return None;
    }
    let len = media.len();
    let index = match current.and_then(|id| media.iter().position(|m| m.id == id)) {
        Some(i) if forward => (i + 1) % len,
        Some(i) => (i + len - 1) % len,
        None if forward => 0,
        None => len - 1,
    };
    media.get(index)
}

/// Seek destination, kept inside the media
pub fn seek_target(position: f64, delta: f64, duration: f64) -> f64 {
    let target = (position + delta).max(0.0);
    if duration > 0.0 {
        target.min(duration)
    } else {
        target
    }
}

pub fn volume_target(current: f32, delta: f32) -> f32 {
    (current + delta).clamp(0.0, 1.0)
}

fn describe_change(change: &CatalogChange) -> String {
    match change {
        CatalogChange::UserAdded { user_token } => format!("User {} added", user_token),
        CatalogChange::UserRemoved { user_token } => format!("User {} removed", user_token),
        CatalogChange::Uploaded { playlist_id } => format!("New media in {}", playlist_id),
        CatalogChange::Deleted { media_id } => format!("Media {} deleted", media_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, sort_order: i32) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            playlist_id: "p".to_string(),
            file_path: format!("/v/{}.mp4", id),
            duration: 30.0,
            sort_order,
        }
    }

    #[test]
    fn test_adjacent_media_wraps() {
        let media = vec![item("a", 1), item("b", 2), item("c", 3)];

        assert_eq!(adjacent_media(&media, Some("a"), true).map(|m| m.id.as_str()), Some("b"));
        assert_eq!(adjacent_media(&media, Some("c"), true).map(|m| m.id.as_str()), Some("a"));
        assert_eq!(adjacent_media(&media, Some("a"), false).map(|m| m.id.as_str()), Some("c"));
        assert_eq!(adjacent_media(&media, Some("b"), false).map(|m| m.id.as_str()), Some("a"));
    }

    #[test]
    fn test_adjacent_media_without_selection() {
        let media = vec![item("a", 1), item("b", 2)];

        assert_eq!(adjacent_media(&media, None, true).map(|m| m.id.as_str()), Some("a"));
        assert_eq!(adjacent_media(&media, Some("gone"), false).map(|m| m.id.as_str()), Some("b"));
        assert!(adjacent_media(&[], Some("a"), true).is_none());
    }

    #[test]
    fn test_seek_target_clamps() {
        assert_eq!(seek_target(3.0, -5.0, 30.0), 0.0);
        assert_eq!(seek_target(28.0, 5.0, 30.0), 30.0);
        assert_eq!(seek_target(10.0, 5.0, 30.0), 15.0);
        // Unknown duration only clamps at zero
        assert_eq!(seek_target(100.0, 5.0, 0.0), 105.0);
    }

    #[test]
    fn test_volume_target_clamps() {
        assert_eq!(volume_target(0.95, 0.1), 1.0);
        assert_eq!(volume_target(0.05, -0.1), 0.0);
        assert!((volume_target(0.5, 0.1) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_describe_change() {
        assert_eq!(
            describe_change(&CatalogChange::Deleted { media_id: "m1".into() }),
            "Media m1 deleted"
        );
        assert_eq!(
            describe_change(&CatalogChange::Uploaded { playlist_id: "p".into() }),
            "New media in p"
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_quit() {
        let settings = Settings {
            // Nothing listens here; the loop must still start and stop cleanly
            config: ServiceConfig::new("http://127.0.0.1:9"),
            playlist_id: "p".to_string(),
            upload: None,
            tick: Duration::from_millis(10),
            prepare_delay: Duration::from_millis(10),
            reconnect_after: None,
        };
        let metrics = Arc::new(RwLock::new(Metrics::new("http://127.0.0.1:9", "p")));
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run(settings, Arc::clone(&metrics), action_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        action_tx.send(Action::TogglePlay).unwrap();
        action_tx.send(Action::Quit).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));

        let m = metrics.read();
        assert_eq!(m.command_errors, 1);
        assert_eq!(m.commands_sent, 0);
        assert!(!m.logs.is_empty());
    }
}
