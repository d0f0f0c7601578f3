//! Client event forwarding and surface adaptation

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::client::ClientEvent;
use crate::reconcile::{MediaWidget, WidgetBackend};

use super::types::{MediaSurface, SessionCallback, SnapshotRecord};

/// Hand tick results to the host callback, in order
pub fn forward_events(events: Vec<ClientEvent>, callback: &RwLock<Option<Arc<dyn SessionCallback>>>) {
    let Some(cb) = callback.read().clone() else {
        if !events.is_empty() {
            debug!("No callback set, dropping {} events", events.len());
        }
        return;
    };

    for event in events {
        match event {
            ClientEvent::Connected => cb.on_connected(),
            ClientEvent::ConnectFailed { reason } => cb.on_connect_failed(reason),
            ClientEvent::Disconnected { reason } => cb.on_disconnected(reason),
            ClientEvent::Snapshot(snapshot) => cb.on_snapshot(SnapshotRecord::from(&snapshot)),
            ClientEvent::CatalogChanged(change) => cb.on_catalog_changed(change.into()),
        }
    }
}

/// Drives a foreign [`MediaSurface`] as a [`MediaWidget`]
pub struct SurfaceWidget {
    surface: Box<dyn MediaSurface>,
    backend: WidgetBackend,
}

impl SurfaceWidget {
    pub fn new(surface: Box<dyn MediaSurface>, backend: WidgetBackend) -> Self {
        Self { surface, backend }
    }
}

impl MediaWidget for SurfaceWidget {
    fn load(&mut self, url: &str) {
        self.surface.load(url.to_string());
    }

    fn seek(&mut self, position_secs: f64) {
        self.surface.seek(position_secs);
    }

    fn play(&mut self) {
        self.surface.play();
    }

    fn pause(&mut self) {
        self.surface.pause();
    }

    fn stop(&mut self) {
        self.surface.stop();
    }

    fn set_volume(&mut self, volume: f32) {
        self.surface.set_volume(volume);
    }

    fn is_ready(&self) -> bool {
        self.surface.is_ready()
    }

    fn position(&self) -> f64 {
        self.surface.position()
    }

    fn backend(&self) -> WidgetBackend {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogChange;
    use crate::ffi::CatalogEvent;
    use crate::sync::PlaybackSnapshot;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl SessionCallback for Arc<Recorder> {
        fn on_connected(&self) {
            self.log.lock().push("connected".into());
        }
        fn on_connect_failed(&self, reason: String) {
            self.log.lock().push(format!("failed:{}", reason));
        }
        fn on_disconnected(&self, reason: String) {
            self.log.lock().push(format!("disconnected:{}", reason));
        }
        fn on_snapshot(&self, snapshot: SnapshotRecord) {
            self.log.lock().push(format!("snapshot:{}", snapshot.media_id));
        }
        fn on_catalog_changed(&self, event: CatalogEvent) {
            self.log.lock().push(format!("catalog:{:?}", event));
        }
    }

    impl MediaSurface for Arc<Recorder> {
        fn load(&self, url: String) {
            self.log.lock().push(format!("load:{}", url));
        }
        fn seek(&self, position_secs: f64) {
            self.log.lock().push(format!("seek:{}", position_secs));
        }
        fn play(&self) {
            self.log.lock().push("play".into());
        }
        fn pause(&self) {
            self.log.lock().push("pause".into());
        }
        fn stop(&self) {
            self.log.lock().push("stop".into());
        }
        fn set_volume(&self, volume: f32) {
            self.log.lock().push(format!("volume:{}", volume));
        }
        fn is_ready(&self) -> bool {
            true
        }
        fn position(&self) -> f64 {
            4.0
        }
    }

    #[test]
    fn test_forward_events_in_order() {
        let recorder = Arc::new(Recorder::default());
        let cb: Arc<dyn SessionCallback> = Arc::new(Arc::clone(&recorder));
        let callback = RwLock::new(Some(cb));

        let snapshot = PlaybackSnapshot {
            media_id: "m1".into(),
            playlist_id: "p".into(),
            is_playing: true,
            file_path: "/v/m1.mp4".into(),
            position: 0.0,
            volume: 1.0,
            duration: 0.0,
        };
        forward_events(
            vec![
                ClientEvent::Connected,
                ClientEvent::Snapshot(snapshot),
                ClientEvent::CatalogChanged(CatalogChange::Deleted { media_id: "m1".into() }),
                ClientEvent::Disconnected { reason: "bye".into() },
            ],
            &callback,
        );

        assert_eq!(
            *recorder.log.lock(),
            vec![
                "connected".to_string(),
                "snapshot:m1".to_string(),
                "catalog:Deleted { media_id: \"m1\" }".to_string(),
                "disconnected:bye".to_string(),
            ]
        );
    }

    #[test]
    fn test_forward_without_callback_is_noop() {
        let callback: RwLock<Option<Arc<dyn SessionCallback>>> = RwLock::new(None);
        forward_events(vec![ClientEvent::Connected], &callback);
    }

    #[test]
    fn test_surface_widget_forwards_calls() {
        let recorder = Arc::new(Recorder::default());
        let mut widget = SurfaceWidget::new(Box::new(Arc::clone(&recorder)), WidgetBackend::Video);

        widget.load("http://h/v/a.mp4");
        widget.seek(2.5);
        widget.set_volume(0.5);
        widget.play();

        assert!(widget.is_ready());
        assert_eq!(widget.position(), 4.0);
        assert_eq!(widget.backend(), WidgetBackend::Video);
        assert_eq!(
            *recorder.log.lock(),
            vec!["load:http://h/v/a.mp4", "seek:2.5", "volume:0.5", "play"]
        );
    }
}
