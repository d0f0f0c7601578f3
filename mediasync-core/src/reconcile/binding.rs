//! Player Reconciliation State Machine
//!
//! One binding per playback surface. Each snapshot for the bound playlist is
//! turned into the smallest set of widget calls that brings the surface in
//! line: an in-place play/pause when the loaded source is right and close
//! enough, otherwise a reload followed by seek/volume/transport once the
//! widget reports ready.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::media_url;
use super::widget::{MediaWidget, WidgetBackend};
use crate::config::ReconcilePolicy;
use crate::sync::PlaybackSnapshot;

/// Where the binding is in its load cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Nothing loaded
    Idle,
    /// Source loaded, waiting for the widget to become ready
    Preparing,
    /// Source ready and being driven in place
    Ready,
}

/// What a snapshot did to the binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Snapshot was for another playlist
    Ignored,
    /// Empty media path: playback stopped
    Stopped,
    /// Source reloaded; transport deferred until ready
    Resync,
    /// Play/pause applied without reloading
    InPlace,
    /// Still preparing the same source; the newest snapshot is applied on ready.
    /// Only while the load is younger than the prepare timeout.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportAction {
    Play,
    Pause,
    Stop,
}

/// Binds one [`MediaWidget`] to one playlist
pub struct PlayerBinding {
    playlist_id: String,
    base_address: String,
    policy: ReconcilePolicy,
    widget: Box<dyn MediaWidget>,
    state: BindingState,
    current_url: Option<String>,
    last_snapshot: Option<PlaybackSnapshot>,
    last_snapshot_time: Option<Instant>,
    /// When the current load was issued
    load_started: Option<Instant>,
    /// Last play/pause/stop sent to the widget since the current load
    last_action: Option<TransportAction>,
}

impl PlayerBinding {
    pub fn new(
        playlist_id: impl Into<String>,
        base_address: impl Into<String>,
        policy: ReconcilePolicy,
        widget: Box<dyn MediaWidget>,
    ) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            base_address: base_address.into(),
            policy,
            widget,
            state: BindingState::Idle,
            current_url: None,
            last_snapshot: None,
            last_snapshot_time: None,
            load_started: None,
            last_action: None,
        }
    }

    /// Reconcile the widget against a snapshot received at `received_at`
    pub fn apply_snapshot(&mut self, snapshot: &PlaybackSnapshot, received_at: Instant) -> Reconciliation {
        if snapshot.playlist_id != self.playlist_id {
            return Reconciliation::Ignored;
        }

        self.last_snapshot = Some(snapshot.clone());
        self.last_snapshot_time = Some(received_at);
        self.widget.set_volume(snapshot.volume);

        if !snapshot.has_media() {
            debug!("[{}] Empty media path, stopping {} widget", self.playlist_id, self.widget.backend());
            self.widget.stop();
            self.last_action = Some(TransportAction::Stop);
            self.state = BindingState::Idle;
            self.current_url = None;
            self.load_started = None;
            return Reconciliation::Stopped;
        }

        let target_url = media_url(&self.base_address, &snapshot.file_path);
        let source_changed = self.current_url.as_deref() != Some(target_url.as_str());

        let mut stalled = false;
        if self.state == BindingState::Preparing && !source_changed {
            let elapsed = self
                .load_started
                .map_or(0.0, |at| received_at.saturating_duration_since(at).as_secs_f64());
            if !self.policy.prepare_expired(elapsed) {
                debug!("[{}] Still preparing, deferring snapshot", self.playlist_id);
                return Reconciliation::Deferred;
            }
            warn!(
                "[{}] {} widget not ready after {:.1}s, reloading",
                self.playlist_id,
                self.widget.backend(),
                elapsed
            );
            stalled = true;
        }

        let current = self.widget.position();
        if source_changed || stalled || self.policy.needs_resync(snapshot.position, current) {
            info!(
                "[{}] Resync: {} at {:.2}s (widget at {:.2}s, source changed: {})",
                self.playlist_id, target_url, snapshot.position, current, source_changed
            );
            self.widget.load(&target_url);
            self.current_url = Some(target_url);
            self.last_action = None;
            self.load_started = Some(received_at);
            self.state = BindingState::Preparing;
            return Reconciliation::Resync;
        }

        if snapshot.is_playing {
            self.transport(TransportAction::Play);
        } else {
            self.transport(TransportAction::Pause);
        }
        Reconciliation::InPlace
    }

    /// The widget finished preparing: apply the newest snapshot.
    /// Returns false if the binding was not waiting for readiness.
    pub fn on_prepared(&mut self) -> bool {
        if self.state != BindingState::Preparing {
            return false;
        }
        let Some(snapshot) = self.last_snapshot.clone() else {
            return false;
        };

        debug!(
            "[{}] {} widget ready, seeking to {:.2}s",
            self.playlist_id,
            self.widget.backend(),
            snapshot.position
        );
        self.widget.seek(snapshot.position);
        self.widget.set_volume(snapshot.volume);

        if snapshot.is_playing {
            self.transport(TransportAction::Play);
        } else if self.policy.is_stopped(snapshot.position) {
            self.transport(TransportAction::Stop);
        } else {
            self.transport(TransportAction::Pause);
        }

        self.state = BindingState::Ready;
        true
    }

    /// Apply readiness if the widget reports it. Called every tick.
    pub fn poll_ready(&mut self) -> bool {
        self.state == BindingState::Preparing && self.widget.is_ready() && self.on_prepared()
    }

    /// Seek-bar position: the last snapshot extrapolated to `now` while playing
    pub fn display_position(&self, now: Instant) -> f64 {
        match (&self.last_snapshot, self.last_snapshot_time) {
            (Some(snapshot), Some(received_at)) => {
                let elapsed = now.saturating_duration_since(received_at).as_secs_f64();
                snapshot.extrapolated_position(elapsed)
            }
            _ => 0.0,
        }
    }

    fn transport(&mut self, action: TransportAction) {
        if self.last_action == Some(action) {
            return;
        }
        match action {
            TransportAction::Play => self.widget.play(),
            TransportAction::Pause => self.widget.pause(),
            TransportAction::Stop => self.widget.stop(),
        }
        self.last_action = Some(action);
    }

    pub fn playlist_id(&self) -> &str {
        &self.playlist_id
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn last_snapshot(&self) -> Option<&PlaybackSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn last_snapshot_time(&self) -> Option<Instant> {
        self.last_snapshot_time
    }

    pub fn backend(&self) -> WidgetBackend {
        self.widget.backend()
    }

    /// Release the widget
    pub fn into_widget(self) -> Box<dyn MediaWidget> {
        self.widget
    }
}

impl std::fmt::Debug for PlayerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerBinding")
            .field("playlist_id", &self.playlist_id)
            .field("backend", &self.widget.backend())
            .field("state", &self.state)
            .field("current_url", &self.current_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{HeadlessWidget, WidgetCall};
    use std::time::Duration;

    const BASE: &str = "http://localhost:8216";

    fn snapshot(file_path: &str, position: f64, is_playing: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            media_id: "m1".to_string(),
            playlist_id: "pl-1".to_string(),
            is_playing,
            file_path: file_path.to_string(),
            position,
            volume: 0.8,
            duration: 60.0,
        }
    }

    fn binding() -> (PlayerBinding, HeadlessWidget) {
        let widget = HeadlessWidget::manual();
        let binding = PlayerBinding::new("pl-1", BASE, ReconcilePolicy::default(), Box::new(widget.clone()));
        (binding, widget)
    }

    /// Binding that has loaded fileA, is ready and sits at `position`
    fn ready_binding(position: f64) -> (PlayerBinding, HeadlessWidget) {
        let (mut binding, widget) = binding();
        binding.apply_snapshot(&snapshot("/v/a.mp4", position, false), Instant::now());
        widget.mark_ready();
        assert!(binding.poll_ready());
        widget.set_position(position);
        widget.take_calls();
        (binding, widget)
    }

    #[test]
    fn test_first_snapshot_loads_and_defers() {
        let (mut binding, widget) = binding();
        let result = binding.apply_snapshot(&snapshot("/v/m1.mp4", 0.0, true), Instant::now());

        assert_eq!(result, Reconciliation::Resync);
        assert_eq!(binding.state(), BindingState::Preparing);
        assert_eq!(binding.current_url(), Some("http://localhost:8216/v/m1.mp4"));
        assert_eq!(
            widget.take_calls(),
            vec![
                WidgetCall::SetVolume(0.8),
                WidgetCall::Load("http://localhost:8216/v/m1.mp4".into()),
            ]
        );

        assert!(!binding.poll_ready());
        widget.mark_ready();
        assert!(binding.poll_ready());
        assert_eq!(binding.state(), BindingState::Ready);
        assert_eq!(
            widget.take_calls(),
            vec![WidgetCall::Seek(0.0), WidgetCall::SetVolume(0.8), WidgetCall::Play]
        );
    }

    #[test]
    fn test_small_drift_applies_in_place() {
        let (mut binding, widget) = ready_binding(10.0);
        let result = binding.apply_snapshot(&snapshot("/v/a.mp4", 10.4, true), Instant::now());

        assert_eq!(result, Reconciliation::InPlace);
        assert_eq!(binding.state(), BindingState::Ready);
        assert_eq!(widget.take_calls(), vec![WidgetCall::SetVolume(0.8), WidgetCall::Play]);
    }

    #[test]
    fn test_large_drift_resyncs() {
        let (mut binding, widget) = ready_binding(10.0);
        let result = binding.apply_snapshot(&snapshot("/v/a.mp4", 12.0, true), Instant::now());

        assert_eq!(result, Reconciliation::Resync);
        assert_eq!(binding.state(), BindingState::Preparing);
        widget.mark_ready();
        binding.poll_ready();
        assert_eq!(
            widget.take_calls(),
            vec![
                WidgetCall::SetVolume(0.8),
                WidgetCall::Load("http://localhost:8216/v/a.mp4".into()),
                WidgetCall::Seek(12.0),
                WidgetCall::SetVolume(0.8),
                WidgetCall::Play,
            ]
        );
    }

    #[test]
    fn test_source_change_resyncs() {
        let (mut binding, widget) = ready_binding(10.0);
        let result = binding.apply_snapshot(&snapshot("/v/b.mp4", 10.0, true), Instant::now());
        assert_eq!(result, Reconciliation::Resync);
        assert_eq!(binding.current_url(), Some("http://localhost:8216/v/b.mp4"));
        assert!(widget.calls().contains(&WidgetCall::Load("http://localhost:8216/v/b.mp4".into())));
    }

    #[test]
    fn test_stopped_widget_resyncs() {
        let (mut binding, _widget) = ready_binding(0.0);
        let result = binding.apply_snapshot(&snapshot("/v/a.mp4", 0.2, true), Instant::now());
        assert_eq!(result, Reconciliation::Resync);
    }

    #[test]
    fn test_empty_path_stops_from_any_state() {
        let (mut binding, widget) = binding();
        binding.apply_snapshot(&snapshot("/v/a.mp4", 3.0, true), Instant::now());
        assert_eq!(binding.state(), BindingState::Preparing);
        widget.take_calls();

        let result = binding.apply_snapshot(&snapshot("", 0.0, false), Instant::now());
        assert_eq!(result, Reconciliation::Stopped);
        assert_eq!(binding.state(), BindingState::Idle);
        assert_eq!(binding.current_url(), None);
        assert_eq!(widget.take_calls(), vec![WidgetCall::SetVolume(0.8), WidgetCall::Stop]);

        let (mut ready, widget) = ready_binding(5.0);
        ready.apply_snapshot(&snapshot("", 0.0, false), Instant::now());
        assert!(widget.calls().contains(&WidgetCall::Stop));
        assert!(!ready.on_prepared());
    }

    #[test]
    fn test_snapshot_while_preparing_updates_target() {
        let (mut binding, widget) = binding();
        binding.apply_snapshot(&snapshot("/v/a.mp4", 1.0, false), Instant::now());
        let result = binding.apply_snapshot(&snapshot("/v/a.mp4", 4.0, true), Instant::now());
        assert_eq!(result, Reconciliation::Deferred);
        widget.take_calls();

        widget.mark_ready();
        binding.poll_ready();
        assert_eq!(
            widget.take_calls(),
            vec![WidgetCall::Seek(4.0), WidgetCall::SetVolume(0.8), WidgetCall::Play]
        );
    }

    #[test]
    fn test_stalled_load_is_reloaded() {
        let (mut binding, widget) = binding();
        let loaded_at = Instant::now();
        binding.apply_snapshot(&snapshot("/v/a.mp4", 0.0, true), loaded_at);
        widget.take_calls();

        // Widget never reports ready
        let fresh = loaded_at + Duration::from_secs(1);
        assert_eq!(
            binding.apply_snapshot(&snapshot("/v/a.mp4", 5.0, true), fresh),
            Reconciliation::Deferred
        );

        let late = loaded_at + Duration::from_secs(6);
        assert_eq!(
            binding.apply_snapshot(&snapshot("/v/a.mp4", 30.0, true), late),
            Reconciliation::Resync
        );
        assert_eq!(binding.state(), BindingState::Preparing);

        // The new load gets its own grace period
        assert_eq!(
            binding.apply_snapshot(&snapshot("/v/a.mp4", 31.0, true), late + Duration::from_secs(1)),
            Reconciliation::Deferred
        );
        assert_eq!(
            binding.apply_snapshot(&snapshot("/v/a.mp4", 90.0, true), late + Duration::from_secs(10)),
            Reconciliation::Resync
        );

        let loads = widget
            .take_calls()
            .into_iter()
            .filter(|c| matches!(c, WidgetCall::Load(_)))
            .count();
        assert_eq!(loads, 2);

        widget.mark_ready();
        assert!(binding.poll_ready());
        assert!(widget.calls().contains(&WidgetCall::Seek(90.0)));
    }

    #[test]
    fn test_paused_snapshot_on_ready() {
        let (mut binding, widget) = binding();
        binding.apply_snapshot(&snapshot("/v/a.mp4", 7.0, false), Instant::now());
        widget.mark_ready();
        binding.on_prepared();
        assert_eq!(widget.calls().last(), Some(&WidgetCall::Pause));

        let (mut binding, widget) = ready_binding(0.0);
        drop(widget);
        binding.apply_snapshot(&snapshot("/v/b.mp4", 0.0, false), Instant::now());
        assert!(binding.on_prepared());
    }

    #[test]
    fn test_stop_when_ready_at_start_and_not_playing() {
        let (mut binding, widget) = binding();
        binding.apply_snapshot(&snapshot("/v/a.mp4", 0.0, false), Instant::now());
        binding.on_prepared();
        assert_eq!(widget.calls().last(), Some(&WidgetCall::Stop));
    }

    #[test]
    fn test_repeated_in_place_updates_do_not_churn() {
        let (mut binding, widget) = ready_binding(10.0);
        widget.set_position(10.0);
        binding.apply_snapshot(&snapshot("/v/a.mp4", 10.0, true), Instant::now());
        binding.apply_snapshot(&snapshot("/v/a.mp4", 10.2, true), Instant::now());
        binding.apply_snapshot(&snapshot("/v/a.mp4", 10.3, false), Instant::now());

        let transport: Vec<_> = widget
            .take_calls()
            .into_iter()
            .filter(|c| !matches!(c, WidgetCall::SetVolume(_)))
            .collect();
        assert_eq!(transport, vec![WidgetCall::Play, WidgetCall::Pause]);
    }

    #[test]
    fn test_other_playlists_are_ignored() {
        let (mut binding, widget) = binding();
        let mut other = snapshot("/v/a.mp4", 1.0, true);
        other.playlist_id = "pl-2".to_string();

        assert_eq!(binding.apply_snapshot(&other, Instant::now()), Reconciliation::Ignored);
        assert!(widget.calls().is_empty());
        assert!(binding.last_snapshot().is_none());
    }

    #[test]
    fn test_display_position_extrapolates_while_playing() {
        let (mut binding, _widget) = binding();
        assert_eq!(binding.display_position(Instant::now()), 0.0);

        let received = Instant::now();
        binding.apply_snapshot(&snapshot("/v/a.mp4", 10.0, true), received);
        assert_eq!(binding.display_position(received + Duration::from_secs(2)), 12.0);
        assert_eq!(binding.display_position(received + Duration::from_secs(600)), 60.0);
        assert_eq!(binding.last_snapshot_time(), Some(received));

        binding.apply_snapshot(&snapshot("/v/a.mp4", 10.0, false), received);
        assert_eq!(binding.display_position(received + Duration::from_secs(2)), 10.0);
    }
}
