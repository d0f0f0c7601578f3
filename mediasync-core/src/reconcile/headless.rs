//! Headless widget
//!
//! A clock-driven stand-in for a real player: it "prepares" for a fixed delay
//! (or until told it is ready), advances its position while playing and keeps
//! a bounded log of the calls it received. Clones share state, so one clone can be
//! attached to a client while another observes it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::widget::{MediaWidget, WidgetBackend};

/// Maximum number of calls kept in the log; oldest are dropped first
const MAX_CALL_LOG: usize = 256;

/// One call received by a [`HeadlessWidget`]
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetCall {
    Load(String),
    Seek(f64),
    Play,
    Pause,
    Stop,
    SetVolume(f32),
}

#[derive(Debug)]
struct HeadlessState {
    source: Option<String>,
    /// None: ready only when `mark_ready` is called
    prepare_delay: Option<Duration>,
    load_started: Option<Instant>,
    ready: bool,
    playing: bool,
    /// Position at `anchor`
    base_position: f64,
    anchor: Instant,
    volume: f32,
    calls: VecDeque<WidgetCall>,
}

impl HeadlessState {
    fn record(&mut self, call: WidgetCall) {
        if self.calls.len() >= MAX_CALL_LOG {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }

    fn position(&self) -> f64 {
        if !self.ready {
            return 0.0;
        }
        if self.playing {
            self.base_position + self.anchor.elapsed().as_secs_f64()
        } else {
            self.base_position
        }
    }

    fn set_position(&mut self, position: f64) {
        self.base_position = position.max(0.0);
        self.anchor = Instant::now();
    }

    fn refresh_ready(&mut self) {
        if self.ready {
            return;
        }
        if let (Some(delay), Some(started)) = (self.prepare_delay, self.load_started) {
            if started.elapsed() >= delay {
                self.ready = true;
                self.anchor = Instant::now();
            }
        }
    }
}

/// Observable snapshot of a headless widget
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessStatus {
    pub source: Option<String>,
    pub ready: bool,
    pub playing: bool,
    pub position: f64,
    pub volume: f32,
}

#[derive(Debug, Clone)]
pub struct HeadlessWidget {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessWidget {
    /// Widget that becomes ready `prepare_delay` after each load
    pub fn with_prepare_delay(prepare_delay: Duration) -> Self {
        Self::build(Some(prepare_delay))
    }

    /// Widget that becomes ready only through [`HeadlessWidget::mark_ready`]
    pub fn manual() -> Self {
        Self::build(None)
    }

    fn build(prepare_delay: Option<Duration>) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState {
                source: None,
                prepare_delay,
                load_started: None,
                ready: false,
                playing: false,
                base_position: 0.0,
                anchor: Instant::now(),
                volume: 1.0,
                calls: VecDeque::with_capacity(MAX_CALL_LOG),
            })),
        }
    }

    /// Finish preparing the loaded source
    pub fn mark_ready(&self) {
        let mut state = self.state.lock();
        if state.source.is_some() && !state.ready {
            state.ready = true;
            state.anchor = Instant::now();
        }
    }

    /// Move the playhead without recording a call (simulates local drift)
    pub fn set_position(&self, position: f64) {
        self.state.lock().set_position(position);
    }

    pub fn status(&self) -> HeadlessStatus {
        let mut state = self.state.lock();
        state.refresh_ready();
        HeadlessStatus {
            source: state.source.clone(),
            ready: state.ready,
            playing: state.playing,
            position: state.position(),
            volume: state.volume,
        }
    }

    /// Most recent calls, oldest first
    pub fn calls(&self) -> Vec<WidgetCall> {
        self.state.lock().calls.iter().cloned().collect()
    }

    /// Most recent calls, clearing the log
    pub fn take_calls(&self) -> Vec<WidgetCall> {
        self.state.lock().calls.drain(..).collect()
    }
}

impl MediaWidget for HeadlessWidget {
    fn load(&mut self, url: &str) {
        let mut state = self.state.lock();
        state.record(WidgetCall::Load(url.to_string()));
        state.source = Some(url.to_string());
        state.load_started = Some(Instant::now());
        state.ready = false;
        state.playing = false;
        state.set_position(0.0);
    }

    fn seek(&mut self, position_secs: f64) {
        let mut state = self.state.lock();
        state.record(WidgetCall::Seek(position_secs));
        state.set_position(position_secs);
    }

    fn play(&mut self) {
        let mut state = self.state.lock();
        state.record(WidgetCall::Play);
        if !state.playing {
            let position = state.position();
            state.set_position(position);
            state.playing = true;
        }
    }

    fn pause(&mut self) {
        let mut state = self.state.lock();
        state.record(WidgetCall::Pause);
        let position = state.position();
        state.set_position(position);
        state.playing = false;
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.record(WidgetCall::Stop);
        state.playing = false;
        state.set_position(0.0);
    }

    fn set_volume(&mut self, volume: f32) {
        let mut state = self.state.lock();
        state.record(WidgetCall::SetVolume(volume));
        state.volume = volume;
    }

    fn is_ready(&self) -> bool {
        let mut state = self.state.lock();
        state.refresh_ready();
        state.ready
    }

    fn position(&self) -> f64 {
        let mut state = self.state.lock();
        state.refresh_ready();
        state.position()
    }

    fn backend(&self) -> WidgetBackend {
        WidgetBackend::Headless
    }
}
