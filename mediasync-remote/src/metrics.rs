//! Shared remote state: counters, the latest sync view and the activity log

use chrono::{DateTime, Local};
use mediasync_core::reconcile::{BindingState, HeadlessStatus};
use mediasync_core::{ConnectionState, MediaItem, PlaybackSnapshot};
use std::collections::VecDeque;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Connection,
    Sync,
    Catalog,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Connection => "CONN",
            LogLevel::Sync => "SYNC",
            LogLevel::Catalog => "MEDIA",
        }
    }
}

/// Remote state shared between the sync loop and the dashboard
pub struct Metrics {
    pub start_time: DateTime<Local>,

    pub service_address: String,

    pub playlist_id: String,

    pub connection: ConnectionState,

    /// Successful connects since start
    pub connects: u64,

    /// Connection drops and failed handshakes since start
    pub disconnects: u64,

    pub snapshots_received: u64,

    pub commands_sent: u64,

    pub command_errors: u64,

    /// Latest authoritative state of our playlist
    pub snapshot: Option<PlaybackSnapshot>,

    /// Simulated surface as last observed
    pub surface: Option<HeadlessStatus>,

    pub binding: Option<BindingState>,

    /// Extrapolated seek-bar position (seconds)
    pub display_position: f64,

    /// Playlist media, in sort order
    pub media: Vec<MediaItem>,

    pub logs: VecDeque<LogEntry>,
}

impl Metrics {
    pub fn new(service_address: &str, playlist_id: &str) -> Self {
        Self {
            start_time: Local::now(),
            service_address: service_address.to_string(),
            playlist_id: playlist_id.to_string(),
            connection: ConnectionState::Disconnected,
            connects: 0,
            disconnects: 0,
            snapshots_received: 0,
            commands_sent: 0,
            command_errors: 0,
            snapshot: None,
            surface: None,
            binding: None,
            display_position: 0.0,
            media: Vec::new(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    /// Record a command outcome
    pub fn command_result(&mut self, name: &str, result: Result<(), String>) {
        match result {
            Ok(()) => {
                self.commands_sent += 1;
                self.log(LogLevel::Sync, format!("-> {}", name));
            }
            Err(e) => {
                self.command_errors += 1;
                self.log(LogLevel::Warning, format!("{} failed: {}", name, e));
            }
        }
    }

    /// Replace the media list, keeping server sort order
    pub fn set_media(&mut self, mut media: Vec<MediaItem>) {
        media.sort_by_key(|m| m.sort_order);
        self.media = media;
    }

    /// Index of the currently selected media item in the list
    pub fn current_media_index(&self) -> Option<usize> {
        let current = self.snapshot.as_ref()?;
        self.media.iter().position(|m| m.id == current.media_id)
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let duration = Local::now().signed_duration_since(self.start_time);
        format_duration(duration.num_seconds() as f64)
    }
}

/// `1h 2m`, `3m 4s` or `5s`
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0) as i64;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// `mm:ss` clock for the seek bar
pub fn format_clock(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
