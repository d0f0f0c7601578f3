//! Media widget capability
//!
//! The core never decodes or renders media. It drives whatever the host
//! plugs in through this trait: a video view, an audio sink, or a headless
//! stand-in.

use std::fmt;

/// Kind of backend behind a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetBackend {
    Video,
    Audio,
    Headless,
    Custom,
}

impl fmt::Display for WidgetBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WidgetBackend::Video => "video",
            WidgetBackend::Audio => "audio",
            WidgetBackend::Headless => "headless",
            WidgetBackend::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A playback surface the reconciler can drive.
///
/// `load` starts asynchronous preparation; the widget reports readiness
/// through [`MediaWidget::is_ready`] (polled every tick) or the host calls
/// `SyncClient::notify_prepared`.
pub trait MediaWidget: Send {
    /// Replace the source and start preparing it
    fn load(&mut self, url: &str);

    /// Jump to a position in seconds
    fn seek(&mut self, position_secs: f64);

    fn play(&mut self);

    fn pause(&mut self);

    /// Stop and rewind
    fn stop(&mut self);

    /// Volume in [0, 1]
    fn set_volume(&mut self, volume: f32);

    /// Whether the loaded source finished preparing
    fn is_ready(&self) -> bool;

    /// Current position in seconds
    fn position(&self) -> f64;

    fn backend(&self) -> WidgetBackend {
        WidgetBackend::Custom
    }
}
