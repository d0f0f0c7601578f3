//! Sync Protocol Messages
//!
//! Wire shapes exchanged with the service of record. The service spells the
//! playlist key `playListId`; inbound decoding also accepts the older aliases.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Outbound event names
pub mod events {
    pub const SUBSCRIBE: &str = "sub";
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const STOP: &str = "stop";
    pub const SEEK: &str = "seek";
    pub const VOLUME: &str = "volume";
    pub const SWITCH: &str = "switch";
    /// Inbound authoritative state push
    pub const RESP: &str = "resp";
}

/// Authoritative playback state of one playlist, pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    /// Currently selected media item
    #[serde(default, alias = "id", deserialize_with = "null_as_empty")]
    pub media_id: String,
    /// Playlist this state belongs to
    #[serde(rename = "playListId", alias = "playlistId")]
    pub playlist_id: String,
    /// Whether the playlist is playing
    #[serde(default)]
    pub is_playing: bool,
    /// Server-relative media path; empty means nothing is loaded
    #[serde(default, deserialize_with = "null_as_empty")]
    pub file_path: String,
    /// Position in seconds
    #[serde(default, alias = "time")]
    pub position: f64,
    /// Volume in [0, 1]
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
}

impl PlaybackSnapshot {
    /// Whether a media source is loaded
    pub fn has_media(&self) -> bool {
        !self.file_path.is_empty()
    }

    /// Position after `elapsed_secs` of wall-clock time, assuming uninterrupted playback
    pub fn extrapolated_position(&self, elapsed_secs: f64) -> f64 {
        let position = if self.is_playing {
            self.position + elapsed_secs.max(0.0)
        } else {
            self.position
        };
        if self.duration > 0.0 {
            position.clamp(0.0, self.duration)
        } else {
            position.max(0.0)
        }
    }
}

fn default_volume() -> f32 {
    1.0
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Catalog entry as listed by the REST plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(alias = "mediaId")]
    pub id: String,
    #[serde(rename = "playListId", alias = "playlistId")]
    pub playlist_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub file_path: String,
    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub sort_order: i32,
}

/// Kind of outbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Subscribe,
    Play,
    Pause,
    Stop,
    Seek,
    SetVolume,
    Switch,
}

impl CommandKind {
    /// Wire event name
    pub fn event_name(&self) -> &'static str {
        match self {
            CommandKind::Subscribe => events::SUBSCRIBE,
            CommandKind::Play => events::PLAY,
            CommandKind::Pause => events::PAUSE,
            CommandKind::Stop => events::STOP,
            CommandKind::Seek => events::SEEK,
            CommandKind::SetVolume => events::VOLUME,
            CommandKind::Switch => events::SWITCH,
        }
    }

    /// Whether the command changes authoritative state (and so carries the user token)
    pub fn mutates_state(&self) -> bool {
        !matches!(self, CommandKind::Subscribe)
    }
}

/// Outbound intent. Fire-and-forget: the next snapshot push is the only acknowledgment.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Subscribe { playlist_id: String },
    Play { playlist_id: String },
    Pause { playlist_id: String },
    Stop { playlist_id: String },
    Seek { playlist_id: String, time: f64 },
    SetVolume { playlist_id: String, volume: f32 },
    Switch { playlist_id: String, media_id: String },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Subscribe { .. } => CommandKind::Subscribe,
            Command::Play { .. } => CommandKind::Play,
            Command::Pause { .. } => CommandKind::Pause,
            Command::Stop { .. } => CommandKind::Stop,
            Command::Seek { .. } => CommandKind::Seek,
            Command::SetVolume { .. } => CommandKind::SetVolume,
            Command::Switch { .. } => CommandKind::Switch,
        }
    }

    pub fn playlist_id(&self) -> &str {
        match self {
            Command::Subscribe { playlist_id }
            | Command::Play { playlist_id }
            | Command::Pause { playlist_id }
            | Command::Stop { playlist_id }
            | Command::Seek { playlist_id, .. }
            | Command::SetVolume { playlist_id, .. }
            | Command::Switch { playlist_id, .. } => playlist_id,
        }
    }

    /// Check the command's arguments before it goes on the wire
    pub fn validate(&self) -> Result<(), String> {
        if self.playlist_id().is_empty() {
            return Err("playlist id is empty".to_string());
        }
        match self {
            Command::Seek { time, .. } if !time.is_finite() || *time < 0.0 => {
                Err(format!("seek time out of range: {}", time))
            }
            Command::SetVolume { volume, .. } if !volume.is_finite() || !(0.0..=1.0).contains(volume) => {
                Err(format!("volume out of range: {}", volume))
            }
            Command::Switch { media_id, .. } if media_id.is_empty() => Err("media id is empty".to_string()),
            _ => Ok(()),
        }
    }

    /// Build the keyed payload for this command
    pub fn payload(&self, user_token: Option<&str>) -> Value {
        let mut data = Map::new();
        data.insert("playListId".to_string(), Value::from(self.playlist_id()));

        match self {
            Command::Seek { time, .. } => {
                data.insert("time".to_string(), Value::from(*time));
            }
            Command::SetVolume { volume, .. } => {
                // Three decimals on the wire
                let volume = (f64::from(*volume) * 1000.0).round() / 1000.0;
                data.insert("volume".to_string(), Value::from(volume));
            }
            Command::Switch { media_id, .. } => {
                data.insert("mediaId".to_string(), Value::from(media_id.as_str()));
            }
            _ => {}
        }

        if self.kind().mutates_state() {
            if let Some(token) = user_token {
                data.insert("userToken".to_string(), Value::from(token));
            }
        }

        Value::Object(data)
    }
}
