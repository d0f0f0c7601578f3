//! Playback State Cache
//!
//! Last authoritative snapshot per playlist. Written only by the consumer tick,
//! so a plain map is enough; each update replaces the whole value.

use std::collections::HashMap;

use super::protocol::PlaybackSnapshot;

/// Last-write-wins store of one snapshot per playlist
#[derive(Debug, Default)]
pub struct PlaybackStateCache {
    snapshots: HashMap<String, PlaybackSnapshot>,
}

impl PlaybackStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot for `snapshot.playlist_id`.
    /// Returns the snapshot it replaced, if any.
    pub fn update(&mut self, snapshot: PlaybackSnapshot) -> Option<PlaybackSnapshot> {
        self.snapshots.insert(snapshot.playlist_id.clone(), snapshot)
    }

    /// Last snapshot seen for a playlist
    pub fn get(&self, playlist_id: &str) -> Option<&PlaybackSnapshot> {
        self.snapshots.get(playlist_id)
    }

    /// Drop everything (stale state must not survive a reconnect)
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
