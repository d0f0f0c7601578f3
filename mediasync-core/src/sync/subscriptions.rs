//! Subscription Registry
//!
//! Playlists this client wants pushes for. Entries survive disconnects: a lost
//! connection turns every active entry back into a pending one, and the next
//! successful connect replays pending entries exactly once, in the order they
//! were first requested.

/// State of a single subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Recorded while offline, waiting for the next connect
    Pending,
    /// `sub` has been emitted on the current connection
    Active,
}

#[derive(Debug, Clone)]
struct Entry {
    playlist_id: String,
    status: SubscriptionStatus,
}

/// Ordered set of subscriptions
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Entry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of a playlist, if it was ever subscribed
    pub fn status(&self, playlist_id: &str) -> Option<SubscriptionStatus> {
        self.find(playlist_id).map(|e| e.status)
    }

    /// Whether `sub` was already emitted on the current connection
    pub fn is_active(&self, playlist_id: &str) -> bool {
        self.status(playlist_id) == Some(SubscriptionStatus::Active)
    }

    /// Record a subscription to replay on the next connect.
    /// Returns false if it is already known (pending or active).
    pub fn defer(&mut self, playlist_id: &str) -> bool {
        if self.find(playlist_id).is_some() {
            return false;
        }
        self.entries.push(Entry {
            playlist_id: playlist_id.to_string(),
            status: SubscriptionStatus::Pending,
        });
        true
    }

    /// Mark a playlist active on the current connection.
    /// Returns false if it was already active (nothing to emit).
    pub fn activate(&mut self, playlist_id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.playlist_id == playlist_id) {
            Some(entry) if entry.status == SubscriptionStatus::Active => false,
            Some(entry) => {
                entry.status = SubscriptionStatus::Active;
                true
            }
            None => {
                self.entries.push(Entry {
                    playlist_id: playlist_id.to_string(),
                    status: SubscriptionStatus::Active,
                });
                true
            }
        }
    }

    /// Move a playlist back to pending (emission failed)
    pub fn demote(&mut self, playlist_id: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.playlist_id == playlist_id) {
            entry.status = SubscriptionStatus::Pending;
        }
    }

    /// Take every pending entry for replay, marking each active.
    /// The pending set is empty afterwards.
    pub fn take_pending(&mut self) -> Vec<String> {
        self.entries
            .iter_mut()
            .filter(|e| e.status == SubscriptionStatus::Pending)
            .map(|e| {
                e.status = SubscriptionStatus::Active;
                e.playlist_id.clone()
            })
            .collect()
    }

    /// The connection is gone: everything becomes pending again
    pub fn connection_lost(&mut self) {
        for entry in &mut self.entries {
            entry.status = SubscriptionStatus::Pending;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == SubscriptionStatus::Pending)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, playlist_id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.playlist_id == playlist_id)
    }
}
