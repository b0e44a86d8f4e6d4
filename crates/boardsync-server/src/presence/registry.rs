//! Presence registry — last-known presence document per connected user.

use dashmap::DashMap;

use boardsync_protocol::{PresenceUser, now_millis};

/// Tracks the last-known presence document for each user.
///
/// Keyed by stable user id; the connection id stays an internal transport
/// detail. Documents are replaced wholesale on every update — the client
/// is responsible for sending a complete document each time.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// User ID → current presence document
    entries: DashMap<String, PresenceUser>,
}

impl PresenceRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a presence document wholesale, stamping `id` and `last_seen`.
    pub fn update(&self, user_id: &str, mut user: PresenceUser) {
        user.id = user_id.to_string();
        user.last_seen = now_millis();
        self.entries.insert(user_id.to_string(), user);
    }

    /// Removes a user's presence entry. Returns whether an entry existed.
    pub fn remove(&self, user_id: &str) -> bool {
        self.entries.remove(user_id).is_some()
    }

    /// Returns a snapshot of all current presence documents.
    pub fn snapshot(&self) -> Vec<PresenceUser> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    /// Evicts entries whose `last_seen` is older than `ttl_ms` relative to
    /// `now_ms`. Returns the evicted user ids.
    pub fn evict_stale(&self, ttl_ms: i64, now_ms: i64) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| now_ms - e.value().last_seen > ttl_ms)
            .map(|e| e.key().clone())
            .collect();

        for user_id in &stale {
            self.entries.remove(user_id);
        }
        stale
    }

    /// Number of tracked presence entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
