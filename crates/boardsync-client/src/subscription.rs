//! Subscriber registry and unsubscribe-on-drop guards.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use boardsync_protocol::{CollaborationEvent, PresenceUser};

pub(crate) type EventCallback = Arc<dyn Fn(&CollaborationEvent) + Send + Sync>;
pub(crate) type PresenceCallback = Arc<dyn Fn(&[PresenceUser]) + Send + Sync>;

/// Registry of event and presence subscribers.
///
/// Event subscribers are keyed by entity id (or the `"*"` wildcard);
/// multiple subscribers per key are supported.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    events: DashMap<String, HashMap<u64, EventCallback>>,
    presence: DashMap<u64, PresenceCallback>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_event(&self, key: &str, callback: EventCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.events
            .entry(key.to_string())
            .or_default()
            .insert(id, callback);
        id
    }

    pub(crate) fn remove_event(&self, key: &str, id: u64) {
        if let Some(mut entry) = self.events.get_mut(key) {
            entry.remove(&id);
            if entry.is_empty() {
                drop(entry);
                self.events.remove(key);
            }
        }
    }

    pub(crate) fn add_presence(&self, callback: PresenceCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.presence.insert(id, callback);
        id
    }

    pub(crate) fn remove_presence(&self, id: u64) {
        self.presence.remove(&id);
    }

    /// Delivers an event to every subscriber whose key matches it.
    ///
    /// Callbacks are collected first so none of them runs while a map
    /// guard is held (a callback may subscribe or unsubscribe).
    pub(crate) fn notify_event(&self, event: &CollaborationEvent) {
        let callbacks: Vec<EventCallback> = self
            .events
            .iter()
            .filter(|entry| event.matches(entry.key()))
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    /// Delivers the full presence list to every presence subscriber.
    pub(crate) fn notify_presence(&self, users: &[PresenceUser]) {
        let callbacks: Vec<PresenceCallback> =
            self.presence.iter().map(|e| e.value().clone()).collect();

        for callback in callbacks {
            callback(users);
        }
    }
}

/// A live subscription; dropping it unsubscribes.
///
/// This is the Rust rendition of the "returns an unsubscribe function"
/// API shape.
pub struct Subscription {
    registry: Arc<SubscriberRegistry>,
    target: SubscriptionTarget,
}

enum SubscriptionTarget {
    Event { key: String, id: u64 },
    Presence { id: u64 },
}

impl Subscription {
    pub(crate) fn event(registry: Arc<SubscriberRegistry>, key: String, id: u64) -> Self {
        Self {
            registry,
            target: SubscriptionTarget::Event { key, id },
        }
    }

    pub(crate) fn presence(registry: Arc<SubscriberRegistry>, id: u64) -> Self {
        Self {
            registry,
            target: SubscriptionTarget::Presence { id },
        }
    }

    /// Explicitly ends the subscription (equivalent to dropping it).
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match &self.target {
            SubscriptionTarget::Event { key, id } => self.registry.remove_event(key, *id),
            SubscriptionTarget::Presence { id } => self.registry.remove_presence(*id),
        }
    }
}
