//! Bounded per-entity event history.

use std::collections::VecDeque;

use dashmap::DashMap;

use boardsync_protocol::CollaborationEvent;

/// Keeps the most recent events per entity key, oldest dropped first.
#[derive(Debug)]
pub(crate) struct EventHistory {
    buffers: DashMap<String, VecDeque<CollaborationEvent>>,
    capacity: usize,
}

impl EventHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            capacity,
        }
    }

    pub(crate) fn push(&self, event: &CollaborationEvent) {
        let mut buffer = self.buffers.entry(event.entity_id.clone()).or_default();
        buffer.push_back(event.clone());
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    pub(crate) fn recent(&self, entity_id: &str) -> Vec<CollaborationEvent> {
        self.buffers
            .get(entity_id)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }
}
