//! Connection registry — tracks all live connections indexed by id and user.

use std::sync::Arc;

use dashmap::DashMap;

use super::handle::{ConnectionHandle, ConnectionId};

/// Thread-safe registry of all live WebSocket connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection ID → connection handle for direct lookup.
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// User ID → list of connection handles (one user can have multiple tabs).
    by_user: DashMap<String, Vec<Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the registry.
    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        self.by_id.insert(handle.id, handle.clone());
        self.by_user
            .entry(handle.user_id.clone())
            .or_default()
            .push(handle);
    }

    /// Removes a connection from the registry.
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.by_id.remove(conn_id)?;
        if let Some(mut connections) = self.by_user.get_mut(&handle.user_id) {
            connections.retain(|c| c.id != *conn_id);
            if connections.is_empty() {
                drop(connections);
                self.by_user.remove(&handle.user_id);
            }
        }
        Some(handle)
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Returns the number of live connections for a user.
    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.by_user.get(user_id).map(|e| e.value().len()).unwrap_or(0)
    }

    /// Returns all connection handles.
    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Returns total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Returns number of unique connected users.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }
}
