//! Broadcast hub — registries, inbound dispatch, and fan-out.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use boardsync_core::config::realtime::RealtimeConfig;
use boardsync_protocol::{ClientMessage, ServerMessage};

use crate::connection::handle::{ConnectionHandle, ConnectionId};
use crate::connection::registry::ConnectionRegistry;
use crate::presence::registry::PresenceRegistry;

/// Central coordinator for the presence and connection registries.
///
/// All mutations go through this type; clients only ever see derived
/// broadcast snapshots, never the registries directly.
#[derive(Debug)]
pub struct BroadcastHub {
    connections: ConnectionRegistry,
    presence: PresenceRegistry,
    config: RealtimeConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl BroadcastHub {
    /// Creates a new hub with empty registries.
    pub fn new(config: RealtimeConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            connections: ConnectionRegistry::new(),
            presence: PresenceRegistry::new(),
            config,
            shutdown_tx,
        }
    }

    /// Registers a new connection for `user_id`.
    ///
    /// Returns the connection handle and the receiver side of its outbound
    /// frame queue.
    pub fn register(&self, user_id: &str) -> (Arc<ConnectionHandle>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(user_id.to_string(), tx));
        self.connections.add(handle.clone());

        info!(
            conn_id = %handle.id,
            user_id = %user_id,
            "WebSocket connection registered"
        );

        (handle, rx)
    }

    /// Unregisters a connection after its socket closed.
    ///
    /// Drops the user's presence entry if this was their last connection,
    /// then re-broadcasts the presence list to the remaining clients.
    pub fn unregister(&self, conn_id: &ConnectionId) {
        if self.drop_connection(conn_id) {
            self.broadcast_presence();
        }
    }

    /// Removes a connection entry; returns whether a presence entry was
    /// removed along with it.
    fn drop_connection(&self, conn_id: &ConnectionId) -> bool {
        let Some(handle) = self.connections.remove(conn_id) else {
            return false;
        };
        handle.mark_dead();

        let presence_removed = if self.connections.user_connection_count(&handle.user_id) == 0 {
            self.presence.remove(&handle.user_id)
        } else {
            false
        };

        info!(
            conn_id = %conn_id,
            user_id = %handle.user_id,
            "WebSocket connection unregistered"
        );

        presence_removed
    }

    /// Processes one inbound text frame from a client.
    ///
    /// Malformed frames and unknown message types are logged and dropped;
    /// the connection stays open and the sender is not notified.
    pub fn handle_inbound(&self, conn_id: &ConnectionId, raw: &str) {
        let Some(handle) = self.connections.get(conn_id) else {
            warn!(conn_id = %conn_id, "Message from unknown connection");
            return;
        };

        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(ClientMessage::Ping) => {
                self.unicast(&handle, &ServerMessage::Pong);
            }
            Ok(ClientMessage::PresenceUpdate { user }) => {
                self.presence.update(&handle.user_id, user);
                self.broadcast_presence();
            }
            Ok(ClientMessage::CollaborationEvent { event }) => {
                // No entity filtering server-side; that is a client concern.
                self.broadcast(&ServerMessage::CollaborationEvent { event });
            }
            Err(e) => {
                if serde_json::from_str::<serde_json::Value>(raw).is_ok() {
                    debug!(conn_id = %conn_id, error = %e, "Unknown message type, ignoring");
                } else {
                    warn!(conn_id = %conn_id, error = %e, "Malformed frame, dropping");
                }
            }
        }
    }

    /// Sends a message to a single connection.
    pub fn unicast(&self, handle: &ConnectionHandle, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(frame) => {
                handle.send(frame);
            }
            Err(e) => {
                warn!(error = %e, "Failed to serialize unicast message");
            }
        }
    }

    /// Broadcasts a message to every open connection.
    ///
    /// Dead or saturated connections are skipped; one slow client never
    /// blocks delivery to the others.
    pub fn broadcast(&self, message: &ServerMessage) {
        let frame = match serde_json::to_string(message) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast message");
                return;
            }
        };

        for handle in self.connections.all() {
            handle.send(frame.clone());
        }
    }

    /// Broadcasts the full presence registry snapshot.
    pub fn broadcast_presence(&self) {
        let users = self.presence.snapshot();
        self.broadcast(&ServerMessage::PresenceUpdate { users });
    }

    /// Runs one sweep pass: evict stale presence entries, unregister dead
    /// connections, then broadcast the presence list once regardless.
    pub fn sweep_once(&self) {
        let now = boardsync_protocol::now_millis();
        let ttl_ms = (self.config.presence_ttl_seconds * 1000) as i64;

        let evicted = self.presence.evict_stale(ttl_ms, now);
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted stale presence entries");
        }

        for handle in self.connections.all() {
            if !handle.is_alive() {
                self.drop_connection(&handle.id);
            }
        }

        self.broadcast_presence();
    }

    /// Returns a shutdown receiver for background task coordination.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates shutdown: signals background tasks and closes all
    /// connections. No draining of in-flight broadcasts is attempted.
    pub fn shutdown(&self) {
        info!("Shutting down broadcast hub");
        let _ = self.shutdown_tx.send(());
        for handle in self.connections.all() {
            handle.mark_dead();
            self.connections.remove(&handle.id);
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Total live connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.connection_count()
    }

    /// Number of tracked presence entries.
    pub fn presence_count(&self) -> usize {
        self.presence.len()
    }
}
