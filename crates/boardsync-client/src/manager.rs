//! Client connection manager — one logical connection to the broadcast
//! server, surviving transient network failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use boardsync_protocol::{
    ClientMessage, CollaborationEvent, CursorPosition, EntityKind, EventKind, PresenceStatus,
    PresenceUser, ServerMessage, now_millis,
};

use crate::backoff::reconnect_delay;
use crate::history::EventHistory;
use crate::subscription::{SubscriberRegistry, Subscription};

/// Connection lifecycle state, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed but never connected, or explicitly disconnected.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open.
    Open,
    /// The socket closed; a reconnect is pending.
    Closed,
    /// Reconnect attempts are exhausted; a later `connect()` starts over.
    Failed,
}

/// Caller-supplied identity attached to outgoing events and presence.
/// Unverified by the server.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Stable user id, sent at handshake.
    pub user_id: String,
    /// Display name.
    pub name: Option<String>,
    /// Avatar URL.
    pub avatar: Option<String>,
}

impl ClientIdentity {
    /// Identity with a caller-chosen stable user id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            avatar: None,
        }
    }

    /// Identity with a generated user id, for anonymous sessions.
    pub fn anonymous() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the avatar URL.
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Client tuning knobs. `new` applies the standard schedule: 1s-based
/// exponential backoff capped at 5 attempts, 30s heartbeat.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://host:8080/ws`.
    pub url: String,
    /// Base delay for exponential reconnect backoff.
    pub reconnect_base_delay: Duration,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Interval between heartbeat pings while open.
    pub heartbeat_interval: Duration,
    /// Collaboration events buffered while disconnected.
    pub offline_queue_capacity: usize,
    /// Recent events retained per subscription key.
    pub event_history_capacity: usize,
    /// Window during which an edit sender counts as a current editor.
    pub editor_window: Duration,
    /// Minimum interval between forwarded cursor positions.
    pub cursor_min_interval: Duration,
}

impl ClientConfig {
    /// Standard configuration for the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_base_delay: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
            offline_queue_capacity: 32,
            event_history_capacity: 50,
            editor_window: Duration::from_secs(30),
            cursor_min_interval: Duration::from_millis(50),
        }
    }
}

/// A partial presence document, merged over the last-sent document before
/// transmission so the server always receives a complete one.
#[derive(Debug, Clone, Default)]
pub struct PresencePatch {
    /// New pointer position.
    pub cursor: Option<CursorPosition>,
    /// New selection description.
    pub selection: Option<String>,
    /// New status.
    pub status: Option<PresenceStatus>,
    /// New current view path.
    pub current_view: Option<String>,
}

/// Handle to the shared client connection manager.
///
/// Cheap to clone; all clones share one logical connection. Connection
/// ownership is reference-counted via [`acquire`](Self::acquire) /
/// [`release`](Self::release): the socket is torn down only when the last
/// holder releases.
#[derive(Clone)]
pub struct CollabClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    identity: ClientIdentity,
    state_tx: watch::Sender<ConnectionState>,
    /// Sender into the live connection's outbound pump, while open.
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    /// Bounded queue of events awaiting reconnection.
    pending: Mutex<VecDeque<ClientMessage>>,
    /// Last presence list received from the server.
    presence: RwLock<Vec<PresenceUser>>,
    /// Authoritative merge base for outgoing presence documents.
    last_sent: Mutex<PresenceUser>,
    /// Server-assigned connection id, once established.
    connection_id: Mutex<Option<String>>,
    pub(crate) subscribers: Arc<SubscriberRegistry>,
    history: EventHistory,
    refcount: AtomicUsize,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CollabClient {
    /// Creates a manager. Construction does not connect; call
    /// [`connect`](Self::connect) or [`acquire`](Self::acquire).
    pub fn new(config: ClientConfig, identity: ClientIdentity) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let last_sent = PresenceUser {
            id: identity.user_id.clone(),
            name: identity.name.clone(),
            avatar: identity.avatar.clone(),
            status: PresenceStatus::Active,
            current_view: "/".to_string(),
            ..Default::default()
        };
        let history = EventHistory::new(config.event_history_capacity);

        Self {
            inner: Arc::new(ClientInner {
                config,
                identity,
                state_tx,
                outbound: Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
                presence: RwLock::new(Vec::new()),
                last_sent: Mutex::new(last_sent),
                connection_id: Mutex::new(None),
                subscribers: Arc::new(SubscriberRegistry::new()),
                history,
                refcount: AtomicUsize::new(0),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Watch receiver for connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Current connection state.
    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// The identity this manager stamps onto outgoing traffic.
    pub fn identity(&self) -> &ClientIdentity {
        &self.inner.identity
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The server-assigned connection id, once established.
    pub fn connection_id(&self) -> Option<String> {
        lock(&self.inner.connection_id).clone()
    }

    /// Last presence list received from the server.
    pub fn presence_users(&self) -> Vec<PresenceUser> {
        self.inner
            .presence
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recent events received for an entity key (bounded buffer).
    pub fn recent_events(&self, entity_id: &str) -> Vec<CollaborationEvent> {
        self.inner.history.recent(entity_id)
    }

    /// Increments the connection refcount, starting the supervisor on the
    /// first holder.
    pub fn acquire(&self) {
        if self.inner.refcount.fetch_add(1, Ordering::SeqCst) == 0 {
            self.connect();
        }
    }

    /// Decrements the connection refcount, tearing the socket down when it
    /// reaches zero.
    pub fn release(&self) {
        if self.inner.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.disconnect();
        }
    }

    /// Starts the connection supervisor. Idempotent while one is running;
    /// after `Failed` or `disconnect()` it starts a fresh attempt cycle.
    pub fn connect(&self) {
        let mut supervisor = lock(&self.inner.supervisor);
        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let inner = self.inner.clone();
        *supervisor = Some(tokio::spawn(supervise(inner)));
    }

    /// Tears down the connection and any pending reconnect.
    pub fn disconnect(&self) {
        if let Some(task) = lock(&self.inner.supervisor).take() {
            task.abort();
        }
        *lock(&self.inner.outbound) = None;
        self.inner.state_tx.send_replace(ConnectionState::Idle);
        info!("Client disconnected");
    }

    /// Subscribes to collaboration events for `entity_id` (or `"*"`).
    /// The subscription ends when the returned guard is dropped.
    pub fn on_collaboration_event<F>(&self, entity_id: &str, callback: F) -> Subscription
    where
        F: Fn(&CollaborationEvent) + Send + Sync + 'static,
    {
        let id = self
            .inner
            .subscribers
            .add_event(entity_id, Arc::new(callback));
        Subscription::event(self.inner.subscribers.clone(), entity_id.to_string(), id)
    }

    /// Subscribes to presence list changes. Each notification carries the
    /// full list, not a diff.
    pub fn on_presence_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[PresenceUser]) + Send + Sync + 'static,
    {
        let id = self.inner.subscribers.add_presence(Arc::new(callback));
        Subscription::presence(self.inner.subscribers.clone(), id)
    }

    /// Builds, stamps, and transmits a collaboration event.
    ///
    /// While disconnected the event is held in a bounded queue and flushed
    /// on the next open; the oldest entries are dropped on overflow.
    pub fn send_collaboration_event(
        &self,
        kind: EventKind,
        entity_type: EntityKind,
        entity_id: &str,
        data: serde_json::Value,
    ) {
        let event = CollaborationEvent {
            kind,
            user_id: self.inner.identity.user_id.clone(),
            user_name: self.inner.identity.name.clone(),
            user_avatar: self.inner.identity.avatar.clone(),
            timestamp: now_millis(),
            data,
            entity_type,
            entity_id: entity_id.to_string(),
        };
        self.inner
            .transmit(ClientMessage::CollaborationEvent { event }, true);
    }

    /// Merges a patch over the last-sent presence document and transmits
    /// the complete result. Dropped while disconnected — the on-open
    /// announce supersedes anything stale.
    pub fn send_presence(&self, patch: PresencePatch) {
        let user = self.inner.merged_presence(patch);
        self.inner
            .transmit(ClientMessage::PresenceUpdate { user }, false);
    }

    /// Forwards a pointer position.
    pub fn update_cursor(&self, x: f64, y: f64) {
        self.send_presence(PresencePatch {
            cursor: Some(CursorPosition { x, y }),
            ..Default::default()
        });
    }

    /// Forwards a selection description.
    pub fn update_selection(&self, selection: &str) {
        self.send_presence(PresencePatch {
            selection: Some(selection.to_string()),
            ..Default::default()
        });
    }

    /// Updates the presence status.
    pub fn update_status(&self, status: PresenceStatus) {
        self.send_presence(PresencePatch {
            status: Some(status),
            ..Default::default()
        });
    }

    /// Records the page the client has open and announces it.
    pub fn set_current_view(&self, path: &str) {
        self.send_presence(PresencePatch {
            current_view: Some(path.to_string()),
            ..Default::default()
        });
    }

    #[cfg(test)]
    pub(crate) fn last_sent_presence(&self) -> PresenceUser {
        lock(&self.inner.last_sent).clone()
    }

    #[cfg(test)]
    pub(crate) fn queued_messages(&self) -> Vec<ClientMessage> {
        lock(&self.inner.pending).iter().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn refcount(&self) -> usize {
        self.inner.refcount.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn inject_server_message(&self, message: ServerMessage) {
        self.inner.handle_server_message(message);
    }
}

impl ClientInner {
    /// Sends into the live connection, or falls back to the offline queue.
    fn transmit(&self, message: ClientMessage, queue_if_offline: bool) {
        let unsent = {
            let outbound = lock(&self.outbound);
            match outbound.as_ref() {
                Some(tx) => tx.send(message).err().map(|e| e.0),
                None => Some(message),
            }
        };

        let Some(message) = unsent else { return };

        if queue_if_offline {
            let mut pending = lock(&self.pending);
            while pending.len() >= self.config.offline_queue_capacity {
                pending.pop_front();
                debug!("Offline queue full, dropping oldest event");
            }
            pending.push_back(message);
        } else {
            trace!("Not connected, dropping presence frame");
        }
    }

    /// Merges a patch over the last-sent document, stamps `last_seen`, and
    /// stores the result as the new merge base.
    fn merged_presence(&self, patch: PresencePatch) -> PresenceUser {
        let mut last_sent = lock(&self.last_sent);
        if let Some(cursor) = patch.cursor {
            last_sent.cursor = Some(cursor);
        }
        if let Some(selection) = patch.selection {
            last_sent.selection = Some(selection);
        }
        if let Some(status) = patch.status {
            last_sent.status = status;
        }
        if let Some(current_view) = patch.current_view {
            last_sent.current_view = current_view;
        }
        last_sent.last_seen = now_millis();
        last_sent.clone()
    }

    /// Re-announces the full presence document, active, on (re)connect.
    fn announce_presence(&self) {
        let user = self.merged_presence(PresencePatch {
            status: Some(PresenceStatus::Active),
            ..Default::default()
        });
        self.transmit(ClientMessage::PresenceUpdate { user }, false);
    }

    /// Drains the offline queue into the live connection.
    fn flush_pending(&self) {
        let drained: Vec<ClientMessage> = lock(&self.pending).drain(..).collect();
        if drained.is_empty() {
            return;
        }
        debug!(count = drained.len(), "Flushing queued events");
        for message in drained {
            self.transmit(message, true);
        }
    }

    fn connect_url(&self) -> String {
        let separator = if self.config.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}user_id={}",
            self.config.url,
            separator,
            urlencoding::encode(&self.identity.user_id)
        )
    }

    /// Routes one parsed server message.
    pub(crate) fn handle_server_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Pong => {
                trace!("Heartbeat pong");
            }
            ServerMessage::ConnectionEstablished { client_id } => {
                debug!(%client_id, "Connection established");
                *lock(&self.connection_id) = Some(client_id);
            }
            ServerMessage::PresenceUpdate { users } => {
                *self
                    .presence
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = users.clone();
                self.subscribers.notify_presence(&users);
            }
            ServerMessage::CollaborationEvent { event } => {
                self.history.push(&event);
                self.subscribers.notify_event(&event);
            }
        }
    }
}

/// Supervisor: connect, pump, and reconnect with exponential backoff
/// until the allowed attempts are exhausted.
async fn supervise(inner: Arc<ClientInner>) {
    let mut attempts: u32 = 0;

    loop {
        inner.state_tx.send_replace(ConnectionState::Connecting);

        match connect_async(inner.connect_url()).await {
            Ok((stream, _response)) => {
                attempts = 0;
                info!(url = %inner.config.url, "Connected to broadcast server");

                run_connection(&inner, stream).await;

                *lock(&inner.outbound) = None;
                inner.state_tx.send_replace(ConnectionState::Closed);
                warn!("Connection closed");
            }
            Err(e) => {
                warn!(error = %e, attempt = attempts, "Connect failed");
            }
        }

        if attempts >= inner.config.max_reconnect_attempts {
            inner.state_tx.send_replace(ConnectionState::Failed);
            warn!(attempts, "Reconnect attempts exhausted, giving up");
            break;
        }

        let delay = reconnect_delay(inner.config.reconnect_base_delay, attempts);
        attempts += 1;
        debug!(delay_ms = delay.as_millis() as u64, attempt = attempts, "Scheduling reconnect");
        tokio::time::sleep(delay).await;
    }
}

/// Pumps one open socket: outbound queue and heartbeat out, frames in.
/// Returns when the socket closes or errors.
async fn run_connection(
    inner: &Arc<ClientInner>,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
) {
    let (mut ws_tx, mut ws_rx) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
    *lock(&inner.outbound) = Some(out_tx);
    // Publish Open only once the outbound queue is installed, so a caller
    // reacting to the state change can send immediately.
    inner.state_tx.send_replace(ConnectionState::Open);

    inner.announce_presence();
    inner.flush_pending();

    let period = inner.config.heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            queued = out_rx.recv() => {
                let Some(message) = queued else { break };
                let frame = match serde_json::to_string(&message) {
                    Ok(f) => f,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize outbound message");
                        continue;
                    }
                };
                if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let Ok(frame) = serde_json::to_string(&ClientMessage::Ping) else { continue };
                if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => inner.handle_server_message(message),
                            Err(e) => warn!(error = %e, "Unparseable server frame, dropping"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Protocol-level ping/pong handled by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;

    use super::*;

    fn offline_client() -> CollabClient {
        CollabClient::new(
            ClientConfig::new("ws://127.0.0.1:1/ws"),
            ClientIdentity::new("alice").with_name("Alice"),
        )
    }

    fn event(entity_id: &str) -> CollaborationEvent {
        CollaborationEvent {
            kind: EventKind::Edit,
            user_id: "bob".to_string(),
            user_name: Some("Bob".to_string()),
            user_avatar: None,
            timestamp: now_millis(),
            data: json!({"field": "title"}),
            entity_type: EntityKind::Task,
            entity_id: entity_id.to_string(),
        }
    }

    #[tokio::test]
    async fn routes_events_by_entity_id_and_wildcard() {
        let client = offline_client();
        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));

        let subs: Vec<Subscription> = ["task-7", "task-9", "*"]
            .into_iter()
            .map(|key| {
                let seen = seen.clone();
                client.on_collaboration_event(key, move |_| {
                    seen.lock().expect("seen").push(key.to_string());
                })
            })
            .collect();

        client.inject_server_message(ServerMessage::CollaborationEvent {
            event: event("task-7"),
        });
        {
            let mut got = seen.lock().expect("seen");
            got.sort();
            assert_eq!(*got, vec!["*".to_string(), "task-7".to_string()]);
            got.clear();
        }

        // A wildcard event reaches every subscriber.
        client.inject_server_message(ServerMessage::CollaborationEvent { event: event("*") });
        {
            let mut got = seen.lock().expect("seen");
            got.sort();
            assert_eq!(
                *got,
                vec!["*".to_string(), "task-7".to_string(), "task-9".to_string()]
            );
        }

        drop(subs);
        client.inject_server_message(ServerMessage::CollaborationEvent {
            event: event("task-7"),
        });
        assert_eq!(seen.lock().expect("seen").len(), 3);
    }

    #[tokio::test]
    async fn presence_updates_replace_the_cached_list_wholesale() {
        let client = offline_client();
        let notified: Arc<StdMutex<usize>> = Arc::new(StdMutex::new(0));
        let counter = notified.clone();
        let _sub = client.on_presence_change(move |users| {
            *counter.lock().expect("count") = users.len();
        });

        client.inject_server_message(ServerMessage::PresenceUpdate {
            users: vec![PresenceUser::default(), PresenceUser::default()],
        });
        assert_eq!(client.presence_users().len(), 2);
        assert_eq!(*notified.lock().expect("count"), 2);

        client.inject_server_message(ServerMessage::PresenceUpdate { users: vec![] });
        assert!(client.presence_users().is_empty());
        assert_eq!(*notified.lock().expect("count"), 0);
    }

    #[tokio::test]
    async fn events_queue_while_offline_and_oldest_drop_on_overflow() {
        let mut config = ClientConfig::new("ws://127.0.0.1:1/ws");
        config.offline_queue_capacity = 2;
        let client = CollabClient::new(config, ClientIdentity::new("alice"));

        for i in 0..3 {
            client.send_collaboration_event(
                EventKind::Comment,
                EntityKind::Task,
                "task-7",
                json!({"content": format!("c{i}")}),
            );
        }

        let queued = client.queued_messages();
        assert_eq!(queued.len(), 2);
        let contents: Vec<&str> = queued
            .iter()
            .map(|m| match m {
                ClientMessage::CollaborationEvent { event } => {
                    event.data["content"].as_str().expect("content")
                }
                other => panic!("unexpected queued message: {other:?}"),
            })
            .collect();
        assert_eq!(contents, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn presence_is_dropped_while_offline_but_still_merged() {
        let client = offline_client();

        client.update_cursor(10.0, 20.0);
        client.update_selection("title field");
        client.set_current_view("/projects/42");

        // Nothing queued: presence frames are not replayed on reconnect.
        assert!(client.queued_messages().is_empty());

        // The merge base accumulated every patch for the next announce.
        let doc = client.last_sent_presence();
        assert_eq!(doc.id, "alice");
        assert_eq!(doc.name.as_deref(), Some("Alice"));
        assert_eq!(doc.cursor, Some(CursorPosition { x: 10.0, y: 20.0 }));
        assert_eq!(doc.selection.as_deref(), Some("title field"));
        assert_eq!(doc.current_view, "/projects/42");
    }

    #[tokio::test]
    async fn stamps_identity_and_timestamp_onto_events() {
        let client = offline_client();
        client.send_collaboration_event(
            EventKind::StatusChange,
            EntityKind::Project,
            "p-1",
            json!({"oldStatus": "open", "newStatus": "done"}),
        );

        let queued = client.queued_messages();
        assert_eq!(queued.len(), 1);
        match &queued[0] {
            ClientMessage::CollaborationEvent { event } => {
                assert_eq!(event.user_id, "alice");
                assert_eq!(event.user_name.as_deref(), Some("Alice"));
                assert!(event.timestamp > 0);
                assert_eq!(event.entity_id, "p-1");
            }
            other => panic!("unexpected queued message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refcounted_teardown_only_at_zero() {
        let client = offline_client();
        client.acquire();
        client.acquire();
        assert_eq!(client.refcount(), 2);

        client.release();
        assert_eq!(client.refcount(), 1);
        // Still held: not back to Idle by release alone.
        assert_ne!(client.current_state(), ConnectionState::Failed);

        client.release();
        assert_eq!(client.refcount(), 0);
        assert_eq!(client.current_state(), ConnectionState::Idle);
    }
}
