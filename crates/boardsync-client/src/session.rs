//! Entity collaboration session — binds the shared client connection to
//! one application entity and derives UI-friendly aggregates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde_json::json;

use boardsync_protocol::{EntityKind, EventKind, PresenceStatus, PresenceUser};

use crate::manager::CollabClient;
use crate::subscription::Subscription;

/// Comments longer than this are silently truncated before transmission.
const MAX_COMMENT_CHARS: usize = 100;
/// At most this many characters of a selection are forwarded.
const MAX_SELECTION_CHARS: usize = 50;

/// A user currently editing the session's entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    /// Stable user id.
    pub user_id: String,
    /// Display name, when the sender supplied one.
    pub user_name: Option<String>,
}

struct EditorEntry {
    user_name: Option<String>,
    seen_at: Instant,
}

/// Collaboration surface for a single entity (a project, task, portfolio,
/// or document).
///
/// Creation acquires the shared client connection (reference-counted);
/// dropping the session releases it — the socket is torn down only when
/// the last session releases.
pub struct EntitySession {
    client: CollabClient,
    entity_type: EntityKind,
    entity_id: String,
    editors: Arc<Mutex<HashMap<String, EditorEntry>>>,
    cursor_gate: Mutex<Option<Instant>>,
    _events: Subscription,
}

impl EntitySession {
    /// Opens a session on `entity_id`, connecting the shared client if this
    /// is the first holder.
    pub fn new(client: &CollabClient, entity_type: EntityKind, entity_id: impl Into<String>) -> Self {
        let client = client.clone();
        client.acquire();

        let entity_id = entity_id.into();
        let editors: Arc<Mutex<HashMap<String, EditorEntry>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let seen = editors.clone();
        let events = client.on_collaboration_event(&entity_id, move |event| {
            if event.kind == EventKind::Edit {
                seen.lock().unwrap_or_else(PoisonError::into_inner).insert(
                    event.user_id.clone(),
                    EditorEntry {
                        user_name: event.user_name.clone(),
                        seen_at: Instant::now(),
                    },
                );
            }
        });

        Self {
            client,
            entity_type,
            entity_id,
            editors,
            cursor_gate: Mutex::new(None),
            _events: events,
        }
    }

    /// The entity this session is bound to.
    pub fn entity(&self) -> (EntityKind, &str) {
        (self.entity_type, &self.entity_id)
    }

    /// The shared client this session sends through.
    pub fn client(&self) -> &CollabClient {
        &self.client
    }

    /// Presence users currently viewing this entity: their `current_view`
    /// contains the entity id and their status is active.
    pub fn current_viewers(&self) -> Vec<PresenceUser> {
        self.client
            .presence_users()
            .into_iter()
            .filter(|user| {
                user.status == PresenceStatus::Active
                    && user.current_view.contains(&self.entity_id)
            })
            .collect()
    }

    /// Users who sent an edit event for this entity within the editor
    /// window (30s by default), evaluated against the clock at call time.
    pub fn current_editors(&self) -> Vec<Editor> {
        self.editors_at(Instant::now())
    }

    fn editors_at(&self, now: Instant) -> Vec<Editor> {
        let window = self.client.config().editor_window;
        let mut editors = self.editors.lock().unwrap_or_else(PoisonError::into_inner);
        editors.retain(|_, entry| now.saturating_duration_since(entry.seen_at) <= window);
        editors
            .iter()
            .map(|(user_id, entry)| Editor {
                user_id: user_id.clone(),
                user_name: entry.user_name.clone(),
            })
            .collect()
    }

    /// Announces a field edit.
    pub fn send_edit(
        &self,
        field: &str,
        old_value: serde_json::Value,
        new_value: serde_json::Value,
        details: Option<&str>,
    ) {
        self.send(
            EventKind::Edit,
            json!({
                "field": field,
                "oldValue": old_value,
                "newValue": new_value,
                "details": details,
            }),
        );
    }

    /// Posts a comment, silently truncated to 100 characters.
    pub fn send_comment(&self, content: &str, target_id: Option<&str>) {
        let content: String = content.chars().take(MAX_COMMENT_CHARS).collect();
        self.send(
            EventKind::Comment,
            json!({"content": content, "targetId": target_id}),
        );
    }

    /// Announces an entity status transition.
    pub fn send_status_change(&self, old_status: &str, new_status: &str) {
        self.send(
            EventKind::StatusChange,
            json!({"oldStatus": old_status, "newStatus": new_status}),
        );
    }

    /// Emits a `user_join` event. Distinct from the presence-document
    /// mechanism; this does not create a presence registry entry.
    pub fn announce_presence(&self) {
        self.send(EventKind::UserJoin, json!({}));
    }

    /// Emits a `user_leave` event.
    pub fn announce_leave(&self) {
        self.send(EventKind::UserLeave, json!({}));
    }

    /// Forwards a pointer position, sampled to at most one frame per
    /// configured minimum interval (20 Hz by default). Dropped frames are
    /// not replayed; the next move wins.
    pub fn forward_cursor(&self, x: f64, y: f64) {
        let min_interval = self.client.config().cursor_min_interval;
        {
            let mut gate = self.cursor_gate.lock().unwrap_or_else(PoisonError::into_inner);
            if gate.is_some_and(|last| last.elapsed() < min_interval) {
                return;
            }
            *gate = Some(Instant::now());
        }
        self.client.update_cursor(x, y);
    }

    /// Forwards the first 50 characters of the current text selection.
    pub fn forward_selection(&self, text: &str) {
        let snippet: String = text.chars().take(MAX_SELECTION_CHARS).collect();
        self.client.update_selection(&snippet);
    }

    fn send(&self, kind: EventKind, data: serde_json::Value) {
        self.client
            .send_collaboration_event(kind, self.entity_type, &self.entity_id, data);
    }
}

impl Drop for EntitySession {
    fn drop(&mut self) {
        self.client.release();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use boardsync_protocol::{ClientMessage, ServerMessage};

    use crate::manager::{ClientConfig, ClientIdentity, ConnectionState};

    use super::*;

    fn offline_client() -> CollabClient {
        CollabClient::new(
            ClientConfig::new("ws://127.0.0.1:1/ws"),
            ClientIdentity::new("alice").with_name("Alice"),
        )
    }

    fn queued_event_data(client: &CollabClient) -> Vec<serde_json::Value> {
        client
            .queued_messages()
            .into_iter()
            .map(|m| match m {
                ClientMessage::CollaborationEvent { event } => event.data,
                other => panic!("unexpected queued message: {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn comments_are_truncated_to_one_hundred_chars() {
        let client = offline_client();
        let session = EntitySession::new(&client, EntityKind::Task, "task-7");

        let long_comment = "x".repeat(500);
        session.send_comment(&long_comment, Some("subtask-1"));

        let data = queued_event_data(&client);
        assert_eq!(data.len(), 1);
        let content = data[0]["content"].as_str().expect("content");
        assert_eq!(content.chars().count(), 100);
        assert_eq!(data[0]["targetId"], "subtask-1");
    }

    #[tokio::test]
    async fn editors_expire_after_the_window() {
        let client = offline_client();
        let session = EntitySession::new(&client, EntityKind::Task, "task-7");
        let window = client.config().editor_window;

        let seen_at = Instant::now();
        session.editors.lock().expect("editors").insert(
            "bob".to_string(),
            EditorEntry {
                user_name: Some("Bob".to_string()),
                seen_at,
            },
        );

        let within = session.editors_at(seen_at + window - Duration::from_secs(1));
        assert_eq!(within.len(), 1);
        assert_eq!(within[0].user_id, "bob");

        assert!(
            session
                .editors_at(seen_at + window + Duration::from_secs(1))
                .is_empty()
        );
    }

    #[tokio::test]
    async fn edit_events_mark_the_sender_as_editing() {
        let client = offline_client();
        let session = EntitySession::new(&client, EntityKind::Task, "task-7");

        client.inject_server_message(ServerMessage::CollaborationEvent {
            event: boardsync_protocol::CollaborationEvent {
                kind: EventKind::Edit,
                user_id: "bob".to_string(),
                user_name: Some("Bob".to_string()),
                user_avatar: None,
                timestamp: boardsync_protocol::now_millis(),
                data: serde_json::json!({"field": "title"}),
                entity_type: EntityKind::Task,
                entity_id: "task-7".to_string(),
            },
        });

        let editors = session.current_editors();
        assert_eq!(editors.len(), 1);
        assert_eq!(editors[0].user_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn viewers_require_matching_view_and_active_status() {
        let client = offline_client();
        let session = EntitySession::new(&client, EntityKind::Task, "task-7");

        client.inject_server_message(ServerMessage::PresenceUpdate {
            users: vec![
                PresenceUser {
                    id: "viewing".to_string(),
                    status: PresenceStatus::Active,
                    current_view: "/tasks/task-7".to_string(),
                    ..Default::default()
                },
                PresenceUser {
                    id: "idle".to_string(),
                    status: PresenceStatus::Idle,
                    current_view: "/tasks/task-7".to_string(),
                    ..Default::default()
                },
                PresenceUser {
                    id: "elsewhere".to_string(),
                    status: PresenceStatus::Active,
                    current_view: "/portfolio".to_string(),
                    ..Default::default()
                },
            ],
        });

        let viewers = session.current_viewers();
        assert_eq!(viewers.len(), 1);
        assert_eq!(viewers[0].id, "viewing");
    }

    #[tokio::test]
    async fn cursor_forwarding_is_throttled() {
        let client = offline_client();
        let session = EntitySession::new(&client, EntityKind::Document, "doc-1");

        session.forward_cursor(1.0, 1.0);
        session.forward_cursor(2.0, 2.0);

        // Second frame arrived inside the minimum interval and was sampled
        // away: the merge base still holds the first position.
        let cursor = client.last_sent_presence().cursor.expect("cursor");
        assert_eq!(cursor.x, 1.0);

        std::thread::sleep(client.config().cursor_min_interval + Duration::from_millis(10));
        session.forward_cursor(3.0, 3.0);
        let cursor = client.last_sent_presence().cursor.expect("cursor");
        assert_eq!(cursor.x, 3.0);
    }

    #[tokio::test]
    async fn selection_forwarding_keeps_fifty_chars() {
        let client = offline_client();
        let session = EntitySession::new(&client, EntityKind::Document, "doc-1");

        session.forward_selection(&"s".repeat(200));
        let selection = client.last_sent_presence().selection.expect("selection");
        assert_eq!(selection.chars().count(), 50);
    }

    #[tokio::test]
    async fn sessions_share_one_refcounted_connection() {
        let client = offline_client();
        let first = EntitySession::new(&client, EntityKind::Task, "task-7");
        let second = EntitySession::new(&client, EntityKind::Project, "p-1");
        assert_eq!(client.refcount(), 2);

        // Let the supervisor task start before checking teardown behavior.
        tokio::task::yield_now().await;

        drop(first);
        assert_eq!(client.refcount(), 1);
        assert_ne!(client.current_state(), ConnectionState::Idle);

        drop(second);
        assert_eq!(client.refcount(), 0);
        assert_eq!(client.current_state(), ConnectionState::Idle);
    }
}
