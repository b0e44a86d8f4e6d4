//! Collaboration event definitions.

use serde::{Deserialize, Serialize};

/// Entity id wildcard meaning "all entities" for global listeners.
pub const WILDCARD_ENTITY: &str = "*";

/// The kind of action a collaboration event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A user announced themselves on an entity.
    UserJoin,
    /// A user left an entity.
    UserLeave,
    /// Pointer moved.
    CursorMove,
    /// Text/field selection changed.
    SelectionChange,
    /// A field was edited.
    Edit,
    /// A comment was posted.
    Comment,
    /// An entity's status changed.
    StatusChange,
}

/// The logical application object a collaboration event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A project board.
    Project,
    /// A task on a board.
    Task,
    /// A portfolio of projects.
    Portfolio,
    /// A free-form document.
    Document,
}

/// An ephemeral, non-persisted broadcast message describing one action.
///
/// Fire-and-forget: the server stores nothing, keeps no ordering index,
/// and sends no acknowledgment. Receivers independently decide retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationEvent {
    /// Action kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Sender identity, stamped by the sending client manager.
    pub user_id: String,
    /// Sender display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Sender avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    /// Client-stamped send time (ms since epoch).
    pub timestamp: i64,
    /// Free-form payload, shape dependent on the event kind.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Entity kind the event concerns.
    pub entity_type: EntityKind,
    /// Entity identifier, or [`WILDCARD_ENTITY`] for all entities.
    pub entity_id: String,
}

impl CollaborationEvent {
    /// Whether this event should be delivered to a listener registered
    /// under `subscription_key` (exact match, or either side wildcard).
    pub fn matches(&self, subscription_key: &str) -> bool {
        subscription_key == self.entity_id
            || subscription_key == WILDCARD_ENTITY
            || self.entity_id == WILDCARD_ENTITY
    }
}
