//! # boardsync-protocol
//!
//! Wire protocol for the Boardsync real-time collaboration layer:
//! JSON text frames over a single WebSocket endpoint. Provides:
//!
//! - Presence documents and status definitions
//! - Collaboration event types scoped to application entities
//! - Tagged client/server message envelopes

pub mod envelope;
pub mod event;
pub mod presence;

pub use envelope::{ClientMessage, ServerMessage};
pub use event::{CollaborationEvent, EntityKind, EventKind, WILDCARD_ENTITY};
pub use presence::{CursorPosition, PresenceStatus, PresenceUser};

/// Current wall-clock time in milliseconds since the Unix epoch, as
/// stamped into presence documents and collaboration events.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
