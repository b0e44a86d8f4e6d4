//! Tagged client/server message envelopes.
//!
//! All frames share a top-level `type` tag. Envelope tags are snake_case,
//! payload fields are camelCase.

use serde::{Deserialize, Serialize};

use crate::event::CollaborationEvent;
use crate::presence::PresenceUser;

/// Messages sent by the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat probe; the server answers with a unicast pong.
    Ping,
    /// Replace the sender's presence document wholesale.
    PresenceUpdate {
        /// The full presence document.
        user: PresenceUser,
    },
    /// Fan a collaboration event out to every open connection.
    CollaborationEvent {
        /// The event to broadcast.
        event: CollaborationEvent,
    },
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Heartbeat acknowledgment.
    Pong,
    /// Sent once after the socket opens.
    #[serde(rename_all = "camelCase")]
    ConnectionEstablished {
        /// Server-generated connection identifier.
        client_id: String,
    },
    /// Full presence registry snapshot, broadcast after every change.
    PresenceUpdate {
        /// All currently-known presence documents.
        users: Vec<PresenceUser>,
    },
    /// A collaboration event echoed/broadcast to every open connection.
    CollaborationEvent {
        /// The event.
        event: CollaborationEvent,
    },
}
