//! Presence document and status definitions.

use serde::{Deserialize, Serialize};

/// User presence status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// User is active and recently interacted.
    #[default]
    Active,
    /// User is connected but idle.
    Idle,
    /// User has marked themselves as away.
    Away,
}

impl PresenceStatus {
    /// Parses from a string with a default fallback.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "idle" => Self::Idle,
            "away" => Self::Away,
            _ => Self::Active,
        }
    }

    /// Converts to string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Away => "away",
        }
    }
}

/// Viewport-relative pointer position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// A live client's self-reported presence document.
///
/// Stored wholesale in the server's presence registry on every
/// `presence_update`; the server stamps `id` and `last_seen`, everything
/// else is client-supplied and unverified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    /// Stable user identifier (stamped by the server from the handshake).
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Current pointer position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    /// Short description of the current text/field selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    /// Presence status.
    #[serde(default)]
    pub status: PresenceStatus,
    /// Path/route the client currently has open.
    #[serde(default)]
    pub current_view: String,
    /// Server-stamped last-seen timestamp (ms since epoch), used for eviction.
    #[serde(default)]
    pub last_seen: i64,
}
