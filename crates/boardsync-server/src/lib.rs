//! # boardsync-server
//!
//! Single-process WebSocket presence/broadcast server. Provides:
//!
//! - Connection registry with per-socket outbound queues
//! - Presence registry keyed by stable user id
//! - Best-effort broadcast fan-out of presence and collaboration events
//! - Periodic sweep evicting stale presence and dead connections

pub mod app;
pub mod connection;
pub mod hub;
pub mod presence;
pub mod sweeper;
pub mod ws;

pub use connection::handle::{ConnectionHandle, ConnectionId};
pub use connection::registry::ConnectionRegistry;
pub use hub::BroadcastHub;
pub use presence::registry::PresenceRegistry;
