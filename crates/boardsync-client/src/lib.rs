//! # boardsync-client
//!
//! Client side of the Boardsync real-time collaboration layer. Provides:
//!
//! - [`CollabClient`]: one logical WebSocket connection with exponential
//!   backoff reconnection, heartbeat, and a typed publish/subscribe surface
//! - [`EntitySession`]: per-entity subscription adapter deriving
//!   "who is viewing" / "who is editing" aggregates
//!
//! Clones of a [`CollabClient`] share one connection; sessions hold it via
//! a reference count so the socket is torn down only when the last session
//! is dropped.

pub mod backoff;
pub mod history;
pub mod manager;
pub mod session;
pub mod subscription;

pub use manager::{
    ClientConfig, ClientIdentity, CollabClient, ConnectionState, PresencePatch,
};
pub use session::{Editor, EntitySession};
pub use subscription::Subscription;
