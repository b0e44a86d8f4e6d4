//! Connection tracking: per-socket handles and the live-connection registry.

pub mod handle;
pub mod registry;
