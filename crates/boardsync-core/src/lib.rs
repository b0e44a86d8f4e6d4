//! # boardsync-core
//!
//! Shared foundation for the Boardsync real-time collaboration layer:
//!
//! - Configuration schemas loaded from TOML + environment variables
//! - Unified application error type used across all crates

pub mod config;
pub mod error;

pub use config::AppConfig;
pub use error::{AppError, ErrorKind};
