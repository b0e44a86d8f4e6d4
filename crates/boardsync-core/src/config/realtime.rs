//! Real-time broadcast engine configuration.

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) broadcast engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Interval between registry sweeps in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Presence entries older than this are evicted at sweep time.
    #[serde(default = "default_presence_ttl")]
    pub presence_ttl_seconds: u64,
    /// Per-connection outbound buffer size.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
            presence_ttl_seconds: default_presence_ttl(),
            channel_buffer_size: default_channel_buffer(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_presence_ttl() -> u64 {
    60
}

fn default_channel_buffer() -> usize {
    256
}
