//! Periodic registry sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::debug;

use crate::hub::BroadcastHub;

/// Runs the periodic sweep loop until shutdown is signalled.
///
/// Every tick evicts stale presence entries and dead connections, then
/// broadcasts the presence list once, whether or not anything changed.
pub async fn run_sweeper(hub: Arc<BroadcastHub>) {
    let mut shutdown = hub.shutdown_receiver();
    let period = Duration::from_secs(hub.config().sweep_interval_seconds);
    let mut interval = time::interval(period);
    // The first tick completes immediately; skip it so sweeps start one
    // full period after boot.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                hub.sweep_once();
            }
            _ = shutdown.recv() => {
                break;
            }
        }
    }

    debug!("Sweeper stopped");
}
