//! Background cache sweeper.
//!
//! One long-lived task per process: drops expired cache entries and
//! keeps certificates fresh ahead of their expiry. Request handlers
//! never pay for this work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::gateway::Gateway;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs sweep passes until shutdown.
pub async fn run(gateway: Arc<Gateway>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                gateway.sweep().await;
                debug!("sweep pass complete");
            }
        }
    }
}
