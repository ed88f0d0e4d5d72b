//! # Health Monitoring
//!
//! Background sweep over every pool key on a fixed interval, independent of
//! any acquire/release traffic: probes idle sessions, expires sessions past
//! their TTL, reclaims surplus idle capacity, and keeps the warm floor
//! topped up. Sweep errors are logged and never stop the loop.

use crate::pool::session_pool::SessionPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle to the background health sweep task
pub struct HealthMonitor {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl HealthMonitor {
    /// Spawn the sweep loop. The first sweep runs immediately, then once per
    /// `interval`.
    pub fn start(pool: Arc<SessionPool>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        info!(
            interval_secs = interval.as_secs(),
            "💓 HEALTH: Monitor started"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pool.sweep_once().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("HEALTH: Monitor stopped");
        });

        Self { handle, shutdown }
    }

    /// Signal the loop to stop without waiting for it
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the loop and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
