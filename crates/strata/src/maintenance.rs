//! Background consolidation loop
//!
//! Ticks on a fixed interval and consolidates whenever the system asks for
//! it. The interval restarts after each pass. Failures are logged and
//! retried on the next tick. Stopping cancels
//! the timer; a pass already in flight is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::system::MemorySystem;

/// Owner of a running maintenance loop
pub struct MaintenanceHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Spawn the loop, first ticking one `period` from now
    pub fn spawn(system: Arc<MemorySystem>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let task = tokio::spawn(run(system, period, token.clone()));
        info!("Maintenance loop started with {:?} interval", period);
        Self { token, task }
    }

    /// Spawn the loop if maintenance is enabled in the system's configuration
    pub fn start(system: Arc<MemorySystem>) -> Option<Self> {
        let config = system.maintenance_config();
        if !config.enabled {
            info!("Maintenance loop disabled");
            return None;
        }
        let period = Duration::from_secs(config.interval_secs.max(1));
        Some(Self::spawn(system, period))
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("Maintenance loop ended abnormally: {}", e);
        }
        info!("Maintenance loop stopped");
    }
}

async fn run(system: Arc<MemorySystem>, period: Duration, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !system.should_consolidate().await {
            debug!("Consolidation not needed this tick");
            continue;
        }

        match system.perform_consolidation().await {
            Ok(Some(summary)) => debug!(
                "Scheduled consolidation created {} fusions",
                summary.fusions_created.len()
            ),
            Ok(None) => debug!("Consolidation already running, tick skipped"),
            Err(e) => warn!("Scheduled consolidation failed, retrying next tick: {}", e),
        }
        // Next tick lands a full period after the pass, when it is due again
        ticker.reset();
    }
}
