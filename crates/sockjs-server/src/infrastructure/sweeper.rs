//! Background task that expires idle sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sockjs_core::SessionRegistry;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Floor for the sweep period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Spawns a task that calls [`SessionRegistry::sweep`] every `period` until
/// `running` is cleared.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    period: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !running.load(Ordering::Relaxed) {
                debug!("sweeper stopping");
                break;
            }
            let removed = registry.sweep(idle_timeout);
            if !removed.is_empty() {
                debug!(?removed, "expired idle sessions");
            }
        }
    })
}
