//! Fixed-rate trigger for reconciliation passes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::task::{PassOutcome, SyncTask};

/// Start a pass every `period`, the first one immediately, until `shutdown`
/// resolves.
///
/// Passes run on their own task so a long pass does not delay the trigger;
/// overlapping triggers are turned away by the task's guard.
pub async fn run_every<S>(task: Arc<SyncTask>, period: Duration, shutdown: S) -> usize
where
    S: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut triggered = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(triggered, "Scheduler stopped");
                return triggered;
            }
            _ = ticker.tick() => {
                triggered += 1;
                let task = task.clone();
                tokio::spawn(async move {
                    let outcome = task.run_pass().await;
                    if outcome == PassOutcome::Completed {
                        info!(?outcome, last_sync = ?task.last_sync_time(), "Pass finished");
                    } else {
                        warn!(?outcome, "Pass finished");
                    }
                });
            }
        }
    }
}

/// Resolves on Ctrl-C.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
