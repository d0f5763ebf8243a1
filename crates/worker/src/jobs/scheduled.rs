use chrono::Utc;
use tokio::sync::watch;

use super::{period, run_every};
use crate::WorkerState;

/// Drains due scheduled notifications on every tick.
pub async fn run(state: WorkerState, shutdown: watch::Receiver<bool>) {
    let every = period(state.settings.scheduler_interval_secs);
    run_every("scheduled-notifications", every, shutdown, || {
        let engine = state.engine.clone();
        async move {
            engine.run_scheduler_tick(Utc::now()).await;
        }
    })
    .await;
}
