use chrono::Utc;
use tokio::sync::watch;

use super::{period, run_every};
use crate::WorkerState;

/// Promotes scheduled campaigns whose start time has passed.
pub async fn run(state: WorkerState, shutdown: watch::Receiver<bool>) {
    let every = period(state.settings.campaign_interval_secs);
    run_every("scheduled-campaigns", every, shutdown, || {
        let engine = state.engine.clone();
        async move {
            let report = engine.promote_due_campaigns(Utc::now()).await;
            if report.promoted > 0 {
                tracing::info!(
                    promoted = report.promoted,
                    completed = report.completed,
                    canceled = report.canceled,
                    "campaign promotion finished"
                );
            }
        }
    })
    .await;
}
