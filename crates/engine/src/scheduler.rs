//! Claim loop for scheduled delivery log entries.

use chrono::{DateTime, Utc};
use notifyhub_core::types::LogStatus;
use serde::Serialize;

use crate::Engine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub claimed: u32,
    pub sent: u32,
    pub failed: u32,
}

impl Engine {
    /// Claims and executes due entries one at a time, at most
    /// `scheduler_batch` per tick. Each claim is a conditional
    /// `scheduled -> processing` update, so concurrent ticks never execute
    /// the same entry twice.
    pub async fn run_scheduler_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for _ in 0..self.config.scheduler_batch.max(0) {
            let log = match self.store.claim_due_log(now).await {
                Ok(Some(log)) => log,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "failed to claim scheduled entry");
                    break;
                }
            };
            report.claimed += 1;
            let log_id = log.id.clone();

            match self.execute_scheduled(log, now).await {
                Ok(Some(LogStatus::Sent)) => report.sent += 1,
                Ok(Some(_)) => report.failed += 1,
                Ok(None) => {}
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(log_id = %log_id, error = %err, "scheduled entry execution failed");
                }
            }
        }

        if report.claimed > 0 {
            tracing::info!(
                claimed = report.claimed,
                sent = report.sent,
                failed = report.failed,
                "scheduler tick finished"
            );
        }
        report
    }
}
