pub mod campaigns;
pub mod scheduled;

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Ticks shorter than this would hammer the claim queries.
const MIN_PERIOD: Duration = Duration::from_secs(1);

pub fn period(secs: u64) -> Duration {
    Duration::from_secs(secs).max(MIN_PERIOD)
}

/// Runs `tick` every `period` until `shutdown` flips. A tick in progress
/// always finishes, so no claimed entry is abandoned mid-execution.
pub async fn run_every<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(job = name, period_secs = period.as_secs(), "job started");

    loop {
        tokio::select! {
            _ = interval.tick() => tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(job = name, "job stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_period_floor() {
        assert_eq!(period(0), Duration::from_secs(1));
        assert_eq!(period(60), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_every_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();

        let job = tokio::spawn(run_every("test", Duration::from_secs(10), rx, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();
        job.await.unwrap();

        // first tick fires immediately, then at 10s and 20s
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
