use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::{task::JoinHandle, time::sleep};
use tracing::info;

use super::cadence::DailyCadence;
use super::refresh::RefreshScheduler;
use crate::TARGET_WORKFLOW_REQUEST;

/// Runs a refresh batch at every trigger of `cadence`, forever.
pub fn spawn_refresh_daemon(scheduler: Arc<RefreshScheduler>, cadence: DailyCadence) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_run: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let mut next = cadence.next_run_from(now);
            // A batch that finishes inside its own trigger instant must not run twice.
            if last_run == Some(next) {
                next = cadence.next_run_from(next + chrono::Duration::seconds(1));
            }
            let wait = duration_until(next, now);
            info!(
                target: TARGET_WORKFLOW_REQUEST,
                next_run_utc = %next.to_rfc3339(),
                next_run_local = %next.with_timezone(&cadence.timezone()).to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "scheduled favorite refresh"
            );
            sleep(wait).await;

            last_run = Some(next);
            scheduler.run_once().await;
        }
    })
}

fn duration_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_instants_wait_zero() {
        let now = Utc::now();
        assert_eq!(duration_until(now - chrono::Duration::seconds(5), now), Duration::ZERO);
        assert_eq!(
            duration_until(now + chrono::Duration::seconds(90), now),
            Duration::from_secs(90)
        );
    }
}
