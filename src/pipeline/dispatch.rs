use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::TARGET_WORKFLOW_REQUEST;

/// Runs detached background work on a bounded number of concurrent slots.
///
/// Submitted work is never joined; callers observe completion through whatever
/// the work itself writes.
#[derive(Clone, Debug)]
pub struct AnalysisDispatcher {
    permits: Arc<Semaphore>,
}

impl AnalysisDispatcher {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn submit<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only waits.
            let Ok(_permit) = permits.clone().acquire_owned().await else {
                return;
            };
            debug!(target: TARGET_WORKFLOW_REQUEST, "analysis slot acquired, {} left", permits.available_permits());
            work.await;
        });
    }
}
