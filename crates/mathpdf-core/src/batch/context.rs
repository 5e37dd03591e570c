//! Cancellation and progress callbacks for batches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::execute::WorkerId;

use super::job::{JobFailure, JobInfo};
use super::progress::Progress;

/// Handle for cancelling a running batch.
///
/// `AbortHandle` can be cloned and shared across threads and tasks; any clone
/// can trigger the abort, which every other clone observes. The batch runner
/// waits on [`AbortHandle::aborted`] alongside worker events.
///
/// # Example
///
/// ```
/// use mathpdf_core::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_aborted());
/// handle_clone.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

#[derive(Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// Request abort and wake every waiter.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Reset the abort flag.
    ///
    /// Called before starting a new batch to clear any previous abort.
    pub fn reset(&self) {
        self.inner.aborted.store(false, Ordering::Release);
    }

    /// Resolve once abort has been requested.
    pub async fn aborted(&self) {
        loop {
            // Register before checking so an abort in between is not missed.
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// Callback trait for batch progress reporting.
pub trait BatchCallback: Send + Sync {
    /// Called once per pool, when the first unit signals readiness.
    fn on_engine_online(&self, _workers: usize) {}

    /// Called when a batch starts with `total` jobs.
    fn on_batch_started(&self, _total: usize) {}

    /// Called when a job is handed to a worker.
    fn on_job_dispatched(&self, _worker: WorkerId, _job: &JobInfo) {}

    /// Called when a job produced output.
    fn on_job_completed(&self, job: &JobInfo, progress: Progress);

    /// Called when a job failed.
    fn on_job_failed(&self, failure: &JobFailure, progress: Progress);

    /// Called when the batch was cancelled.
    fn on_batch_cancelled(&self, _progress: Progress) {}
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_abort_is_shared_between_clones() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        clone.abort();
        assert!(handle.is_aborted());
        handle.reset();
        assert!(!clone.is_aborted());
    }

    #[tokio::test]
    async fn test_aborted_resolves_after_abort() {
        let handle = AbortHandle::new();
        let trigger = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.abort();
        });

        tokio::time::timeout(Duration::from_secs(5), handle.aborted())
            .await
            .expect("abort was not observed");
    }

    #[tokio::test]
    async fn test_aborted_resolves_immediately_when_already_set() {
        let handle = AbortHandle::new();
        handle.abort();
        tokio::time::timeout(Duration::from_millis(100), handle.aborted())
            .await
            .expect("abort was not observed");
    }
}
