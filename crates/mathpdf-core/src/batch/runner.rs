//! Async driver tying the scheduler, its event channel, and delivery together.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::EnhanceConfig;
use crate::error::{Error, Result};
use crate::execute::{EventReceiver, UnitSpawner, event_channel};

use super::context::{AbortHandle, BatchCallback};
use super::coordinator::{BatchCoordinator, BatchReport};
use super::job::JobId;
use super::scheduler::Scheduler;

/// How long units get to signal readiness before they are given up on.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool settings for a [`BatchRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Number of execution units.
    pub workers: usize,
    /// Startup deadline; `None` waits forever.
    pub ready_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            ready_timeout: Some(DEFAULT_READY_TIMEOUT),
        }
    }
}

/// Available hardware parallelism, or 4 when it cannot be determined.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Runs batches to completion on the current task.
pub struct BatchRunner<S: UnitSpawner> {
    scheduler: Scheduler<S>,
    events: EventReceiver,
    coordinator: BatchCoordinator,
    ready_timeout: Option<Duration>,
    pool_started: Instant,
}

impl<S: UnitSpawner> BatchRunner<S> {
    /// Start the worker pool.
    pub fn new(spawner: S, config: RunnerConfig, coordinator: BatchCoordinator) -> Self {
        let (sender, events) = event_channel();
        let scheduler = Scheduler::new(spawner, config.workers, sender);
        Self {
            scheduler,
            events,
            coordinator,
            ready_timeout: config.ready_timeout,
            pool_started: Instant::now(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler<S> {
        &self.scheduler
    }

    pub fn set_callback(&mut self, callback: impl BatchCallback + 'static) {
        self.scheduler.set_callback(callback);
    }

    pub fn enqueue(&mut self, name: impl Into<String>, data: Vec<u8>) -> JobId {
        self.scheduler.enqueue(name, data)
    }

    pub fn enqueue_file(&mut self, path: impl Into<PathBuf>) -> JobId {
        self.scheduler.enqueue_file(path)
    }

    /// Replace the pool, e.g. after a cancelled batch.
    pub fn restart_pool(&mut self) -> Result<()> {
        self.scheduler.restart_pool()?;
        self.pool_started = Instant::now();
        Ok(())
    }

    /// Stop the pool once no more batches will run.
    ///
    /// Idle worker processes are asked to exit and waited for instead of
    /// being killed.
    pub fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown()
    }

    /// Run every queued job as one batch.
    ///
    /// Returns once the batch completed and was delivered, or once `abort`
    /// fired. After a cancellation the pool is left terminated; call
    /// [`BatchRunner::restart_pool`] before running again.
    pub async fn run(&mut self, config: EnhanceConfig, abort: &AbortHandle) -> Result<BatchReport> {
        self.scheduler.start_batch(config)?;

        let deadline = tokio::time::Instant::from_std(
            self.pool_started + self.ready_timeout.unwrap_or(Duration::ZERO),
        );
        let mut startup_settled = self.ready_timeout.is_none();

        loop {
            if let Some(done) = self.scheduler.take_finished() {
                return Ok(self.coordinator.complete(done));
            }
            if !self.scheduler.has_starting_workers() {
                startup_settled = true;
            }

            tokio::select! {
                _ = abort.aborted() => {
                    let cancelled = self.scheduler.cancel()?;
                    return Ok(self.coordinator.cancelled(cancelled));
                }
                _ = tokio::time::sleep_until(deadline), if !startup_settled => {
                    startup_settled = true;
                    let expired = self.scheduler.expire_starting_workers();
                    if expired > 0 {
                        warn!("{} workers failed to start in time", expired);
                    }
                }
                event = self.events.recv() => match event {
                    Some(event) => self.scheduler.handle_event(event),
                    None => return Err(Error::Ipc("worker event channel closed".to_string())),
                },
            }
        }
    }
}
