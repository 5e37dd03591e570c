//! Bookkeeping for the active batch.

use std::time::{Duration, Instant};

use crate::config::EnhanceConfig;

use super::job::{JobFailure, JobInfo, JobOutput, NamedOutput};
use super::progress::Progress;

/// State of the batch currently running.
#[derive(Debug)]
pub struct BatchState {
    total: usize,
    completed: usize,
    config: EnhanceConfig,
    results: Vec<JobOutput>,
    failures: Vec<JobFailure>,
    started_at: Instant,
}

impl BatchState {
    pub fn new(total: usize, config: EnhanceConfig) -> Self {
        Self {
            total,
            completed: 0,
            config,
            results: Vec::with_capacity(total),
            failures: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &EnhanceConfig {
        &self.config
    }

    pub fn progress(&self) -> Progress {
        Progress::new(self.completed, self.total)
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Store a job's output. Returns false if the batch was already full.
    pub fn record_success(&mut self, job: &JobInfo, data: Vec<u8>) -> bool {
        if self.is_complete() {
            return false;
        }
        self.completed += 1;
        self.results.push(JobOutput {
            job: job.id,
            output: NamedOutput {
                name: job.output_name(),
                data,
            },
        });
        true
    }

    /// Store a job's failure. Returns false if the batch was already full.
    pub fn record_failure(&mut self, failure: JobFailure) -> bool {
        if self.is_complete() {
            return false;
        }
        self.completed += 1;
        self.failures.push(failure);
        true
    }

    pub fn into_completed(self) -> CompletedBatch {
        CompletedBatch {
            total: self.total,
            results: self.results,
            failures: self.failures,
            elapsed: self.started_at.elapsed(),
        }
    }

    pub fn into_cancelled(self) -> CancelledBatch {
        CancelledBatch {
            total: self.total,
            completed: self.completed,
            discarded: self.results.len(),
        }
    }
}

/// A batch whose every job reached a terminal state.
#[derive(Debug)]
pub struct CompletedBatch {
    pub total: usize,
    /// Outputs in completion order.
    pub results: Vec<JobOutput>,
    pub failures: Vec<JobFailure>,
    pub elapsed: Duration,
}

impl CompletedBatch {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }
}

/// What was thrown away when a batch was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledBatch {
    pub total: usize,
    pub completed: usize,
    /// Successful outputs dropped without delivery.
    pub discarded: usize,
}
