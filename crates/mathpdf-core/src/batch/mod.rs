//! Batch scheduling over a pool of execution units.
//!
//! ```text
//! JobQueue ──claim_next──► Scheduler ──dispatch──► WorkerHandle ──► ExecutionUnit
//!                              ▲                                         │
//!                              └──────────── WorkerEvent ◄───────────────┘
//!                              │
//!                              ▼ CompletedBatch
//!                       BatchCoordinator ──► ArchiveBundler ──► DeliverySink
//! ```
//!
//! [`BatchRunner`] drives the loop on a tokio task, racing worker events
//! against an [`AbortHandle`] and the pool's startup deadline.

mod context;
mod coordinator;
mod handle;
mod job;
mod progress;
mod queue;
mod runner;
mod scheduler;
mod state;

pub use context::{AbortHandle, BatchCallback};
pub use coordinator::{
    ArchiveBundler, BatchCoordinator, BatchReport, BatchSummary, DEFAULT_ARCHIVE_NAME, Delivery,
    DeliverySink,
};
pub use handle::{WorkerHandle, WorkerState};
pub use job::{
    FailureKind, Job, JobFailure, JobId, JobInfo, JobOutcome, JobOutput, JobSource, NamedOutput,
};
pub use progress::Progress;
pub use queue::JobQueue;
pub use runner::{BatchRunner, DEFAULT_READY_TIMEOUT, RunnerConfig, default_worker_count};
pub use scheduler::Scheduler;
pub use state::{BatchState, CancelledBatch, CompletedBatch};
