//! Core engine for the mathpdf batch document enhancer.
//!
//! This crate provides:
//! - A FIFO job queue and pull-based scheduler over a pool of execution units
//! - Process-backed units talking to `mathpdf-worker` over rkyv IPC
//! - Thread-backed units for in-process runs
//! - Batch coordination: progress, cancellation, ZIP bundling, delivery
//! - Validated, persistable enhancement settings

pub mod batch;
pub mod bundle;
pub mod config;
pub mod error;
pub mod execute;
pub mod ipc;
pub mod transform;

pub use batch::{
    AbortHandle, ArchiveBundler, BatchCallback, BatchCoordinator, BatchReport, BatchRunner,
    BatchSummary, CancelledBatch, CompletedBatch, Delivery, DeliverySink, FailureKind, JobFailure,
    JobId, JobInfo, JobQueue, NamedOutput, Progress, RunnerConfig, Scheduler,
};
pub use bundle::ZipBundler;
pub use config::{EnhanceConfig, LayoutMode, MarginSide};
pub use error::{Error, Result};
pub use execute::{ExecutionUnit, ThreadSpawner, UnitSpawner, WorkerId};
pub use ipc::ProcessSpawner;
