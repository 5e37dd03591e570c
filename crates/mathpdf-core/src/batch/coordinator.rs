//! Turns a finished batch into delivered artifacts.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{Error, Result};

use super::job::{JobFailure, JobOutput, NamedOutput};
use super::state::{CancelledBatch, CompletedBatch};

/// Default name of the archive built for multi-document batches.
pub const DEFAULT_ARCHIVE_NAME: &str = "enhanced_pdfs.zip";

/// Packs several outputs into one archive.
pub trait ArchiveBundler: Send {
    fn bundle(&self, archive_name: &str, outputs: &[&NamedOutput]) -> Result<NamedOutput>;
}

/// Final destination for delivered artifacts.
pub trait DeliverySink: Send {
    fn deliver(&mut self, artifact: &NamedOutput) -> Result<()>;
}

/// What was handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// No job succeeded.
    Nothing,
    /// The only output was delivered as-is.
    Single(String),
    /// Outputs were bundled into an archive.
    Archive { name: String, entries: usize },
}

/// Outcome of a batch that ran to completion.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub failures: Vec<JobFailure>,
    pub delivery: Delivery,
    /// Bundling or delivery error. Collected results are kept regardless.
    pub delivery_error: Option<Error>,
    pub results: Vec<JobOutput>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }
}

/// Terminal report for one batch.
#[derive(Debug)]
pub enum BatchReport {
    Completed(BatchSummary),
    Cancelled(CancelledBatch),
}

/// Bundles and delivers finished batches.
pub struct BatchCoordinator {
    bundler: Box<dyn ArchiveBundler>,
    sink: Box<dyn DeliverySink>,
    archive_name: String,
}

impl BatchCoordinator {
    pub fn new(bundler: impl ArchiveBundler + 'static, sink: impl DeliverySink + 'static) -> Self {
        Self {
            bundler: Box::new(bundler),
            sink: Box::new(sink),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
        }
    }

    pub fn with_archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = name.into();
        self
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    /// Deliver the results of a completed batch.
    ///
    /// One result goes to the sink directly; several are bundled first.
    pub fn complete(&mut self, batch: CompletedBatch) -> BatchReport {
        let CompletedBatch {
            total,
            results,
            failures,
            elapsed,
        } = batch;

        let (delivery, delivery_error) = match results.as_slice() {
            [] => {
                warn!("No documents were enhanced ({} failed)", failures.len());
                (Delivery::Nothing, None)
            }
            [only] => match self.sink.deliver(&only.output) {
                Ok(()) => (Delivery::Single(only.output.name.clone()), None),
                Err(e) => {
                    error!("Failed to deliver {}: {}", only.output.name, e);
                    (Delivery::Nothing, Some(e))
                }
            },
            many => self.deliver_archive(many),
        };

        BatchReport::Completed(BatchSummary {
            total,
            failures,
            delivery,
            delivery_error,
            results,
            elapsed,
        })
    }

    fn deliver_archive(&mut self, results: &[JobOutput]) -> (Delivery, Option<Error>) {
        info!("Generating ZIP archive...");
        let outputs: Vec<&NamedOutput> = results.iter().map(|r| &r.output).collect();
        let archive = match self.bundler.bundle(&self.archive_name, &outputs) {
            Ok(archive) => archive,
            Err(e) => {
                error!("Failed to create {}: {}", self.archive_name, e);
                return (Delivery::Nothing, Some(e));
            }
        };
        match self.sink.deliver(&archive) {
            Ok(()) => (
                Delivery::Archive {
                    name: archive.name,
                    entries: outputs.len(),
                },
                None,
            ),
            Err(e) => {
                error!("Failed to deliver {}: {}", archive.name, e);
                (Delivery::Nothing, Some(e))
            }
        }
    }

    /// Report a cancelled batch. Nothing is delivered.
    pub fn cancelled(&mut self, batch: CancelledBatch) -> BatchReport {
        if batch.discarded > 0 {
            info!("Discarded {} completed results", batch.discarded);
        }
        BatchReport::Cancelled(batch)
    }
}
