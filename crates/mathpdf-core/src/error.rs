//! Error types for mathpdf-core.

use thiserror::Error;

use crate::execute::WorkerId;

/// Result type for mathpdf-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mathpdf-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation requires that no batch is running.
    #[error("a batch is already active")]
    BatchActive,

    /// Operation requires a running batch.
    #[error("no batch is active")]
    NoActiveBatch,

    /// Batch was started with nothing queued.
    #[error("job queue is empty")]
    EmptyQueue,

    /// Queue position does not exist.
    #[error("queue position {position} out of range (queue holds {len} jobs)")]
    PositionOutOfRange { position: usize, len: usize },

    /// Every execution unit in the pool is terminated.
    #[error("no execution units available")]
    NoWorkers,

    /// Dispatch attempted on a worker that still owns a job.
    #[error("worker {0} is busy")]
    WorkerBusy(WorkerId),

    /// Dispatch attempted on a worker that has not signalled readiness.
    #[error("worker {0} is not ready")]
    WorkerNotReady(WorkerId),

    /// Failed to spawn an execution unit.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IPC communication error with worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// A document exceeds what the unit can accept. Only that job is affected.
    #[error("document too large: {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// The peer closed the IPC stream between messages.
    #[error("IPC channel closed")]
    ChannelClosed,

    /// Document transform rejected its input.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Archive creation failed.
    #[error("bundling failed: {0}")]
    Bundle(String),

    /// Artifact could not be handed to the delivery sink.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Settings file could not be parsed or written.
    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Render the error together with a short recovery hint, when one applies.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Spawn(_) => Some(
                "build the worker with `cargo build -p mathpdf-worker`, set MATHPDF_WORKER_PATH, \
                 or pass --in-process",
            ),
            Error::NoWorkers => Some("restart the worker pool before starting another batch"),
            Error::EmptyQueue => Some("queue at least one PDF before starting a batch"),
            Error::InvalidConfig(_) => Some("run `mathpdf settings show` to inspect the settings"),
            Error::Settings(_) => Some("run `mathpdf settings init --force` to rewrite the settings file"),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_appended_for_spawn_errors() {
        let err = Error::Spawn("not found".to_string());
        let rendered = err.with_hint();
        assert!(rendered.starts_with("failed to spawn worker: not found"));
        assert!(rendered.contains("MATHPDF_WORKER_PATH"));
    }

    #[test]
    fn test_no_hint_for_plain_errors() {
        let err = Error::BatchActive;
        assert_eq!(err.with_hint(), "a batch is already active");
    }
}
