//! Jobs, their outcomes, and named outputs.

use std::path::PathBuf;

/// Stable identity of a queued job, assigned at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

/// Where a job's document bytes come from.
#[derive(Debug, Clone)]
pub enum JobSource {
    /// Bytes already in memory.
    Bytes(Vec<u8>),
    /// A file read right before dispatch.
    File(PathBuf),
}

impl JobSource {
    /// Obtain the document bytes.
    pub fn load(self) -> std::io::Result<Vec<u8>> {
        match self {
            JobSource::Bytes(bytes) => Ok(bytes),
            JobSource::File(path) => std::fs::read(path),
        }
    }
}

/// A queued unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub(crate) info: JobInfo,
    pub(crate) source: JobSource,
}

impl Job {
    pub fn id(&self) -> JobId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn source(&self) -> &JobSource {
        &self.source
    }

    /// Split into the identity that travels with the worker and the payload.
    pub fn into_parts(self) -> (JobInfo, JobSource) {
        (self.info, self.source)
    }
}

/// Identity of a claimed job, owned by the worker handle executing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
}

impl JobInfo {
    /// Name of the enhanced document produced for this job.
    pub fn output_name(&self) -> String {
        format!("enhanced_{}", self.name)
    }
}

/// Result reported for one dispatched job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded(Vec<u8>),
    Failed(String),
}

/// A named byte buffer ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedOutput {
    pub name: String,
    pub data: Vec<u8>,
}

/// Successful output of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub job: JobId,
    pub output: NamedOutput,
}

/// Why a job produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The document bytes could not be obtained before dispatch.
    InputRead,
    /// The execution unit refused the document without running it.
    Rejected,
    /// The execution unit reported an error.
    Execution,
    /// The execution unit died while holding the job.
    WorkerLost,
    /// No execution unit was left to run the job.
    Unavailable,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::InputRead => write!(f, "input read"),
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::Execution => write!(f, "execution"),
            FailureKind::WorkerLost => write!(f, "worker lost"),
            FailureKind::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A named per-job failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub job: JobId,
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(job: &JobInfo, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            job: job.id,
            name: job.name.clone(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error processing {}: {}", self.name, self.message)
    }
}
