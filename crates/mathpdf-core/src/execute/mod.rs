//! Execution units for mathpdf batches.
//!
//! An execution unit transforms one document at a time, concurrently with
//! the coordinator. Units never call back into the scheduler directly: they
//! report through a single multiplexed event channel, each event tagged with
//! the worker's identity and pool generation.
//!
//! # Units
//!
//! - **`ProcessUnit`** (in `ipc`) - runs `mathpdf-worker` as a child process.
//!   Can be killed at any time, giving true cancellation and crash isolation.
//! - **`ThreadUnit`** - runs a transform function on a dedicated thread. No
//!   isolation; terminated threads are detached and their late results are
//!   discarded by the scheduler.
//!
//! ```text
//! Scheduler (coordinator task)
//!     │
//!     ├── WorkerHandle ── ExecutionUnit::process(data, config)
//!     │                         │
//!     │                         └── child process / thread
//!     │                                   │
//!     └── EventReceiver ◄── WorkerEvent { tag, Ready | Completed | Failed | Exited }
//! ```

mod thread;

use tokio::sync::mpsc;

use crate::config::EnhanceConfig;
use crate::error::Result;

pub use thread::{ThreadSpawner, ThreadUnit};

/// Identifier of a worker slot within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub(crate) usize);

impl WorkerId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker_{}", self.0)
    }
}

/// Worker identity plus the pool generation it was spawned in.
///
/// Restarting the pool bumps the generation, so events still in flight from
/// a terminated unit can never be mistaken for events of its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerTag {
    pub id: WorkerId,
    pub generation: u64,
}

/// What a unit reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEventKind {
    /// Startup handshake finished.
    Ready,
    /// The dispatched document was transformed.
    Completed(Vec<u8>),
    /// The dispatched document could not be transformed.
    Failed(String),
    /// The unit went away without being asked to.
    Exited(String),
}

/// Event delivered from an execution unit to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    pub tag: WorkerTag,
    pub kind: WorkerEventKind,
}

pub type EventSender = mpsc::UnboundedSender<WorkerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<WorkerEvent>;

/// Create the channel units report through.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// One concurrently running transformer.
pub trait ExecutionUnit: Send {
    /// Hand one document to the unit.
    ///
    /// Returns once the payload is handed over; the outcome arrives later as
    /// a `WorkerEvent`. `Error::PayloadTooLarge` rejects only this document
    /// and leaves the unit ready; any other error means the unit can no
    /// longer accept work.
    fn process(&mut self, data: Vec<u8>, config: &EnhanceConfig) -> Result<()>;

    /// End the unit immediately, discarding in-flight work.
    fn terminate(&mut self);

    /// Let an idle unit exit cleanly.
    fn shutdown(&mut self) {
        self.terminate();
    }
}

/// Factory for execution units.
///
/// A spawned unit starts asynchronously and must send `WorkerEventKind::Ready`
/// tagged with `tag` once it accepts work.
pub trait UnitSpawner {
    type Unit: ExecutionUnit;

    fn spawn(&self, tag: WorkerTag, events: EventSender) -> Result<Self::Unit>;
}
