//! In-process execution units backed by dedicated threads.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use crate::config::EnhanceConfig;
use crate::error::{Error, Result};
use crate::transform;

use super::{EventSender, ExecutionUnit, UnitSpawner, WorkerEvent, WorkerEventKind, WorkerTag};

type TransformFn =
    dyn Fn(&[u8], &EnhanceConfig) -> std::result::Result<Vec<u8>, String> + Send + Sync;

struct Request {
    data: Vec<u8>,
    config: EnhanceConfig,
}

/// Spawns `ThreadUnit`s running a shared transform function.
#[derive(Clone)]
pub struct ThreadSpawner {
    transform: Arc<TransformFn>,
}

impl ThreadSpawner {
    /// Spawner running an arbitrary transform.
    pub fn new(
        transform: impl Fn(&[u8], &EnhanceConfig) -> std::result::Result<Vec<u8>, String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            transform: Arc::new(transform),
        }
    }

    /// Spawner running the same document stage as `mathpdf-worker`.
    pub fn enhancer() -> Self {
        Self::new(|data, config| transform::enhance(data, config).map_err(|e| e.to_string()))
    }
}

impl UnitSpawner for ThreadSpawner {
    type Unit = ThreadUnit;

    fn spawn(&self, tag: WorkerTag, events: EventSender) -> Result<ThreadUnit> {
        let (requests, inbox) = mpsc::channel::<Request>();
        let apply = self.transform.clone();

        thread::Builder::new()
            .name(format!("mathpdf-{}", tag.id))
            .spawn(move || run_unit(tag, inbox, events, apply))
            .map_err(|e| Error::Spawn(format!("failed to start thread for {}: {}", tag.id, e)))?;

        Ok(ThreadUnit {
            requests: Some(requests),
        })
    }
}

fn run_unit(
    tag: WorkerTag,
    inbox: mpsc::Receiver<Request>,
    events: EventSender,
    apply: Arc<TransformFn>,
) {
    if events
        .send(WorkerEvent {
            tag,
            kind: WorkerEventKind::Ready,
        })
        .is_err()
    {
        return;
    }

    // Ends when the unit is terminated or dropped.
    for request in inbox {
        let kind = match transform::guarded(|| apply(&request.data, &request.config)) {
            Ok(data) => WorkerEventKind::Completed(data),
            Err(message) => WorkerEventKind::Failed(message),
        };
        if events.send(WorkerEvent { tag, kind }).is_err() {
            break;
        }
    }

    tracing::trace!("{} (generation {}) stopped", tag.id, tag.generation);
}

/// Execution unit running on a dedicated thread.
///
/// Threads cannot be killed: `terminate` detaches the thread, which finishes
/// its current document and exits. Its result is still sent and must be
/// discarded by the receiver.
pub struct ThreadUnit {
    requests: Option<mpsc::Sender<Request>>,
}

impl ExecutionUnit for ThreadUnit {
    fn process(&mut self, data: Vec<u8>, config: &EnhanceConfig) -> Result<()> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| Error::Ipc("worker thread has been terminated".to_string()))?;
        requests
            .send(Request {
                data,
                config: config.clone(),
            })
            .map_err(|_| Error::Ipc("worker thread has stopped".to_string()))
    }

    fn terminate(&mut self) {
        self.requests = None;
    }
}
