//! Worker process management for mathpdf batches.
//!
//! Provides `ProcessSpawner` for launching `mathpdf-worker` child processes
//! and `ProcessUnit` for feeding them documents. Each worker gets a writer
//! thread feeding its stdin and a reader thread forwarding its responses to
//! the coordinator's event channel, so the coordinator never blocks on a pipe.

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::config::EnhanceConfig;
use crate::error::{Error, Result};
use crate::execute::{EventSender, ExecutionUnit, UnitSpawner, WorkerEvent, WorkerEventKind, WorkerTag};

use super::protocol::{MAX_MESSAGE_LEN, WorkerCommand, WorkerResponse, read_message, write_message};

/// Environment variable overriding the worker binary location.
pub const WORKER_PATH_ENV: &str = "MATHPDF_WORKER_PATH";

fn worker_binary_name() -> &'static str {
    if cfg!(windows) {
        "mathpdf-worker.exe"
    } else {
        "mathpdf-worker"
    }
}

/// Find the mathpdf-worker binary path.
///
/// Looks in the following order:
/// 1. `MATHPDF_WORKER_PATH` environment variable
/// 2. Same directory as the current executable
/// 3. System PATH
/// 4. `target/debug` or `target/release` of the workspace (development)
pub fn find_worker_binary() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(WORKER_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            "{} points to missing file {}",
            WORKER_PATH_ENV,
            path.display()
        );
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let worker_path = exe_dir.join(worker_binary_name());
        if worker_path.exists() {
            return Ok(worker_path);
        }
    }

    if let Ok(path) = which::which(worker_binary_name()) {
        return Ok(path);
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        for profile in ["debug", "release"] {
            let path = PathBuf::from(&manifest_dir)
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(worker_binary_name());
            if path.exists() {
                return Ok(path.canonicalize().unwrap_or(path));
            }
        }
    }

    Err(Error::Spawn(format!(
        "could not find {}. Set {} or ensure it's in PATH.",
        worker_binary_name(),
        WORKER_PATH_ENV
    )))
}

/// Spawns `mathpdf-worker` child processes.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    worker_path: PathBuf,
    max_payload: usize,
}

impl ProcessSpawner {
    /// Spawner for an explicit worker binary.
    pub fn new(worker_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_path: worker_path.into(),
            max_payload: MAX_MESSAGE_LEN,
        }
    }

    /// Refuse documents larger than `bytes`. Capped at the IPC message limit.
    pub fn with_max_payload(mut self, bytes: usize) -> Self {
        self.max_payload = bytes.min(MAX_MESSAGE_LEN);
        self
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Spawner for the worker binary found by [`find_worker_binary`].
    pub fn locate() -> Result<Self> {
        find_worker_binary().map(Self::new)
    }

    pub fn worker_path(&self) -> &Path {
        &self.worker_path
    }
}

impl UnitSpawner for ProcessSpawner {
    type Unit = ProcessUnit;

    fn spawn(&self, tag: WorkerTag, events: EventSender) -> Result<ProcessUnit> {
        let mut child = Command::new(&self.worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let worker logs pass through
            .spawn()
            .map_err(|e| {
                Error::Spawn(format!(
                    "failed to spawn worker process '{}': {}",
                    self.worker_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;

        let (commands, inbox) = mpsc::channel();
        let mut unit = ProcessUnit {
            child,
            commands: Some(commands),
            writer: None,
            max_payload: self.max_payload,
            stopped: false,
        };

        let writer_events = events.clone();
        let writer = thread::Builder::new()
            .name(format!("mathpdf-{}-writer", tag.id))
            .spawn(move || forward_commands(tag, BufWriter::new(stdin), inbox, writer_events));
        match writer {
            Ok(handle) => unit.writer = Some(handle),
            Err(e) => {
                unit.terminate();
                return Err(Error::Spawn(format!(
                    "failed to start writer thread for {}: {}",
                    tag.id, e
                )));
            }
        }

        let reader = thread::Builder::new()
            .name(format!("mathpdf-{}-reader", tag.id))
            .spawn(move || forward_responses(tag, BufReader::new(stdout), events));
        if let Err(e) = reader {
            unit.terminate();
            return Err(Error::Spawn(format!(
                "failed to start reader thread for {}: {}",
                tag.id, e
            )));
        }

        tracing::debug!("Spawned {} as pid {}", tag.id, unit.pid());
        Ok(unit)
    }
}

/// Write queued commands until the unit hangs up or the pipe breaks.
///
/// Dropping stdin on exit makes the worker see end of input and quit.
fn forward_commands(
    tag: WorkerTag,
    mut stdin: BufWriter<ChildStdin>,
    inbox: mpsc::Receiver<WorkerCommand>,
    events: EventSender,
) {
    for command in inbox {
        match write_message(&mut stdin, &command) {
            Ok(()) => {}
            Err(e @ Error::PayloadTooLarge { .. }) => {
                // Nothing reached the pipe; only this document fails.
                let event = WorkerEvent {
                    tag,
                    kind: WorkerEventKind::Failed(e.to_string()),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("{} stopped accepting commands: {}", tag.id, e);
                break;
            }
        }
    }
}

/// Read responses until the worker's stdout closes.
fn forward_responses(tag: WorkerTag, mut stdout: BufReader<ChildStdout>, events: EventSender) {
    loop {
        let kind = match read_message::<_, WorkerResponse>(&mut stdout) {
            Ok(WorkerResponse::Ready) => WorkerEventKind::Ready,
            Ok(WorkerResponse::Complete { data }) => WorkerEventKind::Completed(data),
            Ok(WorkerResponse::Error { message }) => WorkerEventKind::Failed(message),
            Ok(WorkerResponse::ShuttingDown) => break,
            Err(e) => {
                let _ = events.send(WorkerEvent {
                    tag,
                    kind: WorkerEventKind::Exited(e.to_string()),
                });
                break;
            }
        };

        if events.send(WorkerEvent { tag, kind }).is_err() {
            break;
        }
    }
}

/// Execution unit backed by a `mathpdf-worker` child process.
///
/// Killing the process is the cancellation mechanism: the worker is stopped
/// mid-document without any cooperation from the transform.
pub struct ProcessUnit {
    child: Child,
    /// Commands for the writer thread; `None` once the unit is stopped.
    commands: Option<mpsc::Sender<WorkerCommand>>,
    writer: Option<JoinHandle<()>>,
    max_payload: usize,
    stopped: bool,
}

impl ProcessUnit {
    /// Get the process ID of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl ExecutionUnit for ProcessUnit {
    fn process(&mut self, data: Vec<u8>, config: &EnhanceConfig) -> Result<()> {
        if data.len() > self.max_payload {
            return Err(Error::PayloadTooLarge {
                len: data.len(),
                max: self.max_payload,
            });
        }
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| Error::Ipc("Worker has been stopped".to_string()))?;
        commands
            .send(WorkerCommand::Process {
                data,
                config: config.clone(),
            })
            .map_err(|_| Error::Ipc("Worker stdin is closed".to_string()))
    }

    /// Ask the worker to exit and wait for it.
    fn shutdown(&mut self) {
        let Some(commands) = self.commands.take() else {
            return;
        };
        let _ = commands.send(WorkerCommand::Shutdown);
        drop(commands);
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }

        match self.child.wait() {
            Ok(status) if status.success() => {
                tracing::debug!("Worker {} shut down", self.child.id());
            }
            Ok(status) => {
                tracing::warn!("Worker {} exited with status: {}", self.child.id(), status);
            }
            Err(e) => tracing::warn!("Failed to wait for worker {}: {}", self.child.id(), e),
        }
        self.stopped = true;
    }

    fn terminate(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        // The writer thread ends on its own once the pipe breaks.
        self.commands = None;
        self.writer = None;

        if let Err(e) = self.child.kill() {
            // InvalidInput means the process already exited
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!("Failed to kill worker {}: {}", self.pid(), e);
            }
        }

        // Wait to reap zombie
        let _ = self.child.wait();
    }
}

impl Drop for ProcessUnit {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::{WorkerId, event_channel};

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let (events, _rx) = event_channel();
        let spawner = ProcessSpawner::new("/nonexistent/mathpdf-worker");
        let tag = WorkerTag {
            id: WorkerId::new(0),
            generation: 0,
        };

        let result = spawner.spawn(tag, events);
        assert!(matches!(result, Err(Error::Spawn(_))));
    }

    #[test]
    fn test_spawner_keeps_explicit_path() {
        let spawner = ProcessSpawner::new("/opt/mathpdf/mathpdf-worker");
        assert_eq!(spawner.worker_path(), Path::new("/opt/mathpdf/mathpdf-worker"));
        assert_eq!(spawner.max_payload(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_max_payload_capped_at_message_limit() {
        let spawner = ProcessSpawner::new("mathpdf-worker").with_max_payload(usize::MAX);
        assert_eq!(spawner.max_payload(), MAX_MESSAGE_LEN);

        let spawner = ProcessSpawner::new("mathpdf-worker").with_max_payload(1024);
        assert_eq!(spawner.max_payload(), 1024);
    }
}
