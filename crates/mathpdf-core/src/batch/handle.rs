//! Per-worker handle tracked by the scheduler.

use crate::config::EnhanceConfig;
use crate::error::{Error, Result};
use crate::execute::{EventSender, ExecutionUnit, UnitSpawner, WorkerId, WorkerTag};

use super::job::JobInfo;

/// Lifecycle of one execution unit as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, readiness not yet signalled.
    Starting,
    /// Ready and holding no job.
    Idle,
    /// Holding exactly one job.
    Busy(JobInfo),
    /// Ended; never dispatched to again.
    Terminated,
}

/// Scheduler-side handle for one execution unit.
pub struct WorkerHandle<U> {
    tag: WorkerTag,
    state: WorkerState,
    unit: Option<U>,
}

impl<U: ExecutionUnit> WorkerHandle<U> {
    /// Spawn a unit. A spawn failure yields an already terminated handle.
    pub fn start<S>(spawner: &S, tag: WorkerTag, events: EventSender) -> Self
    where
        S: UnitSpawner<Unit = U>,
    {
        match spawner.spawn(tag, events) {
            Ok(unit) => Self {
                tag,
                state: WorkerState::Starting,
                unit: Some(unit),
            },
            Err(e) => {
                tracing::error!("Failed to start {}: {}", tag.id, e.with_hint());
                Self {
                    tag,
                    state: WorkerState::Terminated,
                    unit: None,
                }
            }
        }
    }

    pub fn id(&self) -> WorkerId {
        self.tag.id
    }

    pub fn tag(&self) -> WorkerTag {
        self.tag
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub fn is_starting(&self) -> bool {
        self.state == WorkerState::Starting
    }

    pub fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, WorkerState::Busy(_))
    }

    /// Whether the unit can still do work now or later.
    pub fn is_live(&self) -> bool {
        self.state != WorkerState::Terminated
    }

    /// The job this worker currently owns.
    pub fn current_job(&self) -> Option<&JobInfo> {
        match &self.state {
            WorkerState::Busy(job) => Some(job),
            _ => None,
        }
    }

    /// Whether an event carrying `tag` belongs to this live handle.
    pub fn accepts(&self, tag: WorkerTag) -> bool {
        self.tag == tag && self.is_live()
    }

    /// Record the readiness signal. Returns false if it was not expected.
    pub fn mark_ready(&mut self) -> bool {
        if self.state == WorkerState::Starting {
            self.state = WorkerState::Idle;
            true
        } else {
            false
        }
    }

    /// Hand `job` to the unit. The handle owns the job until `finish`.
    pub fn dispatch(&mut self, job: &JobInfo, data: Vec<u8>, config: &EnhanceConfig) -> Result<()> {
        match &self.state {
            WorkerState::Idle => {}
            WorkerState::Busy(_) => return Err(Error::WorkerBusy(self.tag.id)),
            WorkerState::Starting | WorkerState::Terminated => {
                return Err(Error::WorkerNotReady(self.tag.id));
            }
        }
        let unit = self
            .unit
            .as_mut()
            .ok_or(Error::WorkerNotReady(self.tag.id))?;
        unit.process(data, config)?;
        self.state = WorkerState::Busy(job.clone());
        Ok(())
    }

    /// Release the job after its result arrived.
    pub fn finish(&mut self) -> Option<JobInfo> {
        match std::mem::replace(&mut self.state, WorkerState::Idle) {
            WorkerState::Busy(job) => Some(job),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Let an idle unit exit cleanly; a unit in any other state is terminated.
    pub fn shutdown(&mut self) -> Option<JobInfo> {
        if self.is_idle() {
            if let Some(mut unit) = self.unit.take() {
                unit.shutdown();
            }
        }
        self.terminate()
    }

    /// End the unit. Returns the job it was holding, if any.
    pub fn terminate(&mut self) -> Option<JobInfo> {
        if let Some(mut unit) = self.unit.take() {
            unit.terminate();
        }
        match std::mem::replace(&mut self.state, WorkerState::Terminated) {
            WorkerState::Busy(job) => Some(job),
            _ => None,
        }
    }
}

impl<U> std::fmt::Debug for WorkerHandle<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("tag", &self.tag)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
