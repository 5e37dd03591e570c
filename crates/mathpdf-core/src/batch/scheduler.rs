//! Pull-based job scheduler.
//!
//! Every state change happens on the coordinator task: units only report
//! through the event channel, and the scheduler reacts to one event at a
//! time. A worker pulls its next job whenever it becomes idle, so jobs are
//! claimed in queue order and never handed to a busy unit.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::config::EnhanceConfig;
use crate::error::{Error, Result};
use crate::execute::{EventSender, UnitSpawner, WorkerEvent, WorkerEventKind, WorkerId, WorkerTag};

use super::context::BatchCallback;
use super::handle::WorkerHandle;
use super::job::{FailureKind, Job, JobFailure, JobId, JobInfo, JobOutcome, JobSource};
use super::progress::Progress;
use super::queue::JobQueue;
use super::state::{BatchState, CancelledBatch, CompletedBatch};

/// Owns the worker pool, the job queue, and the active batch.
pub struct Scheduler<S: UnitSpawner> {
    spawner: S,
    pool_size: usize,
    events: EventSender,
    generation: u64,
    workers: Vec<WorkerHandle<S::Unit>>,
    queue: JobQueue,
    batch: Option<BatchState>,
    finished: Option<CompletedBatch>,
    callback: Option<Box<dyn BatchCallback>>,
    engine_online: bool,
}

impl<S: UnitSpawner> Scheduler<S> {
    /// Create a scheduler and start a pool of `pool_size` units.
    pub fn new(spawner: S, pool_size: usize, events: EventSender) -> Self {
        let mut scheduler = Self {
            spawner,
            pool_size: pool_size.max(1),
            events,
            generation: 0,
            workers: Vec::new(),
            queue: JobQueue::new(),
            batch: None,
            finished: None,
            callback: None,
            engine_online: false,
        };
        scheduler.spawn_pool();
        scheduler
    }

    fn spawn_pool(&mut self) {
        self.engine_online = false;
        let generation = self.generation;
        self.workers = (0..self.pool_size)
            .map(|i| {
                let tag = WorkerTag {
                    id: WorkerId::new(i),
                    generation,
                };
                WorkerHandle::start(&self.spawner, tag, self.events.clone())
            })
            .collect();
        debug!(
            "Starting {} workers (generation {})",
            self.pool_size, generation
        );
    }

    /// Terminate every unit and start a fresh pool under a new generation.
    pub fn restart_pool(&mut self) -> Result<()> {
        if self.batch.is_some() {
            return Err(Error::BatchActive);
        }
        for worker in &mut self.workers {
            worker.terminate();
        }
        self.generation += 1;
        self.spawn_pool();
        Ok(())
    }

    pub fn set_callback(&mut self, callback: impl BatchCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn enqueue(&mut self, name: impl Into<String>, data: Vec<u8>) -> JobId {
        self.queue.enqueue(name, JobSource::Bytes(data))
    }

    pub fn enqueue_file(&mut self, path: impl Into<PathBuf>) -> JobId {
        self.queue.enqueue_file(path)
    }

    /// Remove a queued job. Rejected while a batch is active.
    pub fn remove_at(&mut self, position: usize) -> Result<Job> {
        self.queue.remove_at(position)
    }

    pub fn workers(&self) -> &[WorkerHandle<S::Unit>] {
        &self.workers
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.batch.is_some()
    }

    /// Progress of the active batch.
    pub fn progress(&self) -> Option<Progress> {
        self.batch.as_ref().map(BatchState::progress)
    }

    /// Whether any unit has yet to signal readiness.
    pub fn has_starting_workers(&self) -> bool {
        self.workers.iter().any(WorkerHandle::is_starting)
    }

    /// The batch that completed most recently, if not yet taken.
    pub fn take_finished(&mut self) -> Option<CompletedBatch> {
        self.finished.take()
    }

    /// Freeze the queued jobs into a batch and dispatch to every idle unit.
    ///
    /// Units still starting pick up work when their readiness arrives.
    pub fn start_batch(&mut self, config: EnhanceConfig) -> Result<usize> {
        if self.batch.is_some() {
            return Err(Error::BatchActive);
        }
        let config = config.validate()?;
        if !self.workers.iter().any(WorkerHandle::is_live) {
            return Err(Error::NoWorkers);
        }
        let total = self.queue.begin_batch()?;

        self.finished = None;
        self.batch = Some(BatchState::new(total, config));
        info!("Starting batch with {} files", total);
        if let Some(callback) = &self.callback {
            callback.on_batch_started(total);
        }

        for idx in 0..self.workers.len() {
            if self.workers[idx].is_idle() {
                self.pull(idx);
            }
        }
        Ok(total)
    }

    /// Route one event from the channel.
    pub fn handle_event(&mut self, event: WorkerEvent) {
        let WorkerEvent { tag, kind } = event;
        match kind {
            WorkerEventKind::Ready => self.on_worker_ready(tag),
            WorkerEventKind::Completed(data) => {
                self.on_worker_result(tag, JobOutcome::Succeeded(data))
            }
            WorkerEventKind::Failed(message) => {
                self.on_worker_result(tag, JobOutcome::Failed(message))
            }
            WorkerEventKind::Exited(reason) => self.on_worker_exited(tag, reason),
        }
    }

    fn accepting(&self, tag: WorkerTag) -> Option<usize> {
        let idx = tag.id.as_usize();
        match self.workers.get(idx) {
            Some(worker) if worker.accepts(tag) => Some(idx),
            _ => {
                debug!(
                    "Ignoring event from {} (generation {})",
                    tag.id, tag.generation
                );
                None
            }
        }
    }

    /// A unit finished starting.
    pub fn on_worker_ready(&mut self, tag: WorkerTag) {
        let Some(idx) = self.accepting(tag) else {
            return;
        };
        if !self.workers[idx].mark_ready() {
            debug!("{} signalled readiness twice", tag.id);
            return;
        }
        if !self.engine_online {
            self.engine_online = true;
            info!("Engine online ({} workers)", self.workers.len());
            if let Some(callback) = &self.callback {
                callback.on_engine_online(self.workers.len());
            }
        }
        self.pull(idx);
    }

    /// A unit reported the outcome of its job.
    pub fn on_worker_result(&mut self, tag: WorkerTag, outcome: JobOutcome) {
        let Some(idx) = self.accepting(tag) else {
            return;
        };
        let Some(job) = self.workers[idx].finish() else {
            warn!("{} reported a result without holding a job", tag.id);
            return;
        };
        match outcome {
            JobOutcome::Succeeded(data) => self.record_success(&job, data),
            JobOutcome::Failed(message) => {
                self.record_failure(JobFailure::new(&job, FailureKind::Execution, message))
            }
        }
        self.pull(idx);
    }

    fn on_worker_exited(&mut self, tag: WorkerTag, reason: String) {
        let Some(idx) = self.accepting(tag) else {
            return;
        };
        warn!("{} exited unexpectedly: {}", tag.id, reason);
        if let Some(job) = self.workers[idx].terminate() {
            self.record_failure(JobFailure::new(
                &job,
                FailureKind::WorkerLost,
                format!("worker exited: {}", reason),
            ));
        }
        self.fail_stranded_jobs();
    }

    /// Terminate units that never signalled readiness.
    pub fn expire_starting_workers(&mut self) -> usize {
        let mut expired = 0;
        for worker in &mut self.workers {
            if worker.is_starting() {
                warn!("{} did not become ready in time", worker.id());
                worker.terminate();
                expired += 1;
            }
        }
        if expired > 0 {
            self.fail_stranded_jobs();
        }
        expired
    }

    /// Let idle units exit cleanly and terminate the rest.
    ///
    /// Rejected while a batch is active. Restart the pool before the next batch.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.batch.is_some() {
            return Err(Error::BatchActive);
        }
        let live = self.workers.iter().filter(|w| w.is_live()).count();
        for worker in &mut self.workers {
            worker.shutdown();
        }
        debug!("Shut down {} workers", live);
        Ok(())
    }

    /// Abandon the active batch.
    ///
    /// Every unit is terminated and the queue is emptied. Results already
    /// collected are discarded; events still in flight are ignored because
    /// their handles are terminated. Restart the pool before the next batch.
    pub fn cancel(&mut self) -> Result<CancelledBatch> {
        let batch = self.batch.take().ok_or(Error::NoActiveBatch)?;
        for worker in &mut self.workers {
            worker.terminate();
        }
        self.queue.clear();

        let progress = batch.progress();
        warn!("Batch processing cancelled ({})", progress);
        if let Some(callback) = &self.callback {
            callback.on_batch_cancelled(progress);
        }
        Ok(batch.into_cancelled())
    }

    /// Claim and dispatch jobs to worker `idx` until one is in flight.
    fn pull(&mut self, idx: usize) {
        loop {
            if self.batch.is_none() || !self.workers[idx].is_idle() {
                return;
            }
            let Some(job) = self.queue.claim_next() else {
                return;
            };
            let (job, source) = job.into_parts();

            let data = match source.load() {
                Ok(data) => data,
                Err(e) => {
                    self.record_failure(JobFailure::new(
                        &job,
                        FailureKind::InputRead,
                        format!("failed to read input: {}", e),
                    ));
                    continue;
                }
            };

            let dispatched = match &self.batch {
                Some(batch) => self.workers[idx].dispatch(&job, data, batch.config()),
                None => return,
            };
            let worker_id = self.workers[idx].id();
            match dispatched {
                Ok(()) => {
                    debug!("Dispatched {} ({}) to {}", job.name, job.id, worker_id);
                    if let Some(callback) = &self.callback {
                        callback.on_job_dispatched(worker_id, &job);
                    }
                    return;
                }
                Err(e @ Error::PayloadTooLarge { .. }) => {
                    // The unit refused this document only and is still idle.
                    self.record_failure(JobFailure::new(
                        &job,
                        FailureKind::Rejected,
                        e.to_string(),
                    ));
                }
                Err(e) => {
                    warn!("Failed to dispatch {} to {}: {}", job.name, worker_id, e);
                    self.workers[idx].terminate();
                    self.record_failure(JobFailure::new(
                        &job,
                        FailureKind::WorkerLost,
                        format!("worker stopped accepting work: {}", e),
                    ));
                    self.fail_stranded_jobs();
                    return;
                }
            }
        }
    }

    /// Fail the batch's unclaimed jobs once no unit is left to run them.
    fn fail_stranded_jobs(&mut self) {
        if self.batch.is_none() || self.workers.iter().any(WorkerHandle::is_live) {
            return;
        }
        let stranded = self.queue.drain_batch();
        if stranded.is_empty() {
            return;
        }
        error!(
            "No workers left; failing {} remaining files",
            stranded.len()
        );
        for job in stranded {
            let (job, _) = job.into_parts();
            self.record_failure(JobFailure::new(
                &job,
                FailureKind::Unavailable,
                "no worker available",
            ));
        }
    }

    fn record_success(&mut self, job: &JobInfo, data: Vec<u8>) {
        let Some(batch) = self.batch.as_mut() else {
            return;
        };
        if !batch.record_success(job, data) {
            return;
        }
        let progress = batch.progress();
        debug!("{} finished ({})", job.name, progress);
        if let Some(callback) = &self.callback {
            callback.on_job_completed(job, progress);
        }
        self.finish_if_complete();
    }

    fn record_failure(&mut self, failure: JobFailure) {
        let Some(batch) = self.batch.as_mut() else {
            return;
        };
        if !batch.record_failure(failure.clone()) {
            return;
        }
        let progress = batch.progress();
        warn!("{}", failure);
        if let Some(callback) = &self.callback {
            callback.on_job_failed(&failure, progress);
        }
        self.finish_if_complete();
    }

    fn finish_if_complete(&mut self) {
        if !self.batch.as_ref().is_some_and(BatchState::is_complete) {
            return;
        }
        if let Some(batch) = self.batch.take() {
            self.queue.end_batch();
            let done = batch.into_completed();
            info!(
                "Batch processing complete: {} succeeded, {} failed",
                done.succeeded(),
                done.failures.len()
            );
            self.finished = Some(done);
        }
    }
}

impl<S: UnitSpawner> Drop for Scheduler<S> {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            worker.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::execute::{ExecutionUnit, event_channel};

    type DispatchLog = Arc<Mutex<Vec<(WorkerId, Vec<u8>)>>>;

    #[derive(Clone, Default)]
    struct MockSpawner {
        dispatched: DispatchLog,
        terminated: Arc<Mutex<Vec<WorkerTag>>>,
        shut_down: Arc<Mutex<Vec<WorkerTag>>>,
        broken: HashSet<usize>,
        max_payload: Option<usize>,
        fail_spawn: bool,
    }

    struct MockUnit {
        tag: WorkerTag,
        dispatched: DispatchLog,
        terminated: Arc<Mutex<Vec<WorkerTag>>>,
        shut_down: Arc<Mutex<Vec<WorkerTag>>>,
        broken: bool,
        max_payload: Option<usize>,
    }

    impl ExecutionUnit for MockUnit {
        fn process(&mut self, data: Vec<u8>, _config: &EnhanceConfig) -> Result<()> {
            if self.broken {
                return Err(Error::Ipc("pipe closed".to_string()));
            }
            if let Some(max) = self.max_payload.filter(|max| data.len() > *max) {
                return Err(Error::PayloadTooLarge {
                    len: data.len(),
                    max,
                });
            }
            self.dispatched.lock().unwrap().push((self.tag.id, data));
            Ok(())
        }

        fn terminate(&mut self) {
            self.terminated.lock().unwrap().push(self.tag);
        }

        fn shutdown(&mut self) {
            self.shut_down.lock().unwrap().push(self.tag);
        }
    }

    impl UnitSpawner for MockSpawner {
        type Unit = MockUnit;

        fn spawn(&self, tag: WorkerTag, _events: EventSender) -> Result<MockUnit> {
            if self.fail_spawn {
                return Err(Error::Spawn("mock".to_string()));
            }
            Ok(MockUnit {
                tag,
                dispatched: self.dispatched.clone(),
                terminated: self.terminated.clone(),
                shut_down: self.shut_down.clone(),
                broken: self.broken.contains(&tag.id.as_usize()),
                max_payload: self.max_payload,
            })
        }
    }

    #[derive(Clone, Default)]
    struct RecordingCallback {
        progress: Arc<Mutex<Vec<Progress>>>,
        failures: Arc<Mutex<Vec<JobFailure>>>,
        started: Arc<Mutex<Option<usize>>>,
        online: Arc<Mutex<Vec<usize>>>,
    }

    impl BatchCallback for RecordingCallback {
        fn on_engine_online(&self, workers: usize) {
            self.online.lock().unwrap().push(workers);
        }

        fn on_batch_started(&self, total: usize) {
            *self.started.lock().unwrap() = Some(total);
        }

        fn on_job_completed(&self, _job: &JobInfo, progress: Progress) {
            self.progress.lock().unwrap().push(progress);
        }

        fn on_job_failed(&self, failure: &JobFailure, progress: Progress) {
            self.failures.lock().unwrap().push(failure.clone());
            self.progress.lock().unwrap().push(progress);
        }
    }

    fn scheduler(spawner: MockSpawner, workers: usize) -> Scheduler<MockSpawner> {
        let (events, _rx) = event_channel();
        Scheduler::new(spawner, workers, events)
    }

    fn tag(id: usize, generation: u64) -> WorkerTag {
        WorkerTag {
            id: WorkerId::new(id),
            generation,
        }
    }

    fn event(id: usize, generation: u64, kind: WorkerEventKind) -> WorkerEvent {
        WorkerEvent {
            tag: tag(id, generation),
            kind,
        }
    }

    fn dispatched(spawner: &MockSpawner) -> Vec<(usize, Vec<u8>)> {
        spawner
            .dispatched
            .lock()
            .unwrap()
            .iter()
            .map(|(id, data)| (id.as_usize(), data.clone()))
            .collect()
    }

    fn complete(id: usize, data: &[u8]) -> WorkerEvent {
        event(id, 0, WorkerEventKind::Completed(data.to_vec()))
    }

    // ===== Dispatch order =====

    #[test]
    fn test_single_worker_claims_in_fifo_order() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 1);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.enqueue("b.pdf", b"B".to_vec());
        sched.enqueue("c.pdf", b"C".to_vec());

        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        assert_eq!(sched.start_batch(EnhanceConfig::default()).unwrap(), 3);
        assert_eq!(dispatched(&spawner), vec![(0, b"A".to_vec())]);

        sched.handle_event(complete(0, b"a"));
        sched.handle_event(complete(0, b"b"));
        assert_eq!(
            dispatched(&spawner),
            vec![(0, b"A".to_vec()), (0, b"B".to_vec()), (0, b"C".to_vec())]
        );

        sched.handle_event(complete(0, b"c"));
        let done = sched.take_finished().unwrap();
        let names: Vec<_> = done.results.iter().map(|r| r.output.name.clone()).collect();
        assert_eq!(names, vec!["enhanced_a.pdf", "enhanced_b.pdf", "enhanced_c.pdf"]);
        assert!(!sched.is_active());
        assert!(!sched.queue().is_locked());
    }

    #[test]
    fn test_batch_started_before_ready_waits_for_readiness() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 2);
        sched.enqueue("a.pdf", b"A".to_vec());

        sched.start_batch(EnhanceConfig::default()).unwrap();
        assert!(dispatched(&spawner).is_empty());

        sched.handle_event(event(1, 0, WorkerEventKind::Ready));
        assert_eq!(dispatched(&spawner), vec![(1, b"A".to_vec())]);

        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        assert_eq!(dispatched(&spawner).len(), 1);
    }

    #[test]
    fn test_busy_worker_is_never_redispatched() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 1);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.enqueue("b.pdf", b"B".to_vec());

        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();
        // A repeated readiness signal must not pull a second job.
        sched.handle_event(event(0, 0, WorkerEventKind::Ready));

        assert_eq!(dispatched(&spawner).len(), 1);
        assert_eq!(
            sched.workers()[0].current_job().map(|j| j.name.as_str()),
            Some("a.pdf")
        );
    }

    #[test]
    fn test_three_jobs_two_workers_report_monotonic_progress() {
        let spawner = MockSpawner::default();
        let callback = RecordingCallback::default();
        let mut sched = scheduler(spawner.clone(), 2);
        sched.set_callback(callback.clone());
        for name in ["x.pdf", "y.pdf", "z.pdf"] {
            sched.enqueue(name, name.as_bytes().to_vec());
        }

        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.handle_event(event(1, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();
        assert_eq!(dispatched(&spawner).len(), 2);

        sched.handle_event(complete(1, b"y"));
        sched.handle_event(complete(0, b"x"));
        sched.handle_event(complete(1, b"z"));

        let completed: Vec<_> = callback
            .progress
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.completed)
            .collect();
        assert_eq!(completed, vec![1, 2, 3]);
        assert_eq!(*callback.started.lock().unwrap(), Some(3));
        assert_eq!(*callback.online.lock().unwrap(), vec![2]);

        let done = sched.take_finished().unwrap();
        assert_eq!(done.total, 3);
        assert_eq!(done.succeeded(), 3);
        assert!(done.failures.is_empty());
    }

    // ===== Failures =====

    #[test]
    fn test_job_error_counts_toward_progress() {
        let spawner = MockSpawner::default();
        let callback = RecordingCallback::default();
        let mut sched = scheduler(spawner.clone(), 1);
        sched.set_callback(callback.clone());
        sched.enqueue("good.pdf", b"G".to_vec());
        sched.enqueue("bad.pdf", b"B".to_vec());

        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();
        sched.handle_event(complete(0, b"g"));
        sched.handle_event(event(0, 0, WorkerEventKind::Failed("parse error".to_string())));

        let done = sched.take_finished().unwrap();
        assert_eq!(done.succeeded(), 1);
        assert_eq!(done.failures.len(), 1);
        assert_eq!(done.failures[0].kind, FailureKind::Execution);
        assert_eq!(
            done.failures[0].to_string(),
            "Error processing bad.pdf: parse error"
        );
        assert_eq!(callback.failures.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unreadable_input_fails_without_occupying_worker() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 1);
        sched.enqueue_file("/nonexistent/missing.pdf");
        sched.enqueue("ok.pdf", b"OK".to_vec());

        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();
        assert_eq!(dispatched(&spawner), vec![(0, b"OK".to_vec())]);
        assert_eq!(sched.progress(), Some(Progress::new(1, 2)));

        sched.handle_event(complete(0, b"ok"));
        let done = sched.take_finished().unwrap();
        assert_eq!(done.failures[0].kind, FailureKind::InputRead);
        assert_eq!(done.failures[0].name, "missing.pdf");
    }

    #[test]
    fn test_worker_exit_fails_held_job_and_others_continue() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 2);
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            sched.enqueue(name, name.as_bytes().to_vec());
        }
        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.handle_event(event(1, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();

        sched.handle_event(event(0, 0, WorkerEventKind::Exited("crashed".to_string())));
        assert!(!sched.workers()[0].is_live());
        // Late events from the dead unit are ignored.
        sched.handle_event(complete(0, b"late"));
        assert_eq!(sched.progress(), Some(Progress::new(1, 3)));

        sched.handle_event(complete(1, b"b"));
        sched.handle_event(complete(1, b"c"));

        let done = sched.take_finished().unwrap();
        assert_eq!(done.succeeded(), 2);
        assert_eq!(done.failures[0].kind, FailureKind::WorkerLost);
        assert_eq!(done.failures[0].name, "a.pdf");
    }

    #[test]
    fn test_startup_timeout_fails_stranded_jobs() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 2);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.enqueue("b.pdf", b"B".to_vec());
        sched.start_batch(EnhanceConfig::default()).unwrap();

        assert_eq!(sched.expire_starting_workers(), 2);
        let done = sched.take_finished().unwrap();
        assert_eq!(done.succeeded(), 0);
        assert!(
            done.failures
                .iter()
                .all(|f| f.kind == FailureKind::Unavailable)
        );
        assert_eq!(done.failures.len(), 2);
    }

    #[test]
    fn test_dispatch_failure_terminates_unit() {
        let spawner = MockSpawner {
            broken: HashSet::from([0]),
            ..Default::default()
        };
        let mut sched = scheduler(spawner.clone(), 2);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.enqueue("b.pdf", b"B".to_vec());

        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();
        assert!(!sched.workers()[0].is_live());
        assert_eq!(sched.progress(), Some(Progress::new(1, 2)));

        sched.handle_event(event(1, 0, WorkerEventKind::Ready));
        assert_eq!(dispatched(&spawner), vec![(1, b"B".to_vec())]);

        sched.handle_event(complete(1, b"b"));
        let done = sched.take_finished().unwrap();
        assert_eq!(done.failures[0].name, "a.pdf");
        assert_eq!(done.failures[0].kind, FailureKind::WorkerLost);
    }

    #[test]
    fn test_oversized_document_fails_alone_and_worker_stays() {
        let spawner = MockSpawner {
            max_payload: Some(4),
            ..Default::default()
        };
        let mut sched = scheduler(spawner.clone(), 1);
        sched.enqueue("huge.pdf", b"HUGE DOCUMENT".to_vec());
        sched.enqueue("small.pdf", b"S".to_vec());

        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();

        assert_eq!(dispatched(&spawner), vec![(0, b"S".to_vec())]);
        assert!(sched.workers()[0].is_busy());
        assert!(spawner.terminated.lock().unwrap().is_empty());
        assert_eq!(sched.progress(), Some(Progress::new(1, 2)));

        sched.handle_event(complete(0, b"s"));
        let done = sched.take_finished().unwrap();
        assert_eq!(done.succeeded(), 1);
        assert_eq!(done.failures.len(), 1);
        assert_eq!(done.failures[0].name, "huge.pdf");
        assert_eq!(done.failures[0].kind, FailureKind::Rejected);
        assert!(sched.workers()[0].is_idle());
    }

    // ===== Preconditions =====

    #[test]
    fn test_start_batch_preconditions() {
        let mut sched = scheduler(MockSpawner::default(), 1);
        assert!(matches!(
            sched.start_batch(EnhanceConfig::default()),
            Err(Error::EmptyQueue)
        ));

        sched.enqueue("a.pdf", b"A".to_vec());
        let invalid = EnhanceConfig {
            margin_pt: 0,
            ..Default::default()
        };
        assert!(matches!(
            sched.start_batch(invalid),
            Err(Error::InvalidConfig(_))
        ));
        assert!(!sched.queue().is_locked());

        sched.start_batch(EnhanceConfig::default()).unwrap();
        assert!(matches!(
            sched.start_batch(EnhanceConfig::default()),
            Err(Error::BatchActive)
        ));
    }

    #[test]
    fn test_spawn_failure_means_no_workers() {
        let spawner = MockSpawner {
            fail_spawn: true,
            ..Default::default()
        };
        let mut sched = scheduler(spawner, 2);
        sched.enqueue("a.pdf", b"A".to_vec());
        assert!(matches!(
            sched.start_batch(EnhanceConfig::default()),
            Err(Error::NoWorkers)
        ));
    }

    #[test]
    fn test_remove_at_rejected_during_batch() {
        let mut sched = scheduler(MockSpawner::default(), 1);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.enqueue("b.pdf", b"B".to_vec());
        sched.start_batch(EnhanceConfig::default()).unwrap();

        assert!(matches!(sched.remove_at(1), Err(Error::BatchActive)));
        assert_eq!(sched.queue().len(), 2);
    }

    // ===== Cancellation =====

    #[test]
    fn test_cancel_discards_results_and_ignores_late_events() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 2);
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            sched.enqueue(name, name.as_bytes().to_vec());
        }
        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.handle_event(event(1, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();
        sched.handle_event(complete(0, b"a"));

        let cancelled = sched.cancel().unwrap();
        assert_eq!(
            cancelled,
            CancelledBatch {
                total: 3,
                completed: 1,
                discarded: 1
            }
        );
        assert_eq!(spawner.terminated.lock().unwrap().len(), 2);

        sched.handle_event(complete(1, b"b"));
        assert!(sched.take_finished().is_none());
        assert!(sched.progress().is_none());
        assert!(sched.queue().is_empty());
        assert!(matches!(sched.cancel(), Err(Error::NoActiveBatch)));
    }

    #[test]
    fn test_restart_pool_rejects_previous_generation() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 1);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.start_batch(EnhanceConfig::default()).unwrap();
        sched.cancel().unwrap();

        sched.restart_pool().unwrap();
        assert_eq!(sched.generation(), 1);

        sched.enqueue("b.pdf", b"B".to_vec());
        sched.start_batch(EnhanceConfig::default()).unwrap();
        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        assert!(dispatched(&spawner).is_empty());

        sched.handle_event(event(0, 1, WorkerEventKind::Ready));
        assert_eq!(dispatched(&spawner), vec![(0, b"B".to_vec())]);
    }

    #[test]
    fn test_shutdown_stops_idle_units_gracefully() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 2);
        sched.handle_event(event(0, 0, WorkerEventKind::Ready));

        sched.shutdown().unwrap();
        assert_eq!(*spawner.shut_down.lock().unwrap(), vec![tag(0, 0)]);
        assert_eq!(*spawner.terminated.lock().unwrap(), vec![tag(1, 0)]);
        assert!(sched.workers().iter().all(|w| !w.is_live()));

        sched.enqueue("a.pdf", b"A".to_vec());
        assert!(matches!(
            sched.start_batch(EnhanceConfig::default()),
            Err(Error::NoWorkers)
        ));
    }

    #[test]
    fn test_shutdown_rejected_during_batch() {
        let mut sched = scheduler(MockSpawner::default(), 1);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.start_batch(EnhanceConfig::default()).unwrap();
        assert!(matches!(sched.shutdown(), Err(Error::BatchActive)));
        assert!(sched.workers()[0].is_live());
    }

    #[test]
    fn test_restart_pool_rejected_during_batch() {
        let mut sched = scheduler(MockSpawner::default(), 1);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.start_batch(EnhanceConfig::default()).unwrap();
        assert!(matches!(sched.restart_pool(), Err(Error::BatchActive)));
    }

    #[test]
    fn test_jobs_enqueued_mid_batch_run_in_next_batch() {
        let spawner = MockSpawner::default();
        let mut sched = scheduler(spawner.clone(), 1);
        sched.enqueue("a.pdf", b"A".to_vec());
        sched.handle_event(event(0, 0, WorkerEventKind::Ready));
        sched.start_batch(EnhanceConfig::default()).unwrap();
        sched.enqueue("late.pdf", b"L".to_vec());

        sched.handle_event(complete(0, b"a"));
        let done = sched.take_finished().unwrap();
        assert_eq!(done.total, 1);
        assert_eq!(dispatched(&spawner).len(), 1);

        assert_eq!(sched.start_batch(EnhanceConfig::default()).unwrap(), 1);
        assert_eq!(dispatched(&spawner).last().unwrap().1, b"L".to_vec());
    }
}
