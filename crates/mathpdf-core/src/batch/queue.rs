//! FIFO job queue with batch-scoped claiming.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::error::{Error, Result};

use super::job::{Job, JobId, JobInfo, JobSource};

/// Ordered queue of pending jobs.
///
/// While a batch is active the queue is locked: positions cannot be removed
/// and only the jobs present when the batch began can be claimed. Jobs
/// enqueued mid-batch wait for the next one.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
    next_id: u64,
    /// Unclaimed jobs left in the active batch; `None` when idle.
    batch_remaining: Option<usize>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job; allowed at any time.
    pub fn enqueue(&mut self, name: impl Into<String>, source: JobSource) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        self.jobs.push_back(Job {
            info: JobInfo {
                id,
                name: name.into(),
            },
            source,
        });
        id
    }

    /// Append a file, named after its final path component.
    pub fn enqueue_file(&mut self, path: impl Into<PathBuf>) -> JobId {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.enqueue(name, JobSource::File(path))
    }

    /// Remove the job at `position`.
    ///
    /// Rejected while a batch is active, leaving the queue untouched.
    pub fn remove_at(&mut self, position: usize) -> Result<Job> {
        if self.is_locked() {
            return Err(Error::BatchActive);
        }
        let len = self.jobs.len();
        self.jobs
            .remove(position)
            .ok_or(Error::PositionOutOfRange { position, len })
    }

    /// Claim the next job of the active batch in insertion order.
    pub fn claim_next(&mut self) -> Option<Job> {
        let remaining = self.batch_remaining.as_mut()?;
        if *remaining == 0 {
            return None;
        }
        let job = self.jobs.pop_front()?;
        *remaining -= 1;
        Some(job)
    }

    /// Lock the queue and freeze the batch to the jobs currently queued.
    pub(crate) fn begin_batch(&mut self) -> Result<usize> {
        if self.is_locked() {
            return Err(Error::BatchActive);
        }
        if self.jobs.is_empty() {
            return Err(Error::EmptyQueue);
        }
        let total = self.jobs.len();
        self.batch_remaining = Some(total);
        Ok(total)
    }

    /// Unlock the queue after the batch reached a terminal state.
    pub(crate) fn end_batch(&mut self) {
        self.batch_remaining = None;
    }

    /// Take every still-unclaimed job of the active batch.
    pub(crate) fn drain_batch(&mut self) -> Vec<Job> {
        let Some(remaining) = self.batch_remaining.as_mut() else {
            return Vec::new();
        };
        let count = (*remaining).min(self.jobs.len());
        *remaining = 0;
        self.jobs.drain(..count).collect()
    }

    /// Drop every queued job and unlock the queue.
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.batch_remaining = None;
    }

    /// Whether a batch currently owns the queue.
    pub fn is_locked(&self) -> bool {
        self.batch_remaining.is_some()
    }

    /// Unclaimed jobs of the active batch.
    pub fn unclaimed(&self) -> usize {
        self.batch_remaining.unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> JobSource {
        JobSource::Bytes(s.as_bytes().to_vec())
    }

    fn names(queue: &JobQueue) -> Vec<String> {
        queue.iter().map(|j| j.name().to_string()).collect()
    }

    #[test]
    fn test_claims_are_fifo() {
        let mut queue = JobQueue::new();
        let a = queue.enqueue("a.pdf", bytes("a"));
        let b = queue.enqueue("b.pdf", bytes("b"));
        let c = queue.enqueue("c.pdf", bytes("c"));
        assert_eq!([a.as_u64(), b.as_u64(), c.as_u64()], [0, 1, 2]);

        assert_eq!(queue.begin_batch().unwrap(), 3);
        assert_eq!(queue.claim_next().unwrap().id(), a);
        assert_eq!(queue.claim_next().unwrap().id(), b);
        assert_eq!(queue.claim_next().unwrap().id(), c);
        assert!(queue.claim_next().is_none());
    }

    #[test]
    fn test_no_claims_without_batch() {
        let mut queue = JobQueue::new();
        queue.enqueue("a.pdf", bytes("a"));
        assert!(queue.claim_next().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_at_while_idle_shrinks_batch() {
        let mut queue = JobQueue::new();
        queue.enqueue("a.pdf", bytes("a"));
        queue.enqueue("b.pdf", bytes("b"));
        queue.enqueue("c.pdf", bytes("c"));

        let removed = queue.remove_at(1).unwrap();
        assert_eq!(removed.name(), "b.pdf");
        assert_eq!(names(&queue), vec!["a.pdf", "c.pdf"]);
        assert_eq!(queue.begin_batch().unwrap(), 2);
    }

    #[test]
    fn test_remove_at_rejected_while_locked() {
        let mut queue = JobQueue::new();
        queue.enqueue("a.pdf", bytes("a"));
        queue.enqueue("b.pdf", bytes("b"));
        queue.begin_batch().unwrap();

        assert!(matches!(queue.remove_at(1), Err(Error::BatchActive)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_remove_at_out_of_range() {
        let mut queue = JobQueue::new();
        queue.enqueue("a.pdf", bytes("a"));
        assert!(matches!(
            queue.remove_at(4),
            Err(Error::PositionOutOfRange { position: 4, len: 1 })
        ));
    }

    #[test]
    fn test_jobs_enqueued_mid_batch_wait_for_next_batch() {
        let mut queue = JobQueue::new();
        queue.enqueue("a.pdf", bytes("a"));
        queue.begin_batch().unwrap();
        queue.enqueue("late.pdf", bytes("late"));

        assert_eq!(queue.claim_next().unwrap().name(), "a.pdf");
        assert!(queue.claim_next().is_none());

        queue.end_batch();
        assert_eq!(queue.begin_batch().unwrap(), 1);
        assert_eq!(queue.claim_next().unwrap().name(), "late.pdf");
    }

    #[test]
    fn test_begin_batch_preconditions() {
        let mut queue = JobQueue::new();
        assert!(matches!(queue.begin_batch(), Err(Error::EmptyQueue)));

        queue.enqueue("a.pdf", bytes("a"));
        queue.begin_batch().unwrap();
        assert!(matches!(queue.begin_batch(), Err(Error::BatchActive)));
    }

    #[test]
    fn test_drain_batch_takes_only_batch_jobs() {
        let mut queue = JobQueue::new();
        queue.enqueue("a.pdf", bytes("a"));
        queue.enqueue("b.pdf", bytes("b"));
        queue.begin_batch().unwrap();
        queue.enqueue("late.pdf", bytes("late"));
        queue.claim_next().unwrap();

        let drained = queue.drain_batch();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].name(), "b.pdf");
        assert_eq!(queue.unclaimed(), 0);
        assert_eq!(names(&queue), vec!["late.pdf"]);
    }

    #[test]
    fn test_enqueue_file_uses_file_name() {
        let mut queue = JobQueue::new();
        queue.enqueue_file("/papers/notes/lecture 1.pdf");
        assert_eq!(queue.iter().next().unwrap().name(), "lecture 1.pdf");
    }

    #[test]
    fn test_clear_unlocks() {
        let mut queue = JobQueue::new();
        queue.enqueue("a.pdf", bytes("a"));
        queue.begin_batch().unwrap();
        queue.clear();
        assert!(!queue.is_locked());
        assert!(queue.is_empty());
    }
}
