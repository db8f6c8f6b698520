//! Thread-safe FIFO of pending jobs; the hand-off between producers and the
//! interpreter.
//!
//! Every operation takes the queue lock exactly once. Length events are
//! published after the lock is released so subscribers never run under it.

use crate::context::{Context, DeviceEvent};
use crate::job::{Job, JobId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpoolerError {
    #[error("Job {0} is not in the spool")]
    NotFound(JobId),
}

pub struct Spooler {
    queue: Mutex<VecDeque<Job>>,
    context: Arc<dyn Context>,
}

impl Spooler {
    pub fn new(context: Arc<dyn Context>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            context,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        // A panicking producer cannot leave the deque half-written.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, len: usize) {
        self.context.publish(DeviceEvent::QueueLengthChanged(len));
    }

    /// Head of the queue without removing it.
    pub fn peek(&self) -> Option<Job> {
        self.lock().front().cloned()
    }

    /// Removes and returns the head of the queue.
    pub fn pop(&self) -> Option<Job> {
        let (job, len) = {
            let mut queue = self.lock();
            let job = queue.pop_front();
            (job, queue.len())
        };
        if job.is_some() {
            self.announce(len);
        }
        job
    }

    /// Appends one job. A multi-command job stays a single queue entry.
    pub fn enqueue(&self, job: Job) {
        let len = {
            let mut queue = self.lock();
            queue.push_back(job);
            queue.len()
        };
        tracing::debug!(pending = len, "Job spooled");
        self.announce(len);
    }

    /// Appends several jobs in order under a single lock acquisition.
    pub fn enqueue_many(&self, jobs: impl IntoIterator<Item = Job>) {
        let len = {
            let mut queue = self.lock();
            queue.extend(jobs);
            queue.len()
        };
        tracing::debug!(pending = len, "Jobs spooled");
        self.announce(len);
    }

    /// Enqueues `job` only if nothing is pending. The check and the insert
    /// happen under the same lock.
    pub fn enqueue_if_idle(&self, job: Job) -> bool {
        let len = {
            let mut queue = self.lock();
            if !queue.is_empty() {
                return false;
            }
            queue.push_back(job);
            queue.len()
        };
        self.announce(len);
        true
    }

    /// Discards all pending work.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.lock());
        if !dropped.is_empty() {
            tracing::info!(discarded = dropped.len(), "Spool cleared");
        }
        self.announce(0);
    }

    /// Deletes the first pending job equal to `job`.
    pub fn remove(&self, job: &Job) -> Result<(), SpoolerError> {
        let len = {
            let mut queue = self.lock();
            let index = queue
                .iter()
                .position(|pending| pending == job)
                .ok_or(SpoolerError::NotFound(job.id()))?;
            queue.remove(index);
            queue.len()
        };
        self.announce(len);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl std::fmt::Debug for Spooler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spooler").field("pending", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::context::HostContext;

    fn spooler() -> (Spooler, tokio::sync::broadcast::Receiver<DeviceEvent>) {
        let context = Arc::new(HostContext::default());
        let rx = context.subscribe();
        (Spooler::new(context), rx)
    }

    fn lengths(rx: &mut tokio::sync::broadcast::Receiver<DeviceEvent>) -> Vec<usize> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DeviceEvent::QueueLengthChanged(len) = event {
                out.push(len);
            }
        }
        out
    }

    #[test]
    fn test_pop_on_empty_is_silent() {
        let (spooler, mut rx) = spooler();
        assert!(spooler.pop().is_none());
        assert!(lengths(&mut rx).is_empty());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let (spooler, _rx) = spooler();
        let job = Job::command(Command::Home);
        spooler.enqueue(job.clone());
        assert_eq!(spooler.peek(), Some(job.clone()));
        assert_eq!(spooler.len(), 1);
        assert_eq!(spooler.pop(), Some(job));
        assert!(spooler.is_empty());
    }

    #[test]
    fn test_length_events_follow_mutations() {
        let (spooler, mut rx) = spooler();
        spooler.enqueue(Job::command(Command::Home));
        spooler.enqueue_many(vec![Job::code(6), Job::code(7)]);
        spooler.pop();
        spooler.clear();
        assert_eq!(lengths(&mut rx), vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_sequence_is_one_entry() {
        let (spooler, _rx) = spooler();
        spooler.enqueue(Job::sequence(vec![Command::Home, Command::LaserOn, Command::LaserOff]));
        assert_eq!(spooler.len(), 1);
    }

    #[test]
    fn test_remove_missing_job_fails() {
        let (spooler, _rx) = spooler();
        let kept = Job::code(6);
        let gone = Job::code(6);
        spooler.enqueue(kept.clone());
        assert_eq!(spooler.remove(&gone), Err(SpoolerError::NotFound(gone.id())));
        assert_eq!(spooler.remove(&kept), Ok(()));
        assert!(spooler.is_empty());
    }
}
