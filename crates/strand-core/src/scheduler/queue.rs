//! Blocking FIFO job queue shared by a context's workers

use crate::scheduler::Fiber;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::fmt;
use std::sync::Arc;

/// A unit of work picked up by a worker
pub enum Job {
    /// Run a started fiber. The job owns a strong handle to the fiber,
    /// which keeps it alive until its body has finished.
    Run(Arc<Fiber>),

    /// Shutdown sentinel: the receiving worker retires
    Stop,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Run(fiber) => f.debug_tuple("Run").field(&fiber.id()).finish(),
            Job::Stop => f.write_str("Stop"),
        }
    }
}

/// Multi-producer, multi-consumer FIFO of jobs
///
/// The queue owns both ends of the channel, so it can never observe a
/// disconnected state while it is alive.
#[derive(Debug)]
pub struct JobQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl JobQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// Append a job and wake one blocked `get`
    pub fn put(&self, job: Job) {
        // Both ends live in `self`; sending cannot fail.
        let _ = self.tx.send(job);
    }

    /// Take the head job without blocking
    pub fn try_get(&self) -> Option<Job> {
        match self.rx.try_recv() {
            Ok(job) => Some(job),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take the head job, blocking until one is available
    pub fn get(&self) -> Option<Job> {
        self.rx.recv().ok()
    }

    /// Number of queued jobs (approximate under concurrency)
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is empty (approximate under concurrency)
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
