//! Execution lock
//!
//! The engine is single-writer: at any instant at most one thread may touch
//! engine state for a given context. Unlike a plain mutex guard, the lock has
//! to be given up and taken back in the middle of a fiber body (while a
//! worker waits for a job, while a fiber joins another one, while host code
//! blocks), so ownership is tracked explicitly by thread id.

use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

/// Owner-tracking lock serializing access to engine state
#[derive(Debug, Default)]
pub struct ExecutionLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl ExecutionLock {
    /// Create an unlocked lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, blocking until it is free
    ///
    /// If the calling thread already owns the lock the returned guard is a
    /// no-op and releases nothing on drop.
    pub fn lock(&self) -> ExecutionGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        if *owner == Some(me) {
            return ExecutionGuard {
                lock: self,
                owned: false,
            };
        }
        while owner.is_some() {
            self.released.wait(&mut owner);
        }
        *owner = Some(me);
        ExecutionGuard {
            lock: self,
            owned: true,
        }
    }

    /// Check whether the calling thread owns the lock
    pub fn held_by_current_thread(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    /// Check whether any thread owns the lock
    pub fn is_locked(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Release the lock for the duration of the returned guard
    ///
    /// Does nothing if the calling thread does not own the lock. The lock is
    /// reacquired when the guard drops.
    pub fn unlocked(&self) -> Unlocker<'_> {
        let held = self.held_by_current_thread();
        if held {
            self.release();
        }
        Unlocker { lock: self, held }
    }

    fn acquire_raw(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        while owner.is_some() {
            self.released.wait(&mut owner);
        }
        *owner = Some(me);
    }

    fn release(&self) {
        let mut owner = self.owner.lock();
        debug_assert_eq!(*owner, Some(thread::current().id()));
        *owner = None;
        drop(owner);
        self.released.notify_one();
    }
}

/// Scoped ownership of an [`ExecutionLock`]
#[must_use = "the execution lock is released when the guard is dropped"]
pub struct ExecutionGuard<'a> {
    lock: &'a ExecutionLock,
    owned: bool,
}

impl ExecutionGuard<'_> {
    /// Whether this guard took the lock (false for re-entrant guards)
    pub fn is_owner(&self) -> bool {
        self.owned
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        if self.owned {
            self.lock.release();
        }
    }
}

/// Scoped release of an [`ExecutionLock`]
#[must_use = "the execution lock is reacquired when the unlocker is dropped"]
pub struct Unlocker<'a> {
    lock: &'a ExecutionLock,
    held: bool,
}

impl Drop for Unlocker<'_> {
    fn drop(&mut self) {
        if self.held {
            self.lock.acquire_raw();
        }
    }
}
