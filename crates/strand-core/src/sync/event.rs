//! One-shot completion event

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct EventState {
    set: bool,
    waiters: usize,
}

/// A flag that goes from unset to set exactly once and can be waited on by
/// any number of threads
#[derive(Debug, Default)]
pub struct Event {
    state: Mutex<EventState>,
    condvar: Condvar,
}

impl Event {
    /// Create an unset event
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event and wake every waiter
    ///
    /// Returns the number of threads that were waiting when this call set
    /// the event, or `None` if the event was already set (setting twice is
    /// a no-op).
    pub fn set(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if state.set {
            return None;
        }
        state.set = true;
        let waiters = state.waiters;
        drop(state);
        self.condvar.notify_all();
        Some(waiters)
    }

    /// Whether the event has been set
    pub fn is_set(&self) -> bool {
        self.state.lock().set
    }

    /// Number of threads currently blocked in `wait`
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters
    }

    /// Block until the event is set
    pub fn wait(&self) {
        self.wait_with(None, || ());
    }

    /// Block until the event is set or `timeout` elapses
    ///
    /// Returns whether the event is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_with(Some(timeout), || ())
    }

    /// Block until the event is set, optionally giving up after `timeout`
    ///
    /// `on_block` runs once this thread is counted as a waiter and before it
    /// first sleeps, so a `set` racing with it always sees the waiter. It is
    /// not called if the event is already set. Its return value is dropped
    /// after the wait, outside the event's internal lock.
    pub fn wait_with<G>(&self, timeout: Option<Duration>, on_block: impl FnOnce() -> G) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        if state.set {
            return true;
        }
        state.waiters += 1;
        let suspended = on_block();
        while !state.set {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.condvar.wait(&mut state),
            }
        }
        state.waiters -= 1;
        let set = state.set;
        drop(state);
        drop(suspended);
        set
    }
}
