//! Memory scopes
//!
//! Engine values created while running a job must live inside a scope that
//! is entered before the call and left afterwards, whatever way the call
//! ends. The scope here only does the bookkeeping; the counter it maintains
//! lets the context verify that every job left its scope.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts the scopes currently open against one context
#[derive(Debug, Default)]
pub struct ScopeCounter {
    open: AtomicUsize,
    entered: AtomicUsize,
}

impl ScopeCounter {
    /// Create a counter with no open scopes
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes entered and not yet left
    pub fn open(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    /// Scopes entered over the counter's lifetime
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::Relaxed)
    }
}

/// RAII memory scope; left on drop, including during unwinding
#[must_use = "the scope is left as soon as it is dropped"]
pub struct HandleScope<'a> {
    counter: &'a ScopeCounter,
}

impl<'a> HandleScope<'a> {
    /// Enter a new scope
    pub fn enter(counter: &'a ScopeCounter) -> Self {
        counter.open.fetch_add(1, Ordering::AcqRel);
        counter.entered.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        self.counter.open.fetch_sub(1, Ordering::AcqRel);
    }
}
