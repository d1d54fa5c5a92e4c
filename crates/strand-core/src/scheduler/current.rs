//! Thread-local identity of the running fiber
//!
//! Each OS thread keeps a stack of the fibers bound to it. Workers only ever
//! bind one fiber at a time; a host thread that calls `ExecutionContext::run`
//! from inside another context's fiber ends up with two entries, which is
//! why lookups can be keyed by context.

use crate::scheduler::{ContextId, Fiber};
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Vec<Arc<Fiber>>> = const { RefCell::new(Vec::new()) };
}

/// Bind `fiber` as the current fiber of this thread
pub(crate) fn bind(fiber: Arc<Fiber>) {
    CURRENT.with(|stack| stack.borrow_mut().push(fiber));
}

/// Unbind `fiber`, which must be the innermost binding
///
/// Returns `false` if the binding stack was unbalanced.
pub(crate) fn unbind(fiber: &Fiber) -> bool {
    CURRENT.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last() {
            Some(top) if std::ptr::eq(Arc::as_ptr(top), fiber) => {
                stack.pop();
                true
            }
            _ => false,
        }
    })
}

/// The innermost fiber bound to this thread
pub(crate) fn current() -> Option<Arc<Fiber>> {
    CURRENT.with(|stack| stack.borrow().last().cloned())
}

/// The innermost fiber of context `id` bound to this thread
pub(crate) fn current_in(id: ContextId) -> Option<Arc<Fiber>> {
    CURRENT.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find(|f| f.context_id() == id)
            .cloned()
    })
}

/// Whether `fiber` is the innermost binding of this thread
pub(crate) fn is_innermost(fiber: &Fiber) -> bool {
    CURRENT.with(|stack| {
        stack
            .borrow()
            .last()
            .map_or(false, |f| std::ptr::eq(Arc::as_ptr(f), fiber))
    })
}

/// Whether `fiber` is bound anywhere on this thread
pub(crate) fn is_current(fiber: &Fiber) -> bool {
    CURRENT.with(|stack| {
        stack
            .borrow()
            .iter()
            .any(|f| std::ptr::eq(Arc::as_ptr(f), fiber))
    })
}
