//! Reporting of uncaught fiber errors

use crate::engine::ScriptError;
use crate::scheduler::Fiber;

/// Receives errors of fibers that finished with nobody waiting on them
pub trait ErrorReporter: Send + Sync {
    /// Called on the worker thread, with the execution lock held, right
    /// after the fiber completed
    fn report(&self, fiber: &Fiber, error: &ScriptError);
}

/// Default reporter: logs through `tracing` at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, fiber: &Fiber, error: &ScriptError) {
        let trace = error
            .stack
            .clone()
            .unwrap_or_else(|| fiber.trace_info());
        tracing::error!(
            fiber = %fiber.id(),
            name = fiber.name(),
            "uncaught error in fiber: {}\n{}",
            error,
            trace
        );
    }
}
