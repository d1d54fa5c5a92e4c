//! Fiber structure and lifecycle

use crate::engine::{Bindings, Function, HandleScope, ScriptError};
use crate::error::{fatal, SchedulerError, SchedulerResult};
use crate::scheduler::trace::{TraceState, MAX_TRACE_DEPTH};
use crate::scheduler::{current, ContextId, ExecutionContext};
use crate::sync::Event;
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Unique identifier for a Fiber
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

static NEXT_FIBER_ID: AtomicU64 = AtomicU64::new(1);

impl FiberId {
    /// Generate a new unique FiberId
    pub fn new() -> Self {
        FiberId(NEXT_FIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for FiberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a Fiber
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FiberState {
    /// Created, `start()` not called yet
    Created,
    /// Started and waiting in the job queue
    Queued,
    /// Body executing (possibly suspended in `join()`)
    Running,
    /// Body finished, with a value or an error
    Completed,
}

/// A schedulable logical task
///
/// Fibers are shared through `Arc`. Starting a fiber moves one strong
/// handle into the job queue, so a started fiber stays alive until its
/// body has run even if every other handle is dropped.
pub struct Fiber {
    /// Unique identifier
    id: FiberId,

    /// Owning context, fixed at creation
    context: ExecutionContext,

    /// Function to execute
    function: Function,

    /// Captured arguments, consumed when the body starts
    args: Mutex<Vec<Value>>,

    /// Current state
    state: Mutex<FiberState>,

    /// Value returned by the body
    result: Mutex<Option<Value>>,

    /// Error thrown by the body
    error: Mutex<Option<ScriptError>>,

    /// Set once the body has finished
    completion: Event,

    /// Fiber that was current on the starting thread
    caller: Mutex<Option<Arc<Fiber>>>,

    /// Script-visible context object
    bindings: Bindings,

    /// Call frames and cached trace
    trace: TraceState,
}

impl Fiber {
    /// Create a fiber bound to `context`
    pub fn new(context: &ExecutionContext, function: Function, args: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            id: FiberId::new(),
            context: context.clone(),
            function,
            args: Mutex::new(args),
            state: Mutex::new(FiberState::Created),
            result: Mutex::new(None),
            error: Mutex::new(None),
            completion: Event::new(),
            caller: Mutex::new(None),
            bindings: Bindings::new(),
            trace: TraceState::default(),
        })
    }

    /// The fiber bound to the calling thread, if any
    pub fn current() -> Option<Arc<Fiber>> {
        current::current()
    }

    /// Get the Fiber's unique ID
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// Name of the function this fiber runs
    pub fn name(&self) -> &str {
        self.function.name()
    }

    /// Owning execution context
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub(crate) fn context_id(&self) -> ContextId {
        self.context.id()
    }

    /// Get the current state
    pub fn state(&self) -> FiberState {
        *self.state.lock()
    }

    /// Whether the body has finished
    pub fn is_completed(&self) -> bool {
        self.completion.is_set()
    }

    /// Value returned by the body, once completed successfully
    pub fn result(&self) -> Option<Value> {
        self.result.lock().clone()
    }

    /// Error thrown by the body, once completed with a failure
    pub fn error(&self) -> Option<ScriptError> {
        self.error.lock().clone()
    }

    /// The fiber that was current when this one was started
    pub fn caller(&self) -> Option<Arc<Fiber>> {
        self.caller.lock().clone()
    }

    /// The fiber's context object
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Diagnostic call trace
    ///
    /// Captured live when this fiber is running on the calling thread;
    /// otherwise the snapshot taken when it last suspended in `join()` or
    /// completed.
    pub fn trace_info(&self) -> String {
        if current::is_innermost(self) && !self.is_completed() {
            self.trace.capture(MAX_TRACE_DEPTH)
        } else {
            self.trace.cached()
        }
    }

    /// Push a call frame for the lifetime of the returned guard
    pub fn enter_frame(&self, name: &str) -> FrameGuard<'_> {
        self.trace.push(name);
        FrameGuard { fiber: self }
    }

    /// Queue the fiber for execution
    ///
    /// The fiber current on this thread (in the same context) becomes the
    /// caller, and its enumerable bindings are copied into this fiber. A
    /// refused start leaves the fiber untouched in `Created`.
    pub fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        self.start_bounded(None)
    }

    pub(crate) fn start_bounded(self: &Arc<Self>, limit: Option<usize>) -> SchedulerResult<()> {
        // Held until the caller is recorded: the worker that picks the job
        // up takes this lock before running the body.
        let mut state = self.state.lock();
        if *state != FiberState::Created {
            return Err(SchedulerError::AlreadyStarted(self.id));
        }

        self.context.submit(self.clone(), limit)?;
        self.set_caller(current::current_in(self.context_id()));
        *state = FiberState::Queued;
        drop(state);

        tracing::trace!(fiber = %self.id, name = self.name(), "fiber started");
        Ok(())
    }

    /// Block until the fiber completes and return its outcome
    ///
    /// If the calling thread holds the context's execution lock, it is
    /// released while waiting so other fibers can run, and reacquired
    /// before returning.
    pub fn join(&self) -> SchedulerResult<Value> {
        if !self.completion.is_set() {
            self.check_joinable()?;
            self.suspend_current();
            let lock = self.context.execution_lock();
            self.completion.wait_with(None, || lock.unlocked());
        }
        self.outcome()
    }

    /// Like [`join`](Self::join), giving up after `timeout`
    ///
    /// Returns `Ok(None)` if the fiber is still running.
    pub fn join_timeout(&self, timeout: Duration) -> SchedulerResult<Option<Value>> {
        if !self.completion.is_set() {
            self.check_joinable()?;
            self.suspend_current();
            let lock = self.context.execution_lock();
            if !self.completion.wait_with(Some(timeout), || lock.unlocked()) {
                return Ok(None);
            }
        }
        self.outcome().map(Some)
    }

    fn check_joinable(&self) -> SchedulerResult<()> {
        if self.state() == FiberState::Created {
            return Err(SchedulerError::NotStarted(self.id));
        }
        if current::is_current(self) {
            return Err(SchedulerError::JoinSelf(self.id));
        }
        Ok(())
    }

    /// The joining fiber is about to block: remember where it stopped
    fn suspend_current(&self) {
        if let Some(me) = current::current_in(self.context_id()) {
            me.trace.record();
        }
    }

    fn outcome(&self) -> SchedulerResult<Value> {
        if let Some(error) = self.error() {
            return Err(SchedulerError::Script(error));
        }
        Ok(self.result().unwrap_or_default())
    }

    pub(crate) fn set_caller(&self, caller: Option<Arc<Fiber>>) {
        if let Some(caller) = &caller {
            self.bindings.copy_from(caller.bindings());
        }
        *self.caller.lock() = caller;
    }

    /// Run the body on the calling thread
    ///
    /// The caller must hold the context's execution lock. `observed` marks
    /// fibers whose outcome is handed straight back to a host caller; their
    /// errors are never passed to the reporter.
    pub(crate) fn execute(self: &Arc<Self>, observed: bool) {
        self.begin();

        let args = std::mem::take(&mut *self.args.lock());
        let outcome = {
            let _scope = HandleScope::enter(self.context.scopes());
            self.function.invoke(self, &args)
        };
        drop(args);

        self.finish(outcome, observed);
    }

    fn begin(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state == FiberState::Completed || *state == FiberState::Running {
                fatal(&format!("fiber {} executed twice", self.id));
            }
            *state = FiberState::Running;
        }
        current::bind(self.clone());
        self.context.insert_live(self);
        self.trace.push(self.function.name());
    }

    fn finish(&self, outcome: Result<Value, ScriptError>, observed: bool) {
        let failure = match outcome {
            Ok(value) => {
                *self.result.lock() = Some(value);
                None
            }
            Err(error) => {
                *self.error.lock() = Some(error.clone());
                Some(error)
            }
        };

        self.trace.record();
        self.trace.pop();
        *self.state.lock() = FiberState::Completed;

        let waiters = match self.completion.set() {
            Some(waiters) => waiters,
            None => fatal(&format!("fiber {} completed twice", self.id)),
        };

        if let Some(error) = &failure {
            if waiters == 0 && !observed {
                self.context.reporter().report(self, error);
            }
        }

        self.context.remove_live(self);
        if !current::unbind(self) {
            fatal(&format!("fiber {} was not bound to this thread", self.id));
        }

        tracing::trace!(
            fiber = %self.id,
            failed = failure.is_some(),
            "fiber finished"
        );
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Pops a call frame when dropped
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard<'a> {
    fiber: &'a Fiber,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.fiber.trace.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;

    fn test_context() -> ExecutionContext {
        ExecutionContext::new(SchedulerConfig::new().spare_workers(4))
            .expect("failed to create context")
    }

    fn constant(value: i64) -> Function {
        Function::new("constant", move |_, _| Ok(Value::int(value)))
    }

    #[test]
    fn test_fiber_id_uniqueness() {
        let id1 = FiberId::new();
        let id2 = FiberId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
        assert_eq!(format!("{}", FiberId(7)), "#7");
    }

    #[test]
    fn test_fiber_creation() {
        let ctx = test_context();
        let fiber = Fiber::new(&ctx, constant(1), vec![]);

        assert_eq!(fiber.state(), FiberState::Created);
        assert_eq!(fiber.name(), "constant");
        assert!(fiber.caller().is_none());
        assert!(fiber.result().is_none());
        assert!(fiber.error().is_none());
        assert!(!fiber.is_completed());
        assert_eq!(fiber.trace_info(), "");
    }

    #[test]
    fn test_start_twice_fails() {
        let ctx = test_context();
        let fiber = Fiber::new(&ctx, constant(1), vec![]);
        fiber.start().unwrap();
        assert!(matches!(
            fiber.start(),
            Err(SchedulerError::AlreadyStarted(id)) if id == fiber.id()
        ));
        assert_eq!(fiber.join().unwrap(), Value::int(1));
    }

    #[test]
    fn test_join_unstarted_fails() {
        let ctx = test_context();
        let fiber = Fiber::new(&ctx, constant(1), vec![]);
        assert!(matches!(fiber.join(), Err(SchedulerError::NotStarted(_))));
        assert!(matches!(
            fiber.join_timeout(Duration::from_millis(1)),
            Err(SchedulerError::NotStarted(_))
        ));
    }

    #[test]
    fn test_args_are_passed() {
        let ctx = test_context();
        let sum = Function::new("sum", |_, args| {
            Ok(Value::int(args.iter().filter_map(Value::as_int).sum()))
        });
        let fiber = Fiber::new(&ctx, sum, vec![Value::int(1), Value::int(2), Value::int(3)]);
        fiber.start().unwrap();
        assert_eq!(fiber.join().unwrap(), Value::int(6));
        assert_eq!(fiber.state(), FiberState::Completed);
    }

    #[test]
    fn test_join_returns_script_error() {
        let ctx = test_context();
        let failing = Function::new("failing", |_, _| {
            Err(ScriptError::typed("RangeError", "out of range"))
        });
        let fiber = Fiber::new(&ctx, failing, vec![]);
        fiber.start().unwrap();

        let err = fiber.join().unwrap_err();
        let script = err.as_script().expect("script error");
        assert_eq!(script.name, "RangeError");
        assert!(fiber.result().is_none());
        assert_eq!(fiber.error().unwrap().message, "out of range");
    }

    #[test]
    fn test_panic_becomes_script_error() {
        let ctx = test_context();
        let panicking = Function::new("panicking", |_, _| panic!("kaboom"));
        let fiber = Fiber::new(&ctx, panicking, vec![]);
        fiber.start().unwrap();

        let err = fiber.join().unwrap_err();
        assert_eq!(err.as_script().unwrap().message, "kaboom");
        assert_eq!(ctx.open_scopes(), 0);

        // The worker survived and keeps running fibers.
        let next = Fiber::new(&ctx, constant(5), vec![]);
        next.start().unwrap();
        assert_eq!(next.join().unwrap(), Value::int(5));
    }

    #[test]
    fn test_join_self_fails() {
        let ctx = test_context();
        let selfish = Function::new("selfish", |this, _| match this.join() {
            Err(SchedulerError::JoinSelf(_)) => Ok(Value::bool(true)),
            _ => Ok(Value::bool(false)),
        });
        let fiber = Fiber::new(&ctx, selfish, vec![]);
        fiber.start().unwrap();
        assert_eq!(fiber.join().unwrap(), Value::bool(true));
    }

    #[test]
    fn test_live_and_cached_trace() {
        let ctx = test_context();
        let traced = Function::new("outer", |this, _| {
            let _frame = this.enter_frame("inner");
            Ok(Value::str(this.trace_info()))
        });
        let fiber = Fiber::new(&ctx, traced, vec![]);
        fiber.start().unwrap();

        let live = fiber.join().unwrap();
        assert_eq!(live.as_str(), Some("    at inner\n    at outer"));
        // Read from another thread after completion: the cached snapshot.
        assert_eq!(fiber.trace_info(), "    at outer");
    }

    #[test]
    fn test_refused_start_leaves_fiber_untouched() {
        let ctx = test_context();
        let main = Function::new("main", |this, _| {
            this.bindings().set("a", 1);
            this.context().shutdown();

            let child = Fiber::new(this.context(), constant(1), vec![]);
            let refused = matches!(child.start(), Err(SchedulerError::ContextClosed));
            let not_started = matches!(child.join(), Err(SchedulerError::NotStarted(_)));
            Ok(Value::list([
                Value::bool(refused),
                Value::bool(not_started),
                Value::bool(child.state() == FiberState::Created),
                Value::bool(child.caller().is_none()),
                Value::bool(child.bindings().is_empty()),
            ]))
        });

        let checks = ctx.run(main, vec![]).unwrap();
        assert!(checks.as_list().unwrap().iter().all(|v| v.as_bool() == Some(true)));
    }

    #[test]
    fn test_trace_info_live_only_for_innermost_fiber() {
        let ctx = test_context();
        let outer = Function::new("outer", |this, _| {
            let outer_fiber = this.clone();
            let inner = Function::new("inner", move |inner_this, _| {
                Ok(Value::list([
                    Value::str(outer_fiber.trace_info()),
                    Value::str(inner_this.trace_info()),
                ]))
            });
            Ok(this.context().run(inner, vec![])?)
        });

        let traces = ctx.run(outer, vec![]).unwrap();
        // The outer fiber is bound below the inner one and has not
        // suspended yet, so only its (empty) snapshot is visible.
        assert_eq!(
            traces.as_list().unwrap(),
            &[Value::str(""), Value::str("    at inner")]
        );
    }
}
