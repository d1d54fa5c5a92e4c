//! Execution context: job queue, worker pool and live fibers
//!
//! A context is one scheduling domain. It owns the job queue that started
//! fibers wait in, the execution lock that serializes engine access, the
//! set of fibers currently executing, and the counters that size the worker
//! pool. Handles are cheap to clone and all refer to the same context.

use crate::config::SchedulerConfig;
use crate::engine::{ExecutionGuard, ExecutionLock, Function, ScopeCounter};
use crate::error::{fatal, SchedulerError, SchedulerResult};
use crate::scheduler::queue::{Job, JobQueue};
use crate::scheduler::report::{ErrorReporter, TracingReporter};
use crate::scheduler::{current, worker, Fiber, FiberId};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Unique identifier for an ExecutionContext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Create a new unique context ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of a context's pool and fiber counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker threads alive (including ones being spawned)
    pub worker_count: usize,

    /// Workers waiting for a job
    pub idle_count: usize,

    /// Highest `worker_count` observed
    pub peak_workers: usize,

    /// Fibers started and not yet completed
    pub pending_fibers: usize,

    /// Fibers currently executing (including ones suspended in `join`)
    pub live_fibers: usize,

    /// Jobs waiting in the queue
    pub queued_jobs: usize,
}

/// Pool bookkeeping; every update happens in one critical section
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) workers: usize,
    pub(crate) idle: usize,
    pub(crate) peak: usize,
    pub(crate) pending: usize,
    pub(crate) closed: bool,
    pub(crate) failure: Option<String>,
}

pub(crate) struct ContextInner {
    id: ContextId,
    config: SchedulerConfig,
    lock: ExecutionLock,
    queue: JobQueue,
    pool: Mutex<PoolCounters>,
    pool_changed: Condvar,
    live: Mutex<IndexMap<FiberId, Weak<Fiber>>>,
    scopes: ScopeCounter,
    reporter: Arc<dyn ErrorReporter>,
    next_worker: AtomicUsize,
    #[cfg(test)]
    fail_next_spawn: std::sync::atomic::AtomicBool,
}

impl ContextInner {
    pub(crate) fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub(crate) fn lock(&self) -> &ExecutionLock {
        &self.lock
    }

    pub(crate) fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub(crate) fn pool(&self) -> parking_lot::MutexGuard<'_, PoolCounters> {
        self.pool.lock()
    }

    /// Wake threads waiting in `wait_idle` / `wait_shutdown`
    pub(crate) fn notify_pool_changed(&self) {
        self.pool_changed.notify_all();
    }

    pub(crate) fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed)
    }

    /// Close the context and queue the stop sentinel
    pub(crate) fn shutdown(&self) {
        let mut pool = self.pool.lock();
        if pool.closed {
            return;
        }
        pool.closed = true;
        self.queue.put(Job::Stop);
        tracing::debug!(
            context = self.id.as_u64(),
            workers = pool.workers,
            "execution context shutting down"
        );
    }

    /// Consume a pending injected spawn failure
    #[cfg(test)]
    pub(crate) fn take_spawn_failure(&self) -> bool {
        self.fail_next_spawn.swap(false, Ordering::SeqCst)
    }

    /// A scheduled fiber has finished running
    pub(crate) fn fiber_done(&self) {
        let mut pool = self.pool.lock();
        pool.pending -= 1;
        if pool.pending == 0 {
            drop(pool);
            self.pool_changed.notify_all();
        }
    }
}

/// Shuts the context down once the last handle is gone
///
/// Workers only hold `ContextInner`, so they never keep this alive; fibers
/// hold full handles, so a queued or running fiber does.
struct ShutdownOnDrop(Arc<ContextInner>);

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Handle to a scheduling domain
///
/// Dropping the last handle (including the ones held by fibers) shuts the
/// context down and lets its workers exit.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
    _owner: Arc<ShutdownOnDrop>,
}

impl ExecutionContext {
    /// Create a context and its first worker
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        Self::with_reporter(config, Arc::new(TracingReporter))
    }

    /// Create a context with a custom reporter for uncaught fiber errors
    pub fn with_reporter(
        config: SchedulerConfig,
        reporter: Arc<dyn ErrorReporter>,
    ) -> SchedulerResult<Self> {
        let inner = Arc::new(ContextInner {
            id: ContextId::new(),
            config,
            lock: ExecutionLock::new(),
            queue: JobQueue::new(),
            pool: Mutex::new(PoolCounters {
                // The first worker is reserved as idle before it starts.
                workers: 1,
                idle: 1,
                peak: 1,
                ..PoolCounters::default()
            }),
            pool_changed: Condvar::new(),
            live: Mutex::new(IndexMap::new()),
            scopes: ScopeCounter::new(),
            reporter,
            next_worker: AtomicUsize::new(0),
            #[cfg(test)]
            fail_next_spawn: std::sync::atomic::AtomicBool::new(false),
        });
        let owner = Arc::new(ShutdownOnDrop(inner.clone()));

        worker::spawn(&inner).map_err(SchedulerError::WorkerSpawn)?;

        tracing::debug!(
            context = inner.id.as_u64(),
            spare_workers = inner.config.spare_workers,
            "execution context created"
        );
        Ok(Self {
            inner,
            _owner: owner,
        })
    }

    /// Create a context configured from `STRAND_*` environment variables
    pub fn from_env() -> SchedulerResult<Self> {
        Self::new(SchedulerConfig::from_env())
    }

    /// Get the context ID
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Get the configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// The lock serializing engine access
    pub fn execution_lock(&self) -> &ExecutionLock {
        &self.inner.lock
    }

    /// Enter the engine from a host thread
    ///
    /// While the guard is alive no fiber body of this context can run.
    pub fn lock(&self) -> ExecutionGuard<'_> {
        self.inner.lock.lock()
    }

    /// Run blocking host work with the execution lock released
    ///
    /// Lets other fibers run while the calling fiber waits on something
    /// outside the engine. A no-op wrapper if this thread does not hold
    /// the lock.
    pub fn unlocked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _unlocked = self.inner.lock.unlocked();
        f()
    }

    /// Create and start a fiber, enforcing the configured fiber ceiling
    ///
    /// The ceiling is checked in the same critical section that counts the
    /// fiber as pending, so concurrent callers can never overshoot it.
    pub fn spawn(&self, function: Function, args: Vec<Value>) -> SchedulerResult<Arc<Fiber>> {
        let fiber = Fiber::new(self, function, args);
        fiber.start_bounded(Some(self.inner.config.max_fibers))?;
        Ok(fiber)
    }

    /// Run a function synchronously on the calling thread as a root fiber
    ///
    /// Takes the execution lock unless this thread already holds it. The
    /// root fiber's caller is the fiber currently running on this thread in
    /// this context, if any. Its error is returned, not reported.
    pub fn run(&self, function: Function, args: Vec<Value>) -> SchedulerResult<Value> {
        let _guard = self.inner.lock.lock();
        let fiber = Fiber::new(self, function, args);
        fiber.set_caller(current::current_in(self.id()));
        fiber.execute(true);

        match fiber.error() {
            Some(error) => Err(SchedulerError::Script(error)),
            None => Ok(fiber.result().unwrap_or_default()),
        }
    }

    /// The fiber of this context running on the calling thread
    pub fn current_fiber(&self) -> Option<Arc<Fiber>> {
        current::current_in(self.id())
    }

    /// Fibers currently executing, oldest fiber first
    pub fn live_fibers(&self) -> Vec<Arc<Fiber>> {
        let mut live: Vec<_> = self
            .inner
            .live
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        // Removal swaps entries around; order by id on the way out instead.
        live.sort_by_key(|f| f.id());
        live
    }

    /// Render the trace of every live fiber
    pub fn dump_traces(&self) -> String {
        let mut out = String::new();
        for fiber in self.live_fibers() {
            let _ = writeln!(out, "fiber {} ({}):", fiber.id(), fiber.name());
            let trace = fiber.trace_info();
            if !trace.is_empty() {
                let _ = writeln!(out, "{}", trace);
            }
        }
        out
    }

    /// Current pool and fiber counters
    pub fn stats(&self) -> PoolStats {
        let live_fibers = self.inner.live.lock().len();
        let pool = self.inner.pool.lock();
        PoolStats {
            worker_count: pool.workers,
            idle_count: pool.idle,
            peak_workers: pool.peak,
            pending_fibers: pool.pending,
            live_fibers,
            queued_jobs: self.inner.queue.len(),
        }
    }

    /// Memory scopes currently open
    pub fn open_scopes(&self) -> usize {
        self.inner.scopes.open()
    }

    /// Block until every started fiber has completed
    ///
    /// Must not be called from a fiber of this context. Returns `false` on
    /// timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.wait_pool(timeout, |pool| pool.pending == 0)
    }

    /// Stop accepting fibers and retire every worker once the queue drains
    ///
    /// Fibers already started still run to completion.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.pool.lock().closed
    }

    /// Block until every worker has exited; returns `false` on timeout
    pub fn wait_shutdown(&self, timeout: Duration) -> bool {
        self.wait_pool(timeout, |pool| pool.workers == 0)
    }

    fn wait_pool(&self, timeout: Duration, done: impl Fn(&PoolCounters) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pool = self.inner.pool.lock();
        while !done(&pool) {
            if self
                .inner
                .pool_changed
                .wait_until(&mut pool, deadline)
                .timed_out()
            {
                return done(&pool);
            }
        }
        true
    }

    /// Queue a started fiber, refusing it if `limit` fibers are pending
    pub(crate) fn submit(&self, fiber: Arc<Fiber>, limit: Option<usize>) -> SchedulerResult<()> {
        let mut pool = self.inner.pool.lock();
        if pool.closed {
            return Err(SchedulerError::ContextClosed);
        }
        if let Some(failure) = &pool.failure {
            return Err(SchedulerError::PoolExhausted(failure.clone()));
        }
        if let Some(limit) = limit {
            if pool.pending >= limit {
                drop(pool);
                tracing::warn!(limit, "fiber limit reached");
                return Err(SchedulerError::FiberLimit { limit });
            }
        }
        pool.pending += 1;
        // Enqueue inside the critical section so a concurrent shutdown
        // always lands its stop sentinel behind this job.
        self.inner.queue.put(Job::Run(fiber));
        Ok(())
    }

    pub(crate) fn insert_live(&self, fiber: &Arc<Fiber>) {
        let previous = self
            .inner
            .live
            .lock()
            .insert(fiber.id(), Arc::downgrade(fiber));
        if previous.is_some() {
            fatal(&format!("fiber {} entered the live list twice", fiber.id()));
        }
    }

    pub(crate) fn remove_live(&self, fiber: &Fiber) {
        if self.inner.live.lock().swap_remove(&fiber.id()).is_none() {
            fatal(&format!("fiber {} left the live list twice", fiber.id()));
        }
    }

    pub(crate) fn scopes(&self) -> &ScopeCounter {
        &self.inner.scopes
    }

    pub(crate) fn reporter(&self) -> &dyn ErrorReporter {
        self.inner.reporter.as_ref()
    }

    /// Make the next worker spawn fail with an I/O error
    #[cfg(test)]
    pub(crate) fn fail_next_worker_spawn(&self) {
        self.inner.fail_next_spawn.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("stats", &self.stats())
            .finish()
    }
}
