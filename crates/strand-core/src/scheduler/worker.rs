//! Worker threads
//!
//! A worker owns the execution lock for as long as it is alive, except while
//! it blocks waiting for a job. The pool grows by one worker whenever a worker
//! picks up a job and finds nobody left idle, and shrinks whenever a worker
//! finds the queue empty while more than `spare_workers` workers are idle.

use crate::scheduler::context::ContextInner;
use crate::scheduler::queue::Job;
use std::io;
use std::sync::Arc;
use std::thread;

/// Start one worker thread for `ctx`
///
/// The caller must already have counted the worker as alive and idle.
pub(crate) fn spawn(ctx: &Arc<ContextInner>) -> io::Result<()> {
    #[cfg(test)]
    if ctx.take_spawn_failure() {
        return Err(io::Error::other("thread limit reached"));
    }

    let index = ctx.next_worker_index();
    let config = ctx.config();
    let worker_ctx = ctx.clone();

    // Workers are never joined; they retire on their own.
    thread::Builder::new()
        .name(format!("{}-{}", config.worker_name, index))
        .stack_size(config.stack_size)
        .spawn(move || run_loop(worker_ctx, index))
        .map(drop)
}

fn run_loop(ctx: Arc<ContextInner>, index: usize) {
    tracing::debug!(worker = index, "worker started");
    let _guard = ctx.lock().lock();
    ctx.pool().idle -= 1;

    loop {
        let job = match ctx.queue().try_get() {
            Some(job) => job,
            None => {
                if retire_if_surplus(&ctx) {
                    tracing::debug!(worker = index, "worker retired (surplus idle)");
                    return;
                }
                let job = {
                    let _unlocked = ctx.lock().unlocked();
                    // The queue owns its sender, so a blocking get only comes
                    // back empty if it was torn down.
                    ctx.queue().get().unwrap_or(Job::Stop)
                };
                ctx.pool().idle -= 1;
                job
            }
        };

        match job {
            Job::Stop => {
                let mut pool = ctx.pool();
                pool.workers -= 1;
                if pool.workers > 0 {
                    ctx.queue().put(Job::Stop);
                }
                drop(pool);
                ctx.notify_pool_changed();
                tracing::debug!(worker = index, "worker retired (shutdown)");
                return;
            }
            Job::Run(fiber) => {
                tracing::trace!(worker = index, fiber = %fiber.id(), "job dequeued");
                grow_if_needed(&ctx);
                fiber.execute(false);
                drop(fiber);
                ctx.fiber_done();
            }
        }
    }
}

/// Count this worker as idle, or retire it if that would exceed the cap
fn retire_if_surplus(ctx: &ContextInner) -> bool {
    let mut pool = ctx.pool();
    pool.idle += 1;
    if pool.idle <= ctx.config().spare_workers {
        return false;
    }
    pool.idle -= 1;
    pool.workers -= 1;
    drop(pool);
    ctx.notify_pool_changed();
    true
}

/// Add a worker when the one about to run a fiber was the last idle one
///
/// Keeps at least one thread available for the job queue while fiber bodies
/// block in `join` or host calls.
fn grow_if_needed(ctx: &Arc<ContextInner>) {
    {
        let mut pool = ctx.pool();
        if pool.idle != 0 || pool.failure.is_some() {
            return;
        }
        pool.workers += 1;
        pool.idle += 1;
    }

    if let Err(e) = spawn(ctx) {
        let mut pool = ctx.pool();
        pool.workers -= 1;
        pool.idle -= 1;
        pool.failure = Some(e.to_string());
        let workers = pool.workers;
        drop(pool);
        tracing::error!(workers, error = %e, "failed to grow worker pool");
        return;
    }

    let workers = {
        let mut pool = ctx.pool();
        pool.peak = pool.peak.max(pool.workers);
        pool.workers
    };
    tracing::debug!(workers, "worker pool grew");
}

#[cfg(test)]
mod tests {
    use crate::config::SchedulerConfig;
    use crate::engine::Function;
    use crate::error::SchedulerError;
    use crate::scheduler::{ExecutionContext, Fiber, FiberState};
    use crate::value::Value;
    use std::time::Duration;

    fn worker_count() -> Function {
        Function::new("count", |this, _| {
            Ok(Value::int(this.context().stats().worker_count as i64))
        })
    }

    #[test]
    fn test_worker_thread_name() {
        let ctx = ExecutionContext::new(SchedulerConfig::new().worker_name("unit-pool")).unwrap();
        let name = Function::new("name", |_, _| {
            Ok(Value::str(std::thread::current().name().unwrap_or("")))
        });
        let fiber = Fiber::new(&ctx, name, vec![]);
        fiber.start().unwrap();
        let value = fiber.join().unwrap();
        assert!(value.as_str().unwrap().starts_with("unit-pool-"));
    }

    #[test]
    fn test_pool_grows_while_running() {
        let ctx = ExecutionContext::new(SchedulerConfig::new()).unwrap();
        let fiber = Fiber::new(&ctx, worker_count(), vec![]);
        fiber.start().unwrap();
        assert!(fiber.join().unwrap().as_int().unwrap() >= 2);
        assert!(ctx.wait_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_grow_failure_rolls_back_and_exhausts_pool() {
        let ctx = ExecutionContext::new(SchedulerConfig::new()).unwrap();
        ctx.fail_next_worker_spawn();

        // The only worker takes the job, finds nobody idle and fails to grow.
        let fiber = Fiber::new(&ctx, worker_count(), vec![]);
        fiber.start().unwrap();
        assert_eq!(fiber.join().unwrap(), Value::int(1));
        assert!(ctx.wait_idle(Duration::from_secs(5)));

        let stats = ctx.stats();
        assert_eq!(stats.worker_count, 1);
        assert_eq!(stats.peak_workers, 1);
        assert!(stats.idle_count <= stats.worker_count);

        let next = Fiber::new(&ctx, worker_count(), vec![]);
        match next.start() {
            Err(SchedulerError::PoolExhausted(message)) => {
                assert!(message.contains("thread limit reached"))
            }
            other => panic!("expected pool exhaustion, got {:?}", other),
        }
        assert_eq!(next.state(), FiberState::Created);
        assert!(next.caller().is_none());
        assert!(matches!(
            ctx.spawn(worker_count(), vec![]),
            Err(SchedulerError::PoolExhausted(_))
        ));
    }
}
