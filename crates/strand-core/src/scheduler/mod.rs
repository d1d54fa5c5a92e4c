//! Fiber Scheduler
//!
//! Fibers are logical tasks multiplexed onto a pool of worker threads that
//! all share one single-writer engine. At most one worker runs engine code at
//! a time; a fiber gives the engine up only by joining another fiber,
//! running blocking host work through `ExecutionContext::unlocked`, or
//! finishing.

mod context;
mod current;
mod fiber;
mod queue;
mod report;
mod trace;
mod worker;

pub use context::{ContextId, ExecutionContext, PoolStats};
pub use fiber::{Fiber, FiberId, FiberState, FrameGuard};
pub use queue::{Job, JobQueue};
pub use report::{ErrorReporter, TracingReporter};
pub use trace::MAX_TRACE_DEPTH;
