//! Scheduler error types.

use crate::engine::ScriptError;
use crate::scheduler::FiberId;

/// Errors surfaced by the scheduler
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The OS refused to create a worker thread
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// An earlier attempt to grow the worker pool failed
    #[error("worker pool exhausted: {0}")]
    PoolExhausted(String),

    /// `start()` called on a fiber that was already started
    #[error("fiber {0} already started")]
    AlreadyStarted(FiberId),

    /// `join()` called on a fiber that was never started
    #[error("fiber {0} was never started")]
    NotStarted(FiberId),

    /// A fiber tried to join itself
    #[error("fiber {0} cannot join itself")]
    JoinSelf(FiberId),

    /// The context has been shut down
    #[error("execution context is shut down")]
    ContextClosed,

    /// The fiber ceiling was reached
    #[error("too many fibers (limit {limit})")]
    FiberLimit {
        /// Configured ceiling
        limit: usize,
    },

    /// The fiber body threw
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl SchedulerError {
    /// The script error, if this is one
    pub fn as_script(&self) -> Option<&ScriptError> {
        match self {
            SchedulerError::Script(e) => Some(e),
            _ => None,
        }
    }
}

/// Scheduler failures raised inside a fiber body surface as script errors
impl From<SchedulerError> for ScriptError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Script(e) => e,
            other => ScriptError::typed("Error", other.to_string()),
        }
    }
}

/// Scheduler result type
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Abort on corrupted scheduler state
///
/// Invariant violations (a fiber completing twice, an unbalanced live list)
/// mean the scheduler's bookkeeping can no longer be trusted.
#[cold]
pub(crate) fn fatal(message: &str) -> ! {
    tracing::error!("fatal scheduler error: {}", message);
    std::process::abort()
}
