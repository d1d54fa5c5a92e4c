//! Scheduler configuration
//!
//! Defaults can be overridden programmatically with the builder methods or
//! from the environment:
//!
//! | Variable               | Field           | Default         |
//! |------------------------|-----------------|-----------------|
//! | `STRAND_SPARE_WORKERS` | `spare_workers` | 256             |
//! | `STRAND_STACK_SIZE`    | `stack_size`    | 262144 (bytes)  |
//! | `STRAND_MAX_FIBERS`    | `max_fibers`    | 10000           |
//! | `STRAND_WORKER_NAME`   | `worker_name`   | `strand-worker` |
//!
//! Unset or unparsable variables fall back to the default.

use std::str::FromStr;

/// Default ceiling on idle workers before they start retiring
pub const DEFAULT_SPARE_WORKERS: usize = 256;

/// Default OS stack size for worker threads, in bytes
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Default soft ceiling on fibers in flight per context
pub const DEFAULT_MAX_FIBERS: usize = 10_000;

/// Default worker thread name prefix
pub const DEFAULT_WORKER_NAME: &str = "strand-worker";

/// Configuration for an execution context's worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Idle workers allowed before extra ones retire (at least 1)
    pub spare_workers: usize,

    /// Stack size of each worker thread in bytes
    pub stack_size: usize,

    /// Soft ceiling on started-but-unfinished fibers, checked by
    /// `ExecutionContext::spawn`
    pub max_fibers: usize,

    /// Prefix for worker thread names
    pub worker_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            spare_workers: DEFAULT_SPARE_WORKERS,
            stack_size: DEFAULT_STACK_SIZE,
            max_fibers: DEFAULT_MAX_FIBERS,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from `STRAND_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self::new()
            .spare_workers(env_get("STRAND_SPARE_WORKERS", defaults.spare_workers))
            .stack_size(env_get("STRAND_STACK_SIZE", defaults.stack_size))
            .max_fibers(env_get("STRAND_MAX_FIBERS", defaults.max_fibers))
            .worker_name(env_get("STRAND_WORKER_NAME", defaults.worker_name))
    }

    /// Set the spare worker cap (clamped to at least 1 so the pool always
    /// keeps a worker waiting for jobs)
    pub fn spare_workers(mut self, n: usize) -> Self {
        self.spare_workers = n.max(1);
        self
    }

    /// Set the worker thread stack size in bytes
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Set the fiber ceiling
    pub fn max_fibers(mut self, n: usize) -> Self {
        self.max_fibers = n;
        self
    }

    /// Set the worker thread name prefix
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}

/// Parse an environment variable, or return `default`
fn env_get<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
