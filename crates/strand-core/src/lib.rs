//! Strand Core Runtime
//!
//! This crate provides a fiber scheduler for a single-writer script engine:
//! - Fibers with start/join semantics and captured outcomes
//! - A self-sizing worker pool fed by a FIFO job queue
//! - An execution lock handed between fibers at well-defined points
//! - Per-fiber context bindings inherited from the starting fiber
//! - Call traces and reporting of uncaught fiber errors

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod sync;
pub mod value;

pub use config::SchedulerConfig;
pub use engine::{Bindings, ExecutionGuard, ExecutionLock, Function, ScriptError};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{
    ContextId, ErrorReporter, ExecutionContext, Fiber, FiberId, FiberState, PoolStats,
    TracingReporter,
};
pub use sync::Event;
pub use value::Value;
