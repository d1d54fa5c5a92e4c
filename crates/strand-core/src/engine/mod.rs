//! Engine boundary
//!
//! The scheduler treats the script engine as an opaque execution context.
//! These are the only primitives it relies on: a lock serializing engine
//! access, a way to invoke a function, a property bag that can be copied
//! from one fiber to another, a memory scope around each call, and the
//! exception type a call can raise.

mod bindings;
mod exception;
mod function;
mod lock;
mod scope;

pub use bindings::Bindings;
pub use exception::ScriptError;
pub use function::Function;
pub use lock::{ExecutionGuard, ExecutionLock, Unlocker};
pub use scope::{HandleScope, ScopeCounter};
