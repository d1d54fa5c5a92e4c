//! Callable fiber bodies

use crate::engine::ScriptError;
use crate::scheduler::Fiber;
use crate::value::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

type Body = dyn Fn(&Arc<Fiber>, &[Value]) -> Result<Value, ScriptError> + Send + Sync;

/// A named script function
///
/// The body receives the fiber it runs on (the `this` of the call) and the
/// captured arguments, and either returns a value or throws.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    body: Arc<Body>,
}

impl Function {
    /// Wrap a closure as a script function
    pub fn new<F>(name: impl AsRef<str>, body: F) -> Self
    where
        F: Fn(&Arc<Fiber>, &[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.as_ref()),
            body: Arc::new(body),
        }
    }

    /// Function name, used as the outermost trace frame
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function
    ///
    /// A panic inside the body is caught and turned into a [`ScriptError`],
    /// so a misbehaving body can never take a worker thread down with it.
    pub fn invoke(&self, this: &Arc<Fiber>, args: &[Value]) -> Result<Value, ScriptError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.body)(this, args))) {
            Ok(result) => result,
            Err(payload) => Err(ScriptError::from_panic(payload.as_ref())),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}
