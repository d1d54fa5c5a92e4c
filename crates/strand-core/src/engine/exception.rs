//! Script exceptions raised by fiber bodies

/// An error thrown by script code
///
/// This is what a fiber body returns on failure, what `join()` hands back to
/// the joiner, and what the error reporter receives for fibers nobody joined.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ScriptError {
    /// Error class name (e.g. `Error`, `TypeError`)
    pub name: String,

    /// Human readable message
    pub message: String,

    /// Stack trace captured where the error was raised, if any
    pub stack: Option<String>,
}

impl ScriptError {
    /// Create a plain `Error`
    pub fn new(message: impl Into<String>) -> Self {
        Self::typed("Error", message)
    }

    /// Create an error with an explicit class name
    pub fn typed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack trace
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build an error from a caught panic payload
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "fiber body panicked".to_string()
        };
        Self::typed("InternalError", message)
    }
}
