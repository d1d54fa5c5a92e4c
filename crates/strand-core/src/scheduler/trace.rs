//! Fiber call traces

use parking_lot::Mutex;
use std::fmt::Write as _;

/// Maximum number of frames rendered in a trace
pub const MAX_TRACE_DEPTH: usize = 300;

/// Call frames of one fiber plus the last rendered snapshot
#[derive(Debug, Default)]
pub(crate) struct TraceState {
    frames: Mutex<Vec<String>>,
    cached: Mutex<String>,
}

impl TraceState {
    pub(crate) fn push(&self, name: &str) {
        self.frames.lock().push(name.to_string());
    }

    pub(crate) fn pop(&self) {
        self.frames.lock().pop();
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Render the live frames, innermost first
    pub(crate) fn capture(&self, max_depth: usize) -> String {
        render(&self.frames.lock(), max_depth)
    }

    /// Render the live frames into the cached snapshot
    pub(crate) fn record(&self) {
        let rendered = self.capture(MAX_TRACE_DEPTH);
        *self.cached.lock() = rendered;
    }

    pub(crate) fn cached(&self) -> String {
        self.cached.lock().clone()
    }
}

fn render(frames: &[String], max_depth: usize) -> String {
    let mut out = String::new();
    for name in frames.iter().rev().take(max_depth) {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(out, "    at {}", name);
    }
    out
}
