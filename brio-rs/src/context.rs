//! Per-evaluation call stack.
//!
//! An [`ExecutionContext`] is created fresh for every statement the
//! evaluation loop submits and passed by reference into the task closure —
//! it is never shared between loop iterations, so a backgrounded task can
//! never leak its call stack into the next foreground statement.
//!
//! The depth invariant: after a top-level statement completes the stack
//! must be back at the root frame. A deeper stack means an evaluator bug;
//! the loop reports it as an internal error and calls [`ExecutionContext::reset`].

use std::collections::HashMap;

use crate::script::value::Value;

/// Upper bound on call-stack depth (bounds script recursion).
pub const MAX_DEPTH: usize = 64;

/// One namespace frame: the local bindings of a function call.
#[derive(Debug, Default)]
pub struct Frame {
    pub locals: HashMap<String, Value>,
    /// Name of the called function, for error messages.
    pub name: String,
}

/// A depth-bounded, linear sequence of namespace frames.
#[derive(Debug)]
pub struct ExecutionContext {
    frames: Vec<Frame>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// A fresh context holding only the root frame (depth 1).
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                locals: HashMap::new(),
                name: "<top>".to_owned(),
            }],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a call frame. Fails when the stack would exceed [`MAX_DEPTH`].
    pub fn push(&mut self, name: &str, locals: HashMap<String, Value>) -> Result<(), String> {
        if self.frames.len() >= MAX_DEPTH {
            return Err(format!(
                "call depth exceeded ({MAX_DEPTH}) calling {name}()"
            ));
        }
        self.frames.push(Frame {
            locals,
            name: name.to_owned(),
        });
        Ok(())
    }

    pub fn pop(&mut self) {
        // The root frame is never popped.
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Look up a local in the innermost frame.
    pub fn get_local(&self, name: &str) -> Option<&Value> {
        self.frames.last().and_then(|f| f.locals.get(name))
    }

    /// Bind a local in the innermost frame. Returns false at top level,
    /// where assignments belong to the global namespace instead.
    pub fn set_local(&mut self, name: &str, value: Value) -> bool {
        if self.frames.len() == 1 {
            return false;
        }
        if let Some(f) = self.frames.last_mut() {
            f.locals.insert(name.to_owned(), value);
        }
        true
    }

    /// Whether we are inside a function call (below the root frame).
    pub fn in_call(&self) -> bool {
        self.frames.len() > 1
    }

    /// Forcibly unwind back to the root frame.
    pub fn reset(&mut self) {
        self.frames.truncate(1);
        if let Some(root) = self.frames.first_mut() {
            root.locals.clear();
        }
    }
}
