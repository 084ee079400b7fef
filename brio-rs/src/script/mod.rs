//! The brio scripting engine.
//!
//! [`Engine`] holds the shared runtime state: global variables, user
//! function definitions, and the output sink. It is `Sync` — worker
//! threads evaluating concurrently share one engine behind `Arc`, with
//! the two namespaces independently locked. Per-statement state (the
//! call stack) lives in [`crate::context::ExecutionContext`] instead and
//! is never shared between statements.

pub mod eval;
pub mod expr;
pub mod stmt;
pub mod value;

use std::collections::HashMap;
use std::fmt;
use std::io::{BufReader, Write};
use std::sync::Mutex;

use crate::context::ExecutionContext;
use crate::task::CancelToken;

pub use eval::{eval_expr, eval_top};
pub use expr::Expr;
pub use stmt::{parse_statement, StatementReader, Stmt};
pub use value::Value;

/// Prompt used when the script namespace defines no `prompt()` function.
pub const DEFAULT_PROMPT: &str = "brio % ";

/// How many numbered result slots (`$1` .. `$5`) are kept.
pub const RESULT_WINDOW: usize = 5;

// ── Errors ────────────────────────────────────────────────────────────────

/// Everything that can go wrong between reading a statement and printing
/// its result.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The statement never became a tree. No task was submitted.
    Parse(String),
    /// The statement ran and failed.
    Eval(String),
    /// An engine invariant broke. Reported loudly, never fatal.
    Internal(String),
    /// The task observed its cancellation token.
    Interrupted,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Parse(msg) => write!(f, "parse error: {msg}"),
            EngineError::Eval(msg) => write!(f, "error: {msg}"),
            EngineError::Internal(msg) => write!(f, "internal error: {msg}"),
            EngineError::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Result of evaluating one statement, with `return` distinguished so the
/// caller can unwrap it exactly once at the top level.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Value(Value),
    Return(Value),
}

impl Evaluated {
    /// Collapse the control wrapper into the carried value.
    pub fn into_value(self) -> Value {
        match self {
            Evaluated::Value(v) | Evaluated::Return(v) => v,
        }
    }
}

/// A user function definition, stored by name in the engine.
#[derive(Debug, Clone)]
pub struct FnDef {
    pub params: Vec<String>,
    pub body: Expr,
}

// ── Engine ────────────────────────────────────────────────────────────────

/// Shared scripting runtime.
pub struct Engine {
    globals: Mutex<HashMap<String, Value>>,
    functions: Mutex<HashMap<String, FnDef>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            globals: Mutex::new(HashMap::new()),
            functions: Mutex::new(HashMap::new()),
            out: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    /// Redirect `print()` output, mainly for tests.
    pub fn set_output(&self, sink: Box<dyn Write + Send>) {
        if let Ok(mut out) = self.out.lock() {
            *out = sink;
        }
    }

    pub fn print_line(&self, line: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals
            .lock()
            .ok()
            .and_then(|g| g.get(name).cloned())
    }

    pub fn set_global(&self, name: &str, value: Value) {
        if let Ok(mut g) = self.globals.lock() {
            g.insert(name.to_owned(), value);
        }
    }

    pub fn define_fn(&self, name: &str, params: Vec<String>, body: Expr) {
        if let Ok(mut f) = self.functions.lock() {
            f.insert(name.to_owned(), FnDef { params, body });
        }
    }

    pub fn get_fn(&self, name: &str) -> Option<FnDef> {
        self.functions
            .lock()
            .ok()
            .and_then(|f| f.get(name).cloned())
    }

    // ── Result slots ──────────────────────────────────────────────────────

    /// Record a statement's value into the rotating result slots: the
    /// newest value lands in `$1` (and its alias `$_`), older values shift
    /// toward `$5` and fall off. `void` results are not recorded.
    pub fn record_result(&self, value: &Value) {
        if matches!(value, Value::Void) {
            return;
        }
        if let Ok(mut g) = self.globals.lock() {
            for i in (1..RESULT_WINDOW).rev() {
                if let Some(prev) = g.get(&format!("${i}")).cloned() {
                    g.insert(format!("${}", i + 1), prev);
                }
            }
            g.insert("$1".to_owned(), value.clone());
            g.insert("$_".to_owned(), value.clone());
        }
    }

    /// Record the last evaluation error into `$_e`.
    pub fn record_error(&self, err: &EngineError) {
        if let Ok(mut g) = self.globals.lock() {
            g.insert("$_e".to_owned(), Value::Str(err.to_string()));
        }
    }

    // ── Prompt hook ───────────────────────────────────────────────────────

    /// Compute the prompt for the next READY event: the script-defined
    /// `prompt()` if there is one, the built-in default otherwise. A
    /// failing or void `prompt()` falls back to the default rather than
    /// breaking the console.
    pub fn prompt_string(&self) -> String {
        if self.get_fn("prompt").is_some() {
            let call = Expr::Call("prompt".to_owned(), Vec::new());
            let mut ctx = ExecutionContext::new();
            match eval_expr(self, &call, &mut ctx, &CancelToken::new()) {
                Ok(Value::Void) | Err(_) => {}
                Ok(v) => return v.to_string(),
            }
        }
        DEFAULT_PROMPT.to_owned()
    }

    // ── Batch evaluation ──────────────────────────────────────────────────

    /// Evaluate a whole source text statement by statement, stopping at the
    /// first error. Used for init scripts and `-c` one-shots; interactive
    /// input goes through the evaluation loop instead.
    pub fn eval_source(&self, src: &str, cancel: &CancelToken) -> Result<Value, EngineError> {
        let mut reader = StatementReader::new(BufReader::new(src.as_bytes()));
        let mut ctx = ExecutionContext::new();
        let mut last = Value::Void;
        loop {
            let chunk = match reader.next_statement() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return Ok(last),
                Err(msg) => return Err(EngineError::Parse(msg)),
            };
            let stmt = parse_statement(&chunk).map_err(EngineError::Parse)?;
            last = eval_top(self, &stmt, &mut ctx, cancel)?.into_value();
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
