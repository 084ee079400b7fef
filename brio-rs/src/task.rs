//! Cancellable evaluation tasks.
//!
//! A [`TaskHandle`] is the loop's view of one submitted statement: it can
//! poll for the result with a timeout, request cooperative cancellation,
//! or be dropped entirely when the task is detached to the background.
//! Completion is once-only and completion wins over cancellation: a task
//! that finishes before its worker observes the cancel keeps its result,
//! and the done notification fires exactly once either way.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::script::{EngineError, Value};

/// Cooperative cancellation flag, checked by the evaluator at expression
/// nodes and inside `sleep()`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a task produced.
pub type TaskResult = Result<Value, EngineError>;

type DoneHook = Box<dyn FnOnce(&TaskHandle) + Send>;

struct Shared {
    id: u64,
    cancel: CancelToken,
    cancel_requested: AtomicBool,
    slot: Mutex<Option<TaskResult>>,
    done: Condvar,
    on_done: Mutex<Option<DoneHook>>,
}

/// Shared handle to one in-flight evaluation.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<Shared>,
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::SeqCst),
                cancel: CancelToken::new(),
                cancel_requested: AtomicBool::new(false),
                slot: Mutex::new(None),
                done: Condvar::new(),
                on_done: Mutex::new(None),
            }),
        }
    }

    /// Stable task id, used in the status line (`T3`) and reports.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// The token the worker threads through the evaluator.
    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    /// Request cooperative cancellation. Returns false when the task had
    /// already completed; its result stands in that case.
    pub fn cancel(&self) -> bool {
        let slot = match self.shared.slot.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };
        if slot.is_some() {
            return false;
        }
        self.shared.cancel_requested.store(true, Ordering::SeqCst);
        self.shared.cancel.cancel();
        true
    }

    /// Whether cancellation was requested before the task completed.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn is_done(&self) -> bool {
        match self.shared.slot.lock() {
            Ok(s) => s.is_some(),
            Err(p) => p.into_inner().is_some(),
        }
    }

    /// Deliver the task's result. The first completion wins; later calls
    /// are ignored. Fires the done hook (if any) exactly once.
    pub fn complete(&self, result: TaskResult) {
        {
            let mut slot = match self.shared.slot.lock() {
                Ok(s) => s,
                Err(p) => p.into_inner(),
            };
            if slot.is_some() {
                return;
            }
            *slot = Some(result);
            self.shared.done.notify_all();
        }
        // Fired outside the slot lock; the hook may inspect the handle.
        let hook = match self.shared.on_done.lock() {
            Ok(mut h) => h.take(),
            Err(p) => p.into_inner().take(),
        };
        if let Some(hook) = hook {
            hook(self);
        }
    }

    /// Install the done notification. When the task has already completed
    /// the hook fires immediately, so a late install cannot lose the event.
    pub fn set_on_done(&self, hook: DoneHook) {
        let fire_now = {
            let slot = match self.shared.slot.lock() {
                Ok(s) => s,
                Err(p) => p.into_inner(),
            };
            let already_done = slot.is_some();
            if !already_done {
                if let Ok(mut h) = self.shared.on_done.lock() {
                    *h = Some(hook);
                    return;
                }
            }
            already_done
        };
        if fire_now {
            hook(self);
        }
    }

    /// Wait up to `timeout` for the result. `None` means still running.
    pub fn poll_result(&self, timeout: Duration) -> Option<TaskResult> {
        let mut slot = match self.shared.slot.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };
        if slot.is_none() {
            let (guard, _) = match self.shared.done.wait_timeout(slot, timeout) {
                Ok(r) => r,
                Err(p) => p.into_inner(),
            };
            slot = guard;
        }
        slot.clone()
    }

    /// The result, if the task has completed.
    pub fn result(&self) -> Option<TaskResult> {
        match self.shared.slot.lock() {
            Ok(s) => s.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
