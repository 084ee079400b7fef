//! Worker threads for evaluation tasks.
//!
//! The runner never queues: a submitted task starts immediately, either by
//! direct hand-off to a worker already waiting between tasks or on a
//! freshly spawned thread. Workers that stay idle past the keepalive
//! window exit, so an idle console carries no threads and a burst of
//! backgrounded tasks gets one thread each.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::task::{CancelToken, TaskHandle, TaskResult};
use crate::script::EngineError;

/// How long an idle worker waits for the next hand-off before exiting.
pub const WORKER_KEEPALIVE: Duration = Duration::from_secs(60);

type Work = Box<dyn FnOnce(&CancelToken) -> TaskResult + Send>;

#[derive(Default)]
struct Handoff {
    /// Workers currently waiting for a job.
    idle: usize,
    /// At most one job in flight between submit and pickup.
    job: Option<(Work, TaskHandle)>,
}

struct Inner {
    state: Mutex<Handoff>,
    available: Condvar,
    keepalive: Duration,
}

/// Spawns and reuses worker threads, one task per worker at a time.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<Inner>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::with_keepalive(WORKER_KEEPALIVE)
    }

    pub fn with_keepalive(keepalive: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(Handoff::default()),
                available: Condvar::new(),
                keepalive,
            }),
        }
    }

    /// Start `work` on a worker thread and return its handle. The task is
    /// running (or about to run) when this returns; nothing is ever queued
    /// behind another task.
    pub fn submit<F>(&self, work: F) -> TaskHandle
    where
        F: FnOnce(&CancelToken) -> TaskResult + Send + 'static,
    {
        let handle = TaskHandle::new();
        let job: (Work, TaskHandle) = (Box::new(work), handle.clone());

        {
            let mut st = match self.inner.state.lock() {
                Ok(s) => s,
                Err(p) => p.into_inner(),
            };
            if st.idle > 0 && st.job.is_none() {
                st.job = Some(job);
                self.inner.available.notify_one();
                return handle;
            }
        }

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("brio-worker-{}", handle.id()))
            .spawn(move || worker_loop(inner, job));
        if let Err(e) = spawned {
            handle.complete(Err(EngineError::Internal(format!(
                "failed to spawn worker thread: {e}"
            ))));
        }
        handle
    }

    /// Number of workers currently parked between tasks.
    pub fn idle_workers(&self) -> usize {
        match self.inner.state.lock() {
            Ok(s) => s.idle,
            Err(p) => p.into_inner().idle,
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn worker_loop(inner: Arc<Inner>, first: (Work, TaskHandle)) {
    let mut job = first;
    loop {
        let (work, handle) = job;
        let token = handle.cancel_token();
        // A panicking task must still resolve its handle, or the loop
        // polls it forever.
        let result = catch_unwind(AssertUnwindSafe(|| work(&token)))
            .unwrap_or_else(|_| Err(EngineError::Internal("task panicked".to_owned())));
        handle.complete(result);

        job = match wait_for_handoff(&inner) {
            Some(next) => next,
            None => return,
        };
    }
}

/// Park until a job is handed off or the keepalive window lapses.
fn wait_for_handoff(inner: &Inner) -> Option<(Work, TaskHandle)> {
    let mut st = match inner.state.lock() {
        Ok(s) => s,
        Err(p) => p.into_inner(),
    };
    st.idle += 1;
    let deadline = Instant::now() + inner.keepalive;
    loop {
        if let Some(job) = st.job.take() {
            st.idle -= 1;
            return Some(job);
        }
        let now = Instant::now();
        if now >= deadline {
            st.idle -= 1;
            return None;
        }
        st = match inner.available.wait_timeout(st, deadline - now) {
            Ok((guard, _)) => guard,
            Err(p) => p.into_inner().0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Value;

    #[test]
    fn submitted_work_runs_and_delivers() {
        let runner = TaskRunner::new();
        let handle = runner.submit(|_| Ok(Value::Int(42)));
        let result = handle.poll_result(Duration::from_secs(2));
        assert_eq!(result, Some(Ok(Value::Int(42))));
    }

    #[test]
    fn tasks_run_concurrently_not_queued() {
        let runner = TaskRunner::new();
        let slow = runner.submit(|token| {
            let start = Instant::now();
            while start.elapsed() < Duration::from_millis(500) {
                if token.is_cancelled() {
                    return Err(EngineError::Interrupted);
                }
                thread::sleep(Duration::from_millis(5));
            }
            Ok(Value::Int(1))
        });
        let quick = runner.submit(|_| Ok(Value::Int(2)));
        // The quick task finishes while the slow one still runs.
        let result = quick.poll_result(Duration::from_millis(200));
        assert_eq!(result, Some(Ok(Value::Int(2))));
        assert!(!slow.is_done());
        slow.cancel();
    }

    #[test]
    fn idle_worker_is_reused_within_keepalive() {
        let runner = TaskRunner::with_keepalive(Duration::from_secs(5));
        let first = runner.submit(|_| Ok(Value::Void));
        first.poll_result(Duration::from_secs(2));
        // Give the worker a moment to park.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(runner.idle_workers(), 1);

        let second = runner.submit(|_| Ok(Value::Int(9)));
        assert_eq!(
            second.poll_result(Duration::from_secs(2)),
            Some(Ok(Value::Int(9)))
        );
    }

    #[test]
    fn idle_worker_exits_after_keepalive() {
        let runner = TaskRunner::with_keepalive(Duration::from_millis(50));
        let handle = runner.submit(|_| Ok(Value::Void));
        handle.poll_result(Duration::from_secs(2));
        thread::sleep(Duration::from_millis(250));
        assert_eq!(runner.idle_workers(), 0);
    }

    #[test]
    fn panicking_task_still_resolves_its_handle() {
        let runner = TaskRunner::new();
        let handle = runner.submit(|_| panic!("worker blew up"));
        let result = handle.poll_result(Duration::from_secs(2));
        assert!(
            matches!(result, Some(Err(EngineError::Internal(_)))),
            "got {result:?}"
        );

        // The worker survives and keeps accepting hand-offs.
        let next = runner.submit(|_| Ok(Value::Int(1)));
        assert_eq!(
            next.poll_result(Duration::from_secs(2)),
            Some(Ok(Value::Int(1)))
        );
    }

    #[test]
    fn cancellation_interrupts_a_running_task() {
        let runner = TaskRunner::new();
        let handle = runner.submit(|token| {
            loop {
                if token.is_cancelled() {
                    return Err(EngineError::Interrupted);
                }
                thread::sleep(Duration::from_millis(5));
            }
        });
        thread::sleep(Duration::from_millis(30));
        assert!(handle.cancel());
        let result = handle.poll_result(Duration::from_secs(2));
        assert_eq!(result, Some(Err(EngineError::Interrupted)));
    }
}
