//! Interrupt handling.
//!
//! The async-signal-safe part is tiny: the `sigaction` handlers only set
//! a pending flag. The reader thread notices (its blocked `read` returns
//! `EINTR` because the handlers install without `SA_RESTART`) and calls
//! [`SignalController::poll_signals`], which performs the real work on an
//! ordinary thread.
//!
//! Ctrl-C aborts: a running foreground task is cancelled through its
//! token; with no task but a half-parsed statement pending, the current
//! session is discarded and swapped for a fresh one. Ctrl-Z suspends:
//! the foreground task is flagged for detach and the loop lets it finish
//! in the background.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::session::SessionSlot;
use crate::task::TaskHandle;

static SIGINT_PENDING: AtomicBool = AtomicBool::new(false);
static SIGTSTP_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn note_signal(sig: libc::c_int) {
    // Async-signal-safe: a single atomic store, nothing else.
    match sig {
        libc::SIGINT => SIGINT_PENDING.store(true, Ordering::SeqCst),
        libc::SIGTSTP => SIGTSTP_PENDING.store(true, Ordering::SeqCst),
        _ => {}
    }
}

/// Install the SIGINT / SIGTSTP handlers. Without `SA_RESTART`, so the
/// reader thread's blocked `read(2)` returns `EINTR` and gets a chance to
/// call [`SignalController::poll_signals`].
pub fn install_handlers() -> io::Result<()> {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = note_signal as usize;
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_flags = 0;
        for sig in [libc::SIGINT, libc::SIGTSTP] {
            if libc::sigaction(sig, &sa, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

/// What an abort request ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortAction {
    /// A foreground task was cancelled; its id.
    CancelledTask(u64),
    /// No task was running but a partial statement existed; the session
    /// was swapped and the input discarded.
    DiscardedInput,
    /// Nothing to do.
    Idle,
}

/// Mediates between signals and the evaluation loop.
///
/// The loop publishes its foreground task and its reader's dirty flag
/// here; the controller decides, per signal, whether to cancel, discard,
/// or detach.
pub struct SignalController {
    slot: SessionSlot,
    foreground: Mutex<Option<TaskHandle>>,
    dirty: Mutex<Arc<AtomicBool>>,
    /// Id of the task a suspend asked to detach, 0 for none. Carrying the
    /// id (task ids start at 1) keeps a request that raced with task
    /// completion from detaching the next statement.
    detach: Arc<AtomicU64>,
}

impl SignalController {
    pub fn new(slot: SessionSlot, dirty: Arc<AtomicBool>) -> Self {
        Self {
            slot,
            foreground: Mutex::new(None),
            dirty: Mutex::new(dirty),
            detach: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The loop publishes the task it is polling (`None` when idle).
    pub fn set_foreground(&self, task: Option<TaskHandle>) {
        if let Ok(mut fg) = self.foreground.lock() {
            *fg = task;
        }
    }

    /// After a session swap the loop adopts a new statement reader; its
    /// dirty flag replaces the old one here.
    pub fn set_dirty_flag(&self, dirty: Arc<AtomicBool>) {
        if let Ok(mut d) = self.dirty.lock() {
            *d = dirty;
        }
    }

    /// Shared detach request, checked by the loop each poll round. Holds
    /// the id of the task to detach, 0 when no request is pending.
    pub fn detach_request(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.detach)
    }

    /// Ctrl-C semantics.
    pub fn abort(&self) -> AbortAction {
        let task = self
            .foreground
            .lock()
            .ok()
            .and_then(|fg| fg.as_ref().cloned());
        if let Some(task) = task {
            if task.cancel() {
                return AbortAction::CancelledTask(task.id());
            }
            // Completed in the race window; the loop will pick up the
            // result normally.
            return AbortAction::Idle;
        }

        let dirty = match self.dirty.lock() {
            Ok(d) => d.load(Ordering::SeqCst),
            Err(p) => p.into_inner().load(Ordering::SeqCst),
        };
        if dirty {
            self.slot.swap();
            return AbortAction::DiscardedInput;
        }
        AbortAction::Idle
    }

    /// Ctrl-Z semantics. Returns true when a foreground task existed and
    /// was flagged for detach.
    pub fn suspend(&self) -> bool {
        let task = self
            .foreground
            .lock()
            .ok()
            .and_then(|fg| fg.as_ref().cloned());
        match task {
            Some(task) => {
                self.detach.store(task.id(), Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Drain pending signal flags set by the handlers. Called from the
    /// reader thread after an interrupted read (and once per line).
    pub fn poll_signals(&self) -> Option<AbortAction> {
        if SIGTSTP_PENDING.swap(false, Ordering::SeqCst) {
            self.suspend();
            return None;
        }
        if SIGINT_PENDING.swap(false, Ordering::SeqCst) {
            return Some(self.abort());
        }
        None
    }
}
