//! Loop-to-console notifications.
//!
//! The evaluation loop never talks to the terminal directly; it emits
//! [`InterpreterEvent`]s through an [`EventDispatcher`], which tracks the
//! set of live task ids and drives the [`ConsoleUi`](crate::terminal::ConsoleUi).
//! Events can arrive from the loop thread or from a background task's done
//! hook, so the dispatcher is internally locked.

use std::sync::{Arc, Mutex};

use crate::terminal::ConsoleUi;

/// One lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpreterEvent {
    /// The loop wants the next statement; carries the prompt to display.
    Ready(String),
    /// The task with this id started running (or was detached and is
    /// still running).
    Busy(u64),
    /// The task with this id completed.
    Done(u64),
}

/// Routes events to the console and keeps the running-task set current.
pub struct EventDispatcher {
    ui: Arc<dyn ConsoleUi>,
    running: Mutex<Vec<u64>>,
}

impl EventDispatcher {
    pub fn new(ui: Arc<dyn ConsoleUi>) -> Self {
        Self {
            ui,
            running: Mutex::new(Vec::new()),
        }
    }

    pub fn ui(&self) -> &dyn ConsoleUi {
        self.ui.as_ref()
    }

    /// Ids of tasks that have gone Busy but not yet Done, oldest first.
    pub fn running(&self) -> Vec<u64> {
        match self.running.lock() {
            Ok(r) => r.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, event: InterpreterEvent) {
        match event {
            InterpreterEvent::Ready(prompt) => {
                self.ui.set_prompt(&prompt);
                self.ui.redisplay();
            }
            InterpreterEvent::Busy(id) => {
                let running = {
                    let mut r = match self.running.lock() {
                        Ok(r) => r,
                        Err(p) => p.into_inner(),
                    };
                    if !r.contains(&id) {
                        r.push(id);
                    }
                    r.clone()
                };
                self.ui.status(&running);
            }
            InterpreterEvent::Done(id) => {
                let running = {
                    let mut r = match self.running.lock() {
                        Ok(r) => r,
                        Err(p) => p.into_inner(),
                    };
                    r.retain(|t| *t != id);
                    r.clone()
                };
                self.ui.status(&running);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::NullUi;

    #[test]
    fn busy_and_done_maintain_the_running_set() {
        let ui = Arc::new(NullUi::new());
        let d = EventDispatcher::new(ui);
        d.dispatch(InterpreterEvent::Busy(1));
        d.dispatch(InterpreterEvent::Busy(2));
        assert_eq!(d.running(), vec![1, 2]);
        d.dispatch(InterpreterEvent::Done(1));
        assert_eq!(d.running(), vec![2]);
        d.dispatch(InterpreterEvent::Done(2));
        assert!(d.running().is_empty());
    }

    #[test]
    fn duplicate_busy_is_idempotent() {
        let ui = Arc::new(NullUi::new());
        let d = EventDispatcher::new(ui);
        d.dispatch(InterpreterEvent::Busy(7));
        d.dispatch(InterpreterEvent::Busy(7));
        assert_eq!(d.running(), vec![7]);
    }

    #[test]
    fn ready_updates_the_prompt() {
        let ui = Arc::new(NullUi::new());
        let d = EventDispatcher::new(Arc::clone(&ui) as Arc<dyn ConsoleUi>);
        d.dispatch(InterpreterEvent::Ready("brio % ".into()));
        assert_eq!(ui.last_prompt(), "brio % ");
    }
}
