//! The evaluation loop.
//!
//! One thread runs this loop for the life of the console. Each iteration
//! announces readiness with the current prompt, blocks until the session
//! pipe yields one complete statement, submits it to the task runner, and
//! polls the handle in short slices so interrupt requests stay
//! responsive. Three things can end the polling phase: the task
//! completes, the signal controller cancels it (Ctrl-C), or the detach
//! flag moves it to the background (Ctrl-Z) and the loop goes straight
//! back to reading.
//!
//! A session swap (abort during a half-typed statement) surfaces here as
//! EOF on the old pipe with a replacement reader pending in the slot: the
//! parse error is suppressed, `(...)` marks the discarded input, and the
//! loop adopts the fresh reader.

use std::io::BufReader;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::event::{EventDispatcher, InterpreterEvent};
use crate::runner::TaskRunner;
use crate::script::{
    eval_top, parse_statement, Engine, EngineError, Evaluated, StatementReader, Stmt, Value,
};
use crate::session::{PipeReader, SessionSlot};
use crate::signals::SignalController;
use crate::task::TaskHandle;

/// Poll slice while a foreground task runs. Short enough that an abort or
/// suspend feels immediate.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Printed in place of input discarded by an abort.
const DISCARD_MARK: &str = "(...)";

pub struct EvalLoop {
    engine: Arc<Engine>,
    runner: TaskRunner,
    slot: SessionSlot,
    controller: Arc<SignalController>,
    dispatcher: Arc<EventDispatcher>,
    /// Echo `=> value : type` after each successful statement.
    show_results: bool,
}

impl EvalLoop {
    pub fn new(
        engine: Arc<Engine>,
        runner: TaskRunner,
        slot: SessionSlot,
        controller: Arc<SignalController>,
        dispatcher: Arc<EventDispatcher>,
        show_results: bool,
    ) -> Self {
        Self {
            engine,
            runner,
            slot,
            controller,
            dispatcher,
            show_results,
        }
    }

    /// Drive the loop until real end-of-input.
    pub fn run(&self, reader: PipeReader) {
        let mut stmts = StatementReader::new(BufReader::new(reader));
        self.controller.set_dirty_flag(stmts.dirty_flag());

        loop {
            self.dispatcher
                .dispatch(InterpreterEvent::Ready(self.engine.prompt_string()));

            let chunk = match stmts.next_statement() {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    if let Some(next) = self.adopt_swapped_session() {
                        stmts = next;
                        continue;
                    }
                    return;
                }
                Err(msg) => {
                    // EOF inside a statement. After a swap this is the
                    // expected death of the discarded input; otherwise the
                    // input really ended mid-statement.
                    if let Some(next) = self.adopt_swapped_session() {
                        stmts = next;
                        continue;
                    }
                    let err = EngineError::Parse(msg);
                    self.engine.record_error(&err);
                    self.dispatcher.ui().report(&err.to_string());
                    return;
                }
            };

            let stmt = match parse_statement(&chunk) {
                Ok(stmt) => stmt,
                Err(msg) => {
                    let err = EngineError::Parse(msg);
                    self.engine.record_error(&err);
                    self.dispatcher.ui().report(&err.to_string());
                    continue;
                }
            };
            if stmt == Stmt::Empty {
                continue;
            }

            let handle = self.submit(stmt);
            // Publish the foreground task before announcing Busy, so an
            // abort arriving right after the status update finds it.
            self.controller.set_foreground(Some(handle.clone()));
            self.dispatcher
                .dispatch(InterpreterEvent::Busy(handle.id()));

            self.poll_to_completion(handle);
        }
    }

    /// After EOF on the current pipe, check whether the controller swapped
    /// the session. If so, print the discard mark and hand back a reader
    /// over the replacement pipe.
    fn adopt_swapped_session(&self) -> Option<StatementReader<BufReader<PipeReader>>> {
        let pending = self.slot.take_pending()?;
        self.dispatcher.ui().report(DISCARD_MARK);
        let stmts = StatementReader::new(BufReader::new(pending));
        self.controller.set_dirty_flag(stmts.dirty_flag());
        Some(stmts)
    }

    fn submit(&self, stmt: Stmt) -> TaskHandle {
        let engine = Arc::clone(&self.engine);
        self.runner.submit(move |token| {
            let mut ctx = ExecutionContext::new();
            eval_top(&engine, &stmt, &mut ctx, token).map(Evaluated::into_value)
        })
    }

    fn poll_to_completion(&self, handle: TaskHandle) {
        let detach = self.controller.detach_request();
        loop {
            // A request naming any other task is stale (that task already
            // completed before the suspend landed) and is dropped.
            let requested = detach.swap(0, Ordering::SeqCst);
            if requested == handle.id() {
                self.detach(handle);
                return;
            }
            if let Some(result) = handle.poll_result(POLL_TIMEOUT) {
                self.controller.set_foreground(None);
                self.dispatcher
                    .dispatch(InterpreterEvent::Done(handle.id()));
                self.handle_result(result);
                return;
            }
        }
    }

    /// Move the foreground task to the background: stop polling, fire the
    /// Done event whenever it finishes, and go back to reading input. The
    /// task keeps its Busy status chip until then. Its eventual result is
    /// discarded: only the foreground task of a statement writes the
    /// result slots.
    fn detach(&self, handle: TaskHandle) {
        self.controller.set_foreground(None);
        self.dispatcher
            .ui()
            .report(&format!("// T{} running in background", handle.id()));

        let dispatcher = Arc::clone(&self.dispatcher);
        handle.set_on_done(Box::new(move |h| {
            if let Some(Err(e)) = h.result() {
                if e != EngineError::Interrupted {
                    dispatcher.ui().report(&format!("// T{} {e}", h.id()));
                }
            }
            dispatcher.dispatch(InterpreterEvent::Done(h.id()));
        }));
    }

    fn handle_result(&self, result: Result<Value, EngineError>) {
        match result {
            Ok(v) => {
                self.engine.record_result(&v);
                if self.show_results && v != Value::Void {
                    self.dispatcher
                        .ui()
                        .report(&format!("=> {} : {}", v, v.type_name()));
                }
            }
            Err(EngineError::Interrupted) => {
                self.dispatcher.ui().report("// Aborted");
            }
            Err(e) => {
                self.engine.record_error(&e);
                self.dispatcher.ui().report(&e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::{ConsoleUi, NullUi};

    struct Fixture {
        engine: Arc<Engine>,
        slot: SessionSlot,
        controller: Arc<SignalController>,
        ui: Arc<NullUi>,
        reader: Option<PipeReader>,
        show_results: bool,
    }

    impl Fixture {
        fn new(show_results: bool) -> Self {
            let (slot, reader) = SessionSlot::new();
            let dirty = Arc::new(std::sync::atomic::AtomicBool::new(false));
            let controller = Arc::new(SignalController::new(slot.clone(), dirty));
            Self {
                engine: Arc::new(Engine::new()),
                slot,
                controller,
                ui: Arc::new(NullUi::new()),
                reader: Some(reader),
                show_results,
            }
        }

        fn into_loop(mut self) -> (EvalLoop, PipeReader) {
            let dispatcher = Arc::new(EventDispatcher::new(
                Arc::clone(&self.ui) as Arc<dyn ConsoleUi>
            ));
            let reader = self.reader.take().expect("reader");
            let eval_loop = EvalLoop::new(
                Arc::clone(&self.engine),
                TaskRunner::new(),
                self.slot.clone(),
                Arc::clone(&self.controller),
                dispatcher,
                self.show_results,
            );
            (eval_loop, reader)
        }
    }

    #[test]
    fn runs_statements_and_echoes_results() {
        let fx = Fixture::new(true);
        let session = fx.slot.current();
        let engine = Arc::clone(&fx.engine);
        let ui = Arc::clone(&fx.ui);
        let (eval_loop, reader) = fx.into_loop();

        session.write_line("x = 6 * 7").unwrap();
        session.write_line("x").unwrap();
        session.close();
        eval_loop.run(reader);

        assert_eq!(engine.get_global("x"), Some(Value::Int(42)));
        assert!(ui.reports().contains(&"=> 42 : integer".to_owned()));
    }

    #[test]
    fn parse_error_is_reported_and_the_loop_continues() {
        let fx = Fixture::new(true);
        let session = fx.slot.current();
        let engine = Arc::clone(&fx.engine);
        let ui = Arc::clone(&fx.ui);
        let (eval_loop, reader) = fx.into_loop();

        session.write_line("1 +").unwrap();
        session.write_line("2 + 2").unwrap();
        session.close();
        eval_loop.run(reader);

        assert!(ui.reports().iter().any(|r| r.starts_with("parse error:")));
        assert_eq!(engine.get_global("$1"), Some(Value::Int(4)));
    }

    #[test]
    fn stale_suspend_does_not_detach_the_next_statement() {
        let fx = Fixture::new(true);
        let session = fx.slot.current();
        let controller = Arc::clone(&fx.controller);
        let ui = Arc::clone(&fx.ui);
        let (eval_loop, reader) = fx.into_loop();

        // A suspend lands just after its task completes but before the
        // loop clears the foreground slot.
        let finished = crate::task::TaskHandle::new();
        finished.complete(Ok(Value::Int(1)));
        controller.set_foreground(Some(finished));
        assert!(controller.suspend());
        controller.set_foreground(None);

        session.write_line("6 * 7").unwrap();
        session.close();
        eval_loop.run(reader);

        let reports = ui.reports();
        assert!(reports.contains(&"=> 42 : integer".to_owned()), "{reports:?}");
        assert!(
            !reports.iter().any(|r| r.contains("running in background")),
            "{reports:?}"
        );
    }

    #[test]
    fn empty_statement_submits_no_task() {
        let fx = Fixture::new(true);
        let session = fx.slot.current();
        let ui = Arc::clone(&fx.ui);
        let (eval_loop, reader) = fx.into_loop();

        session.write_line(";").unwrap();
        session.close();
        eval_loop.run(reader);

        assert!(ui.statuses().is_empty());
        assert!(ui.reports().is_empty());
    }
}
