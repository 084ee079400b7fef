//! brio — a small embeddable scripting engine with an interactive console.
//!
//! The console is three cooperating threads:
//!
//! * The **reader thread** (the binary's main thread) owns real stdin. It
//!   feeds raw line bytes into the current [`session::ConsoleSession`]'s
//!   pipe and is the only thread that reacts to signals.
//! * The **evaluation loop** ([`eval_loop::EvalLoop`]) parses statements
//!   off the pipe, submits each one as a cancellable task, and polls for
//!   its result in short slices so interrupts stay responsive.
//! * **Worker threads** ([`runner::TaskRunner`]) evaluate one statement
//!   each against the shared [`script::Engine`], started by direct
//!   hand-off and reclaimed after an idle keepalive.
//!
//! Ctrl-C cancels the running statement, or discards a half-typed one by
//! swapping the console session. Ctrl-Z detaches the running statement to
//! the background; its id stays on the status line until it finishes.

pub mod cli;
pub mod context;
pub mod embedded;
pub mod eval_loop;
pub mod event;
pub mod runner;
pub mod script;
pub mod session;
pub mod signals;
pub mod task;
pub mod terminal;
