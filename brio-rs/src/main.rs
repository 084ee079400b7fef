use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use brio::cli::{self, InitScript};
use brio::embedded::DEFAULT_LIB;
use brio::eval_loop::EvalLoop;
use brio::event::EventDispatcher;
use brio::runner::TaskRunner;
use brio::script::{Engine, Value};
use brio::session::SessionSlot;
use brio::signals::SignalController;
use brio::task::CancelToken;
use brio::terminal::{ConsoleUi, TermUi};

fn main() {
    let ver = env!("CARGO_PKG_VERSION");
    println!("brio version {ver}");

    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("brio: {e}");
            eprintln!("Usage: brio [-i[<file>]] [-c<cmd>] [-snd] [<script>...]");
            std::process::exit(1);
        }
    };

    let engine = Arc::new(Engine::new());
    let cancel = CancelToken::new();

    // ── Built-in globals ──────────────────────────────────────────────────
    engine.set_global("version", Value::Str(ver.to_owned()));
    engine.set_global("debug", Value::Int(if args.debug { 1 } else { 0 }));

    // ── Load the embedded default library (fatal if broken) ───────────────
    if let Err(e) = engine.eval_source(DEFAULT_LIB, &cancel) {
        eprintln!("brio: default library: {e}");
        std::process::exit(1);
    }

    // ── Load the user init script ─────────────────────────────────────────
    match &args.init {
        InitScript::Skip => {}
        InitScript::Explicit(path) => {
            if let Err(e) = load_script(&engine, path, &cancel) {
                eprintln!("brio: warning: {e}");
            }
        }
        InitScript::Search => {
            if let Some(path) = cli::find_user_init() {
                if let Err(e) = load_script(&engine, &path, &cancel) {
                    eprintln!("brio: warning: {e}");
                }
            }
        }
    }

    // ── Script files run to completion, no console ────────────────────────
    let mut batch = false;
    for path in &args.scripts {
        batch = true;
        if let Err(e) = load_script(&engine, path, &cancel) {
            eprintln!("brio: {}: {e}", path.display());
            std::process::exit(1);
        }
    }

    // ── One-shot statement (-c<cmd>) ──────────────────────────────────────
    if let Some(cmd) = &args.command {
        batch = true;
        match engine.eval_source(cmd, &cancel) {
            Ok(v) => {
                if args.show_results && v != Value::Void {
                    println!("=> {} : {}", v, v.type_name());
                }
            }
            Err(e) => {
                eprintln!("brio: {e}");
                std::process::exit(1);
            }
        }
    }

    if batch && !args.no_exit_on_eof {
        return;
    }

    run_console(engine, args.show_results, args.no_exit_on_eof);
}

fn load_script(
    engine: &Engine,
    path: &std::path::Path,
    cancel: &CancelToken,
) -> Result<(), String> {
    let src = std::fs::read_to_string(path)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    engine
        .eval_source(&src, cancel)
        .map(|_| ())
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// Interactive mode: spawn the evaluation loop, then run the reader loop
/// on this thread until stdin is exhausted.
fn run_console(engine: Arc<Engine>, show_results: bool, wait_for_background: bool) {
    let ui = Arc::new(TermUi::new());
    let dispatcher = Arc::new(EventDispatcher::new(
        Arc::clone(&ui) as Arc<dyn ConsoleUi>
    ));

    let (slot, reader) = SessionSlot::new();
    let controller = Arc::new(SignalController::new(
        slot.clone(),
        Arc::new(AtomicBool::new(false)),
    ));

    if let Err(e) = brio::signals::install_handlers() {
        eprintln!("brio: warning: signal handlers: {e}");
    }

    let eval_loop = EvalLoop::new(
        Arc::clone(&engine),
        TaskRunner::new(),
        slot.clone(),
        Arc::clone(&controller),
        Arc::clone(&dispatcher),
        show_results,
    );
    let loop_thread = std::thread::Builder::new()
        .name("brio-eval".to_owned())
        .spawn(move || eval_loop.run(reader));

    // ── Reader loop ───────────────────────────────────────────────────────
    loop {
        match read_stdin_line(&controller) {
            Some(line) => {
                // The empty-line hack: a bare Enter becomes `;` so the loop
                // wakes up and reprints the prompt instead of accumulating
                // silence.
                let session = slot.current();
                let result = if line.trim().is_empty() {
                    session.write_bytes(b";\n")
                } else {
                    session.write_bytes(line.as_bytes())
                };
                // A failed write means the session was swapped mid-line;
                // the fresh session picks up the next line.
                let _ = result;
                // Clear the stored prompt so a continuation line of a
                // multi-line statement shows nothing; the next READY
                // restores it.
                ui.set_prompt("");
            }
            None => break,
        }
    }

    // Real EOF: retire the session so the loop unwinds.
    slot.current().close();
    if let Ok(handle) = loop_thread {
        let _ = handle.join();
    }

    if wait_for_background {
        while !dispatcher.running().is_empty() {
            std::thread::sleep(Duration::from_millis(50));
        }
    }
    println!("// Goodbye");
}

/// Read one line of raw bytes from stdin, polling the signal controller
/// whenever the blocked read is interrupted. Returns `None` at EOF.
///
/// Uses `read(2)` directly instead of `BufRead::read_line` because the
/// std reader retries `EINTR` internally, which would delay signal
/// handling until the next complete line.
fn read_stdin_line(controller: &SignalController) -> Option<String> {
    let mut line = Vec::new();
    loop {
        // A signal may have landed between reads rather than during one.
        controller.poll_signals();
        let mut byte = 0u8;
        let n = unsafe {
            libc::read(
                libc::STDIN_FILENO,
                &mut byte as *mut u8 as *mut libc::c_void,
                1,
            )
        };
        match n {
            1 => {
                line.push(byte);
                if byte == b'\n' {
                    return Some(String::from_utf8_lossy(&line).into_owned());
                }
            }
            0 => {
                // EOF. A partial final line still counts.
                if line.is_empty() {
                    return None;
                }
                line.push(b'\n');
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
            _ => {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    controller.poll_signals();
                    continue;
                }
                return None;
            }
        }
    }
}
