//! Console rendering — prompt redraw, reports, and the task status line.
//!
//! The console is line-oriented, not full-screen: output scrolls normally
//! and the only cursor work is redrawing the prompt line in place. The
//! status line is a dashed separator carrying one inverse-video `T<id>`
//! chip per live background task; it is reprinted whenever the task set
//! changes and disappears (prints as plain output) once no tasks remain.
//!
//! [`ConsoleUi`] is the seam between the evaluation loop and the terminal.
//! [`TermUi`] is the interactive implementation; [`NullUi`] records calls
//! for tests.

use std::io::{self, Write};
use std::sync::Mutex;

use crossterm::{
    cursor, queue,
    style::{Attribute, Print, ResetColor, SetAttribute},
    terminal::{self, Clear, ClearType},
};

/// Fallback width when the terminal size cannot be queried.
const DEFAULT_WIDTH: u16 = 80;

/// What the evaluation loop needs from a console.
pub trait ConsoleUi: Send + Sync {
    /// Remember the prompt for subsequent redraws.
    fn set_prompt(&self, prompt: &str);
    /// Redraw the prompt line in place.
    fn redisplay(&self);
    /// Print one line of output above the prompt.
    fn report(&self, line: &str);
    /// The set of live task ids changed; refresh the status line.
    fn status(&self, running: &[u64]);
}

// ── TermUi ────────────────────────────────────────────────────────────────

struct TermState {
    prompt: String,
    out: Box<dyn Write + Send>,
}

/// Interactive crossterm-backed console.
pub struct TermUi {
    state: Mutex<TermState>,
}

impl TermUi {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    pub fn with_output(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(TermState {
                prompt: String::new(),
                out,
            }),
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut TermState) -> io::Result<()>) {
        if let Ok(mut st) = self.state.lock() {
            // Terminal writes are best-effort.
            let _ = f(&mut st);
            let _ = st.out.flush();
        }
    }
}

impl Default for TermUi {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleUi for TermUi {
    fn set_prompt(&self, prompt: &str) {
        if let Ok(mut st) = self.state.lock() {
            st.prompt = prompt.to_owned();
        }
    }

    fn redisplay(&self) {
        self.with_state(|st| {
            queue!(
                st.out,
                cursor::MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(&st.prompt)
            )
        });
    }

    fn report(&self, line: &str) {
        self.with_state(|st| {
            queue!(
                st.out,
                cursor::MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(line),
                Print("\n"),
                Print(&st.prompt)
            )
        });
    }

    fn status(&self, running: &[u64]) {
        let width = terminal::size().map(|(w, _)| w).unwrap_or(DEFAULT_WIDTH);
        let ids: Vec<u64> = running.to_vec();
        self.with_state(|st| {
            queue!(
                st.out,
                cursor::MoveToColumn(0),
                Clear(ClearType::CurrentLine)
            )?;
            let mut used = 0usize;
            for id in &ids {
                let chip = format!("T{id}");
                queue!(
                    st.out,
                    Print("--"),
                    SetAttribute(Attribute::Reverse),
                    Print(&chip),
                    SetAttribute(Attribute::NoReverse),
                    ResetColor
                )?;
                used += 2 + chip.chars().count();
            }
            let fill = (width as usize).saturating_sub(used);
            queue!(st.out, Print("-".repeat(fill)), Print("\n"), Print(&st.prompt))
        });
    }
}

// ── NullUi ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct NullState {
    prompts: Vec<String>,
    reports: Vec<String>,
    statuses: Vec<Vec<u64>>,
    redisplays: usize,
}

/// Records every call instead of touching a terminal. Test double.
#[derive(Default)]
pub struct NullUi {
    state: Mutex<NullState>,
}

impl NullUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_prompt(&self) -> String {
        self.state
            .lock()
            .map(|s| s.prompts.last().cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state.lock().map(|s| s.prompts.clone()).unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<String> {
        self.state.lock().map(|s| s.reports.clone()).unwrap_or_default()
    }

    pub fn statuses(&self) -> Vec<Vec<u64>> {
        self.state.lock().map(|s| s.statuses.clone()).unwrap_or_default()
    }

    pub fn redisplay_count(&self) -> usize {
        self.state.lock().map(|s| s.redisplays).unwrap_or(0)
    }
}

impl ConsoleUi for NullUi {
    fn set_prompt(&self, prompt: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.prompts.push(prompt.to_owned());
        }
    }

    fn redisplay(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.redisplays += 1;
        }
    }

    fn report(&self, line: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.reports.push(line.to_owned());
        }
    }

    fn status(&self, running: &[u64]) {
        if let Ok(mut s) = self.state.lock() {
            s.statuses.push(running.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_ui_records_in_order() {
        let ui = NullUi::new();
        ui.set_prompt("a> ");
        ui.set_prompt("b> ");
        ui.report("hello");
        ui.status(&[3]);
        assert_eq!(ui.last_prompt(), "b> ");
        assert_eq!(ui.reports(), vec!["hello"]);
        assert_eq!(ui.statuses(), vec![vec![3]]);
    }

    #[test]
    fn term_ui_writes_the_prompt_on_redisplay() {
        let buf: Vec<u8> = Vec::new();
        let sink = std::sync::Arc::new(Mutex::new(buf));
        struct Tee(std::sync::Arc<Mutex<Vec<u8>>>);
        impl Write for Tee {
            fn write(&mut self, data: &[u8]) -> io::Result<usize> {
                if let Ok(mut b) = self.0.lock() {
                    b.extend_from_slice(data);
                }
                Ok(data.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let ui = TermUi::with_output(Box::new(Tee(std::sync::Arc::clone(&sink))));
        ui.set_prompt("brio % ");
        ui.redisplay();
        let written = sink.lock().map(|b| b.clone()).unwrap_or_default();
        let text = String::from_utf8_lossy(&written);
        assert!(text.contains("brio % "));
    }

    #[test]
    fn status_line_carries_one_chip_per_task() {
        let sink = std::sync::Arc::new(Mutex::new(Vec::new()));
        struct Tee(std::sync::Arc<Mutex<Vec<u8>>>);
        impl Write for Tee {
            fn write(&mut self, data: &[u8]) -> io::Result<usize> {
                if let Ok(mut b) = self.0.lock() {
                    b.extend_from_slice(data);
                }
                Ok(data.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let ui = TermUi::with_output(Box::new(Tee(std::sync::Arc::clone(&sink))));
        ui.status(&[3, 7]);
        let written = sink.lock().map(|b| b.clone()).unwrap_or_default();
        let text = String::from_utf8_lossy(&written);
        assert!(text.contains("T3"));
        assert!(text.contains("T7"));
    }
}
