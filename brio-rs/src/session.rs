//! Console sessions and the byte pipe between reader and parser.
//!
//! The reader thread writes raw line bytes into a [`ConsoleSession`]; the
//! evaluation loop's statement reader pulls them back out through the
//! paired [`PipeReader`]. Closing the writer side makes the reader see
//! EOF, which is exactly how a session is discarded: the signal
//! controller swaps in a fresh session and closes the old pipe, the
//! half-parsed statement dies with a suppressed parse error, and the loop
//! adopts the replacement reader.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

// ── Byte pipe ─────────────────────────────────────────────────────────────

/// Create a connected in-process byte pipe.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = channel();
    (
        PipeWriter {
            tx: Mutex::new(Some(tx)),
        },
        PipeReader {
            rx,
            buf: Vec::new(),
            pos: 0,
        },
    )
}

/// Sending half. Shareable behind `Arc`; closing is idempotent.
pub struct PipeWriter {
    tx: Mutex<Option<Sender<Vec<u8>>>>,
}

impl PipeWriter {
    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let tx = match self.tx.lock() {
            Ok(t) => t,
            Err(p) => p.into_inner(),
        };
        match tx.as_ref() {
            Some(tx) => tx
                .send(bytes.to_vec())
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")),
        }
    }

    /// Drop the sender so the reading side sees EOF.
    pub fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

/// Receiving half. Blocking [`Read`] that returns 0 at EOF.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buf.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                // All senders gone: EOF.
                Err(_) => return Ok(0),
            }
        }
        let n = (self.buf.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ── ConsoleSession ────────────────────────────────────────────────────────

/// One console lifetime: a pipe plus a validity flag.
///
/// A session is invalidated when it is discarded by an abort or when the
/// real input hits EOF; writes after that fail with `BrokenPipe` and the
/// reader thread stops feeding it.
pub struct ConsoleSession {
    writer: PipeWriter,
    valid: AtomicBool,
}

impl ConsoleSession {
    /// A fresh session and the reader the statement parser will consume.
    pub fn new() -> (Arc<ConsoleSession>, PipeReader) {
        let (writer, reader) = pipe();
        (
            Arc::new(ConsoleSession {
                writer,
                valid: AtomicBool::new(true),
            }),
            reader,
        )
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Feed raw input bytes to the parser side.
    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        if !self.is_valid() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "session closed"));
        }
        self.writer.write_bytes(bytes)
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.write_bytes(&bytes)
    }

    /// Invalidate and close. The parser sees EOF on its next read.
    pub fn close(&self) {
        self.valid.store(false, Ordering::SeqCst);
        self.writer.close();
    }
}

// ── SessionSlot ───────────────────────────────────────────────────────────

struct SlotState {
    session: Arc<ConsoleSession>,
    /// Reader of a freshly swapped-in session, waiting for the loop to
    /// adopt it after the old parse dies.
    pending_reader: Option<PipeReader>,
}

/// Shared holder of the current session, swappable out from under the
/// loop by the signal controller.
#[derive(Clone)]
pub struct SessionSlot {
    state: Arc<Mutex<SlotState>>,
}

impl SessionSlot {
    /// Slot seeded with a first session; returns the reader for the loop.
    pub fn new() -> (SessionSlot, PipeReader) {
        let (session, reader) = ConsoleSession::new();
        (
            SessionSlot {
                state: Arc::new(Mutex::new(SlotState {
                    session,
                    pending_reader: None,
                })),
            },
            reader,
        )
    }

    /// The session the reader thread should feed right now.
    pub fn current(&self) -> Arc<ConsoleSession> {
        match self.state.lock() {
            Ok(s) => Arc::clone(&s.session),
            Err(p) => Arc::clone(&p.into_inner().session),
        }
    }

    /// Replace the current session with a fresh one and close the old
    /// pipe. The discarded parse unwinds with EOF; the loop picks up the
    /// replacement reader via [`SessionSlot::take_pending`].
    pub fn swap(&self) {
        let mut st = match self.state.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        };
        let (session, reader) = ConsoleSession::new();
        let old = std::mem::replace(&mut st.session, session);
        st.pending_reader = Some(reader);
        old.close();
    }

    /// Adopt the reader of a swapped-in session, if a swap happened.
    pub fn take_pending(&self) -> Option<PipeReader> {
        match self.state.lock() {
            Ok(mut s) => s.pending_reader.take(),
            Err(p) => p.into_inner().pending_reader.take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    use crate::script::StatementReader;

    #[test]
    fn bytes_flow_through_the_pipe() {
        let (w, mut r) = pipe();
        w.write_bytes(b"abc").unwrap();
        let mut buf = [0u8; 8];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"abc");
    }

    #[test]
    fn close_produces_eof() {
        let (w, mut r) = pipe();
        w.write_bytes(b"x").unwrap();
        w.close();
        let mut buf = [0u8; 8];
        assert_eq!(r.read(&mut buf).unwrap(), 1);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_after_close_is_broken_pipe() {
        let (session, _reader) = ConsoleSession::new();
        session.close();
        assert!(!session.is_valid());
        assert!(session.write_line("x").is_err());
    }

    #[test]
    fn read_blocks_until_data_arrives() {
        let (session, mut reader) = ConsoleSession::new();
        let writer = Arc::clone(&session);
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            writer.write_line("hi").unwrap();
        });
        let mut buf = [0u8; 8];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi\n");
    }

    #[test]
    fn swap_kills_the_old_parse_and_leaves_a_pending_reader() {
        let (slot, reader) = SessionSlot::new();
        let old = slot.current();
        old.write_bytes(b"max(1,").unwrap();

        let mut stmts = StatementReader::new(BufReader::new(reader));
        slot.swap();

        // The half statement dies with an EOF parse error.
        assert!(stmts.next_statement().is_err());
        assert!(!old.is_valid());

        // The replacement session is live and its reader is waiting.
        let mut pending = slot.take_pending().expect("pending reader after swap");
        slot.current().write_line("1 + 1").unwrap();
        let mut buf = [0u8; 16];
        let n = pending.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"1 + 1\n");
    }

    #[test]
    fn take_pending_is_none_without_a_swap() {
        let (slot, _reader) = SessionSlot::new();
        assert!(slot.take_pending().is_none());
    }
}
