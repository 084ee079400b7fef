//! Statement chunking and parsing.
//!
//! [`StatementReader`] is the blocking, line-oriented front half of the
//! engine: it pulls bytes from a session's input pipe and accumulates them
//! until one complete statement is available. A statement ends at a `;` or
//! a newline outside any string or parenthesis nesting; an open `(` or
//! quote carries the statement across line boundaries (which is why the
//! reader thread clears the prompt after each line — multi-line input
//! shows no intermediate prompt).
//!
//! [`parse_statement`] turns one chunk into a [`Stmt`] tree.

use std::io::{BufRead, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::expr::{parse_expr_tokens, tokenize, Expr, Token};

// ── Stmt ──────────────────────────────────────────────────────────────────

/// One parsed top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A bare `;` or blank input — evaluates to nothing, submits no task.
    Empty,
    Expr(Expr),
    /// `return expr;` — evaluates to the Return control wrapper, which the
    /// evaluation loop unwraps exactly once.
    Return(Option<Expr>),
    /// `fn name(params) = expr;`
    FnDef {
        name: String,
        params: Vec<String>,
        body: Expr,
    },
}

// ── StatementReader ───────────────────────────────────────────────────────

/// Accumulates bytes from a byte source into complete statement chunks.
pub struct StatementReader<R> {
    inner: R,
    /// True while a partially accumulated statement exists. Shared with the
    /// signal controller so it can tell "abort during parse" from an idle
    /// abort.
    dirty: Arc<AtomicBool>,
}

impl<R: BufRead> StatementReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The shared "partial statement pending" flag.
    pub fn dirty_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.dirty)
    }

    /// Block until one complete statement chunk is available.
    ///
    /// Returns `Ok(None)` on clean end-of-input (EOF at a statement
    /// boundary), `Err` on EOF in the middle of a statement.
    pub fn next_statement(&mut self) -> Result<Option<String>, String> {
        // Accumulated as raw bytes; multi-byte UTF-8 sequences must pass
        // through unsplit, so decoding happens once per complete chunk.
        let mut chunk: Vec<u8> = Vec::new();
        let mut depth = 0usize;
        let mut in_str: Option<u8> = None;
        let mut escaped = false;
        let mut in_comment = false;

        loop {
            let Some(byte) = self.read_byte()? else {
                self.dirty.store(false, Ordering::SeqCst);
                let leftover = !chunk.iter().all(u8::is_ascii_whitespace);
                return if leftover {
                    Err("unexpected end of input".to_owned())
                } else {
                    Ok(None)
                };
            };

            if in_comment {
                if byte == b'\n' {
                    in_comment = false;
                } else {
                    continue;
                }
            }

            match in_str {
                Some(quote) => {
                    chunk.push(byte);
                    if escaped {
                        escaped = false;
                    } else if byte == b'\\' {
                        escaped = true;
                    } else if byte == quote {
                        in_str = None;
                    }
                    continue;
                }
                None => match byte {
                    b'"' | b'\'' => {
                        in_str = Some(byte);
                        chunk.push(byte);
                        self.dirty.store(true, Ordering::SeqCst);
                        continue;
                    }
                    b'#' => {
                        in_comment = true;
                        continue;
                    }
                    b'(' => depth += 1,
                    b')' => depth = depth.saturating_sub(1),
                    b';' if depth == 0 => {
                        self.dirty.store(false, Ordering::SeqCst);
                        return decode_chunk(chunk);
                    }
                    b'\n' if depth == 0 => {
                        // A blank accumulation is carried on silently; any
                        // content completes the statement.
                        if chunk.iter().all(u8::is_ascii_whitespace) {
                            chunk.clear();
                            continue;
                        }
                        self.dirty.store(false, Ordering::SeqCst);
                        return decode_chunk(chunk);
                    }
                    _ => {}
                },
            }

            chunk.push(byte);
            if !byte.is_ascii_whitespace() {
                self.dirty.store(true, Ordering::SeqCst);
            }
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>, String> {
        loop {
            let buf = match self.inner.fill_buf() {
                Ok(b) => b,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(format!("input error: {e}")),
            };
            if buf.is_empty() {
                return Ok(None);
            }
            let byte = buf[0];
            self.inner.consume(1);
            return Ok(Some(byte));
        }
    }
}

fn decode_chunk(chunk: Vec<u8>) -> Result<Option<String>, String> {
    match String::from_utf8(chunk) {
        Ok(s) => Ok(Some(s)),
        Err(_) => Err("invalid UTF-8 in input".to_owned()),
    }
}

// ── Statement parsing ─────────────────────────────────────────────────────

/// Parse one complete statement chunk (terminator already stripped).
pub fn parse_statement(src: &str) -> Result<Stmt, String> {
    let trimmed = src.trim();
    if trimmed.is_empty() {
        return Ok(Stmt::Empty);
    }

    let tokens = tokenize(trimmed);
    match tokens.first() {
        Some(Token::Ident(kw)) if kw == "fn" => parse_fn_def(tokens),
        Some(Token::Ident(kw)) if kw == "return" => {
            let rest: Vec<Token> = tokens[1..].to_vec();
            if rest == [Token::Eof] {
                Ok(Stmt::Return(None))
            } else {
                Ok(Stmt::Return(Some(parse_expr_tokens(rest)?)))
            }
        }
        _ => Ok(Stmt::Expr(parse_expr_tokens(tokens)?)),
    }
}

fn parse_fn_def(tokens: Vec<Token>) -> Result<Stmt, String> {
    let mut iter = tokens.into_iter();
    iter.next(); // fn

    let name = match iter.next() {
        Some(Token::Ident(n)) => n,
        other => return Err(format!("expected function name, found {other:?}")),
    };
    if iter.next() != Some(Token::LParen) {
        return Err(format!("expected `(` after fn {name}"));
    }

    let mut params = Vec::new();
    loop {
        match iter.next() {
            Some(Token::RParen) => break,
            Some(Token::Ident(p)) => {
                params.push(p);
                match iter.next() {
                    Some(Token::Comma) => {}
                    Some(Token::RParen) => break,
                    other => {
                        return Err(format!("expected `,` or `)`, found {other:?}"))
                    }
                }
            }
            other => return Err(format!("expected parameter name, found {other:?}")),
        }
    }

    if iter.next() != Some(Token::Assign) {
        return Err(format!("expected `=` in fn {name} definition"));
    }

    let body = parse_expr_tokens(iter.collect())?;
    Ok(Stmt::FnDef { name, params, body })
}
