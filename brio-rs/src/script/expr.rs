//! brio expression lexer, AST, and parser.
//!
//! Operator precedence (lowest → highest):
//!   assign  →  or  →  and  →  equality  →  relational  →
//!   additive  →  multiplicative  →  unary  →  primary

// ── Token ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,

    // Comparison
    Eq, // ==
    Ne, // !=
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And, // &&
    Or,  // ||

    // Assignment
    Assign, // =

    // Misc
    Comma,
    LParen,
    RParen,
    /// Unrecognised input byte — reported as a diagnostic instead of
    /// masking as EOF.
    Unknown(char),
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.src.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: u8) -> Token {
        let mut s = String::new();
        s.push(first as char);
        let mut is_float = false;

        while let Some(ch) = self.peek() {
            match ch {
                b'0'..=b'9' => {
                    self.pos += 1;
                    s.push(ch as char);
                }
                b'.' if !is_float
                    && matches!(self.src.get(self.pos + 1), Some(b'0'..=b'9')) =>
                {
                    is_float = true;
                    self.pos += 1;
                    s.push('.');
                }
                _ => break,
            }
        }

        if is_float {
            Token::Float(s.parse().unwrap_or(0.0))
        } else {
            Token::Int(s.parse().unwrap_or(0))
        }
    }

    fn read_string(&mut self, quote: u8) -> Token {
        // Collected as bytes so multi-byte UTF-8 sequences survive intact.
        let mut bytes = Vec::new();
        while let Some(ch) = self.advance() {
            if ch == quote {
                break;
            }
            if ch == b'\\' {
                match self.advance() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'e') => bytes.push(0x1b),
                    Some(c) => bytes.push(c),
                    None => break,
                }
            } else {
                bytes.push(ch);
            }
        }
        Token::Str(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_ident(&mut self, first: u8) -> Token {
        let mut s = String::new();
        s.push(first as char);
        while let Some(ch @ (b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'$')) = self.peek()
        {
            self.pos += 1;
            s.push(ch as char);
        }
        Token::Ident(s)
    }

    fn next_token(&mut self) -> Token {
        self.skip_ws();
        let Some(ch) = self.advance() else {
            return Token::Eof;
        };
        match ch {
            b'0'..=b'9' => self.read_number(ch),
            b'"' | b'\'' => self.read_string(ch),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => self.read_ident(ch),
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'%' => Token::Percent,
            b',' => Token::Comma,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'=' => {
                if self.eat(b'=') {
                    Token::Eq
                } else {
                    Token::Assign
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    Token::Ne
                } else {
                    Token::Bang
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            b'&' => {
                if self.eat(b'&') {
                    Token::And
                } else {
                    Token::Unknown('&')
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    Token::Or
                } else {
                    Token::Unknown('|')
                }
            }
            c => Token::Unknown(c as char),
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token();
            let eof = tok == Token::Eof;
            out.push(tok);
            if eof {
                break;
            }
        }
        out
    }
}

// ── AST ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Var(String),
    Assign(String, Box<Expr>),
    Unary(char, Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek2(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), String> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!("expected {what}, found {:?}", self.peek()))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr, String> {
        if let (Token::Ident(name), Token::Assign) = (self.peek(), self.peek2()) {
            let name = name.clone();
            self.advance(); // ident
            self.advance(); // =
            let rhs = self.parse_assign()?;
            return Ok(Expr::Assign(name, Box::new(rhs)));
        }
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Bin(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Bin(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Minus) {
            let e = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(e)));
        }
        if self.eat(&Token::Bang) {
            let e = self.parse_unary()?;
            return Ok(Expr::Unary('!', Box::new(e)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(x) => Ok(Expr::Float(x)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            self.expect(&Token::Comma, "`,` or `)`")?;
                        }
                    }
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Token::LParen => {
                let e = self.parse_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(e)
            }
            Token::Unknown(c) => Err(format!("unexpected character `{c}`")),
            Token::Eof => Err("unexpected end of expression".to_owned()),
            tok => Err(format!("unexpected token {tok:?}")),
        }
    }
}

/// Parse a complete expression. Trailing input is an error.
pub fn parse_expr(src: &str) -> Result<Expr, String> {
    let tokens = Lexer::new(src).tokenize();
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if parser.peek() != &Token::Eof {
        return Err(format!("trailing input: {:?}", parser.peek()));
    }
    Ok(expr)
}

/// Parse an expression from an already-tokenized slice (the statement
/// parser strips leading keywords and hands the rest over). The token
/// list must end with [`Token::Eof`].
pub fn parse_expr_tokens(tokens: Vec<Token>) -> Result<Expr, String> {
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if parser.peek() != &Token::Eof {
        return Err(format!("trailing input: {:?}", parser.peek()));
    }
    Ok(expr)
}

/// Tokenize a source fragment (used by the statement parser to look at
/// leading keywords without committing to an expression parse).
pub fn tokenize(src: &str) -> Vec<Token> {
    Lexer::new(src).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence() {
        let e = parse_expr("1 + 2 * 3").unwrap();
        assert_eq!(
            e,
            Expr::Bin(
                BinOp::Add,
                Box::new(Expr::Int(1)),
                Box::new(Expr::Bin(
                    BinOp::Mul,
                    Box::new(Expr::Int(2)),
                    Box::new(Expr::Int(3)),
                )),
            )
        );
    }

    #[test]
    fn assignment_is_right_associative() {
        let e = parse_expr("a = b = 1").unwrap();
        assert_eq!(
            e,
            Expr::Assign(
                "a".into(),
                Box::new(Expr::Assign("b".into(), Box::new(Expr::Int(1)))),
            )
        );
    }

    #[test]
    fn call_with_args() {
        let e = parse_expr("max(1, x)").unwrap();
        assert_eq!(
            e,
            Expr::Call("max".into(), vec![Expr::Int(1), Expr::Var("x".into())])
        );
    }

    #[test]
    fn string_escapes() {
        let e = parse_expr("\"a\\nb\"").unwrap();
        assert_eq!(e, Expr::Str("a\nb".into()));
    }

    #[test]
    fn multibyte_string_literal_survives_lexing() {
        let e = parse_expr("\"café\"").unwrap();
        assert_eq!(e, Expr::Str("café".into()));
    }

    #[test]
    fn result_slot_names_lex_as_idents() {
        let e = parse_expr("$_ + $1").unwrap();
        assert_eq!(
            e,
            Expr::Bin(
                BinOp::Add,
                Box::new(Expr::Var("$_".into())),
                Box::new(Expr::Var("$1".into())),
            )
        );
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert!(parse_expr("1 2").is_err());
        assert!(parse_expr("(1").is_err());
        assert!(parse_expr("").is_err());
    }
}
