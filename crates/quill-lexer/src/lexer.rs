//! Core Quill lexer — converts source text to a token stream.
//!
//! Features:
//! - Maximal-munch operator scanning: `===` before `==` before `=`, `++`
//!   before `+`. This is load-bearing for the grammar: `a+++b` lexes as
//!   `a` `++` `+` `b` and therefore parses as `(a++)+b`.
//! - Single- and double-quoted strings with escape sequences
//! - Line (`//`) and block (`/* */`) comments stripped
//! - Error recovery: collects diagnostics instead of stopping at the first

use quill_types::{Diagnostics, ErrorCode, ScriptError, SourceFile, Span};

use crate::token::{Token, TokenKind};

/// The Quill lexer.
///
/// Converts source text into a vector of [`Token`]s, collecting up to
/// [`quill_types::MAX_ERRORS`] diagnostics along the way. The emitted
/// stream always ends with [`TokenKind::Eof`].
pub struct Lexer<'src> {
    /// The full source text as bytes.
    source: &'src [u8],
    /// Source file for error context.
    source_file: &'src SourceFile,
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
    /// Collected diagnostics.
    errors: Diagnostics,
}

/// Result of lexing: tokens + any diagnostics collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    /// Diagnostics encountered during lexing.
    pub errors: Diagnostics,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source file.
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source: source_file.source.as_bytes(),
            source_file,
            pos: 0,
            line: 1,
            col: 1,
            errors: Diagnostics::empty(),
        }
    }

    /// Lex the entire source into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Cursor helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    /// Advance one byte, tracking line and column.
    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn at(&self) -> (u32, u32) {
        (self.line, self.col)
    }

    fn span_from(&self, start: (u32, u32)) -> Span {
        Span::new(start.0, start.1, self.line, self.col)
    }

    fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.line).unwrap_or("").to_string();
        self.errors.push_error(ScriptError::new(
            &self.source_file.name,
            code,
            message,
            span,
            source_line,
        ));
    }

    // ─────────────────────────────────────────────────────────────
    // Scanning
    // ─────────────────────────────────────────────────────────────

    /// Scan the next token, skipping whitespace and comments.
    fn scan_token(&mut self) -> Token {
        self.skip_trivia();
        let start = self.at();
        let b = match self.peek() {
            None => return Token::new(TokenKind::Eof, self.span_from(start)),
            Some(b) => b,
        };

        // A dot starts a number only when a digit follows (`.5`);
        // otherwise it is member access.
        if b.is_ascii_digit() || (b == b'.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.scan_number(start);
        }
        if b == b'\'' || b == b'"' {
            return self.scan_string(start, b);
        }
        if b.is_ascii_alphabetic() || b == b'_' || b == b'$' {
            return self.scan_word(start);
        }
        self.scan_operator(start)
    }

    /// Skip whitespace and comments. Unterminated block comments are
    /// reported and consume the rest of the input.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.at();
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some(b) = self.bump() {
                        if b == b'*' && self.peek() == Some(b'/') {
                            self.bump();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        let span = self.span_from(start);
                        self.error(
                            ErrorCode::UNTERMINATED_COMMENT,
                            "unterminated block comment",
                            span,
                        );
                    }
                }
                _ => return,
            }
        }
    }

    /// Scan a number: integer and fraction digits plus an optional exponent.
    fn scan_number(&mut self, start: (u32, u32)) -> Token {
        let begin = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        // Covers both `3.14` and the leading-dot form `.5`.
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|b| b.is_ascii_digit()) {
                for _ in 0..ahead {
                    self.bump();
                }
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        let text = std::str::from_utf8(&self.source[begin..self.pos]).unwrap_or("");
        let span = self.span_from(start);
        match text.parse::<f64>() {
            Ok(n) => Token::new(TokenKind::Number(n), span),
            Err(_) => {
                self.error(
                    ErrorCode::INVALID_NUMBER,
                    format!("invalid number literal '{text}'"),
                    span,
                );
                Token::new(TokenKind::Number(f64::NAN), span)
            }
        }
    }

    /// Scan a string literal delimited by `quote`.
    fn scan_string(&mut self, start: (u32, u32), quote: u8) -> Token {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    let span = self.span_from(start);
                    self.error(
                        ErrorCode::UNTERMINATED_STRING,
                        "unterminated string literal",
                        span,
                    );
                    return Token::new(TokenKind::Str(value), span);
                }
                Some(b) if b == quote => {
                    self.bump();
                    return Token::new(TokenKind::Str(value), self.span_from(start));
                }
                Some(b'\\') => {
                    self.bump();
                    match self.bump() {
                        Some(b'n') => value.push('\n'),
                        Some(b't') => value.push('\t'),
                        Some(b'r') => value.push('\r'),
                        Some(b'0') => value.push('\0'),
                        Some(b'\\') => value.push('\\'),
                        Some(b'\'') => value.push('\''),
                        Some(b'"') => value.push('"'),
                        Some(other) => value.push(other as char),
                        None => {}
                    }
                }
                Some(_) => {
                    // Collect one UTF-8 character.
                    let begin = self.pos;
                    self.bump();
                    while self.peek().is_some_and(|b| (b & 0xC0) == 0x80) {
                        self.bump();
                    }
                    if let Ok(s) = std::str::from_utf8(&self.source[begin..self.pos]) {
                        value.push_str(s);
                    }
                }
            }
        }
    }

    /// Scan an identifier or keyword.
    fn scan_word(&mut self, start: (u32, u32)) -> Token {
        let begin = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
        {
            self.bump();
        }
        let text = std::str::from_utf8(&self.source[begin..self.pos]).unwrap_or("");
        let span = self.span_from(start);
        match TokenKind::from_keyword(text) {
            Some(kind) => Token::new(kind, span),
            None => Token::new(TokenKind::Ident(text.to_string()), span),
        }
    }

    /// Scan an operator or punctuation token, longest match first.
    fn scan_operator(&mut self, start: (u32, u32)) -> Token {
        let b = self.bump().expect("caller checked peek");
        let kind = match b {
            b'+' => {
                if self.peek() == Some(b'+') {
                    self.bump();
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if self.peek() == Some(b'-') {
                    self.bump();
                    TokenKind::MinusMinus
                } else {
                    TokenKind::Minus
                }
            }
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'=' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else {
                    TokenKind::Assign
                }
            }
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        TokenKind::BangEqEq
                    } else {
                        TokenKind::BangEq
                    }
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.bump();
                    TokenKind::AndAnd
                } else {
                    let span = self.span_from(start);
                    self.error(
                        ErrorCode::UNEXPECTED_CHARACTER,
                        "unexpected character '&' (did you mean '&&'?)",
                        span,
                    );
                    return self.scan_token();
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.bump();
                    TokenKind::OrOr
                } else {
                    let span = self.span_from(start);
                    self.error(
                        ErrorCode::UNEXPECTED_CHARACTER,
                        "unexpected character '|' (did you mean '||'?)",
                        span,
                    );
                    return self.scan_token();
                }
            }
            b'?' => TokenKind::Question,
            b':' => TokenKind::Colon,
            b'.' => TokenKind::Dot,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            other => {
                let span = self.span_from(start);
                self.error(
                    ErrorCode::UNEXPECTED_CHARACTER,
                    format!("unexpected character '{}'", other as char),
                    span,
                );
                return self.scan_token();
            }
        };
        Token::new(kind, self.span_from(start))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
