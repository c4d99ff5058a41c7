//! Core parser infrastructure: token cursor, error reporting, recovery.

use quill_lexer::token::{Token, TokenKind};
use quill_types::ast::{Node, NodeKind, NodeRef};
use quill_types::{Diagnostics, ErrorCode, ScriptError, SourceFile, Span};
use std::rc::Rc;

use crate::scope::{ScopeOptions, ScopeResolver};

/// The Quill parser.
///
/// Consumes the token stream, resolves names through the scope resolver,
/// and builds a fully scope-resolved AST. Malformed input becomes
/// [`NodeKind::Error`] leaves plus structured diagnostics; parsing then
/// resynchronizes at the next statement boundary, so one pass can surface
/// several independent errors.
pub struct Parser<'src> {
    /// The token stream.
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    /// Source file for error context.
    source_file: &'src SourceFile,
    /// Collected diagnostics.
    errors: Diagnostics,
    /// The scope resolver (shared with expression/statement parsing).
    pub(crate) scope: ScopeResolver,
    /// Loop nesting depth inside the current function, for break/continue
    /// legality. Saved and reset across function literals.
    pub(crate) loop_depth: u32,
}

/// Result of parsing.
pub struct ParseResult {
    /// The program root — always produced; errors are embedded in place.
    pub program: NodeRef,
    /// Diagnostics collected during the parse.
    pub errors: Diagnostics,
}

impl<'src> Parser<'src> {
    /// Create a parser with default scope options (masking allowed, local
    /// redefinition rejected).
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile) -> Self {
        Self::with_options(tokens, source_file, ScopeOptions::default())
    }

    /// Create a parser with explicit scope options.
    pub fn with_options(
        tokens: Vec<Token>,
        source_file: &'src SourceFile,
        options: ScopeOptions,
    ) -> Self {
        Self {
            tokens,
            pos: 0,
            source_file,
            errors: Diagnostics::empty(),
            scope: ScopeResolver::new(options),
            loop_depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens
                .last()
                .expect("token stream should end with Eof")
        })
    }

    /// Returns the kind of the current token.
    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Look ahead by `n` tokens from the current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(1, 1)
        }
    }

    /// Returns the span of the current token.
    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// Returns `true` if the current token is `Eof`.
    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// Check if the current token matches the given kind exactly.
    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a specific token kind. Returns the token, or reports an
    /// error and returns `None`.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check(expected) {
            Some(self.advance())
        } else {
            self.error_at_current(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected '{}', got '{}'", expected, self.peek_kind()),
            );
            None
        }
    }

    /// Expect an identifier. Returns the name and span.
    pub(crate) fn expect_identifier(&mut self) -> Option<(String, Span)> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Some((name, span))
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected identifier, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// Expect an identifier or a keyword used as a member name after `.`
    /// (e.g. `config.for` is a valid member access).
    pub(crate) fn expect_member_name(&mut self) -> Option<(String, Span)> {
        let kind = self.peek_kind().clone();
        match &kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Some((name, span))
            }
            _ if kind.is_keyword() => {
                let span = self.advance().span;
                Some((kind.to_string(), span))
            }
            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected member name, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Report an error at the current token position.
    pub(crate) fn error_at_current(&mut self, code: ErrorCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    /// Report an error at a specific span.
    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_file.line(span.line).unwrap_or("").to_string();
        self.errors.push_error(ScriptError::new(
            &self.source_file.name,
            code,
            message,
            span,
            source_line,
        ));
    }

    /// Record a diagnostic and return the matching error leaf to embed in
    /// the tree.
    pub(crate) fn syntax_error(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> Node {
        let message = message.into();
        self.error_at(code, message.clone(), span);
        Node::new(NodeKind::Error(message), span)
    }

    /// Returns `true` if the error limit is reached and parsing should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= quill_types::MAX_ERRORS
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip tokens until a statement boundary: just past a `;`, or at a
    /// token that can start a statement, or at `}`.
    pub(crate) fn synchronize(&mut self) {
        while !self.at_end() {
            if self.eat(&TokenKind::Semicolon) {
                return;
            }
            match self.peek_kind() {
                TokenKind::Let
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
                | TokenKind::Throw
                | TokenKind::Try
                | TokenKind::With
                | TokenKind::RBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a program.
    ///
    /// The program body is a block inside an implicit function boundary, so
    /// top-level code follows the same scope rules as a function body.
    pub fn parse(mut self) -> ParseResult {
        self.scope.open_strong_scope();
        self.scope.open_scope();

        let start = self.current_span();
        let mut statements = Vec::new();
        while !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => statements.push(Rc::new(stmt)),
                None => {
                    let span = self.current_span();
                    let err = Node::new(
                        NodeKind::Error("malformed statement".to_string()),
                        span,
                    );
                    statements.push(Rc::new(err));
                    self.synchronize();
                }
            }
        }
        let span = start.merge(self.previous_span());

        let locals = self.scope.close_scope();
        let (_decls, closures) = self.scope.close_strong_scope();
        debug_assert!(closures.is_empty(), "top-level code cannot close over anything");

        let mut root = Node::new(NodeKind::Block { statements, locals }, span);
        root.statement = true;
        ParseResult {
            program: Rc::new(root),
            errors: self.errors,
        }
    }
}
