//! Runtime error type for the Quill evaluator.

use quill_types::Span;
use std::fmt;

/// A script-level runtime error.
///
/// This is a *signal payload*, not a Rust error: it propagates through the
/// frame stack like any other signal and is interceptable by `try`/`catch`
/// when `catchable` is set. Uncaught, it becomes the session's terminal
/// error. Host-API misuse panics instead and never takes this form.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// Human-readable description.
    pub message: String,
    /// Whether `try`/`catch` may intercept it.
    pub catchable: bool,
    /// Where it was raised, when known.
    pub span: Option<Span>,
}

impl RuntimeError {
    /// A catchable runtime error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            catchable: true,
            span: None,
        }
    }

    /// An error no `catch` may intercept (e.g. executing an embedded
    /// syntax error).
    pub fn uncatchable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            catchable: false,
            span: None,
        }
    }

    /// Attach the raise site.
    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{span}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}
