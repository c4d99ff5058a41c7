use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of diagnostics collected before the front end stops
/// recording new ones (parsing itself keeps going).
pub const MAX_ERRORS: usize = 20;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Scope,
}

/// Numeric error code (E100–E599).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const INVALID_NUMBER: Self = Self(102);
    pub const UNTERMINATED_COMMENT: Self = Self(103);
    pub const INVALID_ASSIGNMENT_TARGET: Self = Self(104);
    pub const FLOW_OUTSIDE_LOOP: Self = Self(105);
    pub const UNEXPECTED_CHARACTER: Self = Self(106);

    // ── Scope errors (E500–E599) ──
    pub const ALREADY_DECLARED: Self = Self(500);
    pub const MASKED_DECLARATION: Self = Self(501);
    pub const NO_OPEN_SCOPE: Self = Self(502);
    pub const UNBOUND_IDENTIFIER: Self = Self(503);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            500..=599 => ErrorCategory::Scope,
            _ => ErrorCategory::Syntax,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured front-end diagnostic.
///
/// Hosts render these (or serialize them to JSON); the message text is
/// never parsed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptError {
    /// Script name as given to the engine.
    pub file: String,
    /// Error code (e.g., E100).
    pub code: ErrorCode,
    /// Severity.
    pub severity: Severity,
    /// Category (derived from the code).
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Source location.
    #[serde(flatten)]
    pub span: Span,
    /// The exact source line for context.
    pub source_line: String,
    /// Optional fix suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ScriptError {
    /// Create a new diagnostic.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.span, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for ScriptError {}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Scope => write!(f, "scope"),
        }
    }
}

/// A capped collection of diagnostics from one compile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub errors: Vec<ScriptError>,
    pub warnings: Vec<ScriptError>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn empty() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            total_errors: 0,
            total_warnings: 0,
        }
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the MAX_ERRORS storage limit.
    pub fn push_error(&mut self, error: ScriptError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Add a warning.
    pub fn push_warning(&mut self, warning: ScriptError) {
        self.warnings.push(warning);
        self.total_warnings += 1;
    }

    /// Merge another collection into this one.
    pub fn merge(&mut self, other: Diagnostics) {
        // Errors dropped by the other collection's cap stay counted.
        let overflow = other.total_errors.saturating_sub(other.errors.len());
        for e in other.errors {
            self.push_error(e);
        }
        self.total_errors += overflow;
        for w in other.warnings {
            self.push_warning(w);
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::empty()
    }
}
