//! Shared types for the Quill interpreter.
//!
//! This crate defines the scope-resolved AST, declaration identities,
//! source spans, and the structured diagnostics used across all stages.

mod error;
mod span;
pub mod ast;

pub use error::{Diagnostics, ErrorCategory, ErrorCode, ScriptError, Severity, MAX_ERRORS};
pub use span::{SourceFile, Span};
