//! Quill engine: the embedding surface.
//!
//! ```text
//! source → quill-lexer → quill-parser → Script → quill-eval Session
//!                                         ↑            ↑
//!                host registry (dotted names)   breakpoints / budget
//! ```
//!
//! The host registers native values and functions under dotted names,
//! compiles scripts, and drives execution through [`Execution`] handles
//! that pause at breakpoints, at first-chance errors, or on a step budget,
//! and resume exactly where they stopped.

pub mod breakpoints;
pub mod diagnostics;
pub mod engine;
pub mod host;

pub use breakpoints::BreakpointSet;
pub use engine::{Engine, EngineOptions, Execution, Script};
pub use host::{HostError, HostRegistry, HostView};

pub use quill_eval::{RuntimeError, Status, Value};
pub use quill_parser::ScopeOptions;
