//! Quill resumable evaluator.
//!
//! Walks the scope-resolved AST with an explicit frame stack instead of
//! host recursion, so execution can suspend at breakpoints (or the moment
//! a runtime error is produced) arbitrarily deep inside an expression and
//! resume later from exactly that point. Non-local control flow — break,
//! continue, return, throw, runtime errors — travels as signals through
//! the same frame machinery.

pub mod access;
pub mod env;
pub mod error;
pub mod frame;
pub mod session;
pub mod value;

pub use access::{EmptyHost, HostLookup, HostObject};
pub use env::Environment;
pub use error::RuntimeError;
pub use frame::{Frame, FrameSnapshot};
pub use session::{BreakPredicate, Session, SessionOptions, Status};
pub use value::{format_number, new_cell, CellRef, Closure, NativeFn, Signal, Value};
