//! Dynamic environment: declaration identity → live reference cells.
//!
//! Keyed by [`DeclId`], never by name, so two declarations sharing a
//! spelling never alias. Each identity maps to a small stack of cells
//! rather than a single slot: recursive calls and suspended-then-resumed
//! loop bodies can hold several live activations of the same declaration
//! at once.

use crate::value::{new_cell, CellRef};
use quill_types::ast::{DeclId, Declaration};
use std::collections::HashMap;

/// Runtime storage for declaration bindings.
#[derive(Default)]
pub struct Environment {
    cells: HashMap<DeclId, Vec<CellRef>>,
}

impl Environment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a fresh `undefined` cell for the declaration and return it.
    pub fn register(&mut self, decl: &Declaration) -> CellRef {
        let cell = new_cell();
        self.cells.entry(decl.id).or_default().push(cell.clone());
        cell
    }

    /// Push an already-captured cell for the declaration (closure entry),
    /// so references inside the function body resolve to the closed-over
    /// cell rather than any unrelated activation.
    pub fn register_cell(&mut self, decl: &Declaration, cell: CellRef) {
        self.cells.entry(decl.id).or_default().push(cell);
    }

    /// Pop the innermost cell for the declaration.
    ///
    /// Panics on imbalance — that is evaluator misuse, not a script error.
    pub fn unregister(&mut self, decl: &Declaration) {
        let stack = self
            .cells
            .get_mut(&decl.id)
            .unwrap_or_else(|| panic!("unregister of '{}' without a register", decl.name));
        stack
            .pop()
            .unwrap_or_else(|| panic!("unregister of '{}' without a register", decl.name));
        if stack.is_empty() {
            self.cells.remove(&decl.id);
        }
    }

    /// The innermost live cell for the declaration.
    ///
    /// Panics if none is live: with correct scope resolution this cannot
    /// happen, so it is an assertion rather than a language error.
    pub fn find(&self, decl: &Declaration) -> CellRef {
        self.cells
            .get(&decl.id)
            .and_then(|stack| stack.last())
            .unwrap_or_else(|| panic!("'{}' is not registered", decl.name))
            .clone()
    }

    /// Total number of live cells, across all identities.
    pub fn live_bindings(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
