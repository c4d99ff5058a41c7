//! Breakpoint-set storage.
//!
//! A line-number set plus a global break-always flag. The engine shares
//! one set with the running session behind `Rc<RefCell<…>>`, so the host
//! can toggle breakpoints while the script is paused; the session only
//! ever sees it as a per-node predicate.

use quill_types::ast::Node;
use std::collections::BTreeSet;

/// The set of lines to pause on, plus the break-always flag.
#[derive(Debug, Clone, Default)]
pub struct BreakpointSet {
    lines: BTreeSet<u32>,
    break_always: bool,
}

impl BreakpointSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a breakpoint on a 1-based source line.
    pub fn add_line(&mut self, line: u32) {
        self.lines.insert(line);
    }

    /// Disarm a line breakpoint. Returns `true` if it was set.
    pub fn remove_line(&mut self, line: u32) -> bool {
        self.lines.remove(&line)
    }

    /// Drop every line breakpoint (break-always is separate).
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Pause before every breakable node (single-stepping).
    pub fn set_break_always(&mut self, on: bool) {
        self.break_always = on;
    }

    /// Is break-always on?
    pub fn break_always(&self) -> bool {
        self.break_always
    }

    /// Armed lines, ascending.
    pub fn lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines.iter().copied()
    }

    /// True when no line breakpoint is armed.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The predicate: pause before this node?
    pub fn hits(&self, node: &Node) -> bool {
        node.breakable && (self.break_always || self.lines.contains(&node.span.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::ast::{Constant, NodeKind};
    use quill_types::Span;

    fn node_at(line: u32, breakable: bool) -> Node {
        let mut node = Node::new(
            NodeKind::Constant(Constant::Number(1.0)),
            Span::point(line, 1),
        );
        node.breakable = breakable;
        node
    }

    #[test]
    fn test_line_breakpoints() {
        let mut bp = BreakpointSet::new();
        bp.add_line(3);
        assert!(bp.hits(&node_at(3, true)));
        assert!(!bp.hits(&node_at(2, true)));
        assert!(bp.remove_line(3));
        assert!(!bp.remove_line(3));
        assert!(!bp.hits(&node_at(3, true)));
    }

    #[test]
    fn test_break_always_applies_to_all_breakable_nodes() {
        let mut bp = BreakpointSet::new();
        bp.set_break_always(true);
        assert!(bp.hits(&node_at(1, true)));
        assert!(bp.hits(&node_at(99, true)));
    }

    #[test]
    fn test_non_breakable_nodes_never_hit() {
        let mut bp = BreakpointSet::new();
        bp.add_line(1);
        bp.set_break_always(true);
        assert!(!bp.hits(&node_at(1, false)));
    }

    #[test]
    fn test_clear_and_lines() {
        let mut bp = BreakpointSet::new();
        bp.add_line(2);
        bp.add_line(7);
        assert_eq!(bp.lines().collect::<Vec<_>>(), vec![2, 7]);
        bp.clear();
        assert!(bp.is_empty());
    }
}
