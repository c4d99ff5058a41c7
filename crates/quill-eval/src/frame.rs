//! Evaluation frames: the reified call stack.
//!
//! One frame per in-flight node, held on an explicit stack owned by the
//! session. A frame records its node, a small state-machine position, and
//! the partial results of children already evaluated, so resuming after a
//! pause never redoes work. The frame below is the waiter; frames unlink
//! strictly LIFO.

use crate::env::Environment;
use crate::value::Value;
use quill_types::ast::{Declaration, NodeRef};
use quill_types::Span;
use std::rc::Rc;

/// One in-flight node.
pub struct Frame {
    /// The node being evaluated.
    pub node: NodeRef,
    /// State-machine position; meaning is per node kind.
    pub state: u32,
    /// Results of already-evaluated children.
    pub vals: Vec<Value>,
    /// Snapshot of the items being iterated (foreach only).
    pub items: Option<Vec<Value>>,
    /// Next iteration index (foreach only).
    pub index: usize,
    /// Declarations this frame registered; unregistered in reverse on
    /// every exit path.
    pub regs: Vec<Rc<Declaration>>,
}

impl Frame {
    /// Create the entry frame for a node.
    pub fn new(node: NodeRef) -> Self {
        Self {
            node,
            state: 0,
            vals: Vec::new(),
            items: None,
            index: 0,
            regs: Vec::new(),
        }
    }

    /// Unregister everything this frame registered, newest first.
    pub fn cleanup(&mut self, env: &mut Environment) {
        while let Some(decl) = self.regs.pop() {
            env.unregister(&decl);
        }
    }

    /// A read-only view for backtraces.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            kind: self.node.kind_name(),
            span: self.node.span,
        }
    }
}

/// One line of a paused session's backtrace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSnapshot {
    /// Node kind name.
    pub kind: &'static str,
    /// Source location of the node.
    pub span: Span,
}
