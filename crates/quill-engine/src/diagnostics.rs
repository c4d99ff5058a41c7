//! Pre-execution diagnostics collector.
//!
//! One parse can leave several syntax errors embedded in the tree, and
//! identifiers with no lexical binding stay as global leaves resolved only
//! at run time. This collector gathers both before execution: every
//! embedded error node, plus every unbound identifier the host registry
//! does not satisfy — except those created by assignment, which become
//! session globals and are fine.

use quill_types::ast::{NodeKind, NodeRef};
use quill_types::{ErrorCode, ScriptError, SourceFile};
use std::collections::HashSet;

/// Gather everything worth reporting before running `program`.
/// `resolves` answers whether the host satisfies a root name.
pub fn collect(
    program: &NodeRef,
    source: &SourceFile,
    resolves: &dyn Fn(&str) -> bool,
) -> Vec<ScriptError> {
    // Globals assigned somewhere in the script get created on the fly.
    let mut assigned: HashSet<String> = HashSet::new();
    program.walk(&mut |node| {
        if let NodeKind::Assign { target, .. } = &node.kind {
            if let NodeKind::Global(name) = &target.kind {
                assigned.insert(name.clone());
            }
        }
    });

    let mut found = Vec::new();
    let mut seen_globals: HashSet<String> = HashSet::new();
    program.walk(&mut |node| match &node.kind {
        NodeKind::Error(message) => {
            found.push(make_error(
                source,
                ErrorCode::UNEXPECTED_TOKEN,
                message.clone(),
                node.span,
            ));
        }
        NodeKind::Global(name) => {
            if !resolves(name) && !assigned.contains(name) && seen_globals.insert(name.clone()) {
                found.push(make_error(
                    source,
                    ErrorCode::UNBOUND_IDENTIFIER,
                    format!("'{name}' has no binding and no host registration"),
                    node.span,
                ));
            }
        }
        _ => {}
    });
    found
}

fn make_error(
    source: &SourceFile,
    code: ErrorCode,
    message: String,
    span: quill_types::Span,
) -> ScriptError {
    let line = source.line(span.line).unwrap_or("").to_string();
    ScriptError::new(&source.name, code, message, span, line)
}
