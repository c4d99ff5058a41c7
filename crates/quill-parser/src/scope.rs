//! Static scope resolution with closure discovery.
//!
//! The resolver tracks nested lexical scopes while the parser runs. A
//! "strong" scope is a function boundary; a free-variable reference that
//! crosses one becomes a closure of every function between the use and the
//! declaration. Per-name chains of shadowed declarations keep declare,
//! find, and close O(1) in the nesting depth.

use quill_types::ast::{DeclId, DeclKind, Declaration};
use quill_types::{ErrorCode, Span};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Behaviour switches for name declaration.
#[derive(Debug, Clone, Copy)]
pub struct ScopeOptions {
    /// Allow a nested scope to shadow a visible outer declaration.
    pub allow_masking: bool,
    /// Allow redeclaring a name within the same scope (later shadows
    /// earlier for the rest of the scope).
    pub allow_local_redefinition: bool,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            allow_masking: true,
            allow_local_redefinition: false,
        }
    }
}

/// A rejected declaration. Returned, never raised, so the parser can embed
/// it as a syntax error and keep going.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeError {
    /// The name is already declared in the same scope.
    AlreadyDeclared { name: String, previous: Span },
    /// The name would shadow an outer declaration and masking is off.
    Masked { name: String, outer: Span },
    /// No scope is open to declare into.
    NoOpenScope { name: String },
}

impl ScopeError {
    /// The diagnostic code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyDeclared { .. } => ErrorCode::ALREADY_DECLARED,
            Self::Masked { .. } => ErrorCode::MASKED_DECLARATION,
            Self::NoOpenScope { .. } => ErrorCode::NO_OPEN_SCOPE,
        }
    }
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDeclared { name, previous } => {
                write!(f, "'{name}' is already declared in this scope (at {previous})")
            }
            Self::Masked { name, outer } => {
                write!(f, "'{name}' masks an outer declaration (at {outer})")
            }
            Self::NoOpenScope { name } => {
                write!(f, "cannot declare '{name}': no open scope")
            }
        }
    }
}

/// One link in a name's shadowing chain.
struct NameEntry {
    decl: Rc<Declaration>,
    /// Index of the owning scope on the scope stack.
    scope: usize,
}

/// A single lexical scope.
struct Scope {
    /// Function boundary.
    strong: bool,
    /// Declarations owned by this scope, in declaration order.
    decls: Vec<Rc<Declaration>>,
    /// Outer declarations referenced from inside this strong scope.
    closures: Vec<Rc<Declaration>>,
    closure_seen: HashSet<DeclId>,
}

impl Scope {
    fn new(strong: bool) -> Self {
        Self {
            strong,
            decls: Vec::new(),
            closures: Vec::new(),
            closure_seen: HashSet::new(),
        }
    }
}

/// The static scope resolver.
pub struct ScopeResolver {
    scopes: Vec<Scope>,
    names: HashMap<String, Vec<NameEntry>>,
    next_id: u32,
    options: ScopeOptions,
}

impl ScopeResolver {
    /// Create a resolver with the given options.
    pub fn new(options: ScopeOptions) -> Self {
        Self {
            scopes: Vec::new(),
            names: HashMap::new(),
            next_id: 0,
            options,
        }
    }

    /// Push a block scope.
    pub fn open_scope(&mut self) {
        self.scopes.push(Scope::new(false));
    }

    /// Push a function-boundary scope.
    pub fn open_strong_scope(&mut self) {
        self.scopes.push(Scope::new(true));
    }

    /// Number of scopes currently open.
    pub fn open_scopes(&self) -> usize {
        self.scopes.len()
    }

    /// Register a new declaration in the current scope.
    ///
    /// The shadowing checks are skipped for [`DeclKind::WithSubject`]: the
    /// hidden `with` binding always shadows the enclosing one regardless of
    /// the masking option.
    pub fn declare(
        &mut self,
        name: &str,
        kind: DeclKind,
        span: Span,
    ) -> Result<Rc<Declaration>, ScopeError> {
        let current = match self.scopes.len().checked_sub(1) {
            Some(i) => i,
            None => {
                return Err(ScopeError::NoOpenScope {
                    name: name.to_string(),
                })
            }
        };
        if kind != DeclKind::WithSubject {
            if let Some(top) = self.names.get(name).and_then(|chain| chain.last()) {
                if top.scope == current {
                    if !self.options.allow_local_redefinition {
                        return Err(ScopeError::AlreadyDeclared {
                            name: name.to_string(),
                            previous: top.decl.span,
                        });
                    }
                } else if !self.options.allow_masking {
                    return Err(ScopeError::Masked {
                        name: name.to_string(),
                        outer: top.decl.span,
                    });
                }
            }
        }
        let decl = Rc::new(Declaration {
            id: DeclId(self.next_id),
            name: name.to_string(),
            kind,
            span,
        });
        self.next_id += 1;
        self.names
            .entry(name.to_string())
            .or_default()
            .push(NameEntry {
                decl: decl.clone(),
                scope: current,
            });
        self.scopes[current].decls.push(decl.clone());
        Ok(decl)
    }

    /// Resolve a name to the nearest visible declaration.
    pub fn find(&self, name: &str) -> Option<Rc<Declaration>> {
        self.names
            .get(name)
            .and_then(|chain| chain.last())
            .map(|entry| entry.decl.clone())
    }

    /// Resolve a name and, if the declaration lives outside one or more
    /// enclosing function boundaries, register it as a closure of each of
    /// them. Intermediate functions capture what their inner functions
    /// reference, so the chain of cells is intact at run time.
    pub fn find_and_register_closure(&mut self, name: &str) -> Option<Rc<Declaration>> {
        let (decl, decl_scope) = {
            let entry = self.names.get(name).and_then(|chain| chain.last())?;
            (entry.decl.clone(), entry.scope)
        };
        for idx in (decl_scope + 1)..self.scopes.len() {
            if self.scopes[idx].strong {
                let scope = &mut self.scopes[idx];
                if scope.closure_seen.insert(decl.id) {
                    scope.closures.push(decl.clone());
                }
            }
        }
        Some(decl)
    }

    /// Pop a block scope, returning its declarations in declaration order.
    /// Each name is unlinked so the masked outer declaration becomes
    /// visible again.
    ///
    /// Panics if no scope is open or the innermost scope is a function
    /// boundary — that is evaluator-API misuse, not a script error.
    pub fn close_scope(&mut self) -> Vec<Rc<Declaration>> {
        let scope = self.pop(false);
        scope.decls
    }

    /// Pop a function-boundary scope, returning its declarations and its
    /// accumulated closure set.
    pub fn close_strong_scope(&mut self) -> (Vec<Rc<Declaration>>, Vec<Rc<Declaration>>) {
        let scope = self.pop(true);
        (scope.decls, scope.closures)
    }

    fn pop(&mut self, strong: bool) -> Scope {
        let scope = self
            .scopes
            .pop()
            .expect("scope close without a matching open");
        assert_eq!(
            scope.strong, strong,
            "mismatched scope close (strong vs block)"
        );
        for decl in scope.decls.iter().rev() {
            let chain = self
                .names
                .get_mut(&decl.name)
                .expect("declaration missing from name table");
            let top = chain.pop().expect("name chain empty on scope close");
            debug_assert_eq!(top.decl.id, decl.id, "name chain out of order");
            if chain.is_empty() {
                self.names.remove(&decl.name);
            }
        }
        scope
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ScopeResolver {
        ScopeResolver::new(ScopeOptions::default())
    }

    fn sp(line: u32) -> Span {
        Span::point(line, 1)
    }

    #[test]
    fn test_declare_and_find() {
        let mut r = resolver();
        r.open_scope();
        let d = r.declare("x", DeclKind::Let, sp(1)).unwrap();
        assert_eq!(r.find("x").unwrap().id, d.id);
        assert!(r.find("y").is_none());
    }

    #[test]
    fn test_redeclaration_in_same_scope_rejected() {
        let mut r = resolver();
        r.open_scope();
        r.declare("x", DeclKind::Let, sp(1)).unwrap();
        let err = r.declare("x", DeclKind::Let, sp(2)).unwrap_err();
        assert!(matches!(err, ScopeError::AlreadyDeclared { .. }));
    }

    #[test]
    fn test_local_redefinition_allowed_when_enabled() {
        let mut r = ScopeResolver::new(ScopeOptions {
            allow_masking: true,
            allow_local_redefinition: true,
        });
        r.open_scope();
        let first = r.declare("x", DeclKind::Let, sp(1)).unwrap();
        let second = r.declare("x", DeclKind::Let, sp(2)).unwrap();
        assert_ne!(first.id, second.id);
        // The later declaration shadows the earlier one.
        assert_eq!(r.find("x").unwrap().id, second.id);
    }

    #[test]
    fn test_masking_allowed_by_default() {
        let mut r = resolver();
        r.open_scope();
        let outer = r.declare("x", DeclKind::Let, sp(1)).unwrap();
        r.open_scope();
        let inner = r.declare("x", DeclKind::Let, sp(2)).unwrap();
        assert_eq!(r.find("x").unwrap().id, inner.id);
        let closed = r.close_scope();
        assert_eq!(closed.len(), 1);
        // The outer declaration becomes visible again.
        assert_eq!(r.find("x").unwrap().id, outer.id);
    }

    #[test]
    fn test_masking_rejected_when_disabled() {
        let mut r = ScopeResolver::new(ScopeOptions {
            allow_masking: false,
            allow_local_redefinition: false,
        });
        r.open_scope();
        r.declare("x", DeclKind::Let, sp(1)).unwrap();
        r.open_scope();
        let err = r.declare("x", DeclKind::Let, sp(2)).unwrap_err();
        assert!(matches!(err, ScopeError::Masked { .. }));
    }

    #[test]
    fn test_with_subject_bypasses_masking_check() {
        let mut r = ScopeResolver::new(ScopeOptions {
            allow_masking: false,
            allow_local_redefinition: false,
        });
        r.open_scope();
        r.declare(".", DeclKind::WithSubject, sp(1)).unwrap();
        r.open_scope();
        // Nested `with` shadows the outer subject even with masking off.
        assert!(r.declare(".", DeclKind::WithSubject, sp(2)).is_ok());
    }

    #[test]
    fn test_declare_with_no_scope_is_an_error_not_a_panic() {
        let mut r = resolver();
        let err = r.declare("x", DeclKind::Let, sp(1)).unwrap_err();
        assert!(matches!(err, ScopeError::NoOpenScope { .. }));
    }

    #[test]
    #[should_panic(expected = "scope close without a matching open")]
    fn test_close_with_no_scope_is_fatal() {
        let mut r = resolver();
        r.close_scope();
    }

    #[test]
    #[should_panic(expected = "mismatched scope close")]
    fn test_mismatched_close_is_fatal() {
        let mut r = resolver();
        r.open_strong_scope();
        r.close_scope();
    }

    #[test]
    fn test_close_returns_declaration_order() {
        let mut r = resolver();
        r.open_scope();
        r.declare("a", DeclKind::Let, sp(1)).unwrap();
        r.declare("b", DeclKind::Let, sp(2)).unwrap();
        r.declare("c", DeclKind::Let, sp(3)).unwrap();
        let decls = r.close_scope();
        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_closure_discovery_single_boundary() {
        let mut r = resolver();
        r.open_strong_scope();
        r.open_scope();
        let outer = r.declare("count", DeclKind::Let, sp(1)).unwrap();
        r.open_strong_scope(); // function literal
        let found = r.find_and_register_closure("count").unwrap();
        assert_eq!(found.id, outer.id);
        let (_, closures) = r.close_strong_scope();
        assert_eq!(closures.len(), 1);
        assert_eq!(closures[0].id, outer.id);
    }

    #[test]
    fn test_closure_not_registered_for_same_function_locals() {
        let mut r = resolver();
        r.open_strong_scope();
        r.open_scope();
        r.declare("local", DeclKind::Let, sp(1)).unwrap();
        r.find_and_register_closure("local").unwrap();
        r.close_scope();
        let (_, closures) = r.close_strong_scope();
        assert!(closures.is_empty());
    }

    #[test]
    fn test_closure_registered_in_every_intermediate_function() {
        let mut r = resolver();
        r.open_strong_scope();
        let outer = r.declare("x", DeclKind::Let, sp(1)).unwrap();
        r.open_strong_scope(); // middle function, never mentions x itself
        r.open_strong_scope(); // inner function
        r.find_and_register_closure("x").unwrap();
        let (_, inner_closures) = r.close_strong_scope();
        let (_, middle_closures) = r.close_strong_scope();
        assert_eq!(inner_closures.len(), 1);
        assert_eq!(inner_closures[0].id, outer.id);
        // The middle function captures x too, so the inner one can.
        assert_eq!(middle_closures.len(), 1);
        assert_eq!(middle_closures[0].id, outer.id);
    }

    #[test]
    fn test_closure_registered_once_per_scope() {
        let mut r = resolver();
        r.open_strong_scope();
        r.declare("x", DeclKind::Let, sp(1)).unwrap();
        r.open_strong_scope();
        r.find_and_register_closure("x").unwrap();
        r.find_and_register_closure("x").unwrap();
        let (_, closures) = r.close_strong_scope();
        assert_eq!(closures.len(), 1);
    }

    #[test]
    fn test_shadowed_declaration_is_not_captured() {
        let mut r = resolver();
        r.open_strong_scope();
        r.declare("x", DeclKind::Let, sp(1)).unwrap();
        r.open_strong_scope();
        let param = r.declare("x", DeclKind::Param, sp(2)).unwrap();
        let found = r.find_and_register_closure("x").unwrap();
        assert_eq!(found.id, param.id);
        let (_, closures) = r.close_strong_scope();
        assert!(closures.is_empty());
    }

    #[test]
    fn test_distinct_identities_for_same_spelling() {
        let mut r = resolver();
        r.open_scope();
        let a = r.declare("x", DeclKind::Let, sp(1)).unwrap();
        r.open_scope();
        let b = r.declare("x", DeclKind::Let, sp(2)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.name, b.name);
    }
}
