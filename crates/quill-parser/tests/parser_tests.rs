//! Integration tests for the Quill parser.
//!
//! Each test drives real source text through the lexer and parser and
//! inspects the scope-resolved AST: operator shapes, declaration
//! identities, closure discovery, error recovery, and breakable flags.

use quill_lexer::Lexer;
use quill_parser::{Parser, ScopeOptions};
use quill_types::ast::*;
use quill_types::{Diagnostics, ErrorCode, SourceFile};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn parse_with(src: &str, options: ScopeOptions) -> (NodeRef, Diagnostics) {
    let sf = SourceFile::new("test.qs", src);
    let lexed = Lexer::new(&sf).lex();
    assert!(
        !lexed.errors.has_errors(),
        "unexpected lex errors: {:?}",
        lexed.errors.errors
    );
    let result = Parser::with_options(lexed.tokens, &sf, options).parse();
    (result.program, result.errors)
}

fn parse(src: &str) -> (NodeRef, Diagnostics) {
    parse_with(src, ScopeOptions::default())
}

/// Parse and assert there are no diagnostics.
fn parse_ok(src: &str) -> NodeRef {
    let (program, errors) = parse(src);
    assert!(
        !errors.has_errors(),
        "unexpected parse errors: {:?}",
        errors.errors.iter().map(|e| &e.message).collect::<Vec<_>>()
    );
    program
}

/// The statements of the program's root block.
fn statements(program: &NodeRef) -> &[NodeRef] {
    match &program.kind {
        NodeKind::Block { statements, .. } => statements,
        other => panic!("program root should be a block, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expression shapes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn multiplication_binds_tighter_than_addition() {
    let program = parse_ok("1 + 2 * 3;");
    let stmts = statements(&program);
    let NodeKind::Binary { op, right, .. } = &stmts[0].kind else {
        panic!("expected binary node");
    };
    assert_eq!(*op, BinOp::Add);
    assert!(matches!(
        right.kind,
        NodeKind::Binary { op: BinOp::Mul, .. }
    ));
}

#[test]
fn relational_binds_tighter_than_equality() {
    let program = parse_ok("1 == 2 < 3;");
    let stmts = statements(&program);
    let NodeKind::Binary { op, right, .. } = &stmts[0].kind else {
        panic!("expected binary node");
    };
    assert_eq!(*op, BinOp::Eq);
    assert!(matches!(
        right.kind,
        NodeKind::Binary { op: BinOp::Less, .. }
    ));
}

#[test]
fn binary_operators_are_left_associative() {
    let program = parse_ok("10 - 4 - 3;");
    let stmts = statements(&program);
    let NodeKind::Binary { op, left, .. } = &stmts[0].kind else {
        panic!("expected binary node");
    };
    assert_eq!(*op, BinOp::Sub);
    assert!(matches!(left.kind, NodeKind::Binary { op: BinOp::Sub, .. }));
}

#[test]
fn plus_plus_plus_parses_as_postfix_then_add() {
    // `a+++b` is `(a++)+b` — greedy token matching is part of the grammar.
    let program = parse_ok("let a = 1; let b = 2; a+++b;");
    let stmts = statements(&program);
    let NodeKind::Binary { op, left, right } = &stmts[2].kind else {
        panic!("expected binary node");
    };
    assert_eq!(*op, BinOp::Add);
    assert!(matches!(
        left.kind,
        NodeKind::IncDec {
            increment: true,
            prefix: false,
            ..
        }
    ));
    assert!(matches!(right.kind, NodeKind::Ident(_)));
}

#[test]
fn assignment_is_right_associative() {
    let program = parse_ok("let a; let b; a = b = 1;");
    let stmts = statements(&program);
    let NodeKind::Assign { value, .. } = &stmts[2].kind else {
        panic!("expected assign node");
    };
    assert!(matches!(value.kind, NodeKind::Assign { .. }));
}

#[test]
fn ternary_parses_as_if_with_else() {
    let program = parse_ok("1 ? 2 : 3;");
    let stmts = statements(&program);
    let NodeKind::If { otherwise, .. } = &stmts[0].kind else {
        panic!("expected if node");
    };
    assert!(otherwise.is_some());
}

#[test]
fn comma_builds_a_sequence() {
    let program = parse_ok("1, 2, 3;");
    let stmts = statements(&program);
    let NodeKind::Sequence(items) = &stmts[0].kind else {
        panic!("expected sequence node");
    };
    assert_eq!(items.len(), 3);
}

#[test]
fn member_index_call_chain() {
    let program = parse_ok("host.table[0](1, 2);");
    let stmts = statements(&program);
    // Outermost: call with two args.
    let NodeKind::IndexOrCall {
        left: call_left,
        args,
        indexer: false,
    } = &stmts[0].kind
    else {
        panic!("expected call node");
    };
    assert_eq!(args.len(), 2);
    // Inside: index with one arg.
    let NodeKind::IndexOrCall {
        left: index_left,
        indexer: true,
        ..
    } = &call_left.kind
    else {
        panic!("expected index node");
    };
    // Inside: member access on an unresolved (host) root.
    let NodeKind::Member { left, name } = &index_left.kind else {
        panic!("expected member node");
    };
    assert_eq!(name, "table");
    assert!(matches!(
        left.as_ref().unwrap().kind,
        NodeKind::Global(ref n) if n == "host"
    ));
}

#[test]
fn keywords_allowed_as_member_names() {
    let program = parse_ok("config.for;");
    let stmts = statements(&program);
    let NodeKind::Member { name, .. } = &stmts[0].kind else {
        panic!("expected member node");
    };
    assert_eq!(name, "for");
}

#[test]
fn invalid_assignment_target_is_rejected() {
    let (_, errors) = parse("1 = 2;");
    assert!(errors.has_errors());
    assert_eq!(errors.errors[0].code, ErrorCode::INVALID_ASSIGNMENT_TARGET);
}

// ══════════════════════════════════════════════════════════════════════════════
// Scope resolution
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn declared_names_resolve_to_identities() {
    let program = parse_ok("let x = 1; x;");
    let stmts = statements(&program);
    let NodeKind::Let { decl, .. } = &stmts[0].kind else {
        panic!("expected let node");
    };
    let NodeKind::Ident(used) = &stmts[1].kind else {
        panic!("expected resolved identifier");
    };
    assert_eq!(decl.id, used.id);
}

#[test]
fn unresolved_names_become_globals() {
    let program = parse_ok("console;");
    let stmts = statements(&program);
    assert!(matches!(stmts[0].kind, NodeKind::Global(ref n) if n == "console"));
}

#[test]
fn redeclaration_in_same_block_is_an_error_by_default() {
    let (_, errors) = parse("let x = 1; let x = 2;");
    assert!(errors.has_errors());
    assert_eq!(errors.errors[0].code, ErrorCode::ALREADY_DECLARED);
}

#[test]
fn local_redefinition_allowed_when_enabled() {
    let options = ScopeOptions {
        allow_masking: true,
        allow_local_redefinition: true,
    };
    let (_, errors) = parse_with("let x = 1; let x = 2; x;", options);
    assert!(!errors.has_errors());
}

#[test]
fn masking_outer_declarations_is_independent_of_redefinition_flag() {
    // Nested-block shadowing stays legal with redefinition off.
    let program = parse_ok("let x = 1; { let x = 2; x; } x;");
    let stmts = statements(&program);
    let NodeKind::Let { decl: outer, .. } = &stmts[0].kind else {
        panic!("expected let node");
    };
    let NodeKind::Block { statements: inner, .. } = &stmts[1].kind else {
        panic!("expected block node");
    };
    let NodeKind::Let { decl: shadow, .. } = &inner[0].kind else {
        panic!("expected inner let node");
    };
    assert_ne!(outer.id, shadow.id);
    // Inside the block the shadow wins; after it the outer is back.
    let NodeKind::Ident(inner_use) = &inner[1].kind else {
        panic!("expected resolved identifier");
    };
    assert_eq!(inner_use.id, shadow.id);
    let NodeKind::Ident(outer_use) = &stmts[2].kind else {
        panic!("expected resolved identifier");
    };
    assert_eq!(outer_use.id, outer.id);
}

#[test]
fn masking_rejected_when_disabled() {
    let options = ScopeOptions {
        allow_masking: false,
        allow_local_redefinition: false,
    };
    let (_, errors) = parse_with("let x = 1; { let x = 2; }", options);
    assert!(errors.has_errors());
    assert_eq!(errors.errors[0].code, ErrorCode::MASKED_DECLARATION);
}

#[test]
fn block_locals_are_attached_in_declaration_order() {
    let program = parse_ok("let a; let b; let c;");
    let NodeKind::Block { locals, .. } = &program.kind else {
        panic!("expected block");
    };
    let names: Vec<_> = locals.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions and closures
// ══════════════════════════════════════════════════════════════════════════════

fn function_def(node: &NodeRef) -> std::rc::Rc<FunctionDef> {
    match &node.kind {
        NodeKind::Let {
            init: Some(init), ..
        } => match &init.kind {
            NodeKind::Function(def) => def.clone(),
            other => panic!("expected function initializer, got {other:?}"),
        },
        NodeKind::Function(def) => def.clone(),
        other => panic!("expected function node, got {other:?}"),
    }
}

#[test]
fn function_statement_desugars_to_let() {
    let program = parse_ok("function add(a, b) { return a + b; }");
    let stmts = statements(&program);
    let def = function_def(&stmts[0]);
    assert_eq!(def.name.as_deref(), Some("add"));
    assert_eq!(def.params.len(), 2);
    assert!(def.closures.is_empty());
}

#[test]
fn free_variables_are_discovered_as_closures() {
    let program = parse_ok("let count = 0; let bump = function() { count = count + 1; };");
    let stmts = statements(&program);
    let def = function_def(&stmts[1]);
    assert_eq!(def.closures.len(), 1);
    assert_eq!(def.closures[0].name, "count");
    let NodeKind::Let { decl, .. } = &stmts[0].kind else {
        panic!("expected let node");
    };
    assert_eq!(def.closures[0].id, decl.id);
}

#[test]
fn intermediate_functions_capture_for_inner_ones() {
    let program = parse_ok(
        "let x = 1; let outer = function() { return function() { return x; }; };",
    );
    let stmts = statements(&program);
    let outer = function_def(&stmts[1]);
    // The middle function captures x even though only the inner one uses it.
    assert_eq!(outer.closures.len(), 1);
    assert_eq!(outer.closures[0].name, "x");
}

#[test]
fn parameters_shadow_outer_declarations_without_capturing() {
    let program = parse_ok("let x = 1; let f = function(x) { return x; };");
    let stmts = statements(&program);
    let def = function_def(&stmts[1]);
    assert!(def.closures.is_empty());
}

#[test]
fn named_function_expression_binds_its_own_name() {
    let program = parse_ok("let f = function inner() { return inner; };");
    let stmts = statements(&program);
    let def = function_def(&stmts[0]);
    assert!(def.self_decl.is_some());
    assert_eq!(def.name.as_deref(), Some("inner"));
    assert!(def.closures.is_empty());
}

#[test]
fn function_recursion_through_outer_name_is_a_closure() {
    let program = parse_ok("function loop_(n) { if (n > 0) loop_(n - 1); }");
    let stmts = statements(&program);
    let def = function_def(&stmts[0]);
    assert_eq!(def.closures.len(), 1);
    assert_eq!(def.closures[0].name, "loop_");
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn while_loop_end_to_end_shape() {
    let program = parse_ok("let i = 0; while (i < 10) i++; i;");
    let stmts = statements(&program);
    assert_eq!(stmts.len(), 3);
    assert!(matches!(stmts[0].kind, NodeKind::Let { .. }));
    assert!(matches!(
        stmts[1].kind,
        NodeKind::While {
            do_while: false,
            ..
        }
    ));
    assert!(matches!(stmts[2].kind, NodeKind::Ident(_)));
}

#[test]
fn do_while_parses() {
    let program = parse_ok("let i = 0; do i++; while (i < 3);");
    let stmts = statements(&program);
    assert!(matches!(
        stmts[1].kind,
        NodeKind::While { do_while: true, .. }
    ));
}

#[test]
fn foreach_declares_its_loop_variable() {
    let program = parse_ok("for (item in items) item;");
    let stmts = statements(&program);
    let NodeKind::Foreach {
        decl,
        generator,
        body,
    } = &stmts[0].kind
    else {
        panic!("expected foreach node");
    };
    assert_eq!(decl.kind, DeclKind::LoopVar);
    // The generator resolves outside the loop scope.
    assert!(matches!(generator.kind, NodeKind::Global(ref n) if n == "items"));
    let NodeKind::Ident(used) = &body.kind else {
        panic!("expected resolved identifier body");
    };
    assert_eq!(used.id, decl.id);
}

#[test]
fn break_outside_a_loop_is_a_syntax_error() {
    let (program, errors) = parse("break;");
    assert!(errors.has_errors());
    assert_eq!(errors.errors[0].code, ErrorCode::FLOW_OUTSIDE_LOOP);
    let stmts = statements(&program);
    assert!(matches!(stmts[0].kind, NodeKind::Error(_)));
}

#[test]
fn break_does_not_leak_into_function_literals() {
    let (_, errors) = parse("while (1) { let f = function() { break; }; }");
    assert!(errors.has_errors());
    assert_eq!(errors.errors[0].code, ErrorCode::FLOW_OUTSIDE_LOOP);
}

#[test]
fn try_catch_binds_its_parameter() {
    let program = parse_ok("try { throw 1; } catch (e) { e; }");
    let stmts = statements(&program);
    let NodeKind::TryCatch { param, handler, .. } = &stmts[0].kind else {
        panic!("expected try node");
    };
    assert_eq!(param.kind, DeclKind::CatchParam);
    let NodeKind::Block { statements: inner, .. } = &handler.kind else {
        panic!("expected handler block");
    };
    let NodeKind::Ident(used) = &inner[0].kind else {
        panic!("expected resolved identifier");
    };
    assert_eq!(used.id, param.id);
}

#[test]
fn with_subject_resolves_leading_dot_access() {
    let program = parse_ok("with (config) { .timeout; }");
    let stmts = statements(&program);
    let NodeKind::With { decl, body, .. } = &stmts[0].kind else {
        panic!("expected with node");
    };
    let NodeKind::Block { statements: inner, .. } = &body.kind else {
        panic!("expected with body block");
    };
    let NodeKind::Member { left, name } = &inner[0].kind else {
        panic!("expected member node");
    };
    assert_eq!(name, "timeout");
    let NodeKind::Ident(subject) = &left.as_ref().unwrap().kind else {
        panic!("expected resolved subject");
    };
    assert_eq!(subject.id, decl.id);
}

#[test]
fn leading_dot_outside_with_is_a_syntax_error() {
    let (_, errors) = parse(".timeout;");
    assert!(errors.has_errors());
}

#[test]
fn nested_with_shadows_the_subject() {
    let program = parse_ok("with (a) { with (b) { .x; } }");
    let stmts = statements(&program);
    let NodeKind::With { decl: outer, body, .. } = &stmts[0].kind else {
        panic!("expected with node");
    };
    let NodeKind::Block { statements: s1, .. } = &body.kind else {
        panic!()
    };
    let NodeKind::With { decl: inner, body: inner_body, .. } = &s1[0].kind else {
        panic!("expected nested with node");
    };
    assert_ne!(outer.id, inner.id);
    let NodeKind::Block { statements: s2, .. } = &inner_body.kind else {
        panic!()
    };
    let NodeKind::Member { left, .. } = &s2[0].kind else {
        panic!("expected member node");
    };
    let NodeKind::Ident(subject) = &left.as_ref().unwrap().kind else {
        panic!("expected resolved subject");
    };
    assert_eq!(subject.id, inner.id);
}

// ══════════════════════════════════════════════════════════════════════════════
// Error recovery & flags
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn one_parse_surfaces_multiple_errors() {
    let (program, errors) = parse("let = 1; let ok = 2; let 5;");
    assert!(errors.total_errors >= 2);
    // The tree still exists and carries error leaves.
    let mut error_leaves = 0;
    program.walk(&mut |n| {
        if matches!(n.kind, NodeKind::Error(_)) {
            error_leaves += 1;
        }
    });
    assert!(error_leaves >= 1);
    // The healthy statement in the middle still parsed.
    let mut lets = 0;
    program.walk(&mut |n| {
        if matches!(n.kind, NodeKind::Let { .. }) {
            lets += 1;
        }
    });
    assert!(lets >= 1);
}

#[test]
fn breakable_flags_sit_on_statements_only() {
    let program = parse_ok("let x = 1 + 2; while (x < 3) x++;");
    let stmts = statements(&program);
    assert!(stmts.iter().all(|s| s.breakable && s.statement));
    // The initializer subtree is never breakable.
    let NodeKind::Let { init: Some(init), .. } = &stmts[0].kind else {
        panic!("expected let with initializer");
    };
    let mut any_breakable = false;
    init.walk(&mut |n| any_breakable |= n.breakable);
    assert!(!any_breakable);
    // The loop condition is not breakable; the body statement is.
    let NodeKind::While { cond, body, .. } = &stmts[1].kind else {
        panic!("expected while node");
    };
    assert!(!cond.breakable);
    assert!(body.breakable);
}

#[test]
fn blocks_are_statements_but_not_breakpoints() {
    let program = parse_ok("{ let a = 1; }");
    let stmts = statements(&program);
    assert!(stmts[0].statement);
    assert!(!stmts[0].breakable);
    let NodeKind::Block { statements: inner, .. } = &stmts[0].kind else {
        panic!("expected block");
    };
    assert!(inner[0].breakable);
}

#[test]
fn semicolons_are_optional_before_closing_brace() {
    let program = parse_ok("{ let a = 1 }");
    let stmts = statements(&program);
    assert!(matches!(stmts[0].kind, NodeKind::Block { .. }));
}
