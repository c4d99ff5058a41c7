//! Integration tests for the engine: host registration, the compile
//! pipeline, line breakpoints, timeouts, first-chance pauses, and the
//! single-execution lifecycle.

use quill_engine::{Engine, EngineOptions, ScopeOptions, Status, Value};
use quill_types::ErrorCode;

fn run_to_number(engine: &Engine, src: &str) -> f64 {
    let script = engine.compile("test.qs", src);
    assert!(
        !script.diagnostics.has_errors(),
        "compile errors: {:?}",
        script.diagnostics.errors
    );
    let mut exec = engine.execute(&script);
    assert_eq!(exec.run(), Status::Finished, "error: {:?}", exec.error());
    exec.value().unwrap().to_number()
}

// ══════════════════════════════════════════════════════════════════════════════
// Pipeline
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn compile_and_run_end_to_end() {
    let engine = Engine::new();
    assert_eq!(run_to_number(&engine, "let i = 0; while (i < 10) i++; i;"), 10.0);
}

#[test]
fn fingerprint_is_stable_content_hash() {
    let engine = Engine::new();
    let a = engine.compile("a.qs", "1 + 1;");
    let b = engine.compile("b.qs", "1 + 1;");
    let c = engine.compile("c.qs", "1 + 2;");
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_ne!(a.fingerprint, c.fingerprint);
    assert_eq!(a.fingerprint.len(), 64);
    assert!(a.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn compile_collects_diagnostics_but_still_produces_a_program() {
    let engine = Engine::new();
    let script = engine.compile("bad.qs", "let = 1; let ok = 2;");
    assert!(script.diagnostics.has_errors());
    // The tree still exists, with the errors embedded in place.
    let errors = engine.check(&script);
    assert!(!errors.is_empty());
}

#[test]
fn scope_options_flow_through_the_engine() {
    let engine = Engine::with_options(EngineOptions {
        scope: ScopeOptions {
            allow_masking: true,
            allow_local_redefinition: true,
        },
        ..EngineOptions::default()
    });
    // Later declaration shadows the earlier one within the block.
    assert_eq!(run_to_number(&engine, "let x = 1; let x = 2; x;"), 2.0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Host registration
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn registered_functions_are_callable_by_dotted_name() {
    let mut engine = Engine::new();
    engine
        .host_mut()
        .register_fn("math.max", |args| {
            Ok(Value::Number(
                args.iter().map(|v| v.to_number()).fold(f64::NEG_INFINITY, f64::max),
            ))
        })
        .unwrap();
    engine
        .host_mut()
        .register("math.pi", Value::Number(3.14159))
        .unwrap();
    let got = run_to_number(&engine, "math.max(math.pi, 2) + 1;");
    assert!((got - 4.14159).abs() < 1e-9, "got {got}");
}

#[test]
fn host_values_resolve_as_globals() {
    let mut engine = Engine::new();
    engine.host_mut().register("answer", Value::Number(42.0)).unwrap();
    assert_eq!(run_to_number(&engine, "answer;"), 42.0);
}

#[test]
fn scripts_cannot_assign_over_host_names() {
    let mut engine = Engine::new();
    engine.host_mut().register("answer", Value::Number(42.0)).unwrap();
    let script = engine.compile("t.qs", "answer = 1;");
    let mut exec = engine.execute(&script);
    assert_eq!(exec.run(), Status::Failed);
    assert!(exec.error().unwrap().message.contains("host name"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Pre-execution collector
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn check_reports_unbound_identifiers_the_host_lacks() {
    let mut engine = Engine::new();
    let script = engine.compile("t.qs", "let a = 1; missing_one; a;");
    let errors = engine.check(&script);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::UNBOUND_IDENTIFIER);
    assert!(errors[0].message.contains("missing_one"));

    // Registering the name satisfies the reference.
    engine.host_mut().register("missing_one", Value::Null).unwrap();
    assert!(engine.check(&script).is_empty());
}

#[test]
fn check_does_not_flag_assignment_created_globals() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "r = 1; r + 1;");
    assert!(engine.check(&script).is_empty());
}

#[test]
fn check_includes_embedded_syntax_errors() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "let x = 1; 1 = 2;");
    let errors = engine.check(&script);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, quill_types::ErrorCategory::Syntax);
}

// ══════════════════════════════════════════════════════════════════════════════
// Breakpoints
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn line_breakpoint_pauses_and_resumes() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "let a = 1;\nlet b = 2;\na + b;");
    engine.breakpoints().add_line(2);
    let mut exec = engine.execute(&script);
    assert_eq!(exec.run(), Status::AtBreakpoint);
    assert!(!exec.backtrace().is_empty());
    assert_eq!(exec.continue_run(), Status::Finished);
    assert_eq!(exec.value().unwrap().to_number(), 3.0);
}

#[test]
fn breakpoints_can_be_toggled_while_paused() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "let a = 1;\nlet b = 2;\na + b;");
    engine.breakpoints().add_line(2);
    let mut exec = engine.execute(&script);
    assert_eq!(exec.run(), Status::AtBreakpoint);
    // Arm another line while the script is suspended.
    engine.breakpoints().add_line(3);
    assert_eq!(exec.continue_run(), Status::AtBreakpoint);
    assert_eq!(exec.continue_run(), Status::Finished);
    assert_eq!(exec.value().unwrap().to_number(), 3.0);
}

#[test]
fn break_always_single_steps_through_statements() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "let a = 1; let b = 2; a + b;");
    engine.breakpoints().set_break_always(true);
    let mut exec = engine.execute(&script);
    let mut pauses = 0;
    while exec.run() == Status::AtBreakpoint {
        pauses += 1;
        assert!(pauses < 100, "runaway stepping");
    }
    assert_eq!(exec.status(), Status::Finished);
    assert_eq!(pauses, 3);
    assert_eq!(exec.value().unwrap().to_number(), 3.0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Pauses: first-chance errors and timeouts
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn first_chance_pause_then_normal_catching() {
    let engine = Engine::with_options(EngineOptions {
        first_chance_errors: true,
        ..EngineOptions::default()
    });
    let script = engine.compile(
        "t.qs",
        "let r = ''; try { ghost; } catch (e) { r = 'caught'; } r;",
    );
    let mut exec = engine.execute(&script);
    assert_eq!(exec.run(), Status::AtError);
    assert!(!exec.backtrace().is_empty());
    assert_eq!(exec.continue_run(), Status::Finished);
    assert_eq!(exec.value().unwrap().to_display(), "caught");
}

#[test]
fn step_budget_times_out_and_resumes() {
    let engine = Engine::with_options(EngineOptions {
        step_budget: Some(200),
        ..EngineOptions::default()
    });
    let script = engine.compile("t.qs", "let i = 0; while (true) i++;");
    let mut exec = engine.execute(&script);
    assert_eq!(exec.run(), Status::TimedOut);
    // Each continue gets a fresh budget; the loop never ends.
    assert_eq!(exec.continue_run(), Status::TimedOut);
    assert!(exec.value().is_none());
}

#[test]
fn uncaught_errors_surface_on_the_handle() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "throw 'kaput';");
    let mut exec = engine.execute(&script);
    assert_eq!(exec.run(), Status::Failed);
    assert!(exec.error().unwrap().message.contains("kaput"));
    assert!(exec.value().is_none());
}

// ══════════════════════════════════════════════════════════════════════════════
// Execution lifecycle
// ══════════════════════════════════════════════════════════════════════════════

#[test]
#[should_panic(expected = "already active")]
fn starting_a_second_execution_is_fatal() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "1;");
    let _first = engine.execute(&script);
    let _second = engine.execute(&script);
}

#[test]
fn dropping_an_execution_frees_the_engine() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "1 + 1;");
    {
        let mut exec = engine.execute(&script);
        assert_eq!(exec.run(), Status::Finished);
    }
    // Disposed; a new session may start — even an abandoned paused one
    // would have released its bindings on drop.
    let mut exec = engine.execute(&script);
    assert_eq!(exec.run(), Status::Finished);
    assert_eq!(exec.value().unwrap().to_number(), 2.0);
}

#[test]
fn abandoning_a_paused_execution_leaks_nothing() {
    let engine = Engine::new();
    let script = engine.compile("t.qs", "let i = 0;\nwhile (true) { i++; }");
    engine.breakpoints().add_line(2);
    {
        let mut exec = engine.execute(&script);
        assert_eq!(exec.run(), Status::AtBreakpoint);
        assert!(exec.session().live_bindings() > 0);
        // Cancellation is simply "never resume".
    }
    let script2 = engine.compile("t.qs", "2;");
    engine.breakpoints().clear();
    let mut exec = engine.execute(&script2);
    assert_eq!(exec.run(), Status::Finished);
}
