//! The engine: compile pipeline and execution-result handles.
//!
//! `Engine` owns the host registry, the breakpoint set, and the options.
//! `compile` runs lexer + parser into a shareable [`Script`]; `execute`
//! starts a [`Session`] behind an [`Execution`] handle. One execution per
//! engine may be live at a time — starting a second before disposing the
//! first is a precondition violation and panics.

use crate::breakpoints::BreakpointSet;
use crate::diagnostics;
use crate::host::HostRegistry;
use quill_eval::{
    BreakPredicate, FrameSnapshot, RuntimeError, Session, SessionOptions, Status, Value,
};
use quill_lexer::Lexer;
use quill_parser::{Parser, ScopeOptions};
use quill_types::ast::NodeRef;
use quill_types::{Diagnostics, ScriptError, SourceFile};
use sha2::{Digest, Sha256};
use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

/// Engine-wide configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Name-declaration rules handed to the parser.
    pub scope: ScopeOptions,
    /// Pause the instant a runtime error is produced.
    pub first_chance_errors: bool,
    /// Keep the frame chain alive after a terminal error.
    pub keep_frames_on_error: bool,
    /// Per-run step budget; exhausting it pauses with
    /// [`Status::TimedOut`]. `None` runs without a budget.
    pub step_budget: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            scope: ScopeOptions::default(),
            first_chance_errors: false,
            keep_frames_on_error: false,
            step_budget: None,
        }
    }
}

/// A compiled script: shared AST, diagnostics, and a content fingerprint
/// hosts can key caches and breakpoint sets by.
pub struct Script {
    pub name: String,
    pub program: NodeRef,
    pub diagnostics: Diagnostics,
    /// SHA-256 of the source text, lowercase hex.
    pub fingerprint: String,
    source: Rc<SourceFile>,
}

impl Script {
    /// The source this script was compiled from.
    pub fn source(&self) -> &SourceFile {
        &self.source
    }
}

/// The embedding entry point.
pub struct Engine {
    host: HostRegistry,
    breakpoints: Rc<RefCell<BreakpointSet>>,
    options: EngineOptions,
    active: Rc<Cell<bool>>,
}

impl Engine {
    /// Create an engine with default options.
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Create an engine with explicit options.
    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            host: HostRegistry::new(),
            breakpoints: Rc::new(RefCell::new(BreakpointSet::new())),
            options,
            active: Rc::new(Cell::new(false)),
        }
    }

    /// The host registration table.
    pub fn host(&self) -> &HostRegistry {
        &self.host
    }

    /// Mutable access for registrations.
    pub fn host_mut(&mut self) -> &mut HostRegistry {
        &mut self.host
    }

    /// The breakpoint set, shared with any live execution.
    pub fn breakpoints(&self) -> RefMut<'_, BreakpointSet> {
        self.breakpoints.borrow_mut()
    }

    /// Lex and parse a source into a script. Malformed input still
    /// produces a program — errors are embedded in place and listed in
    /// `diagnostics`.
    pub fn compile(&self, name: &str, source: &str) -> Script {
        let source_file = Rc::new(SourceFile::new(name, source));
        let lexed = Lexer::new(&source_file).lex();
        let mut diagnostics = lexed.errors;
        let parsed = Parser::with_options(lexed.tokens, &source_file, self.options.scope).parse();
        diagnostics.merge(parsed.errors);

        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        let fingerprint = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();

        tracing::debug!(
            script = name,
            errors = diagnostics.total_errors,
            fingerprint = %fingerprint,
            "compiled script"
        );
        Script {
            name: name.to_string(),
            program: parsed.program,
            diagnostics,
            fingerprint,
            source: source_file,
        }
    }

    /// The pre-execution collector: embedded syntax errors plus unbound
    /// identifiers this engine's host registry does not satisfy.
    pub fn check(&self, script: &Script) -> Vec<ScriptError> {
        diagnostics::collect(&script.program, &script.source, &|name| {
            self.host.has_root(name)
        })
    }

    /// Start an execution session for a compiled script.
    ///
    /// Panics if another execution from this engine is still alive —
    /// dispose (drop) it first.
    pub fn execute(&self, script: &Script) -> Execution {
        assert!(
            !self.active.get(),
            "an execution is already active on this engine"
        );
        self.active.set(true);

        let breakpoints = self.breakpoints.clone();
        let predicate: BreakPredicate = Rc::new(move |node| breakpoints.borrow().hits(node));
        let session = Session::new(
            script.program.clone(),
            SessionOptions {
                host: Rc::new(self.host.snapshot()),
                break_predicate: Some(predicate),
                break_always: false,
                first_chance_errors: self.options.first_chance_errors,
                keep_frames_on_error: self.options.keep_frames_on_error,
            },
        );
        tracing::debug!(script = %script.name, "execution session started");
        Execution {
            session,
            budget: self.options.step_budget,
            _guard: ActiveGuard(self.active.clone()),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the engine's single-execution slot on drop.
struct ActiveGuard(Rc<Cell<bool>>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Handle to one execution session.
///
/// While paused, the live frame chain is inspectable and `continue_run`
/// / `step` resume exactly at the suspension point. Dropping the handle
/// disposes the session and frees the engine for the next execution.
pub struct Execution {
    session: Session,
    budget: Option<u64>,
    _guard: ActiveGuard,
}

impl Execution {
    /// Run until the script finishes or pauses, applying the engine's
    /// step budget.
    pub fn run(&mut self) -> Status {
        self.session.run_budget(self.budget)
    }

    /// Resume a paused execution. Panics if not paused.
    pub fn continue_run(&mut self) -> Status {
        assert!(
            self.session.is_paused(),
            "continue on an execution that is not paused"
        );
        self.session.run_budget(self.budget)
    }

    /// Advance exactly one step.
    pub fn step(&mut self) -> Status {
        self.session.step()
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.session.status()
    }

    /// Final value, once finished.
    pub fn value(&self) -> Option<&Value> {
        self.session.value()
    }

    /// Terminal error, once failed.
    pub fn error(&self) -> Option<&RuntimeError> {
        self.session.error()
    }

    /// The live frame chain, innermost first.
    pub fn backtrace(&self) -> Vec<FrameSnapshot> {
        self.session.backtrace()
    }

    /// The underlying session, for inspection.
    pub fn session(&self) -> &Session {
        &self.session
    }
}
