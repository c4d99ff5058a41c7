//! The resumable evaluator.
//!
//! A tree-walking interpreter over an explicit frame stack. Each step
//! advances the innermost frame's state machine one move: it either pushes
//! a child frame, completes with a value, or raises a signal. Because the
//! stack is reified, execution can pause before any breakable node (or the
//! instant a runtime error is produced) and resume later from exactly that
//! point, regardless of how deeply the pause sits inside an expression.
//!
//! Signals propagate upward exactly like values until the construct that
//! owns the matching scope intercepts them: loops intercept break and
//! continue, a call frame whose body is running intercepts return, and
//! try/catch intercepts throw and catchable runtime errors. A frame runs
//! its cleanup (unregistering locals, closures, loop variables) whenever
//! it leaves the stack, on every exit path.

use crate::access::{EmptyHost, HostLookup};
use crate::env::Environment;
use crate::error::RuntimeError;
use crate::frame::{Frame, FrameSnapshot};
use crate::value::{new_cell, CellRef, Closure, Signal, Value};
use quill_types::ast::{BinOp, Constant, FlowKind, Node, NodeKind, NodeRef, UnaryOp};
use quill_types::Span;
use std::collections::HashMap;
use std::rc::Rc;

/// Call-frame state while the callee's body is running.
const CALL_BODY: u32 = 1_000;

/// Host-visible execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not started, or mid-run between steps.
    Ready,
    /// Completed with a final value.
    Finished,
    /// Completed with a terminal error.
    Failed,
    /// Paused before a breakable node.
    AtBreakpoint,
    /// Paused at the site of a freshly raised runtime error.
    AtError,
    /// Paused because the step budget ran out.
    TimedOut,
}

/// Breakpoint predicate, consulted once per breakable node.
pub type BreakPredicate = Rc<dyn Fn(&Node) -> bool>;

/// Per-session configuration.
pub struct SessionOptions {
    /// Root-name resolution for identifiers with no lexical binding.
    pub host: Rc<dyn HostLookup>,
    /// Per-node breakpoint predicate.
    pub break_predicate: Option<BreakPredicate>,
    /// Pause before every breakable node (single-stepping).
    pub break_always: bool,
    /// Pause the instant a runtime error is produced, before any
    /// try/catch runs.
    pub first_chance_errors: bool,
    /// On a terminal error, keep the frame chain alive for post-mortem
    /// inspection instead of unwinding it.
    pub keep_frames_on_error: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host: Rc::new(EmptyHost),
            break_predicate: None,
            break_always: false,
            first_chance_errors: false,
            keep_frames_on_error: false,
        }
    }
}

/// One move of a frame's state machine.
enum Act {
    /// Descend into a child node.
    Push(NodeRef),
    /// The frame resolved to a value.
    Done(Value),
    /// The frame raised a signal.
    Raise(Signal),
}

/// Outcome of offering a signal to a frame.
enum Intercept {
    /// Not this frame's business; keep unwinding.
    Pass,
    /// The frame absorbed the signal and mutated itself to continue.
    Handled,
    /// The frame absorbed the signal and resolved to a value.
    Complete(Value),
}

/// One execution of one program against one environment.
///
/// The session owns the frame stack, the dynamic environment, and the
/// session-global cells. Dropping it releases every live binding.
pub struct Session {
    env: Environment,
    frames: Vec<Frame>,
    /// Script-created globals (`x = 1` with no declaration in scope).
    globals: HashMap<String, CellRef>,
    opts: SessionOptions,
    status: Status,
    result: Option<Value>,
    error: Option<RuntimeError>,
    /// Node whose breakpoint fired; pushed without re-consulting the
    /// predicate on resume.
    pending_node: Option<NodeRef>,
    /// First-chance error awaiting propagation; the raising frame is
    /// still innermost for inspection.
    pending_error: Option<RuntimeError>,
    /// The current error already produced its first-chance pause.
    error_notified: bool,
}

impl Session {
    /// Create a session for a parsed program.
    pub fn new(program: NodeRef, opts: SessionOptions) -> Self {
        Self {
            env: Environment::new(),
            frames: vec![Frame::new(program)],
            globals: HashMap::new(),
            opts,
            status: Status::Ready,
            result: None,
            error: None,
            pending_node: None,
            pending_error: None,
            error_notified: false,
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Final value, once finished.
    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Terminal error, once failed.
    pub fn error(&self) -> Option<&RuntimeError> {
        self.error.as_ref()
    }

    /// True while paused at a breakpoint, an error site, or a timeout.
    pub fn is_paused(&self) -> bool {
        matches!(
            self.status,
            Status::AtBreakpoint | Status::AtError | Status::TimedOut
        )
    }

    /// The live frame chain, innermost first. Meaningful while paused, or
    /// after a failure with `keep_frames_on_error` set.
    pub fn backtrace(&self) -> Vec<FrameSnapshot> {
        self.frames.iter().rev().map(Frame::snapshot).collect()
    }

    /// Read a script-created global.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).map(|c| c.borrow().clone())
    }

    /// Number of live cells on the dynamic environment.
    pub fn live_bindings(&self) -> usize {
        self.env.live_bindings()
    }

    // ── Driving ───────────────────────────────────────────────────────────────

    /// Run until the session finishes or pauses.
    pub fn run(&mut self) -> Status {
        self.run_budget(None)
    }

    /// Run with an optional step budget; exhausting it pauses the session
    /// with [`Status::TimedOut`], resumable like any other pause.
    pub fn run_budget(&mut self, budget: Option<u64>) -> Status {
        let mut steps: u64 = 0;
        while !matches!(self.status, Status::Finished | Status::Failed) {
            if budget.is_some_and(|limit| steps >= limit) {
                self.status = Status::TimedOut;
                tracing::trace!(steps, "paused on step budget");
                break;
            }
            self.step();
            steps += 1;
            if self.is_paused() {
                break;
            }
        }
        self.status
    }

    /// Advance exactly one step, resuming first if paused.
    ///
    /// Panics when the session is already resolved — stepping a finished
    /// session is host-API misuse, not a script error.
    pub fn step(&mut self) -> Status {
        assert!(
            !matches!(self.status, Status::Finished | Status::Failed),
            "step on a resolved session"
        );
        self.status = Status::Ready;

        // Resume from a breakpoint: push the remembered node without
        // consulting the predicate again.
        if let Some(node) = self.pending_node.take() {
            tracing::trace!(node = node.kind_name(), "resuming past breakpoint");
            self.frames.push(Frame::new(node));
            return self.status;
        }
        // Resume from a first-chance pause: let the error propagate.
        if let Some(err) = self.pending_error.take() {
            let mut frame = self.frames.pop().expect("raising frame must be live");
            frame.cleanup(&mut self.env);
            self.propagate(Signal::Error(err));
            return self.status;
        }

        let mut frame = match self.frames.pop() {
            Some(frame) => frame,
            None => {
                self.finish(Value::Undefined);
                return self.status;
            }
        };
        match self.advance_frame(&mut frame) {
            Act::Push(node) => {
                self.frames.push(frame);
                if node.breakable && self.should_break(&node) {
                    tracing::trace!(node = node.kind_name(), "paused at breakpoint");
                    self.pending_node = Some(node);
                    self.status = Status::AtBreakpoint;
                } else {
                    self.frames.push(Frame::new(node));
                }
            }
            Act::Done(value) => {
                frame.cleanup(&mut self.env);
                self.deliver(value);
            }
            Act::Raise(signal) => {
                if let Signal::Error(err) = &signal {
                    tracing::debug!(message = %err.message, "runtime error raised");
                    if self.opts.first_chance_errors && !self.error_notified {
                        // Pause at the throw site, frame intact.
                        self.error_notified = true;
                        self.pending_error = Some(err.clone());
                        self.frames.push(frame);
                        self.status = Status::AtError;
                        return self.status;
                    }
                }
                frame.cleanup(&mut self.env);
                self.propagate(signal);
            }
        }
        self.status
    }

    fn should_break(&self, node: &Node) -> bool {
        if self.opts.break_always {
            return true;
        }
        match &self.opts.break_predicate {
            Some(predicate) => predicate(node),
            None => false,
        }
    }

    /// Hand a resolved value to the waiting frame, or finish.
    fn deliver(&mut self, value: Value) {
        match self.frames.last_mut() {
            Some(parent) => parent.vals.push(value),
            None => self.finish(value),
        }
    }

    fn finish(&mut self, value: Value) {
        self.result = Some(value.deref());
        self.status = Status::Finished;
        tracing::trace!("session finished");
    }

    fn fail(&mut self, err: RuntimeError) {
        if !self.opts.keep_frames_on_error {
            while let Some(mut frame) = self.frames.pop() {
                frame.cleanup(&mut self.env);
            }
        }
        self.error = Some(err);
        self.status = Status::Failed;
    }

    /// Would any live try/catch intercept this signal?
    fn would_catch(&self, signal: &Signal) -> bool {
        match signal {
            Signal::Throw(_) => {}
            Signal::Error(err) if err.catchable => {}
            _ => return false,
        }
        self.frames
            .iter()
            .any(|f| matches!(f.node.kind, NodeKind::TryCatch { .. }) && f.state == 1)
    }

    /// Unwind toward the construct that owns the signal.
    fn propagate(&mut self, signal: Signal) {
        // Post-mortem mode: when nothing will catch, fail in place with
        // the frame chain intact.
        if matches!(signal, Signal::Throw(_) | Signal::Error(_))
            && self.opts.keep_frames_on_error
            && !self.would_catch(&signal)
        {
            let err = match signal {
                Signal::Throw(v) => {
                    RuntimeError::new(format!("uncaught exception: {}", v.to_display()))
                }
                Signal::Error(err) => err,
                _ => unreachable!(),
            };
            self.error = Some(err);
            self.status = Status::Failed;
            return;
        }

        loop {
            let Some(top) = self.frames.last_mut() else {
                match signal {
                    Signal::Return(v) => self.finish(v),
                    Signal::Throw(v) => self.fail(RuntimeError::new(format!(
                        "uncaught exception: {}",
                        v.to_display()
                    ))),
                    Signal::Error(err) => self.fail(err),
                    Signal::Break => self.fail(RuntimeError::new("'break' outside of a loop")),
                    Signal::Continue => {
                        self.fail(RuntimeError::new("'continue' outside of a loop"))
                    }
                }
                return;
            };
            match Self::intercept(top, &signal, &mut self.env, &mut self.error_notified) {
                Intercept::Handled => return,
                Intercept::Complete(value) => {
                    let mut frame = self.frames.pop().expect("intercepting frame is live");
                    frame.cleanup(&mut self.env);
                    self.deliver(value);
                    return;
                }
                Intercept::Pass => {
                    let mut frame = self.frames.pop().expect("frame is live");
                    frame.cleanup(&mut self.env);
                }
            }
        }
    }

    /// Offer a signal to a frame on the unwind path.
    fn intercept(
        frame: &mut Frame,
        signal: &Signal,
        env: &mut Environment,
        error_notified: &mut bool,
    ) -> Intercept {
        match &frame.node.kind {
            // Loops own break and continue arriving from their body.
            NodeKind::While { .. } => match signal {
                Signal::Break => Intercept::Complete(Value::Undefined),
                Signal::Continue => {
                    frame.vals.clear();
                    frame.state = 2; // next advance re-tests the condition
                    Intercept::Handled
                }
                _ => Intercept::Pass,
            },
            NodeKind::Foreach { .. } => match signal {
                Signal::Break => Intercept::Complete(Value::Undefined),
                Signal::Continue => {
                    frame.vals.clear();
                    frame.state = 2; // next advance moves to the next item
                    Intercept::Handled
                }
                _ => Intercept::Pass,
            },
            // A call frame whose body is running owns return.
            NodeKind::IndexOrCall { indexer: false, .. } if frame.state == CALL_BODY => {
                match signal {
                    Signal::Return(v) => Intercept::Complete(v.clone()),
                    _ => Intercept::Pass,
                }
            }
            // try/catch owns throw and catchable errors while its body
            // runs; anything raised from the handler passes through.
            NodeKind::TryCatch { param, .. } if frame.state == 1 => {
                let bound = match signal {
                    Signal::Throw(v) => Some(v.clone().deref()),
                    Signal::Error(err) if err.catchable => {
                        // The error is handled; the next one may pause again.
                        *error_notified = false;
                        Some(Value::from(err.message.as_str()))
                    }
                    _ => None,
                };
                match bound {
                    Some(value) => {
                        let cell = env.register(param);
                        *cell.borrow_mut() = value;
                        frame.regs.push(param.clone());
                        frame.state = 2; // next advance runs the handler
                        Intercept::Handled
                    }
                    None => Intercept::Pass,
                }
            }
            _ => Intercept::Pass,
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Per-node state machines
    // ══════════════════════════════════════════════════════════════════════════

    /// Advance a frame's state machine by one move.
    fn advance_frame(&mut self, frame: &mut Frame) -> Act {
        let node = frame.node.clone();
        let span = node.span;
        match &node.kind {
            NodeKind::Constant(c) => Act::Done(constant_value(c)),

            NodeKind::Ident(decl) => Act::Done(Value::Cell(self.env.find(decl))),

            NodeKind::Global(name) => {
                if let Some(cell) = self.globals.get(name) {
                    Act::Done(Value::Cell(cell.clone()))
                } else if let Some(value) = self.opts.host.global(name) {
                    Act::Done(value)
                } else {
                    Act::Raise(Signal::Error(
                        RuntimeError::new(format!("'{name}' is not defined")).at(span),
                    ))
                }
            }

            NodeKind::Member { left, name } => match frame.state {
                0 => match left {
                    Some(l) => {
                        frame.state = 1;
                        Act::Push(l.clone())
                    }
                    None => Act::Raise(Signal::Error(
                        RuntimeError::new("'.' member access outside of 'with'").at(span),
                    )),
                },
                _ => {
                    let object = frame.vals[0].clone().deref();
                    resolve_member(&object, name, span)
                }
            },

            NodeKind::IndexOrCall {
                left,
                args,
                indexer,
            } => {
                let children = args.len() as u32 + 1;
                match frame.state {
                    CALL_BODY => Act::Done(Value::Undefined), // body fell off the end
                    0 => {
                        frame.state = 1;
                        Act::Push(left.clone())
                    }
                    s if s < children => {
                        frame.state = s + 1;
                        Act::Push(args[(s - 1) as usize].clone())
                    }
                    _ => {
                        if *indexer {
                            let object = frame.vals[0].clone().deref();
                            let key = frame.vals[1].clone().deref();
                            resolve_index(&object, &key, span)
                        } else {
                            self.perform_call(frame, span)
                        }
                    }
                }
            }

            NodeKind::Binary { op, left, right } => match op {
                BinOp::And | BinOp::Or => match frame.state {
                    0 => {
                        frame.state = 1;
                        Act::Push(left.clone())
                    }
                    1 => {
                        let l = frame.vals[0].clone().deref();
                        let short_circuit = match op {
                            BinOp::And => !l.truthy(),
                            _ => l.truthy(),
                        };
                        if short_circuit {
                            // The right operand is never visited.
                            Act::Done(l)
                        } else {
                            frame.state = 2;
                            Act::Push(right.clone())
                        }
                    }
                    _ => Act::Done(frame.vals[1].clone().deref()),
                },
                _ => match frame.state {
                    0 => {
                        frame.state = 1;
                        Act::Push(left.clone())
                    }
                    1 => {
                        frame.state = 2;
                        Act::Push(right.clone())
                    }
                    _ => {
                        let l = frame.vals[0].clone().deref();
                        let r = frame.vals[1].clone().deref();
                        Act::Done(binary_value(*op, &l, &r))
                    }
                },
            },

            NodeKind::Unary { op, expr } => match frame.state {
                0 => {
                    frame.state = 1;
                    Act::Push(expr.clone())
                }
                _ => {
                    let v = frame.vals[0].clone().deref();
                    Act::Done(match op {
                        UnaryOp::Neg => Value::Number(-v.to_number()),
                        UnaryOp::Plus => Value::Number(v.to_number()),
                        UnaryOp::Not => Value::Bool(!v.truthy()),
                    })
                }
            },

            NodeKind::If {
                cond,
                then,
                otherwise,
            } => match frame.state {
                0 => {
                    frame.state = 1;
                    Act::Push(cond.clone())
                }
                1 => {
                    let taken = frame.vals[0].clone().deref().truthy();
                    if taken {
                        frame.state = 2;
                        Act::Push(then.clone())
                    } else if let Some(e) = otherwise {
                        frame.state = 2;
                        Act::Push(e.clone())
                    } else {
                        Act::Done(Value::Undefined)
                    }
                }
                _ => Act::Done(frame.vals[1].clone()),
            },

            NodeKind::Block { statements, locals } => match frame.state {
                0 => {
                    // All locals get cells up front, so closures over
                    // later-declared siblings resolve.
                    for decl in locals {
                        self.env.register(decl);
                        frame.regs.push(decl.clone());
                    }
                    if statements.is_empty() {
                        Act::Done(Value::Undefined)
                    } else {
                        frame.state = 1;
                        Act::Push(statements[0].clone())
                    }
                }
                s => {
                    if (s as usize) < statements.len() {
                        frame.vals.clear();
                        frame.state = s + 1;
                        Act::Push(statements[s as usize].clone())
                    } else {
                        Act::Done(frame.vals.pop().unwrap_or(Value::Undefined))
                    }
                }
            },

            NodeKind::Assign { target, value } => match frame.state {
                0 => {
                    if let NodeKind::Global(name) = &target.kind {
                        // Assignment to an unresolved name creates a
                        // session global (unless the host owns the name).
                        let cell = if let Some(cell) = self.globals.get(name) {
                            cell.clone()
                        } else if self.opts.host.global(name).is_some() {
                            return Act::Raise(Signal::Error(
                                RuntimeError::new(format!(
                                    "cannot assign to host name '{name}'"
                                ))
                                .at(span),
                            ));
                        } else {
                            let cell = new_cell();
                            self.globals.insert(name.clone(), cell.clone());
                            cell
                        };
                        frame.vals.push(Value::Cell(cell));
                        frame.state = 2;
                        Act::Push(value.clone())
                    } else {
                        frame.state = 1;
                        Act::Push(target.clone())
                    }
                }
                1 => {
                    frame.state = 2;
                    Act::Push(value.clone())
                }
                _ => {
                    let rhs = frame.vals[1].clone().deref();
                    match &frame.vals[0] {
                        Value::Cell(cell) => {
                            *cell.borrow_mut() = rhs.clone();
                            Act::Done(rhs)
                        }
                        _ => Act::Raise(Signal::Error(
                            RuntimeError::new("invalid assignment target").at(span),
                        )),
                    }
                }
            },

            NodeKind::Let { decl, init } => match frame.state {
                0 => match init {
                    Some(i) => {
                        frame.state = 1;
                        Act::Push(i.clone())
                    }
                    None => Act::Done(Value::Undefined),
                },
                _ => {
                    let value = frame.vals[0].clone().deref();
                    let cell = self.env.find(decl);
                    *cell.borrow_mut() = value;
                    Act::Done(Value::Undefined)
                }
            },

            NodeKind::IncDec {
                target,
                increment,
                prefix,
            } => match frame.state {
                0 => {
                    frame.state = 1;
                    Act::Push(target.clone())
                }
                _ => match &frame.vals[0] {
                    Value::Cell(cell) => {
                        let old = { cell.borrow().to_number() };
                        let new = if *increment { old + 1.0 } else { old - 1.0 };
                        *cell.borrow_mut() = Value::Number(new);
                        Act::Done(Value::Number(if *prefix { new } else { old }))
                    }
                    _ => Act::Raise(Signal::Error(
                        RuntimeError::new("invalid increment/decrement target").at(span),
                    )),
                },
            },

            NodeKind::While {
                cond,
                body,
                do_while,
            } => match frame.state {
                0 => {
                    if *do_while {
                        frame.state = 2;
                        Act::Push(body.clone())
                    } else {
                        frame.state = 1;
                        Act::Push(cond.clone())
                    }
                }
                1 => {
                    // Condition delivered.
                    let go = frame.vals[0].clone().deref().truthy();
                    frame.vals.clear();
                    if go {
                        frame.state = 2;
                        Act::Push(body.clone())
                    } else {
                        Act::Done(Value::Undefined)
                    }
                }
                _ => {
                    // Body delivered (or continue intercepted).
                    frame.vals.clear();
                    frame.state = 1;
                    Act::Push(cond.clone())
                }
            },

            NodeKind::Foreach {
                decl,
                generator,
                body,
            } => match frame.state {
                0 => {
                    frame.state = 1;
                    Act::Push(generator.clone())
                }
                1 => {
                    let g = frame.vals.pop().unwrap_or(Value::Undefined).deref();
                    let items = match enumerate(&g) {
                        Ok(items) => items,
                        Err(err) => return Act::Raise(Signal::Error(err.at(span))),
                    };
                    self.env.register(decl);
                    frame.regs.push(decl.clone());
                    frame.items = Some(items);
                    frame.index = 0;
                    frame.state = 2;
                    self.foreach_step(frame)
                }
                _ => {
                    frame.vals.clear();
                    self.foreach_step(frame)
                }
            },

            NodeKind::Flow { kind, value } => match frame.state {
                0 => match value {
                    Some(v) => {
                        frame.state = 1;
                        Act::Push(v.clone())
                    }
                    None => Act::Raise(flow_signal(*kind, Value::Undefined)),
                },
                _ => {
                    let v = frame.vals[0].clone().deref();
                    Act::Raise(flow_signal(*kind, v))
                }
            },

            NodeKind::Function(def) => {
                // Pair each closure declaration with the cell live right
                // now; the function value carries those cells for life.
                let mut captured = Vec::with_capacity(def.closures.len());
                for decl in &def.closures {
                    captured.push((decl.clone(), self.env.find(decl)));
                }
                Act::Done(Value::Function(Rc::new(Closure {
                    def: def.clone(),
                    captured,
                })))
            }

            NodeKind::TryCatch { body, handler, .. } => match frame.state {
                0 => {
                    frame.state = 1;
                    Act::Push(body.clone())
                }
                1 => Act::Done(frame.vals.pop().unwrap_or(Value::Undefined)),
                2 => {
                    // Set by interception: the parameter is bound, run the
                    // handler.
                    frame.state = 3;
                    Act::Push(handler.clone())
                }
                _ => Act::Done(frame.vals.pop().unwrap_or(Value::Undefined)),
            },

            NodeKind::With {
                decl,
                subject,
                body,
            } => match frame.state {
                0 => {
                    frame.state = 1;
                    Act::Push(subject.clone())
                }
                1 => {
                    let value = frame.vals.pop().unwrap_or(Value::Undefined).deref();
                    let cell = self.env.register(decl);
                    *cell.borrow_mut() = value;
                    frame.regs.push(decl.clone());
                    frame.state = 2;
                    Act::Push(body.clone())
                }
                _ => Act::Done(frame.vals.pop().unwrap_or(Value::Undefined)),
            },

            NodeKind::Sequence(items) => match frame.state {
                0 => {
                    if items.is_empty() {
                        Act::Done(Value::Undefined)
                    } else {
                        frame.state = 1;
                        Act::Push(items[0].clone())
                    }
                }
                s => {
                    if (s as usize) < items.len() {
                        frame.vals.clear();
                        frame.state = s + 1;
                        Act::Push(items[s as usize].clone())
                    } else {
                        Act::Done(frame.vals.pop().unwrap_or(Value::Undefined))
                    }
                }
            },

            NodeKind::Error(message) => Act::Raise(Signal::Error(
                RuntimeError::uncatchable(format!("syntax error: {message}")).at(span),
            )),
        }
    }

    /// Push the next foreach iteration, or finish the loop.
    fn foreach_step(&mut self, frame: &mut Frame) -> Act {
        let node = frame.node.clone();
        let NodeKind::Foreach { decl, body, .. } = &node.kind else {
            unreachable!("foreach_step on a non-foreach frame");
        };
        let items = frame.items.as_ref().expect("items set in state 1");
        if frame.index < items.len() {
            let value = items[frame.index].clone();
            frame.index += 1;
            let cell = self.env.find(decl);
            *cell.borrow_mut() = value;
            Act::Push(body.clone())
        } else {
            Act::Done(Value::Undefined)
        }
    }

    /// All children of a call are evaluated; invoke the callee.
    fn perform_call(&mut self, frame: &mut Frame, span: Span) -> Act {
        let callee = frame.vals[0].clone().deref();
        let argv: Vec<Value> = frame.vals[1..]
            .iter()
            .map(|v| v.clone().deref())
            .collect();
        match callee {
            Value::Native(f) => match f.call(&argv) {
                Ok(value) => Act::Done(value),
                Err(err) => {
                    let err = if err.span.is_none() { err.at(span) } else { err };
                    Act::Raise(Signal::Error(err))
                }
            },
            Value::Function(closure) => {
                // Closure cells first, then the self binding, then the
                // parameters; cleanup unwinds in reverse.
                for (decl, cell) in &closure.captured {
                    self.env.register_cell(decl, cell.clone());
                    frame.regs.push(decl.clone());
                }
                if let Some(self_decl) = &closure.def.self_decl {
                    let cell = self.env.register(self_decl);
                    *cell.borrow_mut() = Value::Function(closure.clone());
                    frame.regs.push(self_decl.clone());
                }
                for (i, param) in closure.def.params.iter().enumerate() {
                    let cell = self.env.register(param);
                    *cell.borrow_mut() = argv.get(i).cloned().unwrap_or(Value::Undefined);
                    frame.regs.push(param.clone());
                }
                frame.state = CALL_BODY;
                Act::Push(closure.def.body.clone())
            }
            Value::Object(object) => match object.call(&argv) {
                Some(Ok(value)) => Act::Done(value),
                Some(Err(err)) => Act::Raise(Signal::Error(err.at(span))),
                None => Act::Raise(Signal::Error(
                    RuntimeError::new(format!("[{}] is not a function", object.type_name()))
                        .at(span),
                )),
            },
            other => Act::Raise(Signal::Error(
                RuntimeError::new(format!("{} is not a function", other.type_name())).at(span),
            )),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Abandoned sessions (including paused ones) release every live
        // binding still on the environment.
        while let Some(mut frame) = self.frames.pop() {
            frame.cleanup(&mut self.env);
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Free helpers
// ══════════════════════════════════════════════════════════════════════════════

fn constant_value(c: &Constant) -> Value {
    match c {
        Constant::Undefined => Value::Undefined,
        Constant::Null => Value::Null,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Number(n) => Value::Number(*n),
        Constant::Str(s) => Value::from(s.as_str()),
    }
}

fn flow_signal(kind: FlowKind, value: Value) -> Signal {
    match kind {
        FlowKind::Break => Signal::Break,
        FlowKind::Continue => Signal::Continue,
        FlowKind::Return => Signal::Return(value),
        FlowKind::Throw => Signal::Throw(value),
    }
}

/// Compute a non-short-circuiting binary operation on derefed operands.
fn binary_value(op: BinOp, l: &Value, r: &Value) -> Value {
    use std::cmp::Ordering;
    match op {
        BinOp::Add => l.add(r),
        BinOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinOp::Mod => Value::Number(l.to_number() % r.to_number()),
        BinOp::Eq => Value::Bool(l.loose_eq(r)),
        BinOp::NotEq => Value::Bool(!l.loose_eq(r)),
        BinOp::StrictEq => Value::Bool(l.strict_eq(r)),
        BinOp::StrictNotEq => Value::Bool(!l.strict_eq(r)),
        BinOp::Less => Value::Bool(matches!(l.compare(r), Some(Ordering::Less))),
        BinOp::LessEq => Value::Bool(matches!(
            l.compare(r),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )),
        BinOp::Greater => Value::Bool(matches!(l.compare(r), Some(Ordering::Greater))),
        BinOp::GreaterEq => Value::Bool(matches!(
            l.compare(r),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        )),
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators have their own states"),
    }
}

/// Resolve `object.name`.
fn resolve_member(object: &Value, name: &str, span: Span) -> Act {
    match object {
        Value::Str(s) if name == "length" => {
            Act::Done(Value::Number(s.chars().count() as f64))
        }
        Value::Object(o) => match o.member(name) {
            Some(value) => Act::Done(value),
            None => Act::Raise(Signal::Error(
                RuntimeError::new(format!(
                    "unknown member '{name}' on [{}]",
                    o.type_name()
                ))
                .at(span),
            )),
        },
        other => Act::Raise(Signal::Error(
            RuntimeError::new(format!(
                "cannot read member '{name}' of {}",
                other.type_name()
            ))
            .at(span),
        )),
    }
}

/// Resolve `object[key]`.
fn resolve_index(object: &Value, key: &Value, span: Span) -> Act {
    match object {
        Value::Str(s) => {
            let n = key.to_number();
            if n.fract() == 0.0 && n >= 0.0 {
                if let Some(ch) = s.chars().nth(n as usize) {
                    return Act::Done(Value::from(ch.to_string()));
                }
            }
            Act::Raise(Signal::Error(
                RuntimeError::new(format!(
                    "string index {} out of range",
                    key.to_display()
                ))
                .at(span),
            ))
        }
        Value::Object(o) => match o.index(key) {
            Some(value) => Act::Done(value),
            None => Act::Raise(Signal::Error(
                RuntimeError::new(format!(
                    "cannot index [{}] with {}",
                    o.type_name(),
                    key.to_display()
                ))
                .at(span),
            )),
        },
        other => Act::Raise(Signal::Error(
            RuntimeError::new(format!("{} is not indexable", other.type_name())).at(span),
        )),
    }
}

/// Items for `for (x in v)`.
fn enumerate(v: &Value) -> Result<Vec<Value>, RuntimeError> {
    match v {
        Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        Value::Object(o) => o.enumerate().ok_or_else(|| {
            RuntimeError::new(format!("[{}] is not enumerable", o.type_name()))
        }),
        other => Err(RuntimeError::new(format!(
            "{} is not enumerable",
            other.type_name()
        ))),
    }
}
