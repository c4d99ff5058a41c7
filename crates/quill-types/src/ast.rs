//! Scope-resolved AST for the Quill language.
//!
//! The parser produces this tree with all lexical names already resolved to
//! [`Declaration`] identities; identifiers it cannot resolve become
//! [`NodeKind::Global`] leaves looked up against the host namespace at run
//! time. Children are reference-counted so evaluation frames can share
//! subtrees with the tree itself.

use crate::Span;
use std::fmt;
use std::rc::Rc;

/// Shared handle to an AST node.
pub type NodeRef = Rc<Node>;

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

/// Identity of a declaration. Allocated once by the scope resolver;
/// the binding key at run time (never the spelled name, so two
/// declarations sharing a name never alias).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What introduced a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// `let name`
    Let,
    /// A function parameter.
    Param,
    /// A `catch (name)` parameter.
    CatchParam,
    /// A `for (name in …)` loop variable.
    LoopVar,
    /// The hidden subject binding of a `with` block.
    WithSubject,
}

/// A single named declaration with a distinct identity.
#[derive(Debug)]
pub struct Declaration {
    pub id: DeclId,
    pub name: String,
    pub kind: DeclKind,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators & constants
// ══════════════════════════════════════════════════════════════════════════════

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    And,
    Or,
}

impl BinOp {
    /// Source spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::StrictEq => "===",
            BinOp::StrictNotEq => "!==",
            BinOp::Less => "<",
            BinOp::Greater => ">",
            BinOp::LessEq => "<=",
            BinOp::GreaterEq => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

/// Non-local control flow statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Break,
    Continue,
    Return,
    Throw,
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

/// A function literal: parameters, body, and the set of outer declarations
/// the body (including nested functions) references. The closure set is
/// discovered lexically by the scope resolver in the same parse pass.
#[derive(Debug)]
pub struct FunctionDef {
    /// Optional function name (for display and self-reference).
    pub name: Option<String>,
    /// Binding for the function's own name inside its body
    /// (named function expressions only).
    pub self_decl: Option<Rc<Declaration>>,
    /// Parameter declarations in order.
    pub params: Vec<Rc<Declaration>>,
    /// Outer declarations captured at function-value creation time.
    pub closures: Vec<Rc<Declaration>>,
    /// The body block.
    pub body: NodeRef,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Nodes
// ══════════════════════════════════════════════════════════════════════════════

/// An AST node: a kind plus source location and evaluation flags.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    /// Stepping may pause before this node runs. Set only on effectful
    /// statement-level positions, never mid-subexpression.
    pub breakable: bool,
    /// This node sits in statement position.
    pub statement: bool,
}

/// Every node kind in the Quill AST.
#[derive(Debug)]
pub enum NodeKind {
    /// A literal constant.
    Constant(Constant),
    /// An identifier resolved to a lexical declaration.
    Ident(Rc<Declaration>),
    /// An identifier with no lexical binding — resolved against the host
    /// namespace (then session globals) at run time.
    Global(String),
    /// `left.name`, or `.name` with `left` absent (resolves against the
    /// innermost `with` subject; the parser normally fills the subject in).
    Member { left: Option<NodeRef>, name: String },
    /// `left[args[0]]` when `indexer`, otherwise `left(args…)`.
    IndexOrCall {
        left: NodeRef,
        args: Vec<NodeRef>,
        indexer: bool,
    },
    /// A binary operation, including short-circuiting `&&`/`||`.
    Binary {
        op: BinOp,
        left: NodeRef,
        right: NodeRef,
    },
    /// A unary operation.
    Unary { op: UnaryOp, expr: NodeRef },
    /// `if`/`else` and the ternary operator (the branch value is the result).
    If {
        cond: NodeRef,
        then: NodeRef,
        otherwise: Option<NodeRef>,
    },
    /// `{ … }` with the declarations owned by this scope.
    Block {
        statements: Vec<NodeRef>,
        locals: Vec<Rc<Declaration>>,
    },
    /// `target = value` (expression-valued).
    Assign { target: NodeRef, value: NodeRef },
    /// `let decl [= init]`.
    Let {
        decl: Rc<Declaration>,
        init: Option<NodeRef>,
    },
    /// `++`/`--`, prefix or postfix.
    IncDec {
        target: NodeRef,
        increment: bool,
        prefix: bool,
    },
    /// `while` / `do … while`.
    While {
        cond: NodeRef,
        body: NodeRef,
        do_while: bool,
    },
    /// `for (decl in generator) body`.
    Foreach {
        decl: Rc<Declaration>,
        generator: NodeRef,
        body: NodeRef,
    },
    /// `break` / `continue` / `return [v]` / `throw v`.
    Flow {
        kind: FlowKind,
        value: Option<NodeRef>,
    },
    /// A function literal.
    Function(Rc<FunctionDef>),
    /// `try body catch (param) handler`.
    TryCatch {
        body: NodeRef,
        param: Rc<Declaration>,
        handler: NodeRef,
    },
    /// `with (subject) body`; `decl` is the hidden subject binding.
    With {
        decl: Rc<Declaration>,
        subject: NodeRef,
        body: NodeRef,
    },
    /// Comma sequence; the result is the last expression.
    Sequence(Vec<NodeRef>),
    /// A syntax error embedded in place of the malformed construct.
    /// Running it raises an uncatchable runtime error.
    Error(String),
}

impl Node {
    /// Create a node with default flags.
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            breakable: false,
            statement: false,
        }
    }

    /// Short name of the node kind, for backtraces and logs.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Constant(_) => "constant",
            NodeKind::Ident(_) => "identifier",
            NodeKind::Global(_) => "global",
            NodeKind::Member { .. } => "member",
            NodeKind::IndexOrCall { indexer: true, .. } => "index",
            NodeKind::IndexOrCall { indexer: false, .. } => "call",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Unary { .. } => "unary",
            NodeKind::If { .. } => "if",
            NodeKind::Block { .. } => "block",
            NodeKind::Assign { .. } => "assign",
            NodeKind::Let { .. } => "let",
            NodeKind::IncDec { .. } => "incdec",
            NodeKind::While { do_while: false, .. } => "while",
            NodeKind::While { do_while: true, .. } => "do-while",
            NodeKind::Foreach { .. } => "foreach",
            NodeKind::Flow {
                kind: FlowKind::Break,
                ..
            } => "break",
            NodeKind::Flow {
                kind: FlowKind::Continue,
                ..
            } => "continue",
            NodeKind::Flow {
                kind: FlowKind::Return,
                ..
            } => "return",
            NodeKind::Flow {
                kind: FlowKind::Throw,
                ..
            } => "throw",
            NodeKind::Function(_) => "function",
            NodeKind::TryCatch { .. } => "try",
            NodeKind::With { .. } => "with",
            NodeKind::Sequence(_) => "sequence",
            NodeKind::Error(_) => "syntax-error",
        }
    }

    /// Visit this node and every descendant, depth first.
    pub fn walk(&self, visit: &mut dyn FnMut(&Node)) {
        visit(self);
        match &self.kind {
            NodeKind::Constant(_)
            | NodeKind::Ident(_)
            | NodeKind::Global(_)
            | NodeKind::Error(_) => {}
            NodeKind::Member { left, .. } => {
                if let Some(l) = left {
                    l.walk(visit);
                }
            }
            NodeKind::IndexOrCall { left, args, .. } => {
                left.walk(visit);
                for a in args {
                    a.walk(visit);
                }
            }
            NodeKind::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            NodeKind::Unary { expr, .. } => expr.walk(visit),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => {
                cond.walk(visit);
                then.walk(visit);
                if let Some(e) = otherwise {
                    e.walk(visit);
                }
            }
            NodeKind::Block { statements, .. } => {
                for s in statements {
                    s.walk(visit);
                }
            }
            NodeKind::Assign { target, value } => {
                target.walk(visit);
                value.walk(visit);
            }
            NodeKind::Let { init, .. } => {
                if let Some(i) = init {
                    i.walk(visit);
                }
            }
            NodeKind::IncDec { target, .. } => target.walk(visit),
            NodeKind::While { cond, body, .. } => {
                cond.walk(visit);
                body.walk(visit);
            }
            NodeKind::Foreach {
                generator, body, ..
            } => {
                generator.walk(visit);
                body.walk(visit);
            }
            NodeKind::Flow { value, .. } => {
                if let Some(v) = value {
                    v.walk(visit);
                }
            }
            NodeKind::Function(def) => def.body.walk(visit),
            NodeKind::TryCatch { body, handler, .. } => {
                body.walk(visit);
                handler.walk(visit);
            }
            NodeKind::With { subject, body, .. } => {
                subject.walk(visit);
                body.walk(visit);
            }
            NodeKind::Sequence(items) => {
                for i in items {
                    i.walk(visit);
                }
            }
        }
    }
}
