//! Expression parsing.
//!
//! A precedence-climbing parser: `parse_primary`/`parse_unary` are the
//! null-denotation half, and a single `parse_binary` loop driven by the
//! token stream's precedence annotations is the left-denotation half.
//! Precedence (lowest → highest): `,` sequence, `=`, `?:`, `||`, `&&`,
//! equality, relational, additive, multiplicative, unary, postfix
//! (`.` `[ ]` `( )` `++` `--`).

use quill_lexer::token::TokenKind;
use quill_types::ast::*;
use quill_types::ErrorCode;
use std::rc::Rc;

use crate::parser::Parser;

/// Map a binary-operator token to its AST operator.
fn binop_of(kind: &TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        TokenKind::EqEq => BinOp::Eq,
        TokenKind::EqEqEq => BinOp::StrictEq,
        TokenKind::BangEq => BinOp::NotEq,
        TokenKind::BangEqEq => BinOp::StrictNotEq,
        TokenKind::Less => BinOp::Less,
        TokenKind::Greater => BinOp::Greater,
        TokenKind::LessEq => BinOp::LessEq,
        TokenKind::GreaterEq => BinOp::GreaterEq,
        TokenKind::AndAnd => BinOp::And,
        TokenKind::OrOr => BinOp::Or,
        _ => return None,
    })
}

/// Node kinds that may appear on the left of `=` or under `++`/`--`.
fn is_assignable(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Ident(_)
            | NodeKind::Global(_)
            | NodeKind::Member { .. }
            | NodeKind::IndexOrCall { indexer: true, .. }
    )
}

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Points
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a full expression, including the comma sequence operator.
    pub(crate) fn parse_expression(&mut self) -> Option<Node> {
        let first = self.parse_assign()?;
        if !self.check(&TokenKind::Comma) {
            return Some(first);
        }
        let start = first.span;
        let mut items = vec![Rc::new(first)];
        while self.eat(&TokenKind::Comma) {
            items.push(Rc::new(self.parse_assign()?));
        }
        let span = start.merge(self.previous_span());
        Some(Node::new(NodeKind::Sequence(items), span))
    }

    /// Parse an assignment (right-associative) or anything tighter.
    pub(crate) fn parse_assign(&mut self) -> Option<Node> {
        let left = self.parse_ternary()?;
        if !self.check(&TokenKind::Assign) {
            return Some(left);
        }
        if !is_assignable(&left.kind) {
            let span = left.span;
            self.advance(); // eat '='
            let _ = self.parse_assign(); // consume the value for recovery
            return Some(self.syntax_error(
                ErrorCode::INVALID_ASSIGNMENT_TARGET,
                "invalid assignment target",
                span,
            ));
        }
        self.advance(); // eat '='
        let value = self.parse_assign()?;
        let span = left.span.merge(value.span);
        Some(Node::new(
            NodeKind::Assign {
                target: Rc::new(left),
                value: Rc::new(value),
            },
            span,
        ))
    }

    /// Parse a ternary conditional or anything tighter.
    fn parse_ternary(&mut self) -> Option<Node> {
        let cond = self.parse_binary(1)?;
        if !self.eat(&TokenKind::Question) {
            return Some(cond);
        }
        let then = self.parse_assign()?;
        self.expect(&TokenKind::Colon)?;
        let otherwise = self.parse_assign()?;
        let span = cond.span.merge(otherwise.span);
        Some(Node::new(
            NodeKind::If {
                cond: Rc::new(cond),
                then: Rc::new(then),
                otherwise: Some(Rc::new(otherwise)),
            },
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Climbing
    // ══════════════════════════════════════════════════════════════════════════

    /// Climb binary operators at or above `min_prec`, using the precedence
    /// level annotated on each operator token. All levels are
    /// left-associative, so the recursive call climbs at `prec + 1`.
    fn parse_binary(&mut self, min_prec: u8) -> Option<Node> {
        let mut left = self.parse_unary()?;
        loop {
            let prec = self.peek_kind().precedence();
            if prec == 0 || prec < min_prec {
                break;
            }
            let op = binop_of(self.peek_kind()).expect("annotated token must be binary");
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span.merge(right.span);
            left = Node::new(
                NodeKind::Binary {
                    op,
                    left: Rc::new(left),
                    right: Rc::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    /// Parse prefix operators.
    fn parse_unary(&mut self) -> Option<Node> {
        let start = self.current_span();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let increment = matches!(self.peek_kind(), TokenKind::PlusPlus);
                self.advance();
                let target = self.parse_unary()?;
                if !is_assignable(&target.kind) {
                    let span = target.span;
                    return Some(self.syntax_error(
                        ErrorCode::INVALID_ASSIGNMENT_TARGET,
                        "invalid increment/decrement target",
                        span,
                    ));
                }
                let span = start.merge(target.span);
                return Some(Node::new(
                    NodeKind::IncDec {
                        target: Rc::new(target),
                        increment,
                        prefix: true,
                    },
                    span,
                ));
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let expr = self.parse_unary()?;
                let span = start.merge(expr.span);
                Some(Node::new(
                    NodeKind::Unary {
                        op,
                        expr: Rc::new(expr),
                    },
                    span,
                ))
            }
            None => self.parse_postfix(),
        }
    }

    /// Parse postfix chains: member access, indexing, calls, `++`/`--`.
    ///
    /// Postfix `++`/`--` bind greedily, so `a+++b` is `(a++)+b` — the
    /// lexer's maximal munch already split the tokens that way.
    fn parse_postfix(&mut self) -> Option<Node> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let (name, nspan) = self.expect_member_name()?;
                    let span = expr.span.merge(nspan);
                    expr = Node::new(
                        NodeKind::Member {
                            left: Some(Rc::new(expr)),
                            name,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Node::new(
                        NodeKind::IndexOrCall {
                            left: Rc::new(expr),
                            args: vec![Rc::new(index)],
                            indexer: true,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_arg_list()?;
                    self.expect(&TokenKind::RParen)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Node::new(
                        NodeKind::IndexOrCall {
                            left: Rc::new(expr),
                            args,
                            indexer: false,
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let increment = matches!(self.peek_kind(), TokenKind::PlusPlus);
                    let op_span = self.advance().span;
                    if !is_assignable(&expr.kind) {
                        let span = expr.span;
                        return Some(self.syntax_error(
                            ErrorCode::INVALID_ASSIGNMENT_TARGET,
                            "invalid increment/decrement target",
                            span,
                        ));
                    }
                    let span = expr.span.merge(op_span);
                    expr = Node::new(
                        NodeKind::IncDec {
                            target: Rc::new(expr),
                            increment,
                            prefix: false,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Some(expr)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary Expressions
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a primary expression.
    fn parse_primary(&mut self) -> Option<Node> {
        let start = self.current_span();
        match self.peek_kind().clone() {
            // ── Literals ────────────────────────────────────────────────
            TokenKind::Number(n) => {
                self.advance();
                Some(Node::new(NodeKind::Constant(Constant::Number(n)), start))
            }
            TokenKind::Str(s) => {
                self.advance();
                Some(Node::new(NodeKind::Constant(Constant::Str(s)), start))
            }
            TokenKind::True => {
                self.advance();
                Some(Node::new(NodeKind::Constant(Constant::Bool(true)), start))
            }
            TokenKind::False => {
                self.advance();
                Some(Node::new(NodeKind::Constant(Constant::Bool(false)), start))
            }
            TokenKind::Null => {
                self.advance();
                Some(Node::new(NodeKind::Constant(Constant::Null), start))
            }
            TokenKind::Undefined => {
                self.advance();
                Some(Node::new(NodeKind::Constant(Constant::Undefined), start))
            }

            // ── Identifiers ─────────────────────────────────────────────
            TokenKind::Ident(name) => {
                self.advance();
                match self.scope.find_and_register_closure(&name) {
                    Some(decl) => Some(Node::new(NodeKind::Ident(decl), start)),
                    // No lexical binding: resolved against the host
                    // namespace at run time.
                    None => Some(Node::new(NodeKind::Global(name), start)),
                }
            }

            // ── Leading-dot member access (`with` subject) ──────────────
            TokenKind::Dot => {
                self.advance();
                let (name, nspan) = self.expect_member_name()?;
                let span = start.merge(nspan);
                match self.scope.find_and_register_closure(".") {
                    Some(subject) => {
                        let left = Node::new(NodeKind::Ident(subject), start);
                        Some(Node::new(
                            NodeKind::Member {
                                left: Some(Rc::new(left)),
                                name,
                            },
                            span,
                        ))
                    }
                    None => Some(self.syntax_error(
                        ErrorCode::UNEXPECTED_TOKEN,
                        "'.' member access outside of 'with'",
                        span,
                    )),
                }
            }

            // ── Grouping ────────────────────────────────────────────────
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Some(inner)
            }

            // ── Function literal ────────────────────────────────────────
            TokenKind::Function => self.parse_function_expr(),

            _ => {
                self.error_at_current(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected expression, got '{}'", self.peek_kind()),
                );
                None
            }
        }
    }

    /// Parse a comma-separated argument list (inside parens).
    fn parse_arg_list(&mut self) -> Option<Vec<NodeRef>> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Some(args);
        }
        loop {
            args.push(Rc::new(self.parse_assign()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(args)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Function Literals
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a function expression: `function [name](params) { … }`.
    fn parse_function_expr(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `function`
        let name = match self.peek_kind().clone() {
            TokenKind::Ident(n) => {
                let span = self.advance().span;
                Some((n, span))
            }
            _ => None,
        };
        self.parse_function_literal(start, name, true)
    }

    /// Parse parameters and body after `function [name]` has been
    /// consumed. When `bind_self` is set, a name becomes a binding for the
    /// function's own value inside its body (named function expressions).
    pub(crate) fn parse_function_literal(
        &mut self,
        start: quill_types::Span,
        name: Option<(String, quill_types::Span)>,
        bind_self: bool,
    ) -> Option<Node> {
        // break/continue cannot cross a function boundary.
        let saved_depth = self.loop_depth;
        self.loop_depth = 0;

        self.scope.open_strong_scope();
        let self_decl = if bind_self {
            name.as_ref().and_then(|(n, nspan)| {
                self.scope.declare(n, DeclKind::Let, *nspan).ok()
            })
        } else {
            None
        };

        let mut params = Vec::new();
        if self.expect(&TokenKind::LParen).is_some() && !self.check(&TokenKind::RParen) {
            loop {
                match self.expect_identifier() {
                    Some((pname, pspan)) => {
                        match self.scope.declare(&pname, DeclKind::Param, pspan) {
                            Ok(decl) => params.push(decl),
                            Err(err) => self.error_at(err.code(), err.to_string(), pspan),
                        }
                    }
                    None => break,
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen);

        let body = match self.parse_block_node() {
            Some(block) => Rc::new(block),
            None => {
                let span = self.current_span();
                Rc::new(Node::new(
                    NodeKind::Error("function body must be a block".to_string()),
                    span,
                ))
            }
        };

        let (_decls, closures) = self.scope.close_strong_scope();
        self.loop_depth = saved_depth;

        let span = start.merge(self.previous_span());
        let def = FunctionDef {
            name: name.map(|(n, _)| n),
            self_decl,
            params,
            closures,
            body,
            span,
        };
        Some(Node::new(NodeKind::Function(Rc::new(def)), span))
    }
}
