//! Statement parsing.
//!
//! Every statement parser calls into the scope resolver for the names it
//! introduces, and marks the produced node as a statement. Breakable flags
//! land on statement-level nodes only, so stepping never pauses inside a
//! subexpression. Semicolons are terminators but tolerated as optional.

use quill_lexer::token::TokenKind;
use quill_types::ast::*;
use quill_types::ErrorCode;
use std::rc::Rc;

use crate::parser::Parser;

impl<'src> Parser<'src> {
    /// Parse a single statement.
    pub(crate) fn parse_statement(&mut self) -> Option<Node> {
        let mut node = match self.peek_kind() {
            TokenKind::Semicolon => {
                // Empty statement.
                let span = self.advance().span;
                Node::new(NodeKind::Constant(Constant::Undefined), span)
            }
            TokenKind::Let => self.parse_let_stmt()?,
            TokenKind::Function if matches!(self.look_ahead(1), TokenKind::Ident(_)) => {
                self.parse_function_stmt()?
            }
            TokenKind::If => self.parse_if_stmt()?,
            TokenKind::While => self.parse_while_stmt()?,
            TokenKind::Do => self.parse_do_while_stmt()?,
            TokenKind::For => self.parse_foreach_stmt()?,
            TokenKind::Break | TokenKind::Continue => self.parse_loop_flow()?,
            TokenKind::Return | TokenKind::Throw => self.parse_return_throw()?,
            TokenKind::Try => self.parse_try_stmt()?,
            TokenKind::With => self.parse_with_stmt()?,
            TokenKind::LBrace => self.parse_block_node()?,
            _ => {
                let expr = self.parse_expression()?;
                self.eat(&TokenKind::Semicolon);
                expr
            }
        };
        node.statement = true;
        // Blocks are not themselves pause points; their statements are.
        if !matches!(node.kind, NodeKind::Block { .. }) {
            node.breakable = true;
        }
        Some(node)
    }

    /// `{ statements… }` — opens a block scope and attaches its locals.
    pub(crate) fn parse_block_node(&mut self) -> Option<Node> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;
        self.scope.open_scope();
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            match self.parse_statement() {
                Some(stmt) => statements.push(Rc::new(stmt)),
                None => {
                    let span = self.current_span();
                    statements.push(Rc::new(Node::new(
                        NodeKind::Error("malformed statement".to_string()),
                        span,
                    )));
                    self.synchronize();
                }
            }
        }
        let locals = self.scope.close_scope();
        self.expect(&TokenKind::RBrace);
        let span = start.merge(self.previous_span());
        Some(Node::new(NodeKind::Block { statements, locals }, span))
    }

    /// `let name [= expr] ;`
    fn parse_let_stmt(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `let`
        let (name, nspan) = self.expect_identifier()?;
        // Declare before the initializer so `let f = function() { f(); }`
        // resolves the body's `f` to this binding.
        let decl = match self.scope.declare(&name, DeclKind::Let, nspan) {
            Ok(decl) => Some(decl),
            Err(err) => {
                self.error_at(err.code(), err.to_string(), nspan);
                None
            }
        };
        let init = if self.eat(&TokenKind::Assign) {
            Some(Rc::new(self.parse_assign()?))
        } else {
            None
        };
        self.eat(&TokenKind::Semicolon);
        let span = start.merge(self.previous_span());
        match decl {
            Some(decl) => Some(Node::new(NodeKind::Let { decl, init }, span)),
            None => Some(Node::new(
                NodeKind::Error(format!("'{name}' cannot be declared here")),
                span,
            )),
        }
    }

    /// `function name(params) { … }` — sugar for `let name = function …`.
    fn parse_function_stmt(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `function`
        let (name, nspan) = self.expect_identifier()?;
        // The name goes into the enclosing scope; recursion inside the
        // body resolves to it as a closure.
        let decl = match self.scope.declare(&name, DeclKind::Let, nspan) {
            Ok(decl) => Some(decl),
            Err(err) => {
                self.error_at(err.code(), err.to_string(), nspan);
                None
            }
        };
        let func = self.parse_function_literal(start, Some((name.clone(), nspan)), false)?;
        self.eat(&TokenKind::Semicolon);
        let span = func.span;
        match decl {
            Some(decl) => Some(Node::new(
                NodeKind::Let {
                    decl,
                    init: Some(Rc::new(func)),
                },
                span,
            )),
            None => Some(Node::new(
                NodeKind::Error(format!("'{name}' cannot be declared here")),
                span,
            )),
        }
    }

    /// `if (cond) stmt [else stmt]`
    fn parse_if_stmt(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `if`
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let then = self.parse_statement()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            Some(Rc::new(self.parse_statement()?))
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Node::new(
            NodeKind::If {
                cond: Rc::new(cond),
                then: Rc::new(then),
                otherwise,
            },
            span,
        ))
    }

    /// `while (cond) stmt`
    fn parse_while_stmt(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `while`
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        let body = body?;
        let span = start.merge(self.previous_span());
        Some(Node::new(
            NodeKind::While {
                cond: Rc::new(cond),
                body: Rc::new(body),
                do_while: false,
            },
            span,
        ))
    }

    /// `do stmt while (cond) ;`
    fn parse_do_while_stmt(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `do`
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        let body = body?;
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.eat(&TokenKind::Semicolon);
        let span = start.merge(self.previous_span());
        Some(Node::new(
            NodeKind::While {
                cond: Rc::new(cond),
                body: Rc::new(body),
                do_while: true,
            },
            span,
        ))
    }

    /// `for ([let] name in generator) stmt`
    fn parse_foreach_stmt(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `for`
        self.expect(&TokenKind::LParen)?;
        self.eat(&TokenKind::Let);
        let (name, nspan) = self.expect_identifier()?;
        self.expect(&TokenKind::In)?;
        // The generator is parsed before the loop variable is declared, so
        // `for (x in x)` resolves the generator to the outer `x`.
        let generator = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;

        self.scope.open_scope();
        let decl = match self.scope.declare(&name, DeclKind::LoopVar, nspan) {
            Ok(decl) => decl,
            Err(err) => {
                self.scope.close_scope();
                let node = self.syntax_error(err.code(), err.to_string(), nspan);
                return Some(node);
            }
        };
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        self.scope.close_scope();
        let body = body?;

        let span = start.merge(self.previous_span());
        Some(Node::new(
            NodeKind::Foreach {
                decl,
                generator: Rc::new(generator),
                body: Rc::new(body),
            },
            span,
        ))
    }

    /// `break ;` / `continue ;`
    fn parse_loop_flow(&mut self) -> Option<Node> {
        let kind = if self.check(&TokenKind::Break) {
            FlowKind::Break
        } else {
            FlowKind::Continue
        };
        let span = self.advance().span;
        self.eat(&TokenKind::Semicolon);
        if self.loop_depth == 0 {
            let word = if kind == FlowKind::Break { "break" } else { "continue" };
            return Some(self.syntax_error(
                ErrorCode::FLOW_OUTSIDE_LOOP,
                format!("'{word}' outside of a loop"),
                span,
            ));
        }
        Some(Node::new(NodeKind::Flow { kind, value: None }, span))
    }

    /// `return [expr] ;` / `throw expr ;`
    fn parse_return_throw(&mut self) -> Option<Node> {
        let kind = if self.check(&TokenKind::Return) {
            FlowKind::Return
        } else {
            FlowKind::Throw
        };
        let start = self.advance().span;
        let value = if matches!(
            self.peek_kind(),
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            None
        } else {
            Some(Rc::new(self.parse_expression()?))
        };
        self.eat(&TokenKind::Semicolon);
        let span = start.merge(self.previous_span());
        if kind == FlowKind::Throw && value.is_none() {
            return Some(self.syntax_error(
                ErrorCode::UNEXPECTED_TOKEN,
                "'throw' requires a value",
                span,
            ));
        }
        Some(Node::new(NodeKind::Flow { kind, value }, span))
    }

    /// `try block catch (name) block`
    fn parse_try_stmt(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `try`
        let body = self.parse_block_node()?;
        self.expect(&TokenKind::Catch)?;
        self.expect(&TokenKind::LParen)?;
        let (name, nspan) = self.expect_identifier()?;
        self.expect(&TokenKind::RParen)?;

        self.scope.open_scope();
        let param = match self.scope.declare(&name, DeclKind::CatchParam, nspan) {
            Ok(decl) => decl,
            Err(err) => {
                self.scope.close_scope();
                let node = self.syntax_error(err.code(), err.to_string(), nspan);
                return Some(node);
            }
        };
        let handler = self.parse_block_node();
        self.scope.close_scope();
        let handler = handler?;

        let span = start.merge(self.previous_span());
        Some(Node::new(
            NodeKind::TryCatch {
                body: Rc::new(body),
                param,
                handler: Rc::new(handler),
            },
            span,
        ))
    }

    /// `with (subject) block`
    fn parse_with_stmt(&mut self) -> Option<Node> {
        let start = self.advance().span; // eat `with`
        self.expect(&TokenKind::LParen)?;
        let subject = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;

        self.scope.open_scope();
        let decl = self
            .scope
            .declare(".", DeclKind::WithSubject, start)
            .expect("with-subject declaration cannot fail in an open scope");
        let body = self.parse_block_node();
        self.scope.close_scope();
        let body = body?;

        let span = start.merge(self.previous_span());
        Some(Node::new(
            NodeKind::With {
                decl,
                subject: Rc::new(subject),
                body: Rc::new(body),
            },
            span,
        ))
    }
}
