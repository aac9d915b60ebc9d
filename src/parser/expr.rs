//! Expression grammar.
//!
//! Operators have no precedence: chains of one operator associate left,
//! mixing different operators requires parentheses. Minus at the start of
//! a line is a fresh unary expression, so sequences split on newlines
//! without semicolons.

use crate::ast::expr::*;
use crate::ast::types::Type;
use crate::lexer::{Token, TokenKind};

use super::Parser;

/// Token kinds that may begin an expression.
const EXPR_START: [TokenKind; 30] = [
    TokenKind::Int,
    TokenKind::Float,
    TokenKind::String,
    TokenKind::True,
    TokenKind::False,
    TokenKind::Id,
    TokenKind::This,
    TokenKind::LParen,
    TokenKind::LSquare,
    TokenKind::LBrace,
    TokenKind::Object,
    TokenKind::At,
    TokenKind::MinusNew,
    TokenKind::Minus,
    TokenKind::Not,
    TokenKind::Let,
    TokenKind::Var,
    TokenKind::If,
    TokenKind::IfDef,
    TokenKind::IfType,
    TokenKind::Match,
    TokenKind::While,
    TokenKind::Repeat,
    TokenKind::For,
    TokenKind::With,
    TokenKind::Try,
    TokenKind::Recover,
    TokenKind::Consume,
    TokenKind::Error,
    TokenKind::CompileIntrinsic,
];

const JUMP_START: [TokenKind; 3] = [TokenKind::Return, TokenKind::Break, TokenKind::Continue];

impl<'a> Parser<'a> {
    fn starts_expr(&self) -> bool {
        let kind = self.state.peek_kind();
        EXPR_START.contains(&kind) || JUMP_START.contains(&kind) || kind == TokenKind::Loc
    }

    /// A sequence of expressions; its value is the last one. Expressions on
    /// the same line must be separated by semicolons.
    pub(crate) fn rawseq(&mut self) -> Result<Expr, ()> {
        let span = self.state.peek().span;
        let mut exprs = vec![self.expr()?];

        loop {
            let had_semi = self.state.accept(TokenKind::Semi).is_some();

            if !self.starts_expr() {
                break;
            }

            if !had_semi && !self.state.peek().first_on_line {
                self.state
                    .record("expressions on the same line must be separated by a semicolon".into());
                return Err(());
            }

            exprs.push(self.expr()?);
        }

        // A lone parenthesized sequence is that sequence; keeping it flat
        // makes printing and re-parsing converge.
        if exprs.len() == 1 && matches!(exprs[0].kind, ExprKind::Seq(_)) {
            return Ok(exprs.pop().expect("just checked"));
        }

        Ok(Expr::new(ExprKind::Seq(exprs), span))
    }

    /// assignment := infix ['=' assignment]
    pub(crate) fn expr(&mut self) -> Result<Expr, ()> {
        let lhs = self.infix()?;

        if self.state.accept(TokenKind::Assign).is_some() {
            let rhs = self.expr()?;
            let span = lhs.span;
            return Ok(Expr::new(
                ExprKind::Assign {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            ));
        }

        Ok(lhs)
    }

    fn binop_for(kind: TokenKind) -> Option<BinOp> {
        let op = match kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Multiply => BinOp::Mul,
            TokenKind::Divide => BinOp::Div,
            TokenKind::Rem => BinOp::Rem,
            TokenKind::LShift => BinOp::Shl,
            TokenKind::RShift => BinOp::Shr,
            TokenKind::And => BinOp::And,
            TokenKind::Or => BinOp::Or,
            TokenKind::Xor => BinOp::Xor,
            TokenKind::Eq => BinOp::Eq,
            TokenKind::Ne => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Is => BinOp::Is,
            TokenKind::Isnt => BinOp::Isnt,
            _ => return None,
        };
        Some(op)
    }

    /// infix := term (op term)* | term 'as' type
    ///
    /// Chains reuse one operator; a different operator in the same chain
    /// needs parentheses.
    fn infix(&mut self) -> Result<Expr, ()> {
        let mut lhs = self.term()?;

        if self.state.accept(TokenKind::As).is_some() {
            let ty = self.type_expr()?;
            let span = lhs.span;
            return Ok(Expr::new(
                ExprKind::As {
                    expr: Box::new(lhs),
                    ty,
                },
                span,
            ));
        }

        let Some(first_op) = Self::binop_for(self.state.peek_kind()) else {
            return Ok(lhs);
        };

        while let Some(op) = Self::binop_for(self.state.peek_kind()) {
            if op != first_op {
                self.state.record(format!(
                    "operator precedence is not defined; parenthesize '{}' and '{}'",
                    first_op.symbol(),
                    op.symbol()
                ));
                return Err(());
            }
            self.state.next();

            let rhs = self.term()?;
            let span = lhs.span;
            lhs = Expr::new(
                ExprKind::Binop {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }

        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ()> {
        let token = self.state.peek();

        match token.kind {
            TokenKind::If => self.if_expr(false),
            TokenKind::IfDef => self.if_expr(true),
            TokenKind::IfType => self.iftype_expr(),
            TokenKind::Match => self.match_expr(),
            TokenKind::While => self.while_expr(),
            TokenKind::Repeat => self.repeat_expr(),
            TokenKind::For => self.for_expr(),
            TokenKind::With => self.with_expr(),
            TokenKind::Try => self.try_expr(),
            TokenKind::Recover => self.recover_expr(),
            TokenKind::Consume => self.consume_expr(),
            TokenKind::Return | TokenKind::Break | TokenKind::Continue => self.jump_expr(),
            TokenKind::Error => {
                self.state.next();
                Ok(Expr::new(ExprKind::ErrorExpr, token.span))
            }
            TokenKind::CompileIntrinsic => {
                self.state.next();
                Ok(Expr::new(ExprKind::CompileIntrinsic, token.span))
            }
            TokenKind::Let | TokenKind::Var => self.local_decl(),
            _ => self.prefix(),
        }
    }

    fn prefix(&mut self) -> Result<Expr, ()> {
        let token = self.state.peek();

        let op = match token.kind {
            // In prefix position both minus forms are unary.
            TokenKind::Minus | TokenKind::MinusNew => Some(UnOp::Neg),
            TokenKind::Not => Some(UnOp::Not),
            _ => None,
        };

        if let Some(op) = op {
            self.state.next();
            let expr = self.prefix()?;
            return Ok(Expr::new(
                ExprKind::Unop {
                    op,
                    expr: Box::new(expr),
                },
                token.span,
            ));
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ()> {
        let mut expr = self.atom()?;

        loop {
            match self.state.peek_kind() {
                TokenKind::Dot => {
                    self.state.next();
                    let member = self.state.token("a member name", &[TokenKind::Id])?;
                    let span = expr.span;
                    expr = Expr::new(
                        ExprKind::Dot {
                            expr: Box::new(expr),
                            member: member.name().ok_or(())?,
                        },
                        span,
                    );
                }
                // An opening bracket at the start of a line begins a new
                // expression instead of continuing this one.
                TokenKind::LSquare if !self.state.peek().first_on_line => {
                    let args = self.opt_type_args()?;
                    let span = expr.span;
                    expr = Expr::new(
                        ExprKind::Qualify {
                            expr: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LParen if !self.state.peek().first_on_line => {
                    expr = self.call(expr)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    /// `receiver(positional… where name = value, …) ?`
    fn call(&mut self, receiver: Expr) -> Result<Expr, ()> {
        let span = receiver.span;
        self.state.skip("an argument list", &[TokenKind::LParen])?;

        let mut positional = vec![];
        let mut named = vec![];

        if !self.state.at(TokenKind::RParen) && !self.state.at(TokenKind::Where) {
            positional.push(self.expr()?);
            while self.state.accept(TokenKind::Comma).is_some() {
                positional.push(self.expr()?);
            }
        }

        if self.state.accept(TokenKind::Where).is_some() {
            loop {
                let id = self.state.token("an argument name", &[TokenKind::Id])?;
                self.state.skip("'='", &[TokenKind::Assign])?;
                let value = self.expr()?;
                named.push((id.name().ok_or(())?, value));

                if self.state.accept(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;
        let partial = self.state.accept(TokenKind::Question).is_some();

        Ok(Expr::new(
            ExprKind::Call(Box::new(CallExpr {
                receiver,
                positional,
                named,
                partial,
            })),
            span,
        ))
    }

    fn atom(&mut self) -> Result<Expr, ()> {
        let token = self.state.peek();

        match token.kind {
            TokenKind::Int => {
                self.state.next();
                Ok(Expr::new(
                    ExprKind::IntLit(token.int_value().unwrap_or(0)),
                    token.span,
                ))
            }
            TokenKind::Float => {
                self.state.next();
                Ok(Expr::new(
                    ExprKind::FloatLit(token.float_value().unwrap_or(0.0)),
                    token.span,
                ))
            }
            TokenKind::String => {
                self.state.next();
                Ok(Expr::new(
                    ExprKind::StringLit(token.name().ok_or(())?),
                    token.span,
                ))
            }
            TokenKind::True | TokenKind::False => {
                self.state.next();
                Ok(Expr::new(
                    ExprKind::BoolLit(token.kind == TokenKind::True),
                    token.span,
                ))
            }
            TokenKind::This => {
                self.state.next();
                Ok(Expr::new(ExprKind::This, token.span))
            }
            TokenKind::Loc => {
                self.state.next();
                Ok(Expr::new(ExprKind::Loc, token.span))
            }
            TokenKind::Id => {
                self.state.next();
                Ok(Expr::new(
                    ExprKind::Reference {
                        name: token.name().ok_or(())?,
                        def: None,
                    },
                    token.span,
                ))
            }
            TokenKind::LParen => self.tuple_or_group(),
            TokenKind::LSquare => self.array_literal(),
            TokenKind::LBrace => self.lambda_literal(),
            TokenKind::Object => self.object_literal(),
            TokenKind::At => self.ffi_call(),
            _ => {
                self.state.record("expected an expression".into());
                Err(())
            }
        }
    }

    /// `(seq)` is grouping, `(seq, seq)` a tuple literal.
    fn tuple_or_group(&mut self) -> Result<Expr, ()> {
        let open = self.state.peek();
        self.state.next();

        let mut elems = vec![self.rawseq()?];
        while self.state.accept(TokenKind::Comma).is_some() {
            elems.push(self.rawseq()?);
        }

        self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;

        if elems.len() == 1 {
            Ok(elems.pop().expect("just checked"))
        } else {
            Ok(Expr::new(ExprKind::Tuple(elems), open.span))
        }
    }

    /// `[as T: e, …]` or `[e, …]`.
    fn array_literal(&mut self) -> Result<Expr, ()> {
        let open = self.state.peek();
        self.state.next();

        let mut elem_type = None;
        if self.state.accept(TokenKind::As).is_some() {
            elem_type = Some(self.type_expr()?);
            self.state.skip("':'", &[TokenKind::Colon])?;
        }

        let mut elems = vec![];
        if !self.state.at(TokenKind::RSquare) {
            elems.push(self.rawseq()?);
            while self.state.accept(TokenKind::Comma).is_some() {
                elems.push(self.rawseq()?);
            }
        }

        self.state.skip("a closing bracket", &[TokenKind::RSquare])?;

        Ok(Expr::new(ExprKind::Array { elem_type, elems }, open.span))
    }

    /// `{cap name(params)(captures): Ret ? => body} cap`
    fn lambda_literal(&mut self) -> Result<Expr, ()> {
        let open = self.state.peek();
        self.state.next();

        let cap = self.opt_cap();
        let name = self.state.accept(TokenKind::Id).and_then(|t| t.name());

        self.state.skip("a parameter list", &[TokenKind::LParen])?;
        let params = self.params(TokenKind::RParen)?;
        self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;

        let mut captures = vec![];
        if self.state.accept(TokenKind::LParen).is_some() {
            if !self.state.at(TokenKind::RParen) {
                loop {
                    captures.push(self.capture()?);
                    if self.state.accept(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;
        }

        let ret = if self.state.accept(TokenKind::Colon).is_some() {
            Some(self.type_expr()?)
        } else {
            None
        };

        let partial = self.state.accept(TokenKind::Question).is_some();
        self.state.skip("'=>'", &[TokenKind::DoubleArrow])?;
        let body = self.rawseq()?;
        self.state.skip("a closing brace", &[TokenKind::RBrace])?;
        let obj_cap = self.opt_cap();

        Ok(Expr::new(
            ExprKind::Lambda(Box::new(LambdaExpr {
                cap,
                obj_cap,
                name,
                params,
                captures,
                ret,
                partial,
                body,
            })),
            open.span,
        ))
    }

    fn capture(&mut self) -> Result<Capture, ()> {
        let id = self.state.token("a capture name", &[TokenKind::Id])?;

        let ty = if self.state.accept(TokenKind::Colon).is_some() {
            Some(self.type_expr()?)
        } else {
            None
        };

        let value = if self.state.accept(TokenKind::Assign).is_some() {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Capture {
            name: id.name().ok_or(())?,
            ty,
            value,
            span: id.span,
        })
    }

    /// `object cap is Provides members end`
    fn object_literal(&mut self) -> Result<Expr, ()> {
        let open = self.state.peek();
        self.state.next();
        let _annotations = self.annotations()?;

        let cap = self.opt_cap();

        let mut provides = vec![];
        if self.state.accept(TokenKind::Is).is_some() {
            provides = self.provides_list()?;
        }

        let (fields, methods) = self.members(&[TokenKind::End])?;
        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::Object {
                cap,
                provides,
                fields,
                methods,
            },
            open.span,
        ))
    }

    /// `@name[Ret](args) ?`
    fn ffi_call(&mut self) -> Result<Expr, ()> {
        let open = self.state.peek();
        self.state.next();

        let name = self
            .state
            .token("an FFI name", &[TokenKind::Id, TokenKind::String])?;

        let mut ret = None;
        if self.state.at(TokenKind::LSquare) {
            let mut args = self.opt_type_args()?;
            if args.len() != 1 {
                self.state
                    .record("an FFI call takes exactly one return type".into());
                return Err(());
            }
            ret = Some(args.pop().expect("just checked"));
        }

        self.state.skip("an argument list", &[TokenKind::LParen])?;
        let mut args = vec![];
        if !self.state.at(TokenKind::RParen) {
            args.push(self.expr()?);
            while self.state.accept(TokenKind::Comma).is_some() {
                args.push(self.expr()?);
            }
        }
        self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;
        let partial = self.state.accept(TokenKind::Question).is_some();

        Ok(Expr::new(
            ExprKind::FfiCall {
                name: name.name().ok_or(())?,
                ret,
                args,
                partial,
            },
            open.span,
        ))
    }

    fn local_decl(&mut self) -> Result<Expr, ()> {
        let token = self.state.next();
        let kind = if token.kind == TokenKind::Let {
            LocalKind::Let
        } else {
            LocalKind::Var
        };

        let id = self.state.token("a local name", &[TokenKind::Id])?;

        let ty = if self.state.accept(TokenKind::Colon).is_some() {
            Some(self.type_expr()?)
        } else {
            None
        };

        Ok(Expr::new(
            ExprKind::Local {
                kind,
                name: id.name().ok_or(())?,
                ty,
                id: None,
            },
            token.span,
        ))
    }

    fn jump_expr(&mut self) -> Result<Expr, ()> {
        let token = self.state.next();

        let value = if self.starts_expr() && !self.state.peek().first_on_line {
            Some(Box::new(self.rawseq()?))
        } else {
            None
        };

        let kind = match token.kind {
            TokenKind::Return => ExprKind::Return(value),
            TokenKind::Break => ExprKind::Break(value),
            _ => ExprKind::Continue,
        };

        Ok(Expr::new(kind, token.span))
    }

    fn if_expr(&mut self, is_ifdef: bool) -> Result<Expr, ()> {
        let open = self.state.next();
        let annotations = self.annotations()?;

        let cond = self.rawseq()?;
        self.state.skip("'then'", &[TokenKind::Then])?;
        let then_body = self.rawseq()?;

        let else_body = self.if_tail(is_ifdef)?;
        self.build_if(open, is_ifdef, annotations, cond, then_body, else_body)
    }

    /// `elseif` chains nest as an `if` in the else branch.
    fn if_tail(&mut self, is_ifdef: bool) -> Result<Option<Expr>, ()> {
        if self.state.at(TokenKind::ElseIf) {
            let open = self.state.next();
            let cond = self.rawseq()?;
            self.state.skip("'then'", &[TokenKind::Then])?;
            let then_body = self.rawseq()?;
            let else_body = self.if_tail(is_ifdef)?;
            let nested = self.build_if(open, is_ifdef, vec![], cond, then_body, else_body)?;
            let span = nested.span;
            return Ok(Some(Expr::new(ExprKind::Seq(vec![nested]), span)));
        }

        let else_body = if self.state.accept(TokenKind::Else).is_some() {
            Some(self.rawseq()?)
        } else {
            None
        };
        self.state.skip("'end'", &[TokenKind::End])?;
        Ok(else_body)
    }

    fn build_if(
        &mut self,
        open: Token,
        is_ifdef: bool,
        annotations: Vec<crate::interner::Symbol>,
        cond: Expr,
        then_body: Expr,
        else_body: Option<Expr>,
    ) -> Result<Expr, ()> {
        let node = Box::new(IfExpr {
            cond,
            then_body,
            else_body,
            annotations,
        });

        let kind = if is_ifdef {
            ExprKind::IfDef(node)
        } else {
            ExprKind::If(node)
        };

        Ok(Expr::new(kind, open.span))
    }

    fn iftype_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();

        let sub = self.type_expr()?;
        self.state.skip("'<:'", &[TokenKind::Subtype])?;
        let sup = self.type_expr()?;
        self.state.skip("'then'", &[TokenKind::Then])?;
        let then_body = self.rawseq()?;

        let else_body = if self.state.accept(TokenKind::Else).is_some() {
            Some(self.rawseq()?)
        } else {
            None
        };
        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::IfType(Box::new(IfTypeExpr {
                sub,
                sup,
                then_body,
                else_body,
            })),
            open.span,
        ))
    }

    fn match_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();
        let _annotations = self.annotations()?;

        let scrutinee = self.rawseq()?;

        let mut cases = vec![];
        while self.state.at(TokenKind::Pipe) {
            let case_open = self.state.next();
            let _case_annotations = self.annotations()?;

            let pattern = self.expr()?;

            let guard = if self.state.accept(TokenKind::If).is_some() {
                Some(self.rawseq()?)
            } else {
                None
            };

            let body = if self.state.accept(TokenKind::DoubleArrow).is_some() {
                Some(self.rawseq()?)
            } else {
                None
            };

            cases.push(MatchCase {
                pattern,
                guard,
                body,
                span: case_open.span,
            });
        }

        let else_body = if self.state.accept(TokenKind::Else).is_some() {
            Some(self.rawseq()?)
        } else {
            None
        };
        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::Match(Box::new(MatchExpr {
                scrutinee,
                cases,
                else_body,
            })),
            open.span,
        ))
    }

    fn while_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();
        let annotations = self.annotations()?;

        let cond = self.rawseq()?;
        self.state.skip("'do'", &[TokenKind::Do])?;
        let body = self.rawseq()?;

        let else_body = if self.state.accept(TokenKind::Else).is_some() {
            Some(self.rawseq()?)
        } else {
            None
        };
        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::While(Box::new(LoopExpr {
                cond,
                body,
                else_body,
                annotations,
            })),
            open.span,
        ))
    }

    fn repeat_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();

        let body = self.rawseq()?;
        self.state.skip("'until'", &[TokenKind::Until])?;
        let annotations = self.annotations()?;
        let cond = self.rawseq()?;

        let else_body = if self.state.accept(TokenKind::Else).is_some() {
            Some(self.rawseq()?)
        } else {
            None
        };
        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::Repeat(Box::new(LoopExpr {
                cond,
                body,
                else_body,
                annotations,
            })),
            open.span,
        ))
    }

    fn idseq(&mut self) -> Result<IdSeq, ()> {
        if self.state.accept(TokenKind::LParen).is_some() {
            let mut elems = vec![self.idseq()?];
            while self.state.accept(TokenKind::Comma).is_some() {
                elems.push(self.idseq()?);
            }
            self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;
            return Ok(IdSeq::Tuple(elems));
        }

        let id = self.state.token("a binding name", &[TokenKind::Id])?;
        Ok(IdSeq::Name {
            name: id.name().ok_or(())?,
            span: id.span,
        })
    }

    fn for_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();

        let binding = self.idseq()?;
        self.state.skip("'in'", &[TokenKind::In])?;
        let iterator = self.rawseq()?;
        self.state.skip("'do'", &[TokenKind::Do])?;
        let body = self.rawseq()?;

        let else_body = if self.state.accept(TokenKind::Else).is_some() {
            Some(self.rawseq()?)
        } else {
            None
        };
        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::For(Box::new(ForExpr {
                binding,
                iterator,
                body,
                else_body,
            })),
            open.span,
        ))
    }

    fn with_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();

        let mut bindings = vec![];
        loop {
            let binding = self.idseq()?;
            self.state.skip("'='", &[TokenKind::Assign])?;
            let init = self.rawseq()?;
            bindings.push((binding, init));

            if self.state.accept(TokenKind::Comma).is_none() {
                break;
            }
        }

        self.state.skip("'do'", &[TokenKind::Do])?;
        let body = self.rawseq()?;

        let else_body = if self.state.accept(TokenKind::Else).is_some() {
            Some(self.rawseq()?)
        } else {
            None
        };
        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::With(Box::new(WithExpr {
                bindings,
                body,
                else_body,
            })),
            open.span,
        ))
    }

    fn try_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();
        let _annotations = self.annotations()?;

        let body = self.rawseq()?;

        let else_body = if self.state.accept(TokenKind::Else).is_some() {
            let _ = self.annotations()?;
            Some(Box::new(self.rawseq()?))
        } else {
            None
        };

        let then_body = if self.state.accept(TokenKind::Then).is_some() {
            let _ = self.annotations()?;
            Some(Box::new(self.rawseq()?))
        } else {
            None
        };

        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::Try {
                body: Box::new(body),
                else_body,
                then_body,
                no_check: false,
            },
            open.span,
        ))
    }

    fn recover_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();
        let _annotations = self.annotations()?;

        let cap = self.opt_cap();
        let body = self.rawseq()?;
        self.state.skip("'end'", &[TokenKind::End])?;

        Ok(Expr::new(
            ExprKind::Recover {
                cap,
                body: Box::new(body),
            },
            open.span,
        ))
    }

    fn consume_expr(&mut self) -> Result<Expr, ()> {
        let open = self.state.next();
        let expr = self.term()?;

        Ok(Expr::new(
            ExprKind::Consume {
                expr: Box::new(expr),
            },
            open.span,
        ))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::MethodKind;
    use crate::parser::test_helpers::{parse_source, parse_source_error};

    fn method_body(input: &str) -> Expr {
        let source = format!("class Foo\n  fun go() =>\n    {input}");
        let (_, _, entities) = parse_source(&source);
        let method = entities[0]
            .methods
            .iter()
            .find(|m| m.kind == MethodKind::Function)
            .expect("method");
        method.body.clone().expect("body")
    }

    fn body_exprs(input: &str) -> Vec<Expr> {
        match method_body(input).kind {
            ExprKind::Seq(exprs) => exprs,
            other => panic!("expected seq, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_operator_chain_same_op() {
        let exprs = body_exprs("1 + 2 + 3");
        let ExprKind::Binop { op, lhs, .. } = &exprs[0].kind else {
            panic!("expected binop");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(lhs.kind, ExprKind::Binop { op: BinOp::Add, .. }));
    }

    #[test]
    fn test_parse_mixed_operators_rejected() {
        let errors = parse_source_error("class Foo\n  fun go() =>\n    1 + 2 * 3");
        assert!(errors
            .iter()
            .any(|e| e.contains("operator precedence is not defined")));
    }

    #[test]
    fn test_parse_minus_newline_splits_sequence() {
        let exprs = body_exprs("a\n    - b");
        assert_eq!(exprs.len(), 2);
        assert!(matches!(
            exprs[1].kind,
            ExprKind::Unop { op: UnOp::Neg, .. }
        ));
    }

    #[test]
    fn test_parse_missing_semicolon_rejected() {
        let errors = parse_source_error("class Foo\n  fun go() =>\n    a b");
        assert!(errors
            .iter()
            .any(|e| e.contains("separated by a semicolon")));
    }

    #[test]
    fn test_parse_call_with_named_args() {
        let exprs = body_exprs("f(1, 2 where value = 3)");
        let ExprKind::Call(call) = &exprs[0].kind else {
            panic!("expected call");
        };
        assert_eq!(call.positional.len(), 2);
        assert_eq!(call.named.len(), 1);
        assert!(!call.partial);
    }

    #[test]
    fn test_parse_match_with_guard_and_fallthrough() {
        let exprs = body_exprs("match x\n    | 1 => 1\n    | 2 if y => 2\n    | 3\n    else 0\n    end");
        let ExprKind::Match(node) = &exprs[0].kind else {
            panic!("expected match");
        };
        assert_eq!(node.cases.len(), 3);
        assert!(node.cases[1].guard.is_some());
        assert!(node.cases[2].body.is_none());
        assert!(node.else_body.is_some());
    }

    #[test]
    fn test_parse_try_else_then() {
        let exprs = body_exprs("try f()? else 1 then 2 end");
        let ExprKind::Try {
            else_body,
            then_body,
            no_check,
            ..
        } = &exprs[0].kind
        else {
            panic!("expected try");
        };
        assert!(else_body.is_some());
        assert!(then_body.is_some());
        assert!(!no_check);
    }

    #[test]
    fn test_parse_lambda_with_captures() {
        let exprs = body_exprs("{(a: U32, b: U32): U32 (c) => a + b } iso");
        let ExprKind::Lambda(lambda) = &exprs[0].kind else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.params.len(), 2);
        assert_eq!(lambda.captures.len(), 1);
        assert_eq!(lambda.obj_cap, Some(crate::ast::Cap::Iso));
    }

    #[test]
    fn test_parse_ffi_call() {
        let exprs = body_exprs("@printf[I32](\"hi\")?");
        let ExprKind::FfiCall { ret, args, partial, .. } = &exprs[0].kind else {
            panic!("expected ffi call");
        };
        assert!(ret.is_some());
        assert_eq!(args.len(), 1);
        assert!(partial);
    }

    #[test]
    fn test_parse_for_loop() {
        let exprs = body_exprs("for (k, v) in pairs do k end");
        let ExprKind::For(node) = &exprs[0].kind else {
            panic!("expected for");
        };
        assert!(matches!(&node.binding, IdSeq::Tuple(elems) if elems.len() == 2));
    }

    #[test]
    fn test_parse_elseif_nests() {
        let exprs = body_exprs("if a then 1 elseif b then 2 else 3 end");
        let ExprKind::If(node) = &exprs[0].kind else {
            panic!("expected if");
        };
        let nested = node.else_body.as_ref().expect("elseif branch");
        let ExprKind::Seq(exprs) = &nested.kind else {
            panic!("elseif wraps in a sequence");
        };
        assert!(matches!(exprs[0].kind, ExprKind::If(_)));
    }
}
