//! Constructors for synthesizing AST fragments.
//!
//! The sugar pass builds whole subtrees (loop rewrites, anonymous types,
//! default constructors); these helpers keep those sites readable. Every
//! node synthesized here carries the span of the construct it replaces.

use crate::ast::expr::*;
use crate::ast::types::{Cap, Nominal, Type};
use crate::ast::{Field, FieldKind, Method, MethodKind, Param};
use crate::interner::Symbol;
use crate::source::Span;

pub fn seq(exprs: Vec<Expr>, span: Span) -> Expr {
    Expr::new(ExprKind::Seq(exprs), span)
}

pub fn reference(name: Symbol, span: Span) -> Expr {
    Expr::new(ExprKind::Reference { name, def: None }, span)
}

pub fn dot(expr: Expr, member: Symbol, span: Span) -> Expr {
    Expr::new(
        ExprKind::Dot {
            expr: Box::new(expr),
            member,
        },
        span,
    )
}

pub fn call(receiver: Expr, positional: Vec<Expr>, span: Span) -> Expr {
    Expr::new(
        ExprKind::Call(Box::new(CallExpr {
            receiver,
            positional,
            named: vec![],
            partial: false,
        })),
        span,
    )
}

pub fn partial_call(receiver: Expr, positional: Vec<Expr>, span: Span) -> Expr {
    Expr::new(
        ExprKind::Call(Box::new(CallExpr {
            receiver,
            positional,
            named: vec![],
            partial: true,
        })),
        span,
    )
}

/// `receiver.name(args)`.
pub fn method_call(receiver: Expr, name: Symbol, args: Vec<Expr>, span: Span) -> Expr {
    call(dot(receiver, name, span), args, span)
}

pub fn let_local(name: Symbol, ty: Option<Type>, span: Span) -> Expr {
    Expr::new(
        ExprKind::Local {
            kind: LocalKind::Let,
            name,
            ty,
            id: None,
        },
        span,
    )
}

pub fn assign(lhs: Expr, rhs: Expr, span: Span) -> Expr {
    Expr::new(
        ExprKind::Assign {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

pub fn consume(expr: Expr, span: Span) -> Expr {
    Expr::new(
        ExprKind::Consume {
            expr: Box::new(expr),
        },
        span,
    )
}

pub fn bool_lit(value: bool, span: Span) -> Expr {
    Expr::new(ExprKind::BoolLit(value), span)
}

pub fn int_lit(value: i128, span: Span) -> Expr {
    Expr::new(ExprKind::IntLit(value), span)
}

pub fn string_lit(value: Symbol, span: Span) -> Expr {
    Expr::new(ExprKind::StringLit(value), span)
}

pub fn break_expr(span: Span) -> Expr {
    Expr::new(ExprKind::Break(None), span)
}

pub fn error_expr(span: Span) -> Expr {
    Expr::new(ExprKind::ErrorExpr, span)
}

pub fn this_expr(span: Span) -> Expr {
    Expr::new(ExprKind::This, span)
}

pub fn while_loop(cond: Expr, body: Expr, else_body: Option<Expr>, span: Span) -> Expr {
    Expr::new(
        ExprKind::While(Box::new(LoopExpr {
            cond,
            body,
            else_body,
            annotations: vec![],
        })),
        span,
    )
}

pub fn try_no_check(body: Expr, else_body: Option<Expr>, then_body: Option<Expr>, span: Span) -> Expr {
    Expr::new(
        ExprKind::Try {
            body: Box::new(body),
            else_body: else_body.map(Box::new),
            then_body: then_body.map(Box::new),
            no_check: true,
        },
        span,
    )
}

pub fn nominal_type(name: Symbol, cap: Option<Cap>, span: Span) -> Type {
    let mut nominal = Nominal::new(name, span);
    nominal.cap = cap;
    Type::Nominal(nominal)
}

pub fn field(kind: FieldKind, name: Symbol, ty: Type, init: Option<Expr>, span: Span) -> Field {
    Field {
        kind,
        name,
        ty,
        init,
        span,
    }
}

pub fn param(name: Symbol, ty: Type, span: Span) -> Param {
    Param {
        name,
        ty,
        default: None,
        pattern: None,
        span,
    }
}

/// A `fun` with the given receiver cap, no parameters.
pub fn simple_fun(cap: Cap, name: Symbol, ret: Type, body: Expr, span: Span) -> Method {
    let mut method = Method::new(MethodKind::Function, name, span);
    method.cap = Some(cap);
    method.ret = Some(ret);
    method.body = Some(body);
    method
}
