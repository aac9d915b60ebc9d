//! Between-pass well-formedness validation.
//!
//! Run after every pass in debug builds. Violations are compiler bugs, not
//! user errors, and are reported on the internal channel.

use crate::ast::expr::{Expr, ExprKind};
use crate::ast::types::Type;
use crate::ast::{Entity, EntityKind, MethodKind, Program};
use crate::pass::Pass;
use crate::reporter::{DiagnosticKind, Reporter};

pub fn check_program(program: &Program, pass: Pass, reporter: &mut Reporter) {
    for entity in &program.entities {
        if entity.pass_reached < pass {
            // Synthesized after this pass started; it is caught up
            // separately and checked at its own level.
            continue;
        }

        check_entity(entity, pass, reporter);
    }
}

fn check_entity(entity: &Entity, pass: Pass, reporter: &mut Reporter) {
    if pass >= Pass::Sugar {
        check_sugared(entity, reporter);
    }

    if pass >= Pass::Name {
        check_named(entity, reporter);
    }

    if pass >= Pass::Traits {
        check_flattened(entity, reporter);
    }

    if pass >= Pass::Expr {
        check_typed(entity, reporter);
    }
}

fn each_body(entity: &Entity, mut f: impl FnMut(&Expr)) {
    for field in &entity.fields {
        if let Some(init) = &field.init {
            init.walk(&mut f);
        }
    }

    for method in &entity.methods {
        if let Some(body) = &method.body {
            body.walk(&mut f);
        }
        if let Some(guard) = &method.guard {
            guard.walk(&mut f);
        }
        for param in &method.params {
            if let Some(default) = &param.default {
                default.walk(&mut f);
            }
        }
    }
}

/// After sugar: surface-only forms are gone and method defaults are filled.
fn check_sugared(entity: &Entity, reporter: &mut Reporter) {
    each_body(entity, |expr| {
        let leftover = match &expr.kind {
            ExprKind::For(_) => Some("for loop"),
            ExprKind::With(_) => Some("with block"),
            ExprKind::As { .. } => Some("as expression"),
            ExprKind::Object { .. } => Some("object literal"),
            ExprKind::Lambda(_) => Some("lambda"),
            ExprKind::Loc => Some("__loc"),
            ExprKind::Unop { .. } => Some("prefix operator"),
            ExprKind::Binop { op, .. } if op.method_name().is_some() => Some("infix operator"),
            _ => None,
        };

        if let Some(what) = leftover {
            reporter.error(
                DiagnosticKind::Internal,
                expr.span,
                format!("{what} not rewritten by the sugar pass"),
            );
        }
    });

    for method in &entity.methods {
        if method.kind == MethodKind::Function && method.cap.is_none() {
            reporter.error(
                DiagnosticKind::Internal,
                method.span,
                "function without a receiver capability after sugar",
            );
        }

        if method.ret.is_none() && entity.kind != EntityKind::Alias {
            reporter.error(
                DiagnosticKind::Internal,
                method.span,
                "method without a result type after sugar",
            );
        }

        if method.params.iter().any(|p| p.pattern.is_some()) {
            reporter.error(
                DiagnosticKind::Internal,
                method.span,
                "case-method pattern parameter survived the sugar pass",
            );
        }
    }

    if entity.kind.is_concrete()
        && !entity
            .methods
            .iter()
            .any(|m| m.kind == MethodKind::Constructor)
    {
        reporter.error(
            DiagnosticKind::Internal,
            entity.span,
            "concrete entity without a constructor after sugar",
        );
    }
}

/// After the name pass: references and nominal types are resolved.
fn check_named(entity: &Entity, reporter: &mut Reporter) {
    each_body(entity, |expr| match &expr.kind {
        ExprKind::Local { id: None, .. } => {
            reporter.error(
                DiagnosticKind::Internal,
                expr.span,
                "local declaration without an identity after the name pass",
            );
        }
        ExprKind::MatchCapture { id: None, .. } => {
            reporter.error(
                DiagnosticKind::Internal,
                expr.span,
                "match capture without an identity after the name pass",
            );
        }
        _ => {}
    });

    let mut check_type = |ty: &Type| {
        for_each_nominal(ty, &mut |nominal| {
            if nominal.entity.is_none() {
                reporter.error(
                    DiagnosticKind::Internal,
                    nominal.span,
                    "nominal type without a definition after the name pass",
                );
            }
        });
    };

    for field in &entity.fields {
        check_type(&field.ty);
    }
    for method in &entity.methods {
        for param in &method.params {
            check_type(&param.ty);
        }
        if let Some(ret) = &method.ret {
            check_type(ret);
        }
    }
}

/// After the traits pass every concrete entity is complete: a body behind
/// every method.
fn check_flattened(entity: &Entity, reporter: &mut Reporter) {
    if !entity.kind.is_concrete() {
        return;
    }

    for method in &entity.methods {
        if method.body.is_none() {
            reporter.error(
                DiagnosticKind::Internal,
                method.span,
                "concrete entity still has a bodiless method after the traits pass",
            );
        }
    }
}

/// After the expr pass every method body carries its type.
fn check_typed(entity: &Entity, reporter: &mut Reporter) {
    for method in &entity.methods {
        // Inherited bodies were typed on the donor.
        if method.inherited_from.is_some() {
            continue;
        }

        if let Some(body) = &method.body {
            if body.ty.is_none() {
                reporter.error(
                    DiagnosticKind::Internal,
                    method.span,
                    "method body without a type after the expr pass",
                );
            }
        }
    }
}

pub fn for_each_nominal(ty: &Type, f: &mut impl FnMut(&crate::ast::types::Nominal)) {
    match ty {
        Type::Nominal(n) => {
            f(n);
            for arg in &n.args {
                for_each_nominal(arg, f);
            }
        }
        Type::Union(types) | Type::Isect(types) | Type::Tuple(types) => {
            for t in types {
                for_each_nominal(t, f);
            }
        }
        Type::Arrow { left, right } => {
            for_each_nominal(left, f);
            for_each_nominal(right, f);
        }
        Type::Fun { params, ret, .. } => {
            for p in params {
                for_each_nominal(p, f);
            }
            for_each_nominal(ret, f);
        }
        Type::This { .. } | Type::TypeParamRef { .. } | Type::DontCare { .. } => {}
    }
}
