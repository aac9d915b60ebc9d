//! Late shape checks: the Main actor, primitive initialisers and
//! finalisers, reserved ABI names, annotation placement, and the
//! builtin-only body marker.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::ast::expr::{Expr, ExprKind};
use crate::ast::types::{Cap, Type};
use crate::ast::{EntityId, EntityKind, Method, MethodKind, Program};
use crate::reporter::DiagnosticKind;

use super::{Context, PassResult};

/// Method names owned by the runtime ABI; user code cannot take them.
/// `_init` and `_final` are legal lifecycle hooks on primitives and are
/// shape-checked instead.
static RESERVED_ABI: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["_event_notify", "_serialise", "_deserialise"]
        .into_iter()
        .collect()
});

static RESERVED_ANNOTATIONS: [&str; 4] = ["packed", "likely", "unlikely", "nosupertype"];

pub fn run(program: &mut Program, ctx: &mut Context) -> PassResult {
    check_main(program, ctx);

    for index in 0..program.entities.len() {
        entity(program, ctx, EntityId(index));
    }

    PassResult::Ok
}

fn check_main(program: &Program, ctx: &mut Context) {
    let names = ctx.session.names;
    let Some(root) = program.root else {
        return;
    };

    let main = program.find_entity(root, names.main_actor);

    let Some(main) = main else {
        ctx.session.reporter.error(
            DiagnosticKind::Semantic,
            Default::default(),
            "the Main actor must have a create constructor",
        );
        return;
    };

    let entity = program.entity(main);

    if entity.kind != EntityKind::Actor {
        ctx.session.reporter.error(
            DiagnosticKind::Semantic,
            entity.span,
            "Main must be an actor",
        );
        return;
    }

    if !entity.type_params.is_empty() {
        ctx.session.reporter.error(
            DiagnosticKind::Semantic,
            entity.span,
            "the Main actor cannot have type parameters",
        );
    }

    let create = entity
        .methods
        .iter()
        .find(|m| m.name == names.create && m.kind == MethodKind::Constructor);

    let Some(create) = create else {
        ctx.session.reporter.error(
            DiagnosticKind::Semantic,
            entity.span,
            "the Main actor must have a create constructor",
        );
        return;
    };

    let shape_ok = create.params.len() == 1
        && create.type_params.is_empty()
        && !create.partial
        && matches!(
            &create.params[0].ty,
            Type::Nominal(n) if n.name == names.env_type
        );

    if !shape_ok {
        ctx.session.reporter.error(
            DiagnosticKind::Semantic,
            create.span,
            "the Main actor must have a create constructor taking a single Env parameter",
        );
    }
}

pub fn entity(program: &mut Program, ctx: &mut Context, id: EntityId) -> PassResult {
    let in_builtin = Some(program.entity(id).package) == program.builtin;

    check_entity_annotations(program, ctx, id);

    for index in 0..program.entity(id).methods.len() {
        let entity = program.entity(id);
        let method = &entity.methods[index];
        let name_text = ctx.session.interner.get(method.name).to_string();

        if !in_builtin && method.inherited_from.is_none() && RESERVED_ABI.contains(name_text.as_str())
        {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                method.span,
                format!("'{name_text}' is reserved by the runtime"),
            );
        }

        if name_text == "_init" && entity.kind != EntityKind::Primitive && !in_builtin {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                method.span,
                "'_init' is only valid on a primitive",
            );
        }

        if entity.kind == EntityKind::Primitive
            && (name_text == "_init" || name_text == "_final")
        {
            check_primitive_lifecycle(ctx, method, &name_text);
        }

        if !in_builtin && method.inherited_from.is_none() {
            if let Some(body) = &method.body {
                check_no_intrinsic(ctx, body);
            }
        }

        check_method_annotations(ctx, method);
        check_condition_annotations(ctx, program.entity(id).methods[index].body.as_ref());
    }

    PassResult::Ok
}

/// `_init`/`_final` run without an allocated receiver: `box fun`, no
/// parameters, returning None, total, no type parameters.
fn check_primitive_lifecycle(ctx: &mut Context, method: &Method, name: &str) {
    let names = ctx.session.names;

    let ok = method.kind == MethodKind::Function
        && method.cap == Some(Cap::Box)
        && method.params.is_empty()
        && method.type_params.is_empty()
        && !method.partial
        && matches!(
            &method.ret,
            Some(Type::Nominal(n)) if n.name == names.none_type
        );

    if !ok {
        ctx.session.reporter.error(
            DiagnosticKind::Semantic,
            method.span,
            format!(
                "'{name}' must be a box fun with no parameters returning None and cannot error"
            ),
        );
    }
}

fn check_no_intrinsic(ctx: &mut Context, body: &Expr) {
    body.walk(&mut |expr| {
        if matches!(expr.kind, ExprKind::CompileIntrinsic) {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                expr.span,
                "compile_intrinsic is reserved for the builtin package",
            );
        }
    });
}

fn check_entity_annotations(program: &Program, ctx: &mut Context, id: EntityId) {
    let entity = program.entity(id);

    for annotation in &entity.annotations {
        let text = ctx.session.interner.get(*annotation).to_string();

        match text.as_str() {
            "packed" => {
                if entity.kind != EntityKind::Struct {
                    ctx.session.reporter.error(
                        DiagnosticKind::Semantic,
                        entity.span,
                        "packed only applies to structs",
                    );
                }
            }
            "nosupertype" => {}
            "likely" | "unlikely" => {
                ctx.session.reporter.error(
                    DiagnosticKind::Semantic,
                    entity.span,
                    format!("'{text}' only applies to conditions"),
                );
            }
            _ => {
                // Unknown user annotations are preserved as metadata.
                ctx.session.reporter.warning(
                    entity.span,
                    format!("unrecognised annotation '{text}'"),
                );
            }
        }
    }
}

fn check_method_annotations(ctx: &mut Context, method: &Method) {
    for annotation in &method.annotations {
        let text = ctx.session.interner.get(*annotation).to_string();

        if RESERVED_ANNOTATIONS.contains(&text.as_str()) {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                method.span,
                format!("'{text}' is not a valid method annotation"),
            );
        } else {
            ctx.session
                .reporter
                .warning(method.span, format!("unrecognised annotation '{text}'"));
        }
    }
}

/// `likely`/`unlikely` may sit on conditions; anything else there is
/// unknown and preserved with a warning.
fn check_condition_annotations(ctx: &mut Context, body: Option<&Expr>) {
    let Some(body) = body else {
        return;
    };

    body.walk(&mut |expr| {
        let annotations = match &expr.kind {
            ExprKind::If(node) | ExprKind::IfDef(node) => &node.annotations,
            ExprKind::While(node) | ExprKind::Repeat(node) => &node.annotations,
            _ => return,
        };

        for annotation in annotations {
            let text = ctx.session.interner.get(*annotation).to_string();
            match text.as_str() {
                "likely" | "unlikely" => {}
                "packed" | "nosupertype" => {
                    ctx.session.reporter.error(
                        DiagnosticKind::Semantic,
                        expr.span,
                        format!("'{text}' is not a valid condition annotation"),
                    );
                }
                _ => {
                    ctx.session
                        .reporter
                        .warning(expr.span, format!("unrecognised annotation '{text}'"));
                }
            }
        }
    });
}
