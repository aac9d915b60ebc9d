//! The traits pass flattens provides lists: abstract methods gain bodies
//! inherited from their providers, clashes and cycles are rejected, and
//! after it every concrete entity is complete.

use crate::ast::types::Type;
use crate::ast::{Def, EntityId, EntityKind, Program};
use crate::reporter::{DiagnosticKind, Frame};

use super::expr::subtype;
use super::{Context, PassResult};

pub fn run(program: &mut Program, ctx: &mut Context) -> PassResult {
    // Providers flatten before the entities that provide them.
    let order = match toposort(program, ctx) {
        Ok(order) => order,
        Err(()) => return PassResult::Error,
    };

    for id in order {
        entity(program, ctx, id);
    }

    PassResult::Ok
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Grey,
    Black,
}

fn toposort(program: &Program, ctx: &mut Context) -> Result<Vec<EntityId>, ()> {
    let mut marks = vec![Mark::White; program.entities.len()];
    let mut order = vec![];
    let mut failed = false;

    for index in 0..program.entities.len() {
        visit(program, ctx, EntityId(index), &mut marks, &mut order, &mut failed);
    }

    if failed {
        Err(())
    } else {
        Ok(order)
    }
}

fn visit(
    program: &Program,
    ctx: &mut Context,
    id: EntityId,
    marks: &mut Vec<Mark>,
    order: &mut Vec<EntityId>,
    failed: &mut bool,
) {
    match marks[id.0] {
        Mark::Black => return,
        Mark::Grey => {
            let entity = program.entity(id);
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                entity.span,
                format!(
                    "'{}' is in a provides cycle",
                    ctx.session.interner.get(entity.name)
                ),
            );
            *failed = true;
            return;
        }
        Mark::White => {}
    }

    marks[id.0] = Mark::Grey;

    for provided in &program.entity(id).provides {
        if let Type::Nominal(nominal) = provided {
            if let Some(provider) = nominal.entity {
                visit(program, ctx, provider, marks, order, failed);
            }
        }
    }

    marks[id.0] = Mark::Black;
    order.push(id);
}

pub fn entity(program: &mut Program, ctx: &mut Context, id: EntityId) -> PassResult {
    if program.entity(id).kind == EntityKind::Alias {
        return PassResult::Ok;
    }

    check_provides_shapes(program, ctx, id);

    let closure = subtype::provides_closure(program, id);
    let mut result = PassResult::Ok;

    for (provider, args) in closure {
        let provider_kind = program.entity(provider).kind;
        if !provider_kind.is_abstract() {
            continue;
        }

        for method_index in 0..program.entity(provider).methods.len() {
            let provider_entity = program.entity(provider);
            let method = &provider_entity.methods[method_index];

            let incoming =
                subtype::reify_method(method, &provider_entity.type_params, &args);
            // Where the body originally came from, for ambiguity checks.
            let origin = method.inherited_from.unwrap_or(provider);

            if !inherit_method(program, ctx, id, provider, origin, incoming) {
                result = PassResult::Error;
            }
        }
    }

    check_completeness(program, ctx, id);
    result
}

/// Only traits and interfaces may be provided.
fn check_provides_shapes(program: &Program, ctx: &mut Context, id: EntityId) {
    for provided in &program.entity(id).provides {
        let ok = match provided {
            Type::Nominal(nominal) => nominal
                .entity
                .map(|p| program.entity(p).kind.is_abstract())
                .unwrap_or(true),
            _ => false,
        };

        if !ok {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                provided.span(),
                "a provides list may only contain traits and interfaces",
            );
        }
    }
}

/// Merge one provided method into the entity. Returns false on a clash.
fn inherit_method(
    program: &mut Program,
    ctx: &mut Context,
    id: EntityId,
    provider: EntityId,
    origin: EntityId,
    incoming: crate::ast::Method,
) -> bool {
    let name = incoming.name;

    if let Some((index, existing)) = program.entity(id).find_method(name) {
        let existing_origin = existing.inherited_from;

        if existing_origin.is_none() {
            // A local definition must be a valid override.
            if !subtype::compatible_signature(program, existing, &incoming) {
                let existing_span = existing.span;
                ctx.session.reporter.error_with(
                    DiagnosticKind::Semantic,
                    existing_span,
                    format!(
                        "'{}' clashes with the version provided by '{}'",
                        ctx.session.interner.get(name),
                        ctx.session.interner.get(program.entity(provider).name)
                    ),
                    vec![Frame {
                        span: incoming.span,
                        message: "provided here".to_string(),
                    }],
                );
                return false;
            }
            return true;
        }

        // Both inherited: the same origin is the same body; different
        // origins with bodies are ambiguous.
        if existing_origin == Some(origin) {
            return true;
        }

        let existing_has_body = existing.body.is_some();
        let existing_span = existing.span;

        if incoming.body.is_some() && existing_has_body {
            ctx.session.reporter.error_with(
                DiagnosticKind::Semantic,
                program.entity(id).span,
                format!(
                    "ambiguous inheritance of '{}': bodies come from '{}' and '{}'",
                    ctx.session.interner.get(name),
                    ctx.session.interner.get(program.entity(origin).name),
                    ctx.session
                        .interner
                        .get(program.entity(existing_origin.unwrap_or(origin)).name)
                ),
                vec![Frame {
                    span: existing_span,
                    message: "first inherited here".to_string(),
                }],
            );
            return false;
        }

        if incoming.body.is_some() && !existing_has_body {
            // The body wins over a bare signature, if the signatures line
            // up contravariantly.
            let compatible = subtype::compatible_signature(
                program,
                &incoming,
                &program.entity(id).methods[index],
            );
            if compatible {
                let mut replacement = incoming;
                replacement.inherited_from = Some(origin);
                program.entity_mut(id).methods[index] = replacement;
                return true;
            }

            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                existing_span,
                format!(
                    "'{}' is provided with incompatible signatures",
                    ctx.session.interner.get(name)
                ),
            );
            return false;
        }

        return true;
    }

    // A brand-new member.
    let mut inherited = incoming;
    inherited.inherited_from = Some(origin);

    let entity = program.entity_mut(id);
    let index = entity.methods.len();
    entity.methods.push(inherited);
    let _ = entity.symbols.add(name, Def::Method { entity: id, index });
    true
}

/// Every method of a concrete entity must have a body once flattening is
/// done.
fn check_completeness(program: &Program, ctx: &mut Context, id: EntityId) {
    let entity = program.entity(id);

    if !entity.kind.is_concrete() {
        return;
    }

    for method in &entity.methods {
        if method.body.is_none() {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                entity.span,
                format!(
                    "'{}' has no implementation of '{}'",
                    ctx.session.interner.get(entity.name),
                    ctx.session.interner.get(method.name)
                ),
            );
        }
    }
}
