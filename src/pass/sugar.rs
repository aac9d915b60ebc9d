//! The sugar pass: rewrites surface forms into the canonical core.
//!
//! Loops, `with` blocks, operators, `as`, object and lambda literals, case
//! methods and `__loc` all disappear here; defaults (entity caps, method
//! caps and result types, missing constructors) are filled in. Synthesized
//! anonymous entities are appended to the module and caught up with
//! `pass_through`.

use crate::ast::builder;
use crate::ast::expr::*;
use crate::ast::types::{Cap, Eph, Nominal, Type};
use crate::ast::{
    Entity, EntityId, EntityKind, Field, FieldKind, Method, MethodKind, Param, Program, UseScheme,
};
use crate::interner::Symbol;
use crate::reporter::DiagnosticKind;
use crate::source::Span;
use crate::target;

use super::{pass_through, Context, Pass, PassResult};

pub fn run(program: &mut Program, ctx: &mut Context) -> PassResult {
    sugar_uses(program, ctx);
    ffi_decl_names(program, ctx);

    let mut index = 0;
    while index < program.entities.len() {
        let id = EntityId(index);
        index += 1;

        if program.entity(id).pass_reached >= Pass::Sugar {
            continue;
        }
        entity(program, ctx, id);
    }

    PassResult::Ok
}

/// Validate `use` guards: only flag expressions survive normalisation.
fn sugar_uses(program: &mut Program, ctx: &mut Context) {
    for package in &program.packages {
        for module in &package.modules {
            for use_ in &module.uses {
                if let Some(guard) = &use_.guard {
                    if let Err((span, message)) = target::check_guard(guard) {
                        ctx.session
                            .reporter
                            .error(DiagnosticKind::Semantic, span, message);
                    }
                }
            }
        }
    }
}

pub fn entity(program: &mut Program, ctx: &mut Context, id: EntityId) -> PassResult {
    if program.entity(id).kind == EntityKind::Alias {
        return PassResult::Ok;
    }

    default_entity_cap(program, id);
    default_type_param_constraints(program, id);
    merge_case_methods(program, ctx, id);
    // The default constructor must exist before initialisers move into
    // constructor bodies.
    add_default_members(program, ctx, id);
    move_field_initialisers(program, id);
    sugar_methods(program, ctx, id);

    PassResult::Ok
}

fn default_entity_cap(program: &mut Program, id: EntityId) {
    let entity = program.entity_mut(id);

    if entity.default_cap.is_none() {
        entity.default_cap = Some(match entity.kind {
            EntityKind::Primitive => Cap::Val,
            EntityKind::Actor => Cap::Tag,
            _ => Cap::Ref,
        });
    }
}

/// An unconstrained type parameter is constrained by itself.
fn default_type_param_constraints(program: &mut Program, id: EntityId) {
    let entity = program.entity_mut(id);

    for tp in &mut entity.type_params {
        if tp.constraint.is_none() {
            tp.constraint = Some(Type::Nominal(Nominal::new(tp.name, tp.span)));
        }
    }

    for method in &mut entity.methods {
        for tp in &mut method.type_params {
            if tp.constraint.is_none() {
                tp.constraint = Some(Type::Nominal(Nominal::new(tp.name, tp.span)));
            }
        }
    }
}

/// The entity's own type, as constructors and primitive equality see it.
fn type_for_this(entity: &Entity, cap: Cap, eph: Eph) -> Type {
    let mut nominal = Nominal::new(entity.name, entity.span);
    nominal.cap = Some(cap);
    nominal.eph = eph;
    nominal.args = entity
        .type_params
        .iter()
        .map(|tp| Type::Nominal(Nominal::new(tp.name, tp.span)))
        .collect();
    Type::Nominal(nominal)
}

/// Field initialisers move to the head of every constructor body.
fn move_field_initialisers(program: &mut Program, id: EntityId) {
    let entity = program.entity_mut(id);

    let mut init_seq = vec![];
    for field in &mut entity.fields {
        if let Some(init) = field.init.take() {
            init_seq.push(builder::assign(
                builder::reference(field.name, field.span),
                init,
                field.span,
            ));
        }
    }

    if init_seq.is_empty() {
        return;
    }

    for method in &mut entity.methods {
        if method.kind != MethodKind::Constructor {
            continue;
        }

        if let Some(body) = &mut method.body {
            let span = body.span;
            let mut exprs = init_seq.clone();
            match &mut body.kind {
                ExprKind::Seq(rest) => exprs.append(rest),
                _ => exprs.push(std::mem::replace(body, builder::seq(vec![], span))),
            }
            *body = builder::seq(exprs, span);
        }
    }
}

/// Missing constructors, and identity equality on primitives.
fn add_default_members(program: &mut Program, ctx: &mut Context, id: EntityId) {
    let entity = program.entity(id);

    if !entity.kind.is_concrete() {
        return;
    }

    let has_constructor = entity
        .methods
        .iter()
        .any(|m| m.kind == MethodKind::Constructor);

    if !has_constructor {
        let span = entity.span;
        let cap = match entity.kind {
            EntityKind::Primitive => Cap::Val,
            EntityKind::Actor => Cap::Tag,
            _ => Cap::Iso,
        };

        let mut create = Method::new(MethodKind::Constructor, ctx.session.names.create, span);
        create.cap = Some(cap);
        create.body = Some(builder::seq(vec![builder::bool_lit(true, span)], span));
        program.entity_mut(id).methods.push(create);
    }

    if program.entity(id).kind == EntityKind::Primitive {
        add_primitive_equality(program, ctx, id);
    }
}

/// `eq`/`ne` on primitives compare identity unless already declared.
fn add_primitive_equality(program: &mut Program, ctx: &mut Context, id: EntityId) {
    let names = ctx.session.names;
    let entity = program.entity(id);
    let span = entity.span;
    let own_type = type_for_this(entity, Cap::Val, Eph::None);
    let bool_type = builder::nominal_type(names.bool_type, None, span);

    let that = ctx.session.interner.intern("that");

    for (name, op) in [(names.eq, BinOp::Is), (names.ne, BinOp::Isnt)] {
        if program.entity(id).find_method(name).is_some() {
            continue;
        }

        let body = Expr::new(
            ExprKind::Binop {
                op,
                lhs: Box::new(builder::this_expr(span)),
                rhs: Box::new(builder::reference(that, span)),
            },
            span,
        );

        let mut method = builder::simple_fun(
            Cap::Box,
            name,
            bool_type.clone(),
            builder::seq(vec![body], span),
            span,
        );
        method.params = vec![builder::param(that, own_type.clone(), span)];
        program.entity_mut(id).methods.push(method);
    }
}

/// Merge same-named methods with pattern parameters or guards into one
/// wrapper dispatching through a `match`.
fn merge_case_methods(program: &mut Program, ctx: &mut Context, id: EntityId) {
    let names: Vec<Symbol> = {
        let entity = program.entity(id);
        let mut seen = vec![];
        for m in &entity.methods {
            if !seen.contains(&m.name) {
                seen.push(m.name);
            }
        }
        seen
    };

    for name in names {
        let group: Vec<usize> = program
            .entity(id)
            .methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.name == name)
            .map(|(i, _)| i)
            .collect();

        if group.len() < 2 {
            continue;
        }

        merge_case_group(program, ctx, id, &group);
    }
}

fn merge_case_group(program: &mut Program, ctx: &mut Context, id: EntityId, group: &[usize]) {
    let reporter_span = program.entity(id).methods[group[0]].span;
    let kind = program.entity(id).methods[group[0]].kind;
    let cap = program.entity(id).methods[group[0]].cap;
    let name = program.entity(id).methods[group[0]].name;
    let arity = program.entity(id).methods[group[0]].params.len();

    for &i in group {
        let m = &program.entity(id).methods[i];
        if m.kind != kind || m.params.len() != arity {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                m.span,
                format!(
                    "clashing definitions of '{}' must agree on kind and parameter count",
                    ctx.session.interner.get(name)
                ),
            );
            return;
        }
        if m.kind == MethodKind::Constructor {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                m.span,
                "constructors cannot be case methods",
            );
            return;
        }
    }

    // Wrapper parameter types are the unions of the declared case types.
    let mut wrapper_params: Vec<Param> = vec![];
    for index in 0..arity {
        let mut types = vec![];
        for &i in group {
            let p = &program.entity(id).methods[i].params[index];
            if p.pattern.is_none() && !matches!(p.ty, Type::DontCare { .. }) {
                types.push(p.ty.clone());
            }
        }

        if types.is_empty() {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                reporter_span,
                format!("cannot infer a type for case parameter {index}; annotate at least one case"),
            );
            return;
        }

        let param_name = ctx.hygienic_name();
        wrapper_params.push(builder::param(param_name, Type::union(types), reporter_span));
    }

    let ret_types: Vec<Type> = group
        .iter()
        .filter_map(|&i| program.entity(id).methods[i].ret.clone())
        .collect();
    let partial = group
        .iter()
        .any(|&i| program.entity(id).methods[i].partial);

    // Turn each case into a match arm over the wrapper's parameter tuple.
    let mut cases = vec![];
    for &i in group {
        let method = &program.entity(id).methods[i];
        let span = method.span;

        let mut elems = vec![];
        for p in &method.params {
            let pattern = match &p.pattern {
                Some(value) => value.clone(),
                None => Expr::new(
                    ExprKind::MatchCapture {
                        name: p.name,
                        ty: p.ty.clone(),
                        id: None,
                    },
                    p.span,
                ),
            };
            elems.push(pattern);
        }

        let pattern = if elems.len() == 1 {
            elems.pop().expect("just checked")
        } else {
            Expr::new(ExprKind::Tuple(elems), span)
        };

        cases.push(MatchCase {
            pattern,
            guard: method.guard.clone(),
            body: method.body.clone(),
            span,
        });
    }

    let span = reporter_span;
    let mut scrutinee_elems: Vec<Expr> = wrapper_params
        .iter()
        .map(|p| builder::reference(p.name, span))
        .collect();
    let scrutinee = if scrutinee_elems.len() == 1 {
        scrutinee_elems.pop().expect("just checked")
    } else {
        Expr::new(ExprKind::Tuple(scrutinee_elems), span)
    };

    let body = Expr::new(
        ExprKind::Match(Box::new(MatchExpr {
            scrutinee,
            cases,
            else_body: None,
        })),
        span,
    );

    let mut wrapper = Method::new(kind, name, span);
    wrapper.cap = cap;
    wrapper.params = wrapper_params;
    wrapper.ret = if ret_types.is_empty() {
        None
    } else {
        Some(Type::union(ret_types))
    };
    wrapper.partial = partial;
    wrapper.body = Some(builder::seq(vec![body], span));

    // Drop the cases, splice the wrapper in at the first one's slot.
    let first = group[0];
    let entity = program.entity_mut(id);
    for &i in group.iter().rev() {
        entity.methods.remove(i);
    }
    entity.methods.insert(first, wrapper);
}

/// Method defaults plus the expression rewrites inside every body.
fn sugar_methods(program: &mut Program, ctx: &mut Context, id: EntityId) {
    let entity_kind = program.entity(id).kind;
    let names = ctx.session.names;

    for index in 0..program.entity(id).methods.len() {
        let span = program.entity(id).methods[index].span;

        // Receiver cap and result type defaults.
        {
            let entity = program.entity(id);
            let method = &entity.methods[index];
            let (cap, ret) = match method.kind {
                MethodKind::Constructor => {
                    let cap = method.cap.unwrap_or(match entity_kind {
                        EntityKind::Primitive => Cap::Val,
                        EntityKind::Actor => Cap::Tag,
                        _ => Cap::Ref,
                    });
                    let ret = type_for_this(entity, cap, Eph::Ephemeral);
                    (cap, Some(ret))
                }
                MethodKind::Behaviour => (
                    Cap::Tag,
                    Some(builder::nominal_type(names.none_type, None, span)),
                ),
                MethodKind::Function => (
                    method.cap.unwrap_or(Cap::Box),
                    Some(
                        method
                            .ret
                            .clone()
                            .unwrap_or_else(|| builder::nominal_type(names.none_type, None, span)),
                    ),
                ),
            };

            let method = &mut program.entity_mut(id).methods[index];
            method.cap = Some(cap);
            if method.kind != MethodKind::Function || method.ret.is_none() {
                method.ret = ret;
            }
        }

        sugar_method_body(program, ctx, id, index);
    }
}

fn sugar_method_body(program: &mut Program, ctx: &mut Context, id: EntityId, index: usize) {
    let Some(mut body) = program.entity_mut(id).methods[index].body.take() else {
        return;
    };

    let method = &program.entity(id).methods[index];
    let mut sctx = SugarCtx {
        entity: id,
        method_name: method.name,
        method_kind: method.kind,
        file: {
            let package = program.package(program.entity(id).package);
            package
                .modules
                .iter()
                .find(|m| m.entities.contains(&id))
                .map(|m| m.source)
        },
    };

    // Leading string literal in a multi-expression body is the docstring.
    if program.entity(id).methods[index].docstring.is_none() {
        if let ExprKind::Seq(exprs) = &mut body.kind {
            if exprs.len() > 1 {
                if let ExprKind::StringLit(doc) = exprs[0].kind {
                    program.entity_mut(id).methods[index].docstring = Some(doc);
                    exprs.remove(0);
                }
            }
        }
    }

    sugar_expr(&mut body, program, ctx, &mut sctx);

    // A None-returning function yields None unless it already cannot fall
    // through.
    let method = &program.entity(id).methods[index];
    let is_none_result = matches!(
        &method.ret,
        Some(Type::Nominal(n)) if n.name == ctx.session.names.none_type
    );

    if method.kind != MethodKind::Constructor && is_none_result {
        if let ExprKind::Seq(exprs) = &mut body.kind {
            let falls_through = !matches!(
                exprs.last().map(|e| &e.kind),
                Some(ExprKind::ErrorExpr) | Some(ExprKind::Return(_))
            );
            if falls_through {
                let span = body.span;
                exprs.push(builder::reference(ctx.session.names.none_type, span));
            }
        }
    }

    program.entity_mut(id).methods[index].body = Some(body);
}

struct SugarCtx {
    entity: EntityId,
    method_name: Symbol,
    method_kind: MethodKind,
    file: Option<crate::source::SourceId>,
}

/// Bottom-up expression rewriting.
fn sugar_expr(expr: &mut Expr, program: &mut Program, ctx: &mut Context, sctx: &mut SugarCtx) {
    // Children first, but skip guard positions: ifdef and use guards keep
    // their operators.
    match &mut expr.kind {
        ExprKind::IfDef(node) => {
            if let Err((span, message)) = target::check_guard(&node.cond) {
                ctx.session
                    .reporter
                    .error(DiagnosticKind::Semantic, span, message);
            }
            sugar_expr(&mut node.then_body, program, ctx, sctx);
            if let Some(e) = &mut node.else_body {
                sugar_expr(e, program, ctx, sctx);
            }
        }
        _ => each_child(expr, |child| sugar_expr(child, program, ctx, sctx)),
    }

    let span = expr.span;

    match &mut expr.kind {
        ExprKind::Binop { op, .. } => {
            let Some(method) = op.method_name() else {
                return;
            };
            let method = ctx.session.interner.intern(method);

            let ExprKind::Binop { lhs, rhs, .. } =
                std::mem::replace(&mut expr.kind, ExprKind::Continue)
            else {
                unreachable!()
            };
            *expr = builder::method_call(*lhs, method, vec![*rhs], span);
        }
        ExprKind::Unop { op, .. } => {
            let method = ctx.session.interner.intern(op.method_name());

            let ExprKind::Unop { expr: inner, .. } =
                std::mem::replace(&mut expr.kind, ExprKind::Continue)
            else {
                unreachable!()
            };
            *expr = builder::method_call(*inner, method, vec![], span);
        }
        ExprKind::Assign { lhs, .. } => {
            // `a(args) = v` becomes `a.update(args where value = v)`.
            if !matches!(lhs.kind, ExprKind::Call(_)) {
                return;
            }

            let ExprKind::Assign { lhs, rhs } =
                std::mem::replace(&mut expr.kind, ExprKind::Continue)
            else {
                unreachable!()
            };
            let ExprKind::Call(call) = lhs.kind else {
                unreachable!()
            };

            let mut update = *call;
            update.receiver = builder::dot(update.receiver, ctx.session.names.update, span);
            update.named.push((ctx.session.names.value, *rhs));
            expr.kind = ExprKind::Call(Box::new(update));
        }
        ExprKind::For(_) => {
            let ExprKind::For(node) = std::mem::replace(&mut expr.kind, ExprKind::Continue) else {
                unreachable!()
            };
            *expr = sugar_for(*node, ctx, span);
        }
        ExprKind::With(_) => {
            let ExprKind::With(node) = std::mem::replace(&mut expr.kind, ExprKind::Continue)
            else {
                unreachable!()
            };
            *expr = sugar_with(*node, ctx, span);
        }
        ExprKind::As { .. } => {
            let ExprKind::As { expr: value, ty } =
                std::mem::replace(&mut expr.kind, ExprKind::Continue)
            else {
                unreachable!()
            };
            match sugar_as(*value, ty, ctx, span) {
                Ok(rewritten) => *expr = rewritten,
                Err(message) => {
                    ctx.session
                        .reporter
                        .error(DiagnosticKind::Semantic, span, message);
                }
            }
        }
        ExprKind::Match(node) => {
            sugar_match(node, ctx);
        }
        ExprKind::Try {
            else_body,
            then_body,
            no_check,
            ..
        } => {
            if else_body.is_none() && then_body.is_some() {
                *no_check = true;
            }
        }
        ExprKind::FfiCall { name, .. } => {
            *name = ffi_name(ctx, *name);
        }
        ExprKind::Loc => {
            *expr = expand_location(ctx, sctx, span);
            sugar_expr(expr, program, ctx, sctx);
        }
        ExprKind::Lambda(_) => {
            let ExprKind::Lambda(node) = std::mem::replace(&mut expr.kind, ExprKind::Continue)
            else {
                unreachable!()
            };
            *expr = sugar_lambda(*node, ctx, span);
            sugar_expr(expr, program, ctx, sctx);
        }
        ExprKind::Object { .. } => {
            let ExprKind::Object {
                cap,
                provides,
                fields,
                methods,
            } = std::mem::replace(&mut expr.kind, ExprKind::Continue)
            else {
                unreachable!()
            };
            *expr = sugar_object(cap, provides, fields, methods, program, ctx, sctx, span);
        }
        ExprKind::Return(value) => {
            // A constructor's return yields the object under construction.
            if sctx.method_kind == MethodKind::Constructor && value.is_none() {
                *value = Some(Box::new(builder::this_expr(span)));
            }
        }
        _ => {}
    }
}

/// Prefix `@` so FFI names can never collide with source names.
fn ffi_name(ctx: &mut Context, name: Symbol) -> Symbol {
    let text = ctx.session.interner.get(name);
    if text.starts_with('@') {
        return name;
    }
    let prefixed = format!("@{text}");
    ctx.session.interner.intern(&prefixed)
}

fn ffi_decl_names(program: &mut Program, ctx: &mut Context) {
    for package in &mut program.packages {
        for module in &mut package.modules {
            for use_ in &mut module.uses {
                if let UseScheme::Ffi(decl) = &mut use_.scheme {
                    decl.name = ffi_name(ctx, decl.name);
                }
            }
        }
    }
}

fn idseq_lhs(idseq: &IdSeq) -> Expr {
    match idseq {
        IdSeq::Name { name, span } => builder::let_local(*name, None, *span),
        IdSeq::Tuple(elems) => {
            let exprs: Vec<Expr> = elems.iter().map(idseq_lhs).collect();
            let span = exprs.first().map(|e| e.span).unwrap_or_default();
            Expr::new(ExprKind::Tuple(exprs), span)
        }
    }
}

/// `for x in iter do body else alt end` becomes an iterator `while`.
fn sugar_for(node: ForExpr, ctx: &mut Context, span: Span) -> Expr {
    let iter_name = ctx.hygienic_name();
    let names = ctx.session.names;

    let init = builder::assign(
        builder::let_local(iter_name, None, span),
        node.iterator,
        span,
    );

    let cond = builder::seq(
        vec![builder::method_call(
            builder::reference(iter_name, span),
            names.has_next,
            vec![],
            span,
        )],
        span,
    );

    let next = builder::try_no_check(
        builder::seq(
            vec![builder::partial_call(
                builder::dot(builder::reference(iter_name, span), names.next, span),
                vec![],
                span,
            )],
            span,
        ),
        Some(builder::seq(vec![builder::break_expr(span)], span)),
        None,
        span,
    );

    let bind = builder::assign(idseq_lhs(&node.binding), next, span);

    let mut body_exprs = vec![bind];
    match node.body.kind {
        ExprKind::Seq(exprs) => body_exprs.extend(exprs),
        _ => body_exprs.push(node.body),
    }

    let while_loop = builder::while_loop(
        cond,
        builder::seq(body_exprs, span),
        node.else_body,
        span,
    );

    builder::seq(vec![init, while_loop], span)
}

/// `with x = e do body end` wraps the body in a disposing `try`.
fn sugar_with(node: WithExpr, ctx: &mut Context, span: Span) -> Expr {
    let names = ctx.session.names;
    let no_check = node.else_body.is_none();

    let mut out = vec![];
    let mut temps = vec![];

    for (binding, init) in node.bindings {
        let temp = ctx.hygienic_name();
        out.push(builder::assign(
            builder::let_local(temp, None, span),
            init,
            span,
        ));
        temps.push((temp, binding));
    }

    let mut body_exprs = vec![];
    for (temp, binding) in &temps {
        body_exprs.push(builder::assign(
            idseq_lhs(binding),
            builder::reference(*temp, span),
            span,
        ));
    }
    match node.body.kind {
        ExprKind::Seq(exprs) => body_exprs.extend(exprs),
        other => body_exprs.push(Expr::new(other, node.body.span)),
    }

    let dispose_calls = |temps: &[(Symbol, IdSeq)], span: Span| -> Vec<Expr> {
        temps
            .iter()
            .map(|(temp, _)| {
                builder::method_call(builder::reference(*temp, span), names.dispose, vec![], span)
            })
            .collect()
    };

    let mut else_exprs = dispose_calls(&temps, span);
    match node.else_body {
        Some(else_body) => match else_body.kind {
            ExprKind::Seq(exprs) => else_exprs.extend(exprs),
            other => else_exprs.push(Expr::new(other, span)),
        },
        None => else_exprs.push(builder::error_expr(span)),
    }

    let then_exprs = dispose_calls(&temps, span);

    let mut try_expr = builder::try_no_check(
        builder::seq(body_exprs, span),
        Some(builder::seq(else_exprs, span)),
        Some(builder::seq(then_exprs, span)),
        span,
    );
    if let ExprKind::Try { no_check: flag, .. } = &mut try_expr.kind {
        *flag = no_check;
    }

    out.push(try_expr);
    builder::seq(out, span)
}

/// `expr as T` becomes a single-case match that consumes the capture;
/// tuple types expand elementwise with `_` as don't-care.
fn sugar_as(value: Expr, ty: Type, ctx: &mut Context, span: Span) -> Result<Expr, String> {
    let mut pattern_elems = vec![];
    let mut body_elems = vec![];
    as_type(&ty, ctx, span, &mut pattern_elems, &mut body_elems);

    if body_elems.is_empty() {
        return Err("cannot treat the value as \"don't care\"".to_string());
    }

    let (pattern, body) = if pattern_elems.len() == 1 {
        (
            pattern_elems.pop().expect("just checked"),
            body_elems.pop().expect("just checked"),
        )
    } else {
        (
            Expr::new(ExprKind::Tuple(pattern_elems), span),
            Expr::new(ExprKind::Tuple(body_elems), span),
        )
    };

    let case = MatchCase {
        pattern,
        guard: None,
        body: Some(builder::seq(vec![body], span)),
        span,
    };

    Ok(Expr::new(
        ExprKind::Match(Box::new(MatchExpr {
            scrutinee: builder::seq(vec![value], span),
            cases: vec![case],
            else_body: Some(builder::seq(vec![builder::error_expr(span)], span)),
        })),
        span,
    ))
}

fn as_type(
    ty: &Type,
    ctx: &mut Context,
    span: Span,
    patterns: &mut Vec<Expr>,
    bodies: &mut Vec<Expr>,
) {
    match ty {
        Type::Tuple(elems) => {
            let mut inner_patterns = vec![];
            let mut inner_bodies = vec![];
            for elem in elems {
                as_type(elem, ctx, span, &mut inner_patterns, &mut inner_bodies);
            }

            patterns.push(Expr::new(ExprKind::Tuple(inner_patterns), span));

            if inner_bodies.is_empty() {
                // Every element is a don't-care; the caller rejects this.
                return;
            }
            if inner_bodies.len() == 1 {
                bodies.push(inner_bodies.pop().expect("just checked"));
            } else {
                bodies.push(Expr::new(ExprKind::Tuple(inner_bodies), span));
            }
        }
        Type::DontCare { .. } => {
            patterns.push(builder::reference(ctx.session.names.underscore, span));
        }
        other => {
            let name = ctx.hygienic_name();
            patterns.push(Expr::new(
                ExprKind::MatchCapture {
                    name,
                    ty: other.clone(),
                    id: None,
                },
                span,
            ));
            bodies.push(builder::consume(builder::reference(name, span), span));
        }
    }
}

/// Case bodies fall through; captures need explicit types.
fn sugar_match(node: &mut MatchExpr, ctx: &mut Context) {
    for index in 0..node.cases.len() {
        normalise_pattern(&mut node.cases[index].pattern, ctx, true);

        if node.cases[index].body.is_some() {
            continue;
        }

        let next_body = node.cases[index + 1..]
            .iter()
            .find_map(|c| c.body.clone());

        match next_body {
            Some(body) => node.cases[index].body = Some(body),
            None => {
                ctx.session.reporter.error(
                    DiagnosticKind::Semantic,
                    node.cases[index].span,
                    "a case with no body has no later case to fall through to",
                );
            }
        }
    }
}

fn normalise_pattern(pattern: &mut Expr, ctx: &mut Context, top_level: bool) {
    let span = pattern.span;

    match &mut pattern.kind {
        ExprKind::Local { kind, name, ty, .. } => {
            if *kind == LocalKind::Var {
                ctx.session.reporter.error(
                    DiagnosticKind::Semantic,
                    span,
                    "match captures are introduced with let",
                );
                return;
            }

            let Some(capture_ty) = ty.take() else {
                ctx.session.reporter.error(
                    DiagnosticKind::Semantic,
                    span,
                    format!(
                        "cannot infer type of capture '{}'; a type annotation is required",
                        ctx.session.interner.get(*name)
                    ),
                );
                return;
            };

            if top_level && matches!(capture_ty, Type::Tuple(_)) {
                ctx.session.reporter.error(
                    DiagnosticKind::Semantic,
                    span,
                    "a tuple capture must be a tuple of captures",
                );
                return;
            }

            pattern.kind = ExprKind::MatchCapture {
                name: *name,
                ty: capture_ty,
                id: None,
            };
        }
        ExprKind::Tuple(elems) => {
            for elem in elems {
                // Tuple elements may be bare sequences from the parser.
                if let ExprKind::Seq(exprs) = &mut elem.kind {
                    if exprs.len() == 1 {
                        let inner = exprs.pop().expect("just checked");
                        *elem = inner;
                    }
                }
                normalise_pattern(elem, ctx, false);
            }
        }
        _ => {}
    }
}

/// `__loc` becomes an object literal with position accessors.
fn expand_location(ctx: &mut Context, sctx: &SugarCtx, span: Span) -> Expr {
    let names = ctx.session.names;

    let file_name = sctx
        .file
        .map(|f| ctx.session.sources.file_name(f).to_string())
        .unwrap_or_default();
    let file_sym = ctx.session.interner.intern(&file_name);
    let method_sym = sctx.method_name;

    let string_type = builder::nominal_type(names.string_type, None, span);
    let usize_type = builder::nominal_type(names.usize_type, None, span);

    let methods = vec![
        builder::simple_fun(
            Cap::Tag,
            names.file,
            string_type.clone(),
            builder::seq(vec![builder::string_lit(file_sym, span)], span),
            span,
        ),
        builder::simple_fun(
            Cap::Tag,
            names.method,
            string_type,
            builder::seq(vec![builder::string_lit(method_sym, span)], span),
            span,
        ),
        builder::simple_fun(
            Cap::Tag,
            names.line,
            usize_type.clone(),
            builder::seq(vec![builder::int_lit(span.line as i128, span)], span),
            span,
        ),
        builder::simple_fun(
            Cap::Tag,
            names.pos,
            usize_type,
            builder::seq(vec![builder::int_lit(span.col as i128, span)], span),
            span,
        ),
    ];

    Expr::new(
        ExprKind::Object {
            cap: None,
            provides: vec![],
            fields: vec![],
            methods,
        },
        span,
    )
}

/// A lambda is an object literal with a single `apply`; captures become
/// fields initialised from the enclosing scope.
fn sugar_lambda(node: LambdaExpr, ctx: &mut Context, span: Span) -> Expr {
    let names = ctx.session.names;

    let mut fields = vec![];
    for capture in node.captures {
        let ty = capture.ty.unwrap_or(Type::DontCare { span: capture.span });
        let init = capture
            .value
            .unwrap_or_else(|| builder::reference(capture.name, capture.span));
        fields.push(builder::field(
            FieldKind::Let,
            capture.name,
            ty,
            Some(init),
            capture.span,
        ));
    }

    let mut apply = Method::new(MethodKind::Function, node.name.unwrap_or(names.apply), span);
    apply.cap = node.cap;
    apply.params = node.params;
    apply.ret = node.ret;
    apply.partial = node.partial;
    apply.body = Some(match node.body.kind {
        ExprKind::Seq(_) => node.body,
        other => builder::seq(vec![Expr::new(other, span)], span),
    });

    Expr::new(
        ExprKind::Object {
            cap: node.obj_cap,
            provides: vec![],
            fields,
            methods: vec![apply],
        },
        span,
    )
}

/// Hoist an object literal into a fresh entity in the module and replace
/// the literal with a constructor call.
#[allow(clippy::too_many_arguments)]
fn sugar_object(
    cap: Option<Cap>,
    provides: Vec<Type>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    program: &mut Program,
    ctx: &mut Context,
    sctx: &mut SugarCtx,
    span: Span,
) -> Expr {
    let names = ctx.session.names;
    let type_name = {
        let hygienic = ctx.hygienic_name();
        let counter = ctx.session.interner.get(hygienic).trim_start_matches('$').to_string();
        ctx.session.interner.intern(&format!("$Object{counter}"))
    };

    let has_fields = !fields.is_empty();
    let has_behaviours = methods.iter().any(|m| m.kind == MethodKind::Behaviour);

    let kind = if has_behaviours {
        if matches!(cap, Some(c) if c != Cap::Tag) {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                span,
                "object literals with behaviours are actors and must be tag",
            );
        }
        EntityKind::Actor
    } else if !has_fields
        && matches!(cap, None | Some(Cap::Tag) | Some(Cap::Box) | Some(Cap::Val))
    {
        EntityKind::Primitive
    } else {
        EntityKind::Class
    };

    let package = program.entity(sctx.entity).package;
    let mut entity = Entity::new(kind, type_name, package, span);
    entity.provides = provides;

    // One constructor parameter and one initialising assignment per field;
    // the call site passes the captured initialiser.
    let mut create = Method::new(MethodKind::Constructor, names.create, span);
    if kind == EntityKind::Class {
        create.cap = cap.or(Some(Cap::Ref));
    }

    let mut create_body = vec![];
    let mut call_args = vec![];

    for field in fields {
        let param_name = ctx.hygienic_name();
        let init = field.init.clone().unwrap_or_else(|| {
            builder::reference(field.name, field.span)
        });

        create.params.push(builder::param(
            param_name,
            field.ty.clone(),
            field.span,
        ));
        create_body.push(builder::assign(
            builder::reference(field.name, field.span),
            builder::consume(builder::reference(param_name, field.span), field.span),
            field.span,
        ));
        call_args.push(init);

        entity.fields.push(Field {
            kind: field.kind,
            name: field.name,
            ty: field.ty,
            init: None,
            span: field.span,
        });
    }

    if create_body.is_empty() {
        create_body.push(builder::bool_lit(true, span));
    }
    create.body = Some(builder::seq(create_body, span));

    entity.methods = methods;
    entity.methods.push(create);

    let id = program.add_entity(entity);

    // Attach to the module the enclosing entity came from.
    let module_pos = {
        let package = program.package(package);
        package
            .modules
            .iter()
            .position(|m| m.entities.contains(&sctx.entity))
            .unwrap_or(0)
    };
    let package_mut = program.package_mut(package);
    if let Some(module) = package_mut.modules.get_mut(module_pos) {
        module.entities.push(id);
    }
    let clash = package_mut.symbols.add(type_name, crate::ast::Def::Entity(id));
    debug_assert!(clash.is_ok(), "hygienic type name collided");

    pass_through(program, ctx, id, Pass::Sugar);

    builder::call(
        builder::dot(builder::reference(type_name, span), names.create, span),
        call_args,
        span,
    )
}

/// Apply `f` to every direct child expression.
fn each_child(expr: &mut Expr, mut f: impl FnMut(&mut Expr)) {
    match &mut expr.kind {
        ExprKind::Seq(exprs) | ExprKind::Tuple(exprs) => {
            for e in exprs {
                f(e);
            }
        }
        ExprKind::Array { elems, .. } => {
            for e in elems {
                f(e);
            }
        }
        ExprKind::Dot { expr, .. }
        | ExprKind::Qualify { expr, .. }
        | ExprKind::Unop { expr, .. }
        | ExprKind::As { expr, .. }
        | ExprKind::Consume { expr }
        | ExprKind::Recover { body: expr, .. } => f(expr),
        ExprKind::Call(call) => {
            f(&mut call.receiver);
            for arg in &mut call.positional {
                f(arg);
            }
            for (_, arg) in &mut call.named {
                f(arg);
            }
        }
        ExprKind::FfiCall { args, .. } => {
            for arg in args {
                f(arg);
            }
        }
        ExprKind::Binop { lhs, rhs, .. } | ExprKind::Assign { lhs, rhs } => {
            f(lhs);
            f(rhs);
        }
        ExprKind::If(node) | ExprKind::IfDef(node) => {
            f(&mut node.cond);
            f(&mut node.then_body);
            if let Some(e) = &mut node.else_body {
                f(e);
            }
        }
        ExprKind::IfType(node) => {
            f(&mut node.then_body);
            if let Some(e) = &mut node.else_body {
                f(e);
            }
        }
        ExprKind::While(node) | ExprKind::Repeat(node) => {
            f(&mut node.cond);
            f(&mut node.body);
            if let Some(e) = &mut node.else_body {
                f(e);
            }
        }
        ExprKind::For(node) => {
            f(&mut node.iterator);
            f(&mut node.body);
            if let Some(e) = &mut node.else_body {
                f(e);
            }
        }
        ExprKind::With(node) => {
            for (_, init) in &mut node.bindings {
                f(init);
            }
            f(&mut node.body);
            if let Some(e) = &mut node.else_body {
                f(e);
            }
        }
        ExprKind::Match(node) => {
            f(&mut node.scrutinee);
            for case in &mut node.cases {
                f(&mut case.pattern);
                if let Some(g) = &mut case.guard {
                    f(g);
                }
                if let Some(b) = &mut case.body {
                    f(b);
                }
            }
            if let Some(e) = &mut node.else_body {
                f(e);
            }
        }
        ExprKind::Try {
            body,
            else_body,
            then_body,
            ..
        } => {
            f(body);
            if let Some(e) = else_body {
                f(e);
            }
            if let Some(e) = then_body {
                f(e);
            }
        }
        ExprKind::Lambda(node) => {
            for capture in &mut node.captures {
                if let Some(value) = &mut capture.value {
                    f(value);
                }
            }
            f(&mut node.body);
        }
        ExprKind::Break(Some(e)) | ExprKind::Return(Some(e)) => f(e),
        _ => {}
    }
}
