//! Structural subtyping over the type AST.
//!
//! Unions and intersections decompose, tuples compare elementwise, nominal
//! types compare through the provides closure (traits) or member-by-member
//! (interfaces), with invariant type arguments and the cap lattice on top.

use crate::ast::types::{Cap, Eph, Nominal, Type};
use crate::ast::{EntityId, EntityKind, Method, Program, TypeParam};

use super::cap;

/// The effective cap of a nominal: the written one or the entity default.
pub fn nominal_cap(program: &Program, nominal: &Nominal) -> Cap {
    if let Some(cap) = nominal.cap {
        return cap;
    }

    nominal
        .entity
        .map(|id| program.entity(id).default_cap.unwrap_or(Cap::Ref))
        .unwrap_or(Cap::Ref)
}

/// Expand a type alias reference, pushing an explicit cap or ephemerality
/// down onto the expansion.
fn expand_alias(program: &Program, nominal: &Nominal) -> Option<Type> {
    let id = nominal.entity?;
    let entity = program.entity(id);

    if entity.kind != EntityKind::Alias {
        return None;
    }

    let mut expanded = entity.alias_of.clone()?;
    expanded = reify(&expanded, &entity.type_params, &nominal.args, false);

    if let Some(cap) = nominal.cap {
        expanded = expanded.with_cap(cap, nominal.eph);
    } else if nominal.eph != Eph::None {
        expanded = expanded.with_eph(nominal.eph);
    }

    Some(expanded)
}

/// Substitute type arguments for the owner's type parameters. A cap
/// written on the parameter reference overrides the argument's cap.
pub fn reify(ty: &Type, params: &[TypeParam], args: &[Type], method_level: bool) -> Type {
    match ty {
        Type::TypeParamRef { cap, eph, def: Some((m, index)), .. } if *m == method_level => {
            let Some(arg) = args.get(*index) else {
                return ty.clone();
            };

            let mut out = arg.clone();
            if let Some(cap) = cap {
                out = out.with_cap(*cap, *eph);
            } else if *eph != Eph::None {
                out = out.with_eph(*eph);
            }
            out
        }
        Type::Nominal(nominal) => {
            let mut out = nominal.clone();
            out.args = nominal
                .args
                .iter()
                .map(|a| reify(a, params, args, method_level))
                .collect();
            Type::Nominal(out)
        }
        Type::Union(types) => Type::union(
            types
                .iter()
                .map(|t| reify(t, params, args, method_level))
                .collect(),
        ),
        Type::Isect(types) => Type::isect(
            types
                .iter()
                .map(|t| reify(t, params, args, method_level))
                .collect(),
        ),
        Type::Tuple(types) => Type::Tuple(
            types
                .iter()
                .map(|t| reify(t, params, args, method_level))
                .collect(),
        ),
        Type::Arrow { left, right } => Type::Arrow {
            left: Box::new(reify(left, params, args, method_level)),
            right: Box::new(reify(right, params, args, method_level)),
        },
        Type::Fun {
            cap,
            params: fn_params,
            ret,
            partial,
            span,
        } => Type::Fun {
            cap: *cap,
            params: fn_params
                .iter()
                .map(|t| reify(t, params, args, method_level))
                .collect(),
            ret: Box::new(reify(ret, params, args, method_level)),
            partial: *partial,
            span: *span,
        },
        other => other.clone(),
    }
}

/// Reify a whole method signature against a provider's type arguments.
pub fn reify_method(method: &Method, params: &[TypeParam], args: &[Type]) -> Method {
    let mut out = method.clone();

    for param in &mut out.params {
        param.ty = reify(&param.ty, params, args, false);
    }
    if let Some(ret) = &mut out.ret {
        *ret = reify(ret, params, args, false);
    }
    for tp in &mut out.type_params {
        if let Some(constraint) = &mut tp.constraint {
            *constraint = reify(constraint, params, args, false);
        }
    }

    out
}

/// The provides closure of an entity: every (provider, reified args) pair
/// reachable through provides edges.
pub fn provides_closure(program: &Program, id: EntityId) -> Vec<(EntityId, Vec<Type>)> {
    let mut out = vec![];
    collect_provides(program, id, &[], &mut out);
    out
}

fn collect_provides(
    program: &Program,
    id: EntityId,
    args: &[Type],
    out: &mut Vec<(EntityId, Vec<Type>)>,
) {
    let entity = program.entity(id);

    for provided in &entity.provides {
        let Type::Nominal(nominal) = provided else {
            continue;
        };
        let Some(provider) = nominal.entity else {
            continue;
        };

        let reified_args: Vec<Type> = nominal
            .args
            .iter()
            .map(|a| reify(a, &entity.type_params, args, false))
            .collect();

        if out.iter().any(|(seen, seen_args)| *seen == provider && *seen_args == reified_args) {
            continue;
        }

        out.push((provider, reified_args.clone()));
        collect_provides(program, provider, &reified_args, out);
    }
}

pub fn is_subtype(program: &Program, sub: &Type, sup: &Type) -> bool {
    // Alias expansion first, so everything below sees real shapes.
    if let Type::Nominal(nominal) = sub {
        if let Some(expanded) = expand_alias(program, nominal) {
            return is_subtype(program, &expanded, sup);
        }
    }
    if let Type::Nominal(nominal) = sup {
        if let Some(expanded) = expand_alias(program, nominal) {
            return is_subtype(program, sub, &expanded);
        }
    }

    match (sub, sup) {
        // The don't-care type relates to everything.
        (Type::DontCare { .. }, _) | (_, Type::DontCare { .. }) => true,

        // Universally quantified sides decompose first.
        (Type::Union(subs), _) => subs.iter().all(|s| is_subtype(program, s, sup)),
        (_, Type::Isect(sups)) => sups.iter().all(|s| is_subtype(program, sub, s)),
        (_, Type::Union(sups)) => sups.iter().any(|s| is_subtype(program, sub, s)),
        (Type::Isect(subs), _) => subs.iter().any(|s| is_subtype(program, s, sup)),

        (Type::Tuple(subs), Type::Tuple(sups)) => {
            subs.len() == sups.len()
                && subs
                    .iter()
                    .zip(sups.iter())
                    .all(|(a, b)| is_subtype(program, a, b))
        }

        (Type::Nominal(sub_n), Type::Nominal(sup_n)) => nominal_subtype(program, sub_n, sup_n),

        (Type::TypeParamRef { def: sub_def, cap: sub_cap, eph: sub_eph, .. },
         Type::TypeParamRef { def: sup_def, cap: sup_cap, eph: sup_eph, .. }) => {
            sub_def == sup_def
                && cap::is_sub_cap_eph(
                    sub_cap.unwrap_or(Cap::Any),
                    *sub_eph,
                    sup_cap.unwrap_or(Cap::Any),
                    *sup_eph,
                )
        }

        // A type parameter is a subtype of whatever its constraint is.
        (Type::TypeParamRef { .. }, _) => false,

        (
            Type::Fun {
                cap: sub_cap,
                params: sub_params,
                ret: sub_ret,
                partial: sub_partial,
                ..
            },
            Type::Fun {
                cap: sup_cap,
                params: sup_params,
                ret: sup_ret,
                partial: sup_partial,
                ..
            },
        ) => {
            sub_params.len() == sup_params.len()
                && sub_params
                    .iter()
                    .zip(sup_params.iter())
                    .all(|(a, b)| is_subtype(program, b, a))
                && is_subtype(program, sub_ret, sup_ret)
                && (*sup_partial || !*sub_partial)
                && cap::is_sub_cap(*sub_cap, *sup_cap)
        }

        (Type::Arrow { .. }, _) | (_, Type::Arrow { .. }) => sub == sup,
        (Type::This { .. }, Type::This { .. }) => true,

        _ => false,
    }
}

fn nominal_subtype(program: &Program, sub: &Nominal, sup: &Nominal) -> bool {
    let (Some(sub_id), Some(sup_id)) = (sub.entity, sup.entity) else {
        // Unresolved names compare by name only; the name pass has already
        // reported the real problem.
        return sub.name == sup.name;
    };

    let caps_ok = cap::is_sub_cap_eph(
        nominal_cap(program, sub),
        sub.eph,
        nominal_cap(program, sup),
        sup.eph,
    );

    if sub_id == sup_id {
        return sub.args == sup.args && caps_ok;
    }

    let sup_entity = program.entity(sup_id);

    match sup_entity.kind {
        EntityKind::Trait | EntityKind::Interface => {}
        _ => return false,
    }

    // Nominally, through the provides closure.
    let in_closure = provides_closure(program, sub_id)
        .into_iter()
        .any(|(provider, args)| {
            let reified: Vec<Type> = args
                .iter()
                .map(|a| reify(a, &program.entity(sub_id).type_params, &sub.args, false))
                .collect();
            provider == sup_id && reified == sup.args
        });

    if in_closure {
        return caps_ok;
    }

    // Structurally, for interfaces only.
    if sup_entity.kind != EntityKind::Interface {
        return false;
    }

    let sub_entity = program.entity(sub_id);

    let members_ok = sup_entity.methods.iter().all(|wanted| {
        let wanted = reify_method(wanted, &sup_entity.type_params, &sup.args);

        let Some((_, found)) = sub_entity.find_method(wanted.name) else {
            return false;
        };
        let found = reify_method(found, &sub_entity.type_params, &sub.args);

        compatible_signature(program, &found, &wanted)
    });

    members_ok && caps_ok
}

/// Method override compatibility: parameters contravariant, result
/// covariant, errors covariant, receiver cap contravariant.
pub fn compatible_signature(program: &Program, imp: &Method, decl: &Method) -> bool {
    if imp.params.len() != decl.params.len() {
        return false;
    }
    if imp.kind != decl.kind {
        return false;
    }

    for (imp_param, decl_param) in imp.params.iter().zip(decl.params.iter()) {
        if !is_subtype(program, &decl_param.ty, &imp_param.ty) {
            return false;
        }
    }

    match (&imp.ret, &decl.ret) {
        (Some(imp_ret), Some(decl_ret)) => {
            if !is_subtype(program, imp_ret, decl_ret) {
                return false;
            }
        }
        (None, None) => {}
        _ => return false,
    }

    if imp.partial && !decl.partial {
        return false;
    }

    let imp_cap = imp.cap.unwrap_or(Cap::Box);
    let decl_cap = decl.cap.unwrap_or(Cap::Box);
    cap::is_sub_cap(decl_cap, imp_cap)
}
