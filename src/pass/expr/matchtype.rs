//! Match-type analysis: can a pattern type match an operand type?
//!
//! The answer is three-valued. `Accept` means some instances match,
//! `Reject` means the types are structurally disjoint, and `Deny` means a
//! match is forbidden by capabilities even where the structure lines up.
//! `Deny` surfaces as an error even where `Reject` would merely narrow.

use crate::ast::types::{Cap, Type};
use crate::ast::{EntityKind, Program};

use super::cap;
use super::subtype::{self, nominal_cap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Accept,
    Reject,
    Deny,
}

pub fn could_match(program: &Program, operand: &Type, pattern: &Type) -> MatchResult {
    match (operand, pattern) {
        (_, Type::DontCare { .. }) => MatchResult::Accept,

        (Type::Union(types), _) => {
            combine_any(types.iter().map(|t| could_match(program, t, pattern)))
        }
        (_, Type::Union(types)) => {
            combine_any(types.iter().map(|t| could_match(program, operand, t)))
        }
        (Type::Isect(types), _) => {
            combine_all(types.iter().map(|t| could_match(program, t, pattern)))
        }
        (_, Type::Isect(types)) => {
            combine_all(types.iter().map(|t| could_match(program, operand, t)))
        }

        (Type::Tuple(ops), Type::Tuple(pats)) => {
            if ops.len() != pats.len() {
                return MatchResult::Reject;
            }
            combine_all(
                ops.iter()
                    .zip(pats.iter())
                    .map(|(o, p)| could_match(program, o, p)),
            )
        }
        (Type::Tuple(_), _) | (_, Type::Tuple(_)) => MatchResult::Reject,

        (Type::Nominal(op), Type::Nominal(pat)) => {
            // Compare shapes with the caps neutralised, then judge caps.
            let erased_op = Type::Nominal(op.clone()).with_cap(Cap::Tag, Default::default());
            let erased_pat = Type::Nominal(pat.clone()).with_cap(Cap::Tag, Default::default());

            let downcast = subtype::is_subtype(program, &erased_pat, &erased_op);
            let upcast = subtype::is_subtype(program, &erased_op, &erased_pat);
            let could_overlap = upcast
                || downcast
                || pat
                    .entity
                    .is_some_and(|id| program.entity(id).kind.is_abstract());

            if !could_overlap {
                return MatchResult::Reject;
            }

            let op_cap = nominal_cap(program, op);
            let pat_cap = nominal_cap(program, pat);

            if cap::is_sub_cap(cap::alias(op_cap), pat_cap) {
                MatchResult::Accept
            } else {
                MatchResult::Deny
            }
        }

        (Type::TypeParamRef { .. }, _) | (_, Type::TypeParamRef { .. }) => {
            // Unknown instantiation: assume a match is possible; the caps
            // still gate it.
            match (operand.cap(), pattern.cap()) {
                (Some(op_cap), Some(pat_cap))
                    if !cap::is_sub_cap(cap::alias(op_cap), pat_cap) =>
                {
                    MatchResult::Deny
                }
                _ => MatchResult::Accept,
            }
        }

        _ => MatchResult::Reject,
    }
}

fn combine_any(results: impl Iterator<Item = MatchResult>) -> MatchResult {
    let mut out = MatchResult::Reject;

    for result in results {
        match result {
            MatchResult::Accept => return MatchResult::Accept,
            MatchResult::Deny => out = MatchResult::Deny,
            MatchResult::Reject => {}
        }
    }

    out
}

fn combine_all(results: impl Iterator<Item = MatchResult>) -> MatchResult {
    let mut out = MatchResult::Accept;

    for result in results {
        match result {
            MatchResult::Reject => return MatchResult::Reject,
            MatchResult::Deny => out = MatchResult::Deny,
            MatchResult::Accept => {}
        }
    }

    out
}

/// One analysed case: its pattern type, and whether it is disqualified
/// from exhaustiveness (guarded, or matching by structural equality).
pub struct CaseShape {
    pub pattern_ty: Type,
    pub guarded: bool,
    pub by_value: bool,
}

/// A match is exhaustive when the unguarded capture cases cover every
/// member of the operand type.
pub fn is_exhaustive(program: &Program, operand: &Type, cases: &[CaseShape]) -> bool {
    operand.union_members().iter().all(|member| {
        cases.iter().any(|case| {
            if case.guarded || case.by_value {
                return false;
            }

            // Primitives with the default identity eq are fully covered by
            // a value pattern naming the primitive itself.
            subtype::is_subtype(program, member, &case.pattern_ty)
        })
    })
}

/// A value pattern like `P1` covers the whole primitive; a literal with a
/// custom eq does not. The expr pass decides which one it saw.
pub fn primitive_value_covers(program: &Program, pattern_ty: &Type) -> bool {
    match pattern_ty {
        Type::Nominal(nominal) => nominal
            .entity
            .is_some_and(|id| program.entity(id).kind == EntityKind::Primitive),
        _ => false,
    }
}
