//! The reference-capability lattice.
//!
//! Concrete order: `iso <: trn <: ref <: box`, `iso <: val <: box`, and
//! everything `<: tag`. Nothing but `iso` is `<: iso`. The generic cap
//! sets relate through their members.

use crate::ast::types::{Cap, Eph};

const CONCRETE: [Cap; 6] = [Cap::Iso, Cap::Trn, Cap::Ref, Cap::Val, Cap::Box, Cap::Tag];

/// The concrete subtype order.
pub fn sub_concrete(sub: Cap, sup: Cap) -> bool {
    if sub == sup || sup == Cap::Tag {
        return true;
    }

    match (sub, sup) {
        (Cap::Iso, Cap::Trn | Cap::Ref | Cap::Val | Cap::Box) => true,
        (Cap::Trn, Cap::Ref | Cap::Box) => true,
        (Cap::Ref, Cap::Box) => true,
        (Cap::Val, Cap::Box) => true,
        _ => false,
    }
}

/// Subtyping between caps, generic sets included: a set on the left must
/// hold for every member, a set on the right is satisfied by membership.
pub fn is_sub_cap(sub: Cap, sup: Cap) -> bool {
    sub.members()
        .iter()
        .all(|s| sup.members().iter().any(|t| sub_concrete(*s, *t)))
}

/// Caps with the ephemerality marks factored in: a supertype demanding an
/// ephemeral value only accepts ephemeral subtypes.
pub fn is_sub_cap_eph(sub: Cap, sub_eph: Eph, sup: Cap, sup_eph: Eph) -> bool {
    match (sub_eph, sup_eph) {
        (Eph::Ephemeral, _) => is_sub_cap(sub, sup),
        (_, Eph::Ephemeral) => false,
        _ => is_sub_cap(sub, sup),
    }
}

/// The capability of an additional alias of a reference.
pub fn alias(cap: Cap) -> Cap {
    match cap {
        Cap::Iso => Cap::Tag,
        Cap::Trn => Cap::Box,
        other => other,
    }
}

/// Caps that may cross an actor boundary.
pub fn is_sendable(cap: Cap) -> bool {
    cap.members()
        .iter()
        .all(|c| matches!(c, Cap::Iso | Cap::Val | Cap::Tag))
}

/// Viewpoint adaptation: the cap seen when reading a `field`-cap field
/// through an `origin`-cap reference. `None` means the read is forbidden.
/// Generic caps adapt member by member, joining the results.
pub fn viewpoint(origin: Cap, field: Cap) -> Option<Cap> {
    if origin.is_concrete() && !field.is_concrete() {
        let mut result: Option<Cap> = None;
        for member in field.members() {
            let adapted = viewpoint(origin, *member)?;
            result = Some(match result {
                None => adapted,
                Some(current) => join(current, adapted)?,
            });
        }
        return result;
    }

    let adapted = match origin {
        Cap::Iso => match field {
            Cap::Iso | Cap::Ref => Cap::Iso,
            Cap::Val => Cap::Val,
            Cap::Trn | Cap::Box | Cap::Tag => Cap::Tag,
            _ => return None,
        },
        Cap::Trn => match field {
            Cap::Iso => Cap::Iso,
            Cap::Trn | Cap::Ref => Cap::Trn,
            Cap::Val => Cap::Val,
            Cap::Box => Cap::Box,
            Cap::Tag => Cap::Tag,
            _ => return None,
        },
        Cap::Ref => field,
        Cap::Val => match field {
            Cap::Tag => Cap::Tag,
            _ => Cap::Val,
        },
        Cap::Box => match field {
            Cap::Iso | Cap::Tag => Cap::Tag,
            Cap::Trn | Cap::Ref | Cap::Box => Cap::Box,
            Cap::Val => Cap::Val,
            _ => return None,
        },
        Cap::Tag => return None,
        // Generic origins adapt through each member; use the upper bound.
        set => {
            let mut result: Option<Cap> = None;
            for member in set.members() {
                let adapted = viewpoint(*member, field)?;
                result = Some(match result {
                    None => adapted,
                    Some(current) => join(current, adapted)?,
                });
            }
            return result;
        }
    };

    Some(adapted)
}

/// Whether a value with cap `rhs` may be written into a field of a
/// receiver with cap `receiver`.
pub fn safe_to_write(receiver: Cap, rhs: Cap) -> bool {
    match receiver {
        Cap::Ref => true,
        Cap::Iso => is_sendable(rhs),
        Cap::Trn => rhs
            .members()
            .iter()
            .all(|c| matches!(c, Cap::Iso | Cap::Trn | Cap::Val | Cap::Tag)),
        _ => false,
    }
}

/// Least upper bound in the concrete lattice.
pub fn join(a: Cap, b: Cap) -> Option<Cap> {
    if sub_concrete(a, b) {
        return Some(b);
    }
    if sub_concrete(b, a) {
        return Some(a);
    }

    CONCRETE
        .iter()
        .copied()
        .filter(|c| sub_concrete(a, *c) && sub_concrete(b, *c))
        .reduce(|best, c| if sub_concrete(c, best) { c } else { best })
}

/// Greatest lower bound in the concrete lattice.
pub fn meet(a: Cap, b: Cap) -> Option<Cap> {
    if sub_concrete(a, b) {
        return Some(a);
    }
    if sub_concrete(b, a) {
        return Some(b);
    }

    CONCRETE
        .iter()
        .copied()
        .filter(|c| sub_concrete(*c, a) && sub_concrete(*c, b))
        .reduce(|best, c| if sub_concrete(best, c) { c } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_spine() {
        assert!(sub_concrete(Cap::Iso, Cap::Trn));
        assert!(sub_concrete(Cap::Trn, Cap::Ref));
        assert!(sub_concrete(Cap::Ref, Cap::Box));
        assert!(sub_concrete(Cap::Iso, Cap::Val));
        assert!(sub_concrete(Cap::Val, Cap::Box));

        for cap in CONCRETE {
            assert!(sub_concrete(cap, Cap::Tag));
            assert!(sub_concrete(cap, cap));
            if cap != Cap::Iso {
                assert!(!sub_concrete(cap, Cap::Iso), "{cap} <: iso");
            }
        }

        assert!(!sub_concrete(Cap::Trn, Cap::Val));
        assert!(!sub_concrete(Cap::Val, Cap::Ref));
        assert!(!sub_concrete(Cap::Box, Cap::Ref));
    }

    #[test]
    fn test_transitivity() {
        for a in CONCRETE {
            for b in CONCRETE {
                for c in CONCRETE {
                    if sub_concrete(a, b) && sub_concrete(b, c) {
                        assert!(sub_concrete(a, c), "{a} <: {b} <: {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_antisymmetry() {
        for a in CONCRETE {
            for b in CONCRETE {
                if sub_concrete(a, b) && sub_concrete(b, a) {
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn test_join_meet_absorption() {
        for a in CONCRETE {
            for b in CONCRETE {
                let j = join(a, b).expect("join exists");
                let m = meet(a, b).expect("meet exists");

                // a ∨ (a ∧ b) = a and a ∧ (a ∨ b) = a
                assert_eq!(join(a, m), Some(a), "absorption failed for {a} {b}");
                assert_eq!(meet(a, j), Some(a), "absorption failed for {a} {b}");
            }
        }
    }

    #[test]
    fn test_cap_set_subtyping() {
        assert!(is_sub_cap(Cap::Share, Cap::Send));
        assert!(!is_sub_cap(Cap::Send, Cap::Share));
        assert!(is_sub_cap(Cap::Val, Cap::Read));
        assert!(is_sub_cap(Cap::Send, Cap::Any));
        assert!(!is_sub_cap(Cap::Read, Cap::Send));
    }

    #[test]
    fn test_alias() {
        assert_eq!(alias(Cap::Iso), Cap::Tag);
        assert_eq!(alias(Cap::Trn), Cap::Box);
        assert_eq!(alias(Cap::Ref), Cap::Ref);
        assert_eq!(alias(Cap::Val), Cap::Val);
    }

    #[test]
    fn test_viewpoint_table() {
        assert_eq!(viewpoint(Cap::Ref, Cap::Iso), Some(Cap::Iso));
        assert_eq!(viewpoint(Cap::Box, Cap::Ref), Some(Cap::Box));
        assert_eq!(viewpoint(Cap::Box, Cap::Iso), Some(Cap::Tag));
        assert_eq!(viewpoint(Cap::Val, Cap::Ref), Some(Cap::Val));
        assert_eq!(viewpoint(Cap::Iso, Cap::Ref), Some(Cap::Iso));
        assert_eq!(viewpoint(Cap::Iso, Cap::Trn), Some(Cap::Tag));
        assert_eq!(viewpoint(Cap::Tag, Cap::Val), None);
    }

    #[test]
    fn test_safe_to_write() {
        assert!(safe_to_write(Cap::Ref, Cap::Ref));
        assert!(safe_to_write(Cap::Iso, Cap::Val));
        assert!(!safe_to_write(Cap::Iso, Cap::Ref));
        assert!(safe_to_write(Cap::Trn, Cap::Trn));
        assert!(!safe_to_write(Cap::Trn, Cap::Box));
        assert!(!safe_to_write(Cap::Box, Cap::Ref));
        assert!(!safe_to_write(Cap::Val, Cap::Val));
        assert!(!safe_to_write(Cap::Tag, Cap::Tag));
    }

    #[test]
    fn test_sendable() {
        assert!(is_sendable(Cap::Iso));
        assert!(is_sendable(Cap::Val));
        assert!(is_sendable(Cap::Tag));
        assert!(is_sendable(Cap::Send));
        assert!(is_sendable(Cap::Share));
        assert!(!is_sendable(Cap::Ref));
        assert!(!is_sendable(Cap::Read));
    }
}
