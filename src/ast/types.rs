use std::fmt;

use crate::ast::EntityId;
use crate::interner::Symbol;
use crate::source::Span;

/// Reference capabilities. The first six are concrete instantiation caps;
/// the rest are the generic cap sets usable on type parameters and
/// interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Cap {
    Iso,
    Trn,
    Ref,
    Val,
    Box,
    Tag,
    Read,
    Send,
    Share,
    Any,
}

impl Cap {
    pub fn is_concrete(&self) -> bool {
        matches!(
            self,
            Cap::Iso | Cap::Trn | Cap::Ref | Cap::Val | Cap::Box | Cap::Tag
        )
    }

    /// The concrete caps a generic cap set stands for.
    pub fn members(&self) -> &'static [Cap] {
        match self {
            Cap::Read => &[Cap::Ref, Cap::Val, Cap::Box],
            Cap::Send => &[Cap::Iso, Cap::Val, Cap::Tag],
            Cap::Share => &[Cap::Val, Cap::Tag],
            Cap::Any => &[Cap::Iso, Cap::Trn, Cap::Ref, Cap::Val, Cap::Box, Cap::Tag],
            Cap::Iso => &[Cap::Iso],
            Cap::Trn => &[Cap::Trn],
            Cap::Ref => &[Cap::Ref],
            Cap::Val => &[Cap::Val],
            Cap::Box => &[Cap::Box],
            Cap::Tag => &[Cap::Tag],
        }
    }
}

impl fmt::Display for Cap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cap::Iso => "iso",
            Cap::Trn => "trn",
            Cap::Ref => "ref",
            Cap::Val => "val",
            Cap::Box => "box",
            Cap::Tag => "tag",
            Cap::Read => "#read",
            Cap::Send => "#send",
            Cap::Share => "#share",
            Cap::Any => "#any",
        };
        f.write_str(name)
    }
}

/// Alias state of a type: `^` marks a value with no other alias, `!` a
/// borrowed alias introduced while matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Eph {
    #[default]
    None,
    Ephemeral,
    Borrowed,
}

impl fmt::Display for Eph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eph::None => Ok(()),
            Eph::Ephemeral => f.write_str("^"),
            Eph::Borrowed => f.write_str("!"),
        }
    }
}

/// A named type. `entity` is the resolved definition, filled in by the name
/// pass; until then only `package`/`name` are meaningful.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Nominal {
    pub package: Option<Symbol>,
    pub name: Symbol,
    pub args: Vec<Type>,
    pub cap: Option<Cap>,
    pub eph: Eph,
    pub entity: Option<EntityId>,
    pub span: Span,
}

impl Nominal {
    pub fn new(name: Symbol, span: Span) -> Self {
        Nominal {
            package: None,
            name,
            args: vec![],
            cap: None,
            eph: Eph::None,
            entity: None,
            span,
        }
    }
}

/// Types are tree-shaped values mutated in place by the passes; unions and
/// intersections are kept flattened and deduplicated.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Type {
    Nominal(Nominal),
    Union(Vec<Type>),
    Isect(Vec<Type>),
    Tuple(Vec<Type>),
    /// Viewpoint adaptation `left -> right`.
    Arrow { left: Box<Type>, right: Box<Type> },
    /// `this` used as a viewpoint origin.
    This { span: Span },
    TypeParamRef {
        name: Symbol,
        cap: Option<Cap>,
        eph: Eph,
        /// (is method-level, index), filled by the name pass.
        def: Option<(bool, usize)>,
        span: Span,
    },
    Fun {
        cap: Cap,
        params: Vec<Type>,
        ret: Box<Type>,
        partial: bool,
        span: Span,
    },
    DontCare { span: Span },
}

impl Type {
    pub fn span(&self) -> Span {
        match self {
            Type::Nominal(n) => n.span,
            Type::Union(types) | Type::Isect(types) | Type::Tuple(types) => {
                types.first().map(|t| t.span()).unwrap_or_default()
            }
            Type::Arrow { left, .. } => left.span(),
            Type::This { span }
            | Type::TypeParamRef { span, .. }
            | Type::Fun { span, .. }
            | Type::DontCare { span } => *span,
        }
    }

    /// Build a union, flattening nested unions and dropping duplicates. A
    /// one-element union is its element.
    pub fn union(types: Vec<Type>) -> Type {
        let mut flat: Vec<Type> = vec![];

        for ty in types {
            match ty {
                Type::Union(inner) => {
                    for t in inner {
                        if !flat.contains(&t) {
                            flat.push(t);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }

        if flat.len() == 1 {
            flat.pop().unwrap_or(Type::DontCare {
                span: Span::default(),
            })
        } else {
            Type::Union(flat)
        }
    }

    /// Build an intersection with the same normalisation as [`Type::union`].
    pub fn isect(types: Vec<Type>) -> Type {
        let mut flat: Vec<Type> = vec![];

        for ty in types {
            match ty {
                Type::Isect(inner) => {
                    for t in inner {
                        if !flat.contains(&t) {
                            flat.push(t);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }

        if flat.len() == 1 {
            flat.pop().unwrap_or(Type::DontCare {
                span: Span::default(),
            })
        } else {
            Type::Isect(flat)
        }
    }

    /// The members of this type viewed as a union.
    pub fn union_members(&self) -> Vec<&Type> {
        match self {
            Type::Union(types) => types.iter().collect(),
            other => vec![other],
        }
    }

    /// The cap on the outermost layer, if this type shape carries one.
    pub fn cap(&self) -> Option<Cap> {
        match self {
            Type::Nominal(n) => n.cap,
            Type::TypeParamRef { cap, .. } => *cap,
            Type::Fun { cap, .. } => Some(*cap),
            _ => None,
        }
    }

    pub fn eph(&self) -> Eph {
        match self {
            Type::Nominal(n) => n.eph,
            Type::TypeParamRef { eph, .. } => *eph,
            _ => Eph::None,
        }
    }

    pub fn with_cap(mut self, new_cap: Cap, new_eph: Eph) -> Type {
        match &mut self {
            Type::Nominal(n) => {
                n.cap = Some(new_cap);
                n.eph = new_eph;
            }
            Type::TypeParamRef { cap, eph, .. } => {
                *cap = Some(new_cap);
                *eph = new_eph;
            }
            Type::Union(types) | Type::Isect(types) | Type::Tuple(types) => {
                let taken = std::mem::take(types);
                *types = taken
                    .into_iter()
                    .map(|t| t.with_cap(new_cap, new_eph))
                    .collect();
            }
            _ => {}
        }
        self
    }

    pub fn with_eph(mut self, new_eph: Eph) -> Type {
        match &mut self {
            Type::Nominal(n) => n.eph = new_eph,
            Type::TypeParamRef { eph, .. } => *eph = new_eph,
            Type::Union(types) | Type::Isect(types) | Type::Tuple(types) => {
                let taken = std::mem::take(types);
                *types = taken.into_iter().map(|t| t.with_eph(new_eph)).collect();
            }
            _ => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal(name: u32) -> Type {
        // Symbols are opaque; tests fabricate them through transmute-free
        // indices by interning in order.
        let mut interner = crate::interner::Interner::new();
        let mut sym = interner.intern("A0");
        for i in 1..=name {
            sym = interner.intern(&format!("A{i}"));
        }
        Type::Nominal(Nominal::new(sym, Span::default()))
    }

    #[test]
    fn test_union_flattens_and_dedupes() {
        let a = nominal(0);
        let b = nominal(1);

        let u = Type::union(vec![
            a.clone(),
            Type::Union(vec![b.clone(), a.clone()]),
            b.clone(),
        ]);

        match u {
            Type::Union(types) => assert_eq!(types, vec![a, b]),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn test_singleton_union_collapses() {
        let a = nominal(0);
        assert_eq!(Type::union(vec![a.clone(), a.clone()]), a);
    }

    #[test]
    fn test_cap_set_members() {
        assert_eq!(Cap::Share.members(), &[Cap::Val, Cap::Tag]);
        assert!(Cap::Any.members().contains(&Cap::Trn));
        assert!(!Cap::Read.is_concrete());
        assert!(Cap::Iso.is_concrete());
    }
}
