//! Type expression grammar.

use crate::ast::types::{Cap, Eph, Nominal, Type};
use crate::ast::TypeParam;
use crate::lexer::TokenKind;

use super::Parser;

impl<'a> Parser<'a> {
    /// A full type: viewpoint arrows bind tightest, then a uniform chain of
    /// `|` or `&`. Mixing the two without parentheses is rejected.
    pub(crate) fn type_expr(&mut self) -> Result<Type, ()> {
        let first = self.viewpoint_type()?;

        match self.state.peek_kind() {
            TokenKind::Pipe => {
                let mut types = vec![first];
                while self.state.accept(TokenKind::Pipe).is_some() {
                    types.push(self.viewpoint_type()?);
                }
                if self.state.at(TokenKind::Amp) {
                    self.state
                        .record("mixing '|' and '&' requires parentheses".into());
                    return Err(());
                }
                Ok(Type::union(types))
            }
            TokenKind::Amp => {
                let mut types = vec![first];
                while self.state.accept(TokenKind::Amp).is_some() {
                    types.push(self.viewpoint_type()?);
                }
                if self.state.at(TokenKind::Pipe) {
                    self.state
                        .record("mixing '&' and '|' requires parentheses".into());
                    return Err(());
                }
                Ok(Type::isect(types))
            }
            _ => Ok(first),
        }
    }

    /// `origin -> type`, right associative.
    fn viewpoint_type(&mut self) -> Result<Type, ()> {
        let left = self.atom_type()?;

        if self.state.accept(TokenKind::Arrow).is_some() {
            let right = self.viewpoint_type()?;
            return Ok(Type::Arrow {
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    fn atom_type(&mut self) -> Result<Type, ()> {
        let token = self.state.peek();

        match token.kind {
            TokenKind::This => {
                self.state.next();
                Ok(Type::This { span: token.span })
            }
            TokenKind::LParen => self.tuple_type(),
            TokenKind::LBrace => self.fun_type(),
            TokenKind::Id => self.nominal_type(),
            _ => {
                self.state.record("expected a type".into());
                Err(())
            }
        }
    }

    /// `(T)` is grouping; `(T, U)` is a tuple.
    fn tuple_type(&mut self) -> Result<Type, ()> {
        self.state.skip("an opening parenthesis", &[TokenKind::LParen])?;

        let mut types = vec![self.type_expr()?];
        while self.state.accept(TokenKind::Comma).is_some() {
            types.push(self.type_expr()?);
        }

        self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;

        if types.len() == 1 {
            Ok(types.pop().expect("just checked"))
        } else {
            Ok(Type::Tuple(types))
        }
    }

    /// `[pkg.] Name [typeargs] [cap] [^|!]`. A lone `_` is the don't-care
    /// type.
    fn nominal_type(&mut self) -> Result<Type, ()> {
        let first = self.state.token("a type name", &[TokenKind::Id])?;
        let Some(mut name) = first.name() else {
            return Err(());
        };

        if name == self.names.underscore {
            return Ok(Type::DontCare { span: first.span });
        }

        let mut package = None;
        if self.state.accept(TokenKind::Dot).is_some() {
            let second = self.state.token("a type name", &[TokenKind::Id])?;
            package = Some(name);
            name = second.name().ok_or(())?;
        }

        let mut nominal = Nominal::new(name, first.span);
        nominal.package = package;
        nominal.args = self.opt_type_args()?;
        nominal.cap = self.opt_cap_or_set();
        nominal.eph = self.opt_eph();

        Ok(Type::Nominal(nominal))
    }

    pub(crate) fn opt_eph(&mut self) -> Eph {
        if self.state.accept(TokenKind::Ephemeral).is_some() {
            Eph::Ephemeral
        } else if self.state.accept(TokenKind::Aliased).is_some() {
            Eph::Borrowed
        } else {
            Eph::None
        }
    }

    /// `[T, U]`, empty when absent.
    pub(crate) fn opt_type_args(&mut self) -> Result<Vec<Type>, ()> {
        if !self.state.at(TokenKind::LSquare) {
            return Ok(vec![]);
        }
        self.state.next();

        let mut args = vec![self.type_expr()?];
        while self.state.accept(TokenKind::Comma).is_some() {
            args.push(self.type_expr()?);
        }

        self.state.skip("a closing bracket", &[TokenKind::RSquare])?;
        Ok(args)
    }

    /// `{cap (T, U): R ?} cap ^` function type.
    fn fun_type(&mut self) -> Result<Type, ()> {
        let open = self.state.peek();
        self.state.skip("an opening brace", &[TokenKind::LBrace])?;

        // Receiver cap of the underlying apply; the object cap after the
        // braces is the one subtyping works with.
        let _ = self.opt_cap();

        self.state.skip("a parameter list", &[TokenKind::LParen])?;
        let mut params = vec![];
        if !self.state.at(TokenKind::RParen) {
            params.push(self.type_expr()?);
            while self.state.accept(TokenKind::Comma).is_some() {
                params.push(self.type_expr()?);
            }
        }
        self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;

        let ret = if self.state.accept(TokenKind::Colon).is_some() {
            self.type_expr()?
        } else {
            Type::Nominal(Nominal::new(self.names.none_type, open.span))
        };

        let partial = self.state.accept(TokenKind::Question).is_some();
        self.state.skip("a closing brace", &[TokenKind::RBrace])?;

        // The object cap of the function value, after the braces.
        let cap = self.opt_cap_or_set().unwrap_or(Cap::Box);
        let _ = self.opt_eph();

        Ok(Type::Fun {
            cap,
            params,
            ret: Box::new(ret),
            partial,
            span: open.span,
        })
    }

    /// `[Name [: constraint] [= default], …]`.
    pub(crate) fn opt_type_params(&mut self) -> Result<Vec<TypeParam>, ()> {
        if !self.state.at(TokenKind::LSquare) {
            return Ok(vec![]);
        }
        self.state.next();

        let mut params = vec![];
        loop {
            let id = self.state.token("a type parameter name", &[TokenKind::Id])?;
            let name = id.name().ok_or(())?;

            let constraint = if self.state.accept(TokenKind::Colon).is_some() {
                Some(self.type_expr()?)
            } else {
                None
            };

            let default = if self.state.accept(TokenKind::Assign).is_some() {
                Some(self.type_expr()?)
            } else {
                None
            };

            params.push(TypeParam {
                name,
                constraint,
                default,
                span: id.span,
            });

            if self.state.accept(TokenKind::Comma).is_none() {
                break;
            }
        }

        self.state.skip("a closing bracket", &[TokenKind::RSquare])?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::types::{Cap, Eph, Type};
    use crate::ast::EntityKind;
    use crate::parser::test_helpers::parse_source;

    fn field_type(input: &str) -> (crate::session::Session, Type) {
        let source = format!("class Foo\n  var x: {input}");
        let (session, _, entities) = parse_source(&source);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, EntityKind::Class);
        let ty = entities[0].fields[0].ty.clone();
        (session, ty)
    }

    #[test]
    fn test_parse_nominal_with_cap_and_eph() {
        let (session, ty) = field_type("String val^");
        match ty {
            Type::Nominal(n) => {
                assert_eq!(session.interner.get(n.name), "String");
                assert_eq!(n.cap, Some(Cap::Val));
                assert_eq!(n.eph, Eph::Ephemeral);
            }
            other => panic!("expected nominal, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_union_flattens(){
        let (_, ty) = field_type("(A | B | A)");
        match ty {
            Type::Union(types) => assert_eq!(types.len(), 2),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tuple_and_viewpoint() {
        let (_, ty) = field_type("(A, this->B)");
        match ty {
            Type::Tuple(types) => {
                assert_eq!(types.len(), 2);
                assert!(matches!(types[1], Type::Arrow { .. }));
            }
            other => panic!("expected tuple, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_generic_nominal() {
        let (session, ty) = field_type("Wombat[A, (B | C)] ref");
        match ty {
            Type::Nominal(n) => {
                assert_eq!(session.interner.get(n.name), "Wombat");
                assert_eq!(n.args.len(), 2);
                assert_eq!(n.cap, Some(Cap::Ref));
            }
            other => panic!("expected nominal, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fun_type() {
        let (_, ty) = field_type("{(A, B): C ?} val");
        match ty {
            Type::Fun {
                cap,
                params,
                partial,
                ..
            } => {
                assert_eq!(cap, Cap::Val);
                assert_eq!(params.len(), 2);
                assert!(partial);
            }
            other => panic!("expected fun type, got {other:?}"),
        }
    }
}
