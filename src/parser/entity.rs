//! Entity, member and `use` directive grammar.

use crate::ast::types::Type;
use crate::ast::{
    Entity, EntityKind, FfiDecl, Field, FieldKind, Method, MethodKind, Param, Use, UseScheme,
};
use crate::lexer::TokenKind;

use super::Parser;

impl<'a> Parser<'a> {
    /// `use [alias =] "path" [if guard]` or `use @name[Ret](params) ?`.
    pub(crate) fn use_directive(&mut self) -> Result<Use, ()> {
        let open = self.state.peek();
        self.state.skip("'use'", &[TokenKind::Use])?;

        let mut alias = None;
        if self.state.at(TokenKind::Id) && self.state.peek_at(1) == TokenKind::Assign {
            alias = self.state.next().name();
            self.state.next();
        }

        let scheme = if self.state.accept(TokenKind::At).is_some() {
            self.ffi_decl(open.span)?
        } else {
            let path = self
                .state
                .token("a package path string", &[TokenKind::String])?;
            UseScheme::Package {
                path: path.name().ok_or(())?,
                package: None,
            }
        };

        let guard = if self.state.accept(TokenKind::If).is_some() {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Use {
            alias,
            scheme,
            guard,
            span: open.span,
        })
    }

    fn ffi_decl(&mut self, span: crate::source::Span) -> Result<UseScheme, ()> {
        let name = self
            .state
            .token("an FFI name", &[TokenKind::Id, TokenKind::String])?;

        let mut args = self.opt_type_args()?;
        if args.len() != 1 {
            self.state
                .record("an FFI declaration needs exactly one return type".into());
            return Err(());
        }
        let ret = args.pop().expect("just checked");

        self.state.skip("a parameter list", &[TokenKind::LParen])?;
        let (params, variadic) = self.ffi_params()?;
        self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;

        let partial = self.state.accept(TokenKind::Question).is_some();

        Ok(UseScheme::Ffi(FfiDecl {
            name: name.name().ok_or(())?,
            ret,
            params,
            variadic,
            partial,
            span,
        }))
    }

    fn ffi_params(&mut self) -> Result<(Vec<Param>, bool), ()> {
        let mut params = vec![];
        let mut variadic = false;

        while !self.state.at(TokenKind::RParen) {
            if self.state.accept(TokenKind::Ellipsis).is_some() {
                variadic = true;
                break;
            }

            let id = self.state.token("a parameter name", &[TokenKind::Id])?;
            self.state.skip("':'", &[TokenKind::Colon])?;
            let ty = self.type_expr()?;

            params.push(Param {
                name: id.name().ok_or(())?,
                ty,
                default: None,
                pattern: None,
                span: id.span,
            });

            if self.state.accept(TokenKind::Comma).is_none() {
                break;
            }
        }

        Ok((params, variadic))
    }

    /// One entity declaration, `type` aliases included.
    pub(crate) fn entity(&mut self) -> Result<Entity, ()> {
        let open = self.state.next();

        let kind = match open.kind {
            TokenKind::Type => EntityKind::Alias,
            TokenKind::Interface => EntityKind::Interface,
            TokenKind::Trait => EntityKind::Trait,
            TokenKind::Primitive => EntityKind::Primitive,
            TokenKind::Struct => EntityKind::Struct,
            TokenKind::Class => EntityKind::Class,
            TokenKind::Actor => EntityKind::Actor,
            _ => {
                self.state.record("expected a type declaration".into());
                return Err(());
            }
        };

        let annotations = self.annotations()?;
        let default_cap = self.opt_cap();

        let id = self.state.token("a type name", &[TokenKind::Id])?;
        let mut entity = Entity::new(kind, id.name().ok_or(())?, self.package, open.span);
        entity.annotations = annotations;
        entity.default_cap = default_cap;
        entity.type_params = self.opt_type_params()?;

        if kind == EntityKind::Alias {
            self.state.skip("'is'", &[TokenKind::Is])?;
            entity.alias_of = Some(self.type_expr()?);

            if self.state.at(TokenKind::String) {
                entity.docstring = self.state.next().name();
            }
            return Ok(entity);
        }

        if self.state.accept(TokenKind::Is).is_some() {
            entity.provides = self.provides_list()?;
        }

        if self.state.at(TokenKind::String) {
            entity.docstring = self.state.next().name();
        }

        let (fields, methods) = self.members(&[
            TokenKind::Eof,
            TokenKind::Use,
            TokenKind::Type,
            TokenKind::Interface,
            TokenKind::Trait,
            TokenKind::Primitive,
            TokenKind::Struct,
            TokenKind::Class,
            TokenKind::Actor,
        ])?;

        entity.fields = fields;
        entity.methods = methods;
        Ok(entity)
    }

    /// A provides list is one type in source form; unions are allowed
    /// syntactically and rejected later, so keep the list flat here.
    pub(crate) fn provides_list(&mut self) -> Result<Vec<Type>, ()> {
        let ty = self.type_expr()?;

        Ok(match ty {
            Type::Isect(types) => types,
            other => vec![other],
        })
    }

    /// Fields, then methods, until a terminator token.
    pub(crate) fn members(
        &mut self,
        terminators: &[TokenKind],
    ) -> Result<(Vec<Field>, Vec<Method>), ()> {
        let mut fields = vec![];
        let mut methods = vec![];

        while self.state.at_any(&[TokenKind::Var, TokenKind::Let, TokenKind::Embed]) {
            fields.push(self.field()?);
        }

        loop {
            if self.state.at_any(terminators) {
                break;
            }

            if self
                .state
                .at_any(&[TokenKind::New, TokenKind::Be, TokenKind::Fun])
            {
                methods.push(self.method()?);
                continue;
            }

            if self.state.at_any(&[TokenKind::Var, TokenKind::Let, TokenKind::Embed]) {
                self.state
                    .record("fields must come before methods".into());
                return Err(());
            }

            self.state.record("expected a member".into());
            return Err(());
        }

        Ok((fields, methods))
    }

    fn field(&mut self) -> Result<Field, ()> {
        let open = self.state.next();

        let kind = match open.kind {
            TokenKind::Var => FieldKind::Var,
            TokenKind::Let => FieldKind::Let,
            _ => FieldKind::Embed,
        };

        let id = self.state.token("a field name", &[TokenKind::Id])?;
        self.state.skip("a field type", &[TokenKind::Colon])?;
        let ty = self.type_expr()?;

        let init = if self.state.accept(TokenKind::Assign).is_some() {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Field {
            kind,
            name: id.name().ok_or(())?,
            ty,
            init,
            span: open.span,
        })
    }

    /// `new|be|fun [annotations] [cap] name [typeparams] (params) [: T] [?]
    /// [if guard] [docstring] [=> body]`.
    fn method(&mut self) -> Result<Method, ()> {
        let open = self.state.next();

        let kind = match open.kind {
            TokenKind::New => MethodKind::Constructor,
            TokenKind::Be => MethodKind::Behaviour,
            _ => MethodKind::Function,
        };

        let annotations = self.annotations()?;
        let cap = self.opt_cap();

        let id = self.state.token("a method name", &[TokenKind::Id])?;
        let mut method = Method::new(kind, id.name().ok_or(())?, open.span);
        method.annotations = annotations;
        method.cap = cap;
        method.type_params = self.opt_type_params()?;

        self.state.skip("a parameter list", &[TokenKind::LParen])?;
        method.params = self.params(TokenKind::RParen)?;
        self.state.skip("a closing parenthesis", &[TokenKind::RParen])?;

        if self.state.accept(TokenKind::Colon).is_some() {
            method.ret = Some(self.type_expr()?);
        }

        method.partial = self.state.accept(TokenKind::Question).is_some();

        if self.state.accept(TokenKind::If).is_some() {
            method.guard = Some(self.rawseq()?);
        }

        if self.state.at(TokenKind::String) {
            method.docstring = self.state.next().name();
        }

        if self.state.accept(TokenKind::DoubleArrow).is_some() {
            method.body = Some(self.rawseq()?);
        }

        Ok(method)
    }

    /// Parameters; a value in place of `name: Type` is a case-method
    /// pattern.
    pub(crate) fn params(&mut self, end: TokenKind) -> Result<Vec<Param>, ()> {
        let mut params = vec![];

        while !self.state.at(end) {
            let span = self.state.peek().span;

            let is_plain = self.state.at(TokenKind::Id)
                && matches!(
                    self.state.peek_at(1),
                    TokenKind::Colon | TokenKind::Assign | TokenKind::Comma
                )
                || (self.state.at(TokenKind::Id) && self.state.peek_at(1) == end);

            if is_plain {
                let id = self.state.next();

                let ty = if self.state.accept(TokenKind::Colon).is_some() {
                    self.type_expr()?
                } else {
                    Type::DontCare { span }
                };

                let default = if self.state.accept(TokenKind::Assign).is_some() {
                    Some(self.expr()?)
                } else {
                    None
                };

                params.push(Param {
                    name: id.name().ok_or(())?,
                    ty,
                    default,
                    pattern: None,
                    span,
                });
            } else {
                // A case-method pattern; the merged wrapper gives it a name.
                let pattern = self.expr()?;
                params.push(Param {
                    name: self.names.underscore,
                    ty: Type::DontCare { span },
                    default: None,
                    pattern: Some(pattern),
                    span,
                });
            }

            if self.state.accept(TokenKind::Comma).is_none() {
                break;
            }
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::{parse_source, parse_source_error};

    #[test]
    fn test_parse_entity_kinds() {
        let (_, _, entities) = parse_source(
            "trait T\ninterface I\nprimitive P\nstruct S\nclass C\nactor A\ntype Alias is (C | A)",
        );

        let kinds: Vec<_> = entities.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntityKind::Trait,
                EntityKind::Interface,
                EntityKind::Primitive,
                EntityKind::Struct,
                EntityKind::Class,
                EntityKind::Actor,
                EntityKind::Alias,
            ]
        );
        assert!(entities[6].alias_of.is_some());
    }

    #[test]
    fn test_parse_entity_with_cap_provides_docstring() {
        let (session, _, entities) = parse_source(
            "class \\packed\\ iso Wombat[A: Any] is (Stringable & Comparable)\n  \"\"\"docs\"\"\"\n  var x: A",
        );

        let entity = &entities[0];
        assert_eq!(entity.default_cap, Some(crate::ast::Cap::Iso));
        assert_eq!(entity.provides.len(), 2);
        assert_eq!(entity.type_params.len(), 1);
        assert_eq!(entity.fields.len(), 1);
        assert_eq!(
            session.interner.get(entity.annotations[0]),
            "packed"
        );
        assert_eq!(
            session.interner.get(entity.docstring.expect("docstring")),
            "docs"
        );
    }

    #[test]
    fn test_parse_method_shapes() {
        let (_, _, entities) = parse_source(
            "actor Main\n  new create(env: Env) =>\n    None\n  be go() =>\n    None\n  fun ref work[A](x: U32 = 1): U32 ? =>\n    x",
        );

        let methods = &entities[0].methods;
        assert_eq!(methods[0].kind, MethodKind::Constructor);
        assert_eq!(methods[1].kind, MethodKind::Behaviour);

        let work = &methods[2];
        assert_eq!(work.kind, MethodKind::Function);
        assert_eq!(work.cap, Some(crate::ast::Cap::Ref));
        assert_eq!(work.type_params.len(), 1);
        assert!(work.partial);
        assert!(work.params[0].default.is_some());
    }

    #[test]
    fn test_parse_case_method_patterns() {
        let (_, _, entities) = parse_source(
            "primitive Fib\n  fun apply(0): U64 => 0\n  fun apply(1): U64 => 1\n  fun apply(n: U64): U64 => Fib(n - 1) + Fib(n - 2)",
        );

        let methods = &entities[0].methods;
        assert_eq!(methods.len(), 3);
        assert!(methods[0].params[0].pattern.is_some());
        assert!(methods[2].params[0].pattern.is_none());
    }

    #[test]
    fn test_parse_field_after_method_rejected() {
        let errors =
            parse_source_error("class C\n  fun go() =>\n    1\n  var x: U32");
        assert!(errors.iter().any(|e| e.contains("fields must come before methods")));
    }

    #[test]
    fn test_parse_use_forms() {
        let (session, module, _) = parse_source(
            "use \"collections\"\nuse alias = \"net\" if linux\nuse @printf[I32](fmt: Pointer[U8] tag, ...) ?\nclass C",
        );

        assert_eq!(module.uses.len(), 3);
        assert!(module.uses[0].alias.is_none());
        assert!(module.uses[1].alias.is_some());
        assert!(module.uses[1].guard.is_some());

        match &module.uses[2].scheme {
            UseScheme::Ffi(decl) => {
                assert_eq!(session.interner.get(decl.name), "printf");
                assert!(decl.variadic);
                assert!(decl.partial);
            }
            other => panic!("expected ffi decl, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_module_docstring() {
        let (session, module, _) = parse_source("\"\"\"module docs\"\"\"\nclass C");
        assert_eq!(
            session.interner.get(module.docstring.expect("docstring")),
            "module docs"
        );
    }

    #[test]
    fn test_parse_error_recovers_at_next_entity() {
        let (_, _, entities) = {
            let source = "class C\n  fun go() =>\n    1 +\nactor Main\n  new create(env: Env) =>\n    None";
            let mut session = crate::session::Session::new(crate::target::Target::default());
            let src = session.sources.add("test.maru", source);
            let tokens = crate::lexer::Lexer::new(
                &session.sources,
                src,
                &mut session.interner,
                &mut session.reporter,
                false,
            )
            .lex();
            let names = session.names;
            let parser = super::super::Parser::new(
                &tokens,
                crate::ast::PackageId(0),
                names,
                &mut session.reporter,
            );
            let (module, entities) = parser.module(src);
            assert!(session.reporter.has_errors());
            (session, module, entities)
        };

        assert_eq!(entities.len(), 1, "parsing resumed at the next entity");
    }
}
