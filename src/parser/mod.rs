//! Recursive-descent parser for Maru.
//!
//! Grammar productions live in `entity`, `types` and `expr`; they all go
//! through the combinator primitives of [`combinators::ParseState`].
//! Syntax errors inside an entity are surfaced as the best attempt of the
//! failed production, then parsing resumes at the next entity keyword.

pub mod combinators;
mod entity;
mod expr;
mod types;

pub use combinators::{ParseError, ParseState};

use crate::ast::{Entity, Module, PackageId};
use crate::interner::Symbol;
use crate::lexer::{Token, TokenKind};
use crate::reporter::{DiagnosticKind, Reporter};
use crate::session::Names;
use crate::source::SourceId;

pub struct Parser<'a> {
    pub(crate) state: ParseState<'a>,
    pub(crate) reporter: &'a mut Reporter,
    pub(crate) names: Names,
    pub(crate) package: PackageId,
}

const ENTITY_KEYWORDS: [TokenKind; 7] = [
    TokenKind::Type,
    TokenKind::Interface,
    TokenKind::Trait,
    TokenKind::Primitive,
    TokenKind::Struct,
    TokenKind::Class,
    TokenKind::Actor,
];

impl<'a> Parser<'a> {
    pub fn new(
        tokens: &'a [Token],
        package: PackageId,
        names: Names,
        reporter: &'a mut Reporter,
    ) -> Self {
        Parser {
            state: ParseState::new(tokens),
            reporter,
            names,
            package,
        }
    }

    /// Parse one module: optional docstring, `use` directives, entities.
    pub fn module(mut self, source: SourceId) -> (Module, Vec<Entity>) {
        let mut module = Module::new(source);
        let mut entities = vec![];

        if self.state.at(TokenKind::String) {
            module.docstring = self.state.next().name();
        }

        while self.state.at(TokenKind::Use) {
            match self.use_directive() {
                Ok(use_) => module.uses.push(use_),
                Err(()) => {
                    self.surface_error();
                    self.recover_to_entity();
                }
            }
        }

        while !self.state.at(TokenKind::Eof) {
            if !self.state.at_any(&ENTITY_KEYWORDS) {
                self.state.record("expected a type declaration".into());
                self.surface_error();
                self.recover_to_entity();
                continue;
            }

            match self.entity() {
                Ok(entity) => entities.push(entity),
                Err(()) => {
                    self.surface_error();
                    self.recover_to_entity();
                }
            }
        }

        (module, entities)
    }

    /// Publish the deferred best-attempt error of a failed production.
    fn surface_error(&mut self) {
        if let Some(error) = self.state.best_error() {
            self.reporter
                .error(DiagnosticKind::Syntax, error.span, error.message.clone());
        }
        self.state.clear_best_error();
    }

    fn recover_to_entity(&mut self) {
        loop {
            if self.state.at(TokenKind::Eof) || self.state.at_any(&ENTITY_KEYWORDS) {
                return;
            }
            self.state.next();
        }
    }

    /// `\name, name\` after a keyword.
    pub(crate) fn annotations(&mut self) -> Result<Vec<Symbol>, ()> {
        let mut out = vec![];

        if self.state.accept(TokenKind::Backslash).is_none() {
            return Ok(out);
        }

        loop {
            let id = self.state.token("an annotation name", &[TokenKind::Id])?;
            if let Some(name) = id.name() {
                out.push(name);
            }

            if self.state.accept(TokenKind::Comma).is_none() {
                break;
            }
        }

        self.state
            .skip("a closing backslash", &[TokenKind::Backslash])?;
        Ok(out)
    }

    /// An optional concrete capability token.
    pub(crate) fn opt_cap(&mut self) -> Option<crate::ast::Cap> {
        let cap = match self.state.peek_kind() {
            TokenKind::Iso => crate::ast::Cap::Iso,
            TokenKind::Trn => crate::ast::Cap::Trn,
            TokenKind::Ref => crate::ast::Cap::Ref,
            TokenKind::Val => crate::ast::Cap::Val,
            TokenKind::Box => crate::ast::Cap::Box,
            TokenKind::Tag => crate::ast::Cap::Tag,
            _ => return None,
        };
        self.state.next();
        Some(cap)
    }

    /// An optional capability, including the generic `#cap` sets.
    pub(crate) fn opt_cap_or_set(&mut self) -> Option<crate::ast::Cap> {
        if let Some(cap) = self.opt_cap() {
            return Some(cap);
        }

        let cap = match self.state.peek_kind() {
            TokenKind::CapRead => crate::ast::Cap::Read,
            TokenKind::CapSend => crate::ast::Cap::Send,
            TokenKind::CapShare => crate::ast::Cap::Share,
            TokenKind::CapAny => crate::ast::Cap::Any,
            _ => return None,
        };
        self.state.next();
        Some(cap)
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::lexer::Lexer;
    use crate::session::Session;
    use crate::target::Target;

    /// Lex and parse a single module in test mode, panicking on errors.
    pub fn parse_source(input: &str) -> (Session, Module, Vec<Entity>) {
        let mut session = Session::new(Target::default()).with_test_symbols();
        let source = session.sources.add("test.maru", input);

        let tokens = Lexer::new(
            &session.sources,
            source,
            &mut session.interner,
            &mut session.reporter,
            true,
        )
        .lex();
        assert!(!session.reporter.has_errors(), "lex errors in test input");

        let names = session.names;
        let parser = Parser::new(&tokens, PackageId(0), names, &mut session.reporter);
        let (module, entities) = parser.module(source);

        (session, module, entities)
    }

    /// Parse, expecting at least one syntax error.
    pub fn parse_source_error(input: &str) -> Vec<String> {
        let mut session = Session::new(Target::default()).with_test_symbols();
        let source = session.sources.add("test.maru", input);

        let tokens = Lexer::new(
            &session.sources,
            source,
            &mut session.interner,
            &mut session.reporter,
            true,
        )
        .lex();

        let names = session.names;
        let parser = Parser::new(&tokens, PackageId(0), names, &mut session.reporter);
        let _ = parser.module(source);

        session
            .reporter
            .diagnostics()
            .map(|d| d.message.clone())
            .collect()
    }
}
