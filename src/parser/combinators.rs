//! Primitive parsing combinators over a token vector.
//!
//! Every grammar production is built from these: consume a token from a
//! kind set, try alternatives with index save/restore, repeat while a
//! lookahead matches. Failed alternatives record their error into a single
//! best-attempt frame (the furthest-advanced position wins) which is only
//! surfaced if no alternative succeeds.

use crate::lexer::{Token, TokenKind};
use crate::source::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

pub struct ParseState<'a> {
    tokens: &'a [Token],
    index: usize,
    best: Option<(usize, ParseError)>,
}

impl<'a> ParseState<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        ParseState {
            tokens,
            index: 0,
            best: None,
        }
    }

    /// The current token. The lexer guarantees a trailing `Eof`, so peeking
    /// is total.
    pub fn peek(&self) -> Token {
        self.tokens
            .get(self.index)
            .copied()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, Span::default()))
    }

    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub fn peek_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.index + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    pub fn next(&mut self) -> Token {
        let token = self.peek();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    pub fn get_index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// TOKEN: consume one token out of `kinds`, or record a deferred error
    /// describing what was being parsed.
    pub fn token(&mut self, desc: &str, kinds: &[TokenKind]) -> Result<Token, ()> {
        let current = self.peek();

        if kinds.contains(&current.kind) {
            self.index += 1;
            return Ok(current);
        }

        self.record(format!(
            "expected {desc}, found '{}'",
            current.kind.describe()
        ));
        Err(())
    }

    /// SKIP: like [`ParseState::token`] but the token itself is discarded.
    pub fn skip(&mut self, desc: &str, kinds: &[TokenKind]) -> Result<(), ()> {
        self.token(desc, kinds).map(|_| ())
    }

    /// OPT: consume a token of the given kind when it is next.
    pub fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek_kind() == kind {
            Some(self.next())
        } else {
            None
        }
    }

    /// IF: lookahead check without consuming.
    pub fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub fn at_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek_kind())
    }

    /// RULE: try `f`; on failure rewind to where it started.
    pub fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ()>) -> Option<T> {
        let saved = self.index;
        match f(self) {
            Ok(value) => Some(value),
            Err(()) => {
                self.index = saved;
                None
            }
        }
    }

    /// Record a deferred error at the current position. Only the furthest
    /// frame is retained; ties keep the earlier message.
    pub fn record(&mut self, message: String) {
        let span = self.peek().span;

        match &self.best {
            Some((best_index, _)) if *best_index >= self.index => {}
            _ => {
                self.best = Some((
                    self.index,
                    ParseError {
                        message,
                        span,
                    },
                ));
            }
        }
    }

    /// The best error frame recorded so far, for surfacing after all
    /// alternatives failed.
    pub fn best_error(&self) -> Option<&ParseError> {
        self.best.as_ref().map(|(_, e)| e)
    }

    pub fn clear_best_error(&mut self) {
        self.best = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(kinds: &[TokenKind]) -> Vec<Token> {
        let mut out: Vec<Token> = kinds
            .iter()
            .map(|k| Token::new(*k, Span::default()))
            .collect();
        out.push(Token::new(TokenKind::Eof, Span::default()));
        out
    }

    #[test]
    fn test_token_and_skip() {
        let toks = tokens(&[TokenKind::Class, TokenKind::Id]);
        let mut state = ParseState::new(&toks);

        assert!(state.skip("a class", &[TokenKind::Class]).is_ok());
        assert!(state.token("a name", &[TokenKind::Id]).is_ok());
        assert_eq!(state.peek_kind(), TokenKind::Eof);
    }

    #[test]
    fn test_attempt_rewinds() {
        let toks = tokens(&[TokenKind::Class, TokenKind::Id]);
        let mut state = ParseState::new(&toks);

        let failed: Option<()> = state.attempt(|s| {
            s.skip("a class", &[TokenKind::Class])?;
            s.skip("an actor", &[TokenKind::Actor])?;
            Ok(())
        });

        assert_eq!(failed, None);
        assert_eq!(state.get_index(), 0);
    }

    #[test]
    fn test_best_error_keeps_furthest() {
        let toks = tokens(&[TokenKind::Class, TokenKind::Id]);
        let mut state = ParseState::new(&toks);

        state.record("shallow".into());
        state.next();
        state.record("deep".into());
        state.set_index(0);
        state.record("shallow again".into());

        assert_eq!(state.best_error().unwrap().message, "deep");
    }
}
