//! Lexer for Maru source.
//!
//! Splits a registered source into a token vector with positions. The lexer
//! never aborts: malformed input produces a `LexErr` token plus a diagnostic
//! and scanning resumes at the next plausible character.

mod token;

pub use token::*;

use crate::interner::Interner;
use crate::reporter::{DiagnosticKind, Reporter};
use crate::source::{SourceId, SourceMap, Span};

pub struct Lexer<'a> {
    code: &'a [u8],
    source: SourceId,
    position: usize,
    line: usize,
    col: usize,
    /// Set when a newline has been consumed since the last emitted token.
    newline: bool,
    allow_test_symbols: bool,
    interner: &'a mut Interner,
    reporter: &'a mut Reporter,
}

impl<'a> Lexer<'a> {
    pub fn new(
        sources: &'a SourceMap,
        source: SourceId,
        interner: &'a mut Interner,
        reporter: &'a mut Reporter,
        allow_test_symbols: bool,
    ) -> Self {
        Self {
            code: sources.get(source).code.as_bytes(),
            source,
            position: 0,
            line: 1,
            col: 1,
            newline: true,
            allow_test_symbols,
            interner,
            reporter,
        }
    }

    pub fn lex(mut self) -> Vec<Token> {
        let mut tokens = vec![];

        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);

            if done {
                return tokens;
            }
        }
    }

    fn here(&self) -> Span {
        Span::new(self.source, self.line, self.col)
    }

    fn peek(&self) -> Option<u8> {
        self.code.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.code.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.position += 1;

        if c == b'\n' {
            self.line += 1;
            self.col = 1;
            self.newline = true;
        } else if c & 0xc0 != 0x80 {
            // Continuation bytes of a UTF-8 sequence share their column.
            self.col += 1;
        }

        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.skip_block_comment();
                }
                _ => return,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.here();
        self.advance();
        self.advance();
        let mut depth = 1usize;

        while depth > 0 {
            match (self.peek(), self.peek_at(1)) {
                (Some(b'/'), Some(b'*')) => {
                    self.advance();
                    self.advance();
                    depth += 1;
                }
                (Some(b'*'), Some(b'/')) => {
                    self.advance();
                    self.advance();
                    depth -= 1;
                }
                (Some(_), _) => {
                    self.advance();
                }
                (None, _) => {
                    self.reporter
                        .error(DiagnosticKind::Lex, start, "unterminated block comment");
                    return;
                }
            }
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let first_on_line = self.newline;
        let span = self.here();

        let Some(c) = self.peek() else {
            let mut token = Token::new(TokenKind::Eof, span);
            token.first_on_line = first_on_line;
            return token;
        };

        let mut token = match c {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => self.lex_name(span),
            b'0'..=b'9' => self.lex_number(span),
            b'"' => self.lex_string(span),
            b'#' => self.lex_cap_set(span),
            _ => self.lex_symbol(span, first_on_line),
        };

        token.first_on_line = first_on_line;
        self.newline = false;
        token
    }

    fn lex_name(&mut self, span: Span) -> Token {
        let start = self.position;

        if self.peek() == Some(b'$') {
            self.advance();
            if !self.allow_test_symbols {
                self.reporter.error(
                    DiagnosticKind::Lex,
                    span,
                    "test names starting with $ are not allowed outside test mode",
                );
                return Token::new(TokenKind::LexErr, span);
            }
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'\'' {
                self.advance();
            } else {
                break;
            }
        }

        let name = std::str::from_utf8(&self.code[start..self.position]).unwrap_or("");

        if let Some(kind) = KEYWORDS.get(name) {
            return Token::new(*kind, span);
        }

        let mut token = Token::new(TokenKind::Id, span);
        token.payload = Payload::Name(self.interner.intern(name));
        token
    }

    fn lex_cap_set(&mut self, span: Span) -> Token {
        let start = self.position;
        self.advance();

        while let Some(c) = self.peek() {
            if c.is_ascii_lowercase() {
                self.advance();
            } else {
                break;
            }
        }

        let name = std::str::from_utf8(&self.code[start..self.position]).unwrap_or("");

        match CAP_SETS.get(name) {
            Some(kind) => Token::new(*kind, span),
            None => {
                self.reporter.error(
                    DiagnosticKind::Lex,
                    span,
                    format!("unknown capability set '{name}'"),
                );
                Token::new(TokenKind::LexErr, span)
            }
        }
    }

    fn lex_number(&mut self, span: Span) -> Token {
        if self.peek() == Some(b'0') {
            match self.peek_at(1) {
                Some(b'x') | Some(b'X') => {
                    self.advance();
                    self.advance();
                    return self.lex_integer(span, 16);
                }
                Some(b'b') | Some(b'B') => {
                    self.advance();
                    self.advance();
                    return self.lex_integer(span, 2);
                }
                _ => {}
            }
        }

        // Decimal: may still turn out to be a float.
        let start = self.position;
        self.eat_digits();

        let is_float = match (self.peek(), self.peek_at(1)) {
            // A dot only makes a float when a digit follows, so that
            // `1.add(2)` stays a method call on an integer literal.
            (Some(b'.'), Some(d)) if d.is_ascii_digit() => true,
            (Some(b'e') | Some(b'E'), _) => true,
            _ => false,
        };

        if !is_float {
            let text = std::str::from_utf8(&self.code[start..self.position]).unwrap_or("");
            return self.integer_token(span, text, 10);
        }

        if self.peek() == Some(b'.') {
            self.advance();
            self.eat_digits();
        }

        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.advance();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            if !matches!(self.peek(), Some(d) if d.is_ascii_digit()) {
                self.reporter
                    .error(DiagnosticKind::Lex, span, "float exponent has no digits");
                return Token::new(TokenKind::LexErr, span);
            }
            self.eat_digits();
        }

        let text: String = std::str::from_utf8(&self.code[start..self.position])
            .unwrap_or("")
            .chars()
            .filter(|c| *c != '_')
            .collect();

        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => {
                let mut token = Token::new(TokenKind::Float, span);
                token.payload = Payload::Float(value);
                token
            }
            _ => {
                self.reporter
                    .error(DiagnosticKind::Lex, span, "float literal out of range");
                Token::new(TokenKind::LexErr, span)
            }
        }
    }

    fn eat_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn lex_integer(&mut self, span: Span, radix: u32) -> Token {
        let start = self.position;

        while let Some(c) = self.peek() {
            if (c as char).is_digit(radix) || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }

        if self.position == start {
            self.reporter
                .error(DiagnosticKind::Lex, span, "integer literal has no digits");
            return Token::new(TokenKind::LexErr, span);
        }

        let text = std::str::from_utf8(&self.code[start..self.position]).unwrap_or("");
        self.integer_token(span, text, radix)
    }

    /// Accumulate into 128 bits; overflow is a lexical error, not wrapping.
    fn integer_token(&mut self, span: Span, text: &str, radix: u32) -> Token {
        let mut value: i128 = 0;

        for c in text.chars() {
            if c == '_' {
                continue;
            }
            let digit = c.to_digit(radix).unwrap_or(0) as i128;

            value = match value
                .checked_mul(radix as i128)
                .and_then(|v| v.checked_add(digit))
            {
                Some(v) => v,
                None => {
                    self.reporter
                        .error(DiagnosticKind::Lex, span, "integer literal overflow");
                    return Token::new(TokenKind::LexErr, span);
                }
            };
        }

        let mut token = Token::new(TokenKind::Int, span);
        token.payload = Payload::Int(value);
        token
    }

    fn lex_string(&mut self, span: Span) -> Token {
        if self.peek_at(1) == Some(b'"') && self.peek_at(2) == Some(b'"') {
            return self.lex_triple_string(span);
        }

        self.advance();
        let mut value = String::new();

        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    self.reporter
                        .error(DiagnosticKind::Lex, span, "unterminated string literal");
                    return Token::new(TokenKind::LexErr, span);
                }
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    let escape_span = self.here();
                    self.advance();
                    match self.lex_escape() {
                        Some(c) => value.push(c),
                        None => {
                            self.reporter.error(
                                DiagnosticKind::Lex,
                                escape_span,
                                "invalid escape sequence",
                            );
                            return Token::new(TokenKind::LexErr, span);
                        }
                    }
                }
                Some(_) => {
                    let at = self.position;
                    self.advance();
                    while self.peek().is_some_and(|c| c & 0xc0 == 0x80) {
                        self.advance();
                    }
                    value.push_str(
                        std::str::from_utf8(&self.code[at..self.position]).unwrap_or(""),
                    );
                }
            }
        }

        let mut token = Token::new(TokenKind::String, span);
        token.payload = Payload::Name(self.interner.intern(&value));
        token
    }

    fn lex_escape(&mut self) -> Option<char> {
        let c = self.advance()?;

        match c {
            b'a' => Some('\x07'),
            b'b' => Some('\x08'),
            b'e' => Some('\x1b'),
            b'f' => Some('\x0c'),
            b'n' => Some('\n'),
            b'r' => Some('\r'),
            b't' => Some('\t'),
            b'v' => Some('\x0b'),
            b'0' => Some('\0'),
            b'"' => Some('"'),
            b'\'' => Some('\''),
            b'\\' => Some('\\'),
            b'x' => self.lex_hex_escape(2),
            b'u' => self.lex_hex_escape(4),
            b'U' => self.lex_hex_escape(6),
            _ => None,
        }
    }

    fn lex_hex_escape(&mut self, digits: usize) -> Option<char> {
        let mut value: u32 = 0;

        for _ in 0..digits {
            let c = self.advance()? as char;
            value = value.checked_mul(16)?.checked_add(c.to_digit(16)?)?;
        }

        char::from_u32(value)
    }

    /// Triple-quoted strings are raw: no escape processing, common leading
    /// whitespace stripped, boundary blank lines trimmed.
    fn lex_triple_string(&mut self, span: Span) -> Token {
        self.advance();
        self.advance();
        self.advance();

        let start = self.position;

        loop {
            match self.peek() {
                None => {
                    self.reporter
                        .error(DiagnosticKind::Lex, span, "unterminated string literal");
                    return Token::new(TokenKind::LexErr, span);
                }
                Some(b'"') if self.peek_at(1) == Some(b'"') && self.peek_at(2) == Some(b'"') => {
                    break;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }

        let raw = std::str::from_utf8(&self.code[start..self.position]).unwrap_or("");
        self.advance();
        self.advance();
        self.advance();

        let value = normalise_triple_string(raw);
        let mut token = Token::new(TokenKind::String, span);
        token.payload = Payload::Name(self.interner.intern(&value));
        token
    }

    fn lex_symbol(&mut self, span: Span, first_on_line: bool) -> Token {
        let c = self.advance().unwrap_or(0);

        let kind = match c {
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LSquare,
            b']' => TokenKind::RSquare,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semi,
            b'^' => TokenKind::Ephemeral,
            b'&' => TokenKind::Amp,
            b'|' => TokenKind::Pipe,
            b'@' => TokenKind::At,
            b'?' => TokenKind::Question,
            b'\\' => TokenKind::Backslash,
            b'+' => TokenKind::Plus,
            b'*' => TokenKind::Multiply,
            b'/' => TokenKind::Divide,
            b'%' => TokenKind::Rem,
            b'.' => {
                if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            b':' => TokenKind::Colon,
            b'-' => {
                if self.peek() == Some(b'>') {
                    self.advance();
                    TokenKind::Arrow
                } else if first_on_line {
                    TokenKind::MinusNew
                } else {
                    TokenKind::Minus
                }
            }
            b'=' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::Eq
                }
                Some(b'>') => {
                    self.advance();
                    TokenKind::DoubleArrow
                }
                _ => TokenKind::Assign,
            },
            b'!' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::Ne
                } else {
                    TokenKind::Aliased
                }
            }
            b'<' => match self.peek() {
                Some(b'<') => {
                    self.advance();
                    TokenKind::LShift
                }
                Some(b'=') => {
                    self.advance();
                    TokenKind::Le
                }
                Some(b':') => {
                    self.advance();
                    TokenKind::Subtype
                }
                _ => TokenKind::Lt,
            },
            b'>' => match self.peek() {
                Some(b'>') => {
                    self.advance();
                    TokenKind::RShift
                }
                Some(b'=') => {
                    self.advance();
                    TokenKind::Ge
                }
                _ => TokenKind::Gt,
            },
            _ => {
                self.reporter.error(
                    DiagnosticKind::Lex,
                    span,
                    format!("unexpected character '{}'", c as char),
                );
                return Token::new(TokenKind::LexErr, span);
            }
        };

        Token::new(kind, span)
    }
}

fn normalise_triple_string(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.split('\n').collect();

    // A newline straight after the opening quotes is presentation only.
    if lines.first().is_some_and(|l| l.trim().is_empty()) && lines.len() > 1 {
        lines.remove(0);
    }

    if lines.last().is_some_and(|l| !l.is_empty() && l.trim().is_empty()) {
        lines.pop();
    }

    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| if l.len() >= indent { &l[indent..] } else { "" })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;

    fn lex_all(input: &str) -> (Vec<Token>, Interner, Reporter) {
        let mut sources = SourceMap::new();
        let id = sources.add("test.maru", input);
        let mut interner = Interner::new();
        let mut reporter = Reporter::new();

        let tokens = Lexer::new(&sources, id, &mut interner, &mut reporter, true).lex();
        (tokens, interner, reporter)
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        let (tokens, _, reporter) = lex_all(input);
        assert!(!reporter.has_errors());
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_entity_header() {
        assert_eq!(
            kinds("actor Main"),
            vec![TokenKind::Actor, TokenKind::Id, TokenKind::Eof]
        );
    }

    #[test]
    fn test_lex_keywords_and_caps() {
        assert_eq!(
            kinds("fun ref box #read iso"),
            vec![
                TokenKind::Fun,
                TokenKind::Ref,
                TokenKind::Box,
                TokenKind::CapRead,
                TokenKind::Iso,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_int_radixes() {
        let (tokens, _, _) = lex_all("42 0xFF 0b1010 1_000");
        let values: Vec<i128> = tokens
            .iter()
            .filter_map(|t| t.int_value())
            .collect();
        assert_eq!(values, vec![42, 255, 10, 1000]);
    }

    #[test]
    fn test_lex_int_overflow() {
        let (tokens, _, reporter) = lex_all("0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF");
        assert!(reporter.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::LexErr);
    }

    #[test]
    fn test_lex_float_and_method_call_dot() {
        let (tokens, _, _) = lex_all("3.25 1.add 2e3");
        assert_eq!(tokens[0].float_value(), Some(3.25));
        assert_eq!(tokens[1].kind, TokenKind::Int);
        assert_eq!(tokens[2].kind, TokenKind::Dot);
        assert_eq!(tokens[3].kind, TokenKind::Id);
        assert_eq!(tokens[4].float_value(), Some(2000.0));
    }

    #[test]
    fn test_lex_minus_disambiguation() {
        let (tokens, _, _) = lex_all("a - b\n- c");
        assert_eq!(tokens[1].kind, TokenKind::Minus);
        assert_eq!(tokens[3].kind, TokenKind::MinusNew);
        assert!(tokens[3].first_on_line);
    }

    #[test]
    fn test_lex_string_escapes() {
        let (tokens, interner, _) = lex_all(r#""a\tb\x41B""#);
        let sym = tokens[0].name().unwrap();
        assert_eq!(interner.get(sym), "a\tbAB");
    }

    #[test]
    fn test_lex_triple_string_strips_indent() {
        let (tokens, interner, _) = lex_all("\"\"\"\n    first\n      second\n    \"\"\"");
        let sym = tokens[0].name().unwrap();
        assert_eq!(interner.get(sym), "first\n  second");
    }

    #[test]
    fn test_lex_nested_comments() {
        assert_eq!(
            kinds("a /* one /* two */ still */ b"),
            vec![TokenKind::Id, TokenKind::Id, TokenKind::Eof]
        );
    }

    #[test]
    fn test_lex_operators_greedy() {
        assert_eq!(
            kinds("<: <= << ... => ->"),
            vec![
                TokenKind::Subtype,
                TokenKind::Le,
                TokenKind::LShift,
                TokenKind::Ellipsis,
                TokenKind::DoubleArrow,
                TokenKind::Arrow,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lex_error_recovers() {
        let (tokens, _, reporter) = lex_all("a ` b");
        assert!(reporter.has_errors());
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Id,
                TokenKind::LexErr,
                TokenKind::Id,
                TokenKind::Eof
            ]
        );
    }
}
