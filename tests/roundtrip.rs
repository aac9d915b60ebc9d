//! Lexer and parser round-trips: printing what was read and reading it
//! again lands on the same tokens and the same tree.

use maru_lang::ast::pretty::Printer;
use maru_lang::ast::{Entity, PackageId};
use maru_lang::interner::Interner;
use maru_lang::lexer::{Lexer, Payload, Token, TokenKind};
use maru_lang::parser::Parser;
use maru_lang::session::Session;
use maru_lang::target::Target;

fn lex(source: &str, session: &mut Session) -> Vec<Token> {
    let src = session.sources.add("roundtrip.maru", source);
    let tokens = Lexer::new(
        &session.sources,
        src,
        &mut session.interner,
        &mut session.reporter,
        true,
    )
    .lex();
    assert!(!session.reporter.has_errors(), "lex errors in test input");
    tokens
}

fn parse(source: &str, session: &mut Session) -> Vec<Entity> {
    let src = session.sources.add("roundtrip.maru", source);
    let tokens = Lexer::new(
        &session.sources,
        src,
        &mut session.interner,
        &mut session.reporter,
        true,
    )
    .lex();
    let names = session.names;
    let parser = Parser::new(&tokens, PackageId(0), names, &mut session.reporter);
    let (_, entities) = parser.module(src);
    assert!(
        !session.reporter.has_errors(),
        "parse errors: {:?}",
        session
            .reporter
            .diagnostics()
            .map(|d| d.message.clone())
            .collect::<Vec<_>>()
    );
    entities
}

/// Render a token stream back to compilable text.
fn render(tokens: &[Token], interner: &Interner) -> String {
    let mut out = String::new();

    for token in tokens {
        if token.kind == TokenKind::Eof {
            break;
        }

        match (token.kind, token.payload) {
            (TokenKind::Id, Payload::Name(sym)) => out.push_str(interner.get(sym)),
            (TokenKind::Int, Payload::Int(value)) => out.push_str(&value.to_string()),
            (TokenKind::Float, Payload::Float(value)) => out.push_str(&format!("{value:?}")),
            (TokenKind::String, Payload::Name(sym)) => {
                out.push('"');
                for c in interner.get(sym).chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            (kind, _) => out.push_str(kind.describe()),
        }
        out.push(' ');
    }

    out
}

#[test]
fn test_lexer_roundtrip() {
    let source = "class \\packed\\ iso Wombat[A: Any #read] is Stringable \
                  var _count: U32 = 0x2A \
                  fun box scale(by: F64 = 1.5): F64 ? => error";

    let mut session = Session::new(Target::default()).with_test_symbols();
    let first = lex(source, &mut session);

    let rendered = render(&first, &session.interner);
    let second = lex(&rendered, &mut session);

    let strip = |tokens: &[Token]| -> Vec<(TokenKind, Payload)> {
        tokens.iter().map(|t| (t.kind, t.payload)).collect()
    };
    assert_eq!(strip(&first), strip(&second));
}

fn print_entities(entities: &[Entity], session: &Session) -> String {
    entities
        .iter()
        .map(|e| Printer::new(&session.interner).entity_to_string(e))
        .collect::<Vec<_>>()
        .join("\n")
}

fn assert_parser_roundtrip(source: &str) {
    let mut session = Session::new(Target::default()).with_test_symbols();

    let first = parse(source, &mut session);
    let printed = print_entities(&first, &session);

    let second = parse(&printed, &mut session);
    let reprinted = print_entities(&second, &session);

    assert_eq!(printed, reprinted, "printing is a fixpoint");

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.name, b.name);
        assert_eq!(a.type_params, b.type_params);
        assert_eq!(a.provides, b.provides);
        assert_eq!(a.fields, b.fields);
        assert_eq!(a.methods, b.methods, "methods differ for one entity");
    }
}

#[test]
fn test_parser_roundtrip_entities() {
    assert_parser_roundtrip(
        "trait box Frame\n  fun area(): U64\n\nclass \\packed\\ val Rect[A: Any val] is Frame\n  var w: U64 = 1\n  var h: U64 = 2\n  fun area(): U64 =>\n    w * h\n",
    );
}

#[test]
fn test_parser_roundtrip_expressions() {
    assert_parser_roundtrip(
        "primitive Go\n  fun f(x: U32, flag: Bool): U32 ? =>\n    let y: U32 = if flag then x + 1 else x end\n    while flag do\n      y\n    else\n      0\n    end\n    match (x, y)\n    | (1, 2) => 3\n    | (let a: U32, _) if flag => a\n    else\n      9\n    end\n    try\n      error\n    else\n      4\n    then\n      5\n    end\n",
    );
}

#[test]
fn test_parser_roundtrip_sugar_surface() {
    assert_parser_roundtrip(
        "primitive Go\n  fun f(items: Iterator[U32] ref): U32 =>\n    for (a, b) in items do\n      a\n    end\n    with r = items do\n      r\n    end\n    x as (U32, _)\n",
    );
}
