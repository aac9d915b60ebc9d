//! The canonicalising rewrites, observed through the compiled tree.

mod common;

use common::{assert_error, compile_ok, MAIN_STUB};
use maru_lang::ast::{Cap, Entity, ExprKind, Method, MethodKind, Program};
use maru_lang::session::Session;

fn find_entity<'a>(session: &Session, program: &'a Program, name: &str) -> &'a Entity {
    program
        .entities
        .iter()
        .find(|e| session.interner.get(e.name) == name)
        .unwrap_or_else(|| panic!("no entity '{name}'"))
}

fn find_method<'a>(session: &Session, entity: &'a Entity, name: &str) -> &'a Method {
    entity
        .methods
        .iter()
        .find(|m| session.interner.get(m.name) == name)
        .unwrap_or_else(|| panic!("no method '{name}'"))
}

#[test]
fn test_operators_become_method_calls() {
    let source = format!(
        "primitive Go\n  fun f(a: U32, b: U32): U32 =>\n    a + b\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    let go = find_entity(&session, &compiled.program, "Go");
    let f = find_method(&session, go, "f");
    let body = f.body.as_ref().expect("body");

    let ExprKind::Seq(exprs) = &body.kind else {
        panic!("body is a sequence");
    };
    let ExprKind::Call(call) = &exprs[0].kind else {
        panic!("operator became a call, got {:?}", exprs[0].kind);
    };
    let ExprKind::Dot { member, .. } = &call.receiver.kind else {
        panic!("call goes through a dot");
    };
    assert_eq!(session.interner.get(*member), "add");
}

#[test]
fn test_for_loop_becomes_iterator_while() {
    let source = format!(
        "class Iter\n  new create() =>\n    true\n  fun ref has_next(): Bool =>\n    false\n  fun ref next(): U32 ? =>\n    error\nprimitive Go\n  fun f(): None =>\n    for x in Iter do\n      None\n    end\n{MAIN_STUB}"
    );
    let (_, compiled) = compile_ok(&source);

    // The loop is gone; a while over has_next/next replaced it.
    let mut saw_while = false;
    let mut saw_for = false;
    for entity in &compiled.program.entities {
        for method in &entity.methods {
            if let Some(body) = &method.body {
                body.walk(&mut |expr| match expr.kind {
                    ExprKind::While(_) => saw_while = true,
                    ExprKind::For(_) => saw_for = true,
                    _ => {}
                });
            }
        }
    }
    assert!(saw_while);
    assert!(!saw_for);
}

#[test]
fn test_with_block_disposes_on_both_paths() {
    let source = format!(
        "class Res\n  new create() =>\n    true\n  fun dispose(): None =>\n    None\nprimitive Go\n  fun f(): None =>\n    with r = Res do\n      None\n    end\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    let go = find_entity(&session, &compiled.program, "Go");
    let f = find_method(&session, go, "f");
    let body = f.body.as_ref().expect("body");

    let mut dispose_calls = 0;
    body.walk(&mut |expr| {
        if let ExprKind::Call(call) = &expr.kind {
            if let ExprKind::Dot { member, .. } = &call.receiver.kind {
                if session.interner.get(*member) == "dispose" {
                    dispose_calls += 1;
                }
            }
        }
    });

    // Once on the failure path, once on the way out.
    assert_eq!(dispose_calls, 2);
}

#[test]
fn test_update_sugar() {
    let source = format!(
        "class Board\n  new create() =>\n    true\n  fun ref update(i: U32, value: U32): None =>\n    None\nprimitive Go\n  fun f(b: Board ref): None =>\n    b(1) = 2\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    let go = find_entity(&session, &compiled.program, "Go");
    let f = find_method(&session, go, "f");
    let body = f.body.as_ref().expect("body");

    let mut saw_update = false;
    body.walk(&mut |expr| {
        if let ExprKind::Call(call) = &expr.kind {
            if let ExprKind::Dot { member, .. } = &call.receiver.kind {
                if session.interner.get(*member) == "update" {
                    saw_update = true;
                    assert_eq!(call.named.len(), 1, "value passed as a named argument");
                }
            }
        }
    });
    assert!(saw_update);
}

#[test]
fn test_as_becomes_match_with_consume() {
    let source = format!(
        "primitive P1\nprimitive P2\nprimitive Go\n  fun f(x: (P1 | P2)): P1 ? =>\n    x as P1\n{MAIN_STUB}"
    );
    let (_, compiled) = compile_ok(&source);

    let mut saw_match = false;
    for entity in &compiled.program.entities {
        for method in &entity.methods {
            if let Some(body) = &method.body {
                body.walk(&mut |expr| {
                    if let ExprKind::Match(node) = &expr.kind {
                        if node
                            .else_body
                            .as_ref()
                            .is_some_and(|e| {
                                let ExprKind::Seq(exprs) = &e.kind else {
                                    return false;
                                };
                                matches!(exprs[0].kind, ExprKind::ErrorExpr)
                            })
                        {
                            saw_match = true;
                        }
                    }
                });
            }
        }
    }
    assert!(saw_match, "as was rewritten into a match that errors");
}

#[test]
fn test_as_all_dontcare_tuple_is_rejected() {
    let source = format!(
        "primitive P1\nprimitive Go\n  fun f(x: (P1, P1)): None ? =>\n    x as (_, _)\n    None\n{MAIN_STUB}"
    );
    assert_error(&source, "don't care");
}

#[test]
fn test_default_constructor_added() {
    let source = format!("class Quiet\n{MAIN_STUB}");
    let (session, compiled) = compile_ok(&source);

    let quiet = find_entity(&session, &compiled.program, "Quiet");
    let create = find_method(&session, quiet, "create");
    assert_eq!(create.kind, MethodKind::Constructor);
    assert_eq!(create.cap, Some(Cap::Iso));
}

#[test]
fn test_primitive_gets_identity_equality() {
    let source = format!("primitive Quiet\n{MAIN_STUB}");
    let (session, compiled) = compile_ok(&source);

    let quiet = find_entity(&session, &compiled.program, "Quiet");
    let eq = find_method(&session, quiet, "eq");
    let body = eq.body.as_ref().expect("eq has a body");

    let mut saw_is = false;
    body.walk(&mut |expr| {
        if matches!(
            expr.kind,
            ExprKind::Binop {
                op: maru_lang::ast::BinOp::Is,
                ..
            }
        ) {
            saw_is = true;
        }
    });
    assert!(saw_is, "primitive eq compares identity");
}

#[test]
fn test_fun_defaults_to_box_and_none() {
    let source = format!("primitive Go\n  fun f() =>\n    true\n{MAIN_STUB}");
    let (session, compiled) = compile_ok(&source);

    let go = find_entity(&session, &compiled.program, "Go");
    let f = find_method(&session, go, "f");
    assert_eq!(f.cap, Some(Cap::Box));

    let ret = f.ret.as_ref().expect("result type filled in");
    let maru_lang::ast::Type::Nominal(n) = ret else {
        panic!("nominal result");
    };
    assert_eq!(session.interner.get(n.name), "None");

    // The body grew a trailing None so the value lines up.
    let body = f.body.as_ref().expect("body");
    let ExprKind::Seq(exprs) = &body.kind else {
        panic!("body is a sequence");
    };
    assert!(matches!(&exprs.last().unwrap().kind, ExprKind::Reference { .. }));
}

#[test]
fn test_case_methods_merge_into_match() {
    let source = format!(
        "primitive Fib\n  fun fib(0): U64 =>\n    0\n  fun fib(1): U64 =>\n    1\n  fun fib(n: U64): U64 =>\n    fib(n - 1) + fib(n - 2)\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    let fib = find_entity(&session, &compiled.program, "Fib");
    let applies: Vec<_> = fib
        .methods
        .iter()
        .filter(|m| session.interner.get(m.name) == "fib")
        .collect();
    assert_eq!(applies.len(), 1, "the cases merged into one method");

    let body = applies[0].body.as_ref().expect("body");
    let mut saw_match = false;
    body.walk(&mut |expr| {
        if let ExprKind::Match(node) = &expr.kind {
            assert_eq!(node.cases.len(), 3);
            saw_match = true;
        }
    });
    assert!(saw_match);
}

#[test]
fn test_lambda_becomes_anonymous_entity() {
    let source = format!(
        "primitive Go\n  fun f(): U32 =>\n    let double = {{(x: U32): U32 => x * 2 }}\n    double(21)\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    // An anonymous entity with an apply method exists now.
    let anonymous = compiled.program.entities.iter().find(|e| {
        session.interner.get(e.name).starts_with("$Object")
            && e.methods
                .iter()
                .any(|m| session.interner.get(m.name) == "apply")
    });
    assert!(anonymous.is_some(), "lambda hoisted to an anonymous entity");
}

#[test]
fn test_object_literal_with_behaviour_is_actor() {
    let source = format!(
        "primitive Go\n  fun f(): None =>\n    let o = object\n      be poke() =>\n        None\n    end\n    None\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    let anonymous = compiled
        .program
        .entities
        .iter()
        .find(|e| session.interner.get(e.name).starts_with("$Object"))
        .expect("anonymous entity");
    assert_eq!(anonymous.kind, maru_lang::ast::EntityKind::Actor);
}

#[test]
fn test_loc_expands_to_position_object() {
    let source = format!(
        "primitive Go\n  fun f(): None =>\n    let here = __loc\n    None\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    let anonymous = compiled
        .program
        .entities
        .iter()
        .find(|e| session.interner.get(e.name).starts_with("$Object"))
        .expect("anonymous entity");

    for accessor in ["file", "method", "line", "pos"] {
        assert!(
            anonymous
                .methods
                .iter()
                .any(|m| session.interner.get(m.name) == accessor),
            "__loc object has {accessor}"
        );
    }
}

#[test]
fn test_docstring_moves_out_of_body() {
    let source = format!(
        "primitive Go\n  fun f(): U32 =>\n    \"adds nothing\"\n    1\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    let go = find_entity(&session, &compiled.program, "Go");
    let f = find_method(&session, go, "f");
    assert_eq!(
        f.docstring.map(|d| session.interner.get(d).to_string()),
        Some("adds nothing".to_string())
    );
}

#[test]
fn test_return_in_constructor_returns_this() {
    let source = "class C\n  new create(early: Bool) =>\n    if early then\n      return\n    end\n    true\nactor Main\n  new create(env: Env) =>\n    None\n";
    let (session, compiled) = compile_ok(source);

    let c = find_entity(&session, &compiled.program, "C");
    let create = find_method(&session, c, "create");
    let body = create.body.as_ref().expect("body");

    let mut saw_return_this = false;
    body.walk(&mut |expr| {
        if let ExprKind::Return(Some(value)) = &expr.kind {
            if matches!(value.kind, ExprKind::This) {
                saw_return_this = true;
            }
        }
    });
    assert!(saw_return_this);
}
