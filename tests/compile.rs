//! Whole-program scenarios: one compile per behaviour the front-end
//! guarantees.

mod common;

use common::{assert_error, compile_ok, compile_source, MAIN_STUB};
use maru_lang::ast::{EntityKind, ExprKind, MethodKind};

#[test]
fn test_minimal_program_compiles() {
    let (_, compiled) = compile_ok(MAIN_STUB);
    assert_eq!(compiled.signature.len(), 32);
}

#[test]
fn test_missing_main_fails_verify() {
    assert_error(
        "class Foo\n",
        "the Main actor must have a create constructor",
    );
}

#[test]
fn test_main_shape_is_checked() {
    assert_error(
        "actor Main\n  new create(env: Env, extra: U32) =>\n    None\n",
        "single Env parameter",
    );
}

#[test]
fn test_trait_body_inheritance() {
    let source = format!(
        "trait T\n  fun ref bar(): U32 =>\n    1\nclass C is T\n  new create() =>\n    true\n{MAIN_STUB}"
    );
    let (session, compiled) = compile_ok(&source);

    let c = compiled
        .program
        .entities
        .iter()
        .find(|e| session.interner.get(e.name) == "C")
        .expect("C exists");
    assert_eq!(c.kind, EntityKind::Class);

    let bar_name = session.interner.find("bar").expect("bar interned");
    let (_, bar) = c.find_method(bar_name).expect("C has bar");

    assert!(bar.inherited_from.is_some(), "bar was inherited");
    assert_eq!(bar.kind, MethodKind::Function);

    let body = bar.body.as_ref().expect("bar has a body");
    let ExprKind::Seq(exprs) = &body.kind else {
        panic!("body is a sequence");
    };
    assert!(matches!(exprs[0].kind, ExprKind::IntLit(1)));
}

#[test]
fn test_capability_denial_on_val_write() {
    let source = "class X\n  var y: U32 = 0\nactor Main\n  new create(env: Env) =>\n    let x: X val = X\n    x.y = 1\n";
    assert_error(source, "cannot write through val");
}

#[test]
fn test_exhaustive_union_match_needs_no_else() {
    let source = format!(
        "primitive P1\nprimitive P2\nprimitive Go\n  fun f(x: (P1 | P2)): U8 =>\n    match x\n    | P1 => 0\n    | P2 => 1\n    end\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_non_exhaustive_match_requires_else() {
    let source = format!(
        "primitive P1\nprimitive P2\nprimitive Go\n  fun f(x: (P1 | P2)): U8 =>\n    match x\n    | P1 => 0\n    end\n{MAIN_STUB}"
    );
    assert_error(&source, "match is not exhaustive");
}

#[test]
fn test_auto_recover_wraps_fresh_constructor() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    let a: A iso = A\n";
    let (session, compiled) = compile_ok(source);

    // The right-hand side is now an implicit recover block.
    let main = compiled
        .program
        .entities
        .iter()
        .find(|e| session.interner.get(e.name) == "Main")
        .expect("Main exists");
    let create = &main.methods[0];
    let body = create.body.as_ref().expect("body");

    let mut saw_recover = false;
    body.walk(&mut |expr| {
        if matches!(expr.kind, ExprKind::Recover { .. }) {
            saw_recover = true;
        }
    });
    assert!(saw_recover, "the constructor call was wrapped in a recover");
}

#[test]
fn test_auto_recover_rejected_for_unsendable_args() {
    let source = "class B\n  new create() =>\n    true\nclass A\n  var b: B ref\n  new create(b': B ref) =>\n    b = b'\nactor Main\n  new create(env: Env) =>\n    let b: B ref = B\n    let a: A iso = A.create(b)\n";
    assert_error(source, "expected");
}

#[test]
fn test_signature_is_produced_and_stable() {
    let (_, first) = compile_ok(MAIN_STUB);
    let (_, second) = compile_ok(MAIN_STUB);
    assert_eq!(first.signature, second.signature);
}

#[test]
fn test_use_imports_package_types() {
    let lib = "class val Point\n  new val create() =>\n    true\n";
    let main = "use \"geo\"\nactor Main\n  new create(env: Env) =>\n    let p: Point val = Point\n";

    let (session, result) = common::compile_with(
        maru_lang::target::Target::default(),
        &[("main", main), ("geo", lib)],
    );
    assert!(
        !session.reporter.has_errors(),
        "{}",
        session.reporter.render_all(&session.sources)
    );
    result.expect("compiles");
}

#[test]
fn test_use_alias_qualifies_types() {
    let lib = "class val Point\n  new val create() =>\n    true\n";
    let main = "use g = \"geo\"\nactor Main\n  new create(env: Env) =>\n    let p: g.Point val = g.Point\n";

    let (session, result) = common::compile_with(
        maru_lang::target::Target::default(),
        &[("main", main), ("geo", lib)],
    );
    assert!(
        !session.reporter.has_errors(),
        "{}",
        session.reporter.render_all(&session.sources)
    );
    result.expect("compiles");
}

#[test]
fn test_use_guard_skips_import() {
    // The windows-guarded import never loads on the default linux target,
    // so the type is unknown.
    let lib = "class val Point\n  new val create() =>\n    true\n";
    let main = "use \"geo\" if windows\nactor Main\n  new create(env: Env) =>\n    let p: Point val = Point\n";

    let (session, _) = common::compile_with(
        maru_lang::target::Target::default(),
        &[("main", main), ("geo", lib)],
    );
    assert!(session
        .reporter
        .diagnostics()
        .any(|d| d.message.contains("can't find declaration of 'Point'")
            || d.message.contains("Point")));
}

#[test]
fn test_private_types_stay_private() {
    let lib = "class val _Secret\n  new val create() =>\n    true\n";
    let main = "use \"geo\"\nactor Main\n  new create(env: Env) =>\n    let s: _Secret val = _Secret\n";

    let (session, _) = common::compile_with(
        maru_lang::target::Target::default(),
        &[("main", main), ("geo", lib)],
    );
    assert!(session.reporter.has_errors());
}

#[test]
fn test_did_you_mean_suggestion() {
    let source = "actor Main\n  new create(env: Env) =>\n    let x: U32 = 1\n    let y: U32 = X\n";
    assert_error(source, "did you mean 'x'?");
}

#[test]
fn test_provides_cycle_is_rejected() {
    let source = format!("trait A is B\ntrait B is A\n{MAIN_STUB}");
    assert_error(&source, "provides cycle");
}

#[test]
fn test_provides_must_be_abstract() {
    let source = format!("class C\ntrait T is C\n{MAIN_STUB}");
    assert_error(&source, "may only contain traits and interfaces");
}

#[test]
fn test_concrete_entity_must_implement_trait() {
    let source = format!("trait T\n  fun go(): U32\nclass C is T\n{MAIN_STUB}");
    assert_error(&source, "no implementation of 'go'");
}

#[test]
fn test_ffi_needs_exactly_one_live_declaration() {
    let source = "use @puts[I32](s: String box)\nuse @puts[I32](s: String box) if linux\nactor Main\n  new create(env: Env) =>\n    @puts(\"hi\")\n";
    assert_error(source, "multiple declarations of '@puts'");

    let source = "actor Main\n  new create(env: Env) =>\n    @puts(\"hi\")\n";
    assert_error(source, "no declaration of '@puts'");
}

#[test]
fn test_ffi_call_with_declaration_compiles() {
    let source = "use @puts[I32](s: String box)\nactor Main\n  new create(env: Env) =>\n    @puts(\"hi\")\n    None\n";
    let (session, result) = compile_source(source);
    assert!(
        !session.reporter.has_errors(),
        "{}",
        session.reporter.render_all(&session.sources)
    );
    result.expect("compiles");
}

#[test]
fn test_primitive_init_shape_is_checked() {
    let source = format!(
        "primitive P\n  fun ref _init(): None =>\n    None\n{MAIN_STUB}"
    );
    assert_error(&source, "'_init' must be a box fun");
}

#[test]
fn test_reserved_abi_names_are_rejected() {
    let source = format!("class C\n  fun _serialise(): None =>\n    None\n{MAIN_STUB}");
    assert_error(&source, "reserved by the runtime");
}

#[test]
fn test_compile_intrinsic_outside_builtin() {
    let source = format!("class C\n  fun go(): U32 =>\n    compile_intrinsic\n{MAIN_STUB}");
    assert_error(&source, "reserved for the builtin package");
}

#[test]
fn test_iftype_picks_branch_statically() {
    let source = format!(
        "primitive Go\n  fun f(): U32 =>\n    iftype U32 <: (U32 | U64) then 1 else 2 end\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_literal_without_antecedent_fails() {
    let source = "actor Main\n  new create(env: Env) =>\n    let x = 1\n";
    assert_error(source, "could not infer the type of this literal");
}
