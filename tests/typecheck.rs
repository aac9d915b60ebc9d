//! Capability and inference behaviour across whole programs.

mod common;

use common::{assert_error, compile_ok, MAIN_STUB};

#[test]
fn test_arithmetic_on_numerics() {
    let source = format!(
        "primitive Go\n  fun f(): U32 =>\n    (1 + 2) * 3\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_wrong_return_type() {
    let source = format!(
        "primitive Go\n  fun f(): Bool =>\n    \"nope\"\n{MAIN_STUB}"
    );
    assert_error(&source, "expected Bool");
}

#[test]
fn test_if_arms_union_into_result() {
    let source = format!(
        "primitive Go\n  fun f(x: Bool): (U32 | Bool) =>\n    if x then 1 else false end\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_condition_must_be_bool() {
    let source = format!(
        "primitive Go\n  fun f(): U32 =>\n    if \"yes\" then 1 else 2 end\n{MAIN_STUB}"
    );
    assert_error(&source, "expected Bool");
}

#[test]
fn test_box_receiver_cannot_call_ref_method() {
    let source = format!(
        "class C\n  var n: U32 = 0\n  fun ref bump(): U32 =>\n    n = n + 1\n  fun peek(): U32 =>\n    bump()\n{MAIN_STUB}"
    );
    assert_error(&source, "box receiver cannot call a ref method");
}

#[test]
fn test_tag_cannot_read_fields() {
    let source = "class C\n  var n: U32 = 0\nactor Main\n  new create(env: Env) =>\n    let c: C tag = C\n    let n: U32 = c.n\n";
    assert_error(source, "cannot read a field through tag");
}

#[test]
fn test_viewpoint_adaptation_through_box() {
    // Reading a ref field through a box receiver yields box, which cannot
    // satisfy a ref binding.
    let source = "class Inner\n  new create() =>\n    true\nclass C\n  var inner: Inner ref\n  new create() =>\n    inner = Inner\n  fun read(): Inner ref =>\n    inner\nactor Main\n  new create(env: Env) =>\n    None\n";
    assert_error(source, "expected Inner ref");
}

#[test]
fn test_consume_makes_value_ephemeral() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    let a: A iso = A\n    let b: A iso = consume a\n";
    compile_ok(source);
}

#[test]
fn test_iso_alias_is_tag() {
    // Without a consume, an iso local only aliases as tag.
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    let a: A iso = A\n    let b: A iso = a\n";
    assert_error(source, "expected A iso");
}

#[test]
fn test_use_after_consume_is_rejected() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    let a: A iso = A\n    let b: A iso = consume a\n    let c: A tag = a\n";
    assert_error(source, "cannot be used after it is consumed");
}

#[test]
fn test_use_before_definition_is_rejected() {
    let source = "actor Main\n  new create(env: Env) =>\n    let x: U32\n    let y: U32 = x\n";
    assert_error(source, "used before a value is assigned");
}

#[test]
fn test_let_reassignment_is_rejected() {
    let source = "actor Main\n  new create(env: Env) =>\n    let x: U32 = 1\n    x = 2\n";
    assert_error(source, "cannot reassign the let local 'x'");
}

#[test]
fn test_constructor_must_initialise_fields() {
    let source = format!(
        "class C\n  var n: U32\n  new create() =>\n    true\n{MAIN_STUB}"
    );
    assert_error(&source, "not initialised by this constructor");
}

#[test]
fn test_branch_initialisation_must_cover_all_paths() {
    let source = format!(
        "class C\n  var n: U32\n  new create(flag: Bool) =>\n    if flag then\n      n = 1\n    end\n{MAIN_STUB}"
    );
    assert_error(&source, "not initialised by this constructor");
}

#[test]
fn test_branch_initialisation_on_both_paths_is_fine() {
    let source = format!(
        "class C\n  var n: U32\n  new create(flag: Bool) =>\n    if flag then\n      n = 1\n    else\n      n = 2\n    end\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_consumed_in_try_is_poisoned_in_else() {
    let source = "class A\n  new create() =>\n    true\nprimitive Go\n  fun f(): A iso^ ? =>\n    let a: A iso = A\n    try\n      let b: A iso = consume a\n      consume b\n    else\n      consume a\n    end\nactor Main\n  new create(env: Env) =>\n    None\n";
    assert_error(source, "may have been consumed in the failed try body");
}

#[test]
fn test_loop_carried_consume_is_rejected() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    var a: A iso = A\n    var go: Bool = true\n    while go do\n      let b: A iso = consume a\n      go = false\n    end\n";
    assert_error(source, "cannot be used after it is consumed");
}

#[test]
fn test_consume_before_break_is_forbidden_after_while() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    var a: A iso = A\n    var go: Bool = true\n    while go do\n      let b: A iso = consume a\n      break\n    end\n    let c: A tag = a\n";
    assert_error(source, "cannot be used after it is consumed");
}

#[test]
fn test_consume_before_break_is_forbidden_after_repeat() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    var a: A iso = A\n    var go: Bool = true\n    repeat\n      let b: A iso = consume a\n      break\n    until go end\n    let c: A tag = a\n";
    assert_error(source, "cannot be used after it is consumed");
}

#[test]
fn test_reassignment_before_break_is_fine() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    var a: A iso = A\n    var go: Bool = true\n    while go do\n      let b: A iso = consume a\n      a = A\n      break\n    end\n    let c: A tag = a\n";
    compile_ok(source);
}

#[test]
fn test_loop_with_reassignment_is_fine() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    var a: A iso = A\n    var go: Bool = true\n    while go do\n      let b: A iso = consume a\n      a = A\n      go = false\n    end\n";
    compile_ok(source);
}

#[test]
fn test_recover_promotes_to_iso() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    let a: A iso = recover iso A end\n";
    compile_ok(source);
}

#[test]
fn test_recover_rejects_unsendable_capture() {
    let source = "class A\n  new create() =>\n    true\nactor Main\n  new create(env: Env) =>\n    let outer: A ref = A\n    let a: A iso = recover iso outer end\n";
    assert_error(source, "cannot access non-sendable 'outer'");
}

#[test]
fn test_partial_call_needs_try_or_partial_method() {
    let source = format!(
        "primitive Go\n  fun may(): U32 ? =>\n    error\n  fun f(): U32 =>\n    may()?\n{MAIN_STUB}"
    );
    assert_error(&source, "enclose it in a try");
}

#[test]
fn test_partial_call_inside_try_is_fine() {
    let source = format!(
        "primitive Go\n  fun may(): U32 ? =>\n    error\n  fun f(): U32 =>\n    try may()? else 0 end\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_match_deny_on_capability_violation() {
    // A val scrutinee can never be matched into a ref capture.
    let source = format!(
        "class C\n  new create() =>\n    true\nprimitive Go\n  fun f(x: C val): Bool =>\n    match x\n    | let c: C ref => true\n    else\n      false\n    end\n{MAIN_STUB}"
    );
    assert_error(&source, "capability of the matched value prevents");
}

#[test]
fn test_match_reject_on_disjoint_types() {
    let source = format!(
        "primitive P1\nprimitive P2\nprimitive Go\n  fun f(x: P1): Bool =>\n    match x\n    | let p: P2 val => true\n    else\n      false\n    end\n{MAIN_STUB}"
    );
    assert_error(&source, "can never match");
}

#[test]
fn test_guarded_case_does_not_count_for_exhaustiveness() {
    let source = format!(
        "primitive P1\nprimitive P2\nprimitive Go\n  fun f(x: (P1 | P2), g: Bool): U8 =>\n    match x\n    | P1 => 0\n    | P2 if g => 1\n    end\n{MAIN_STUB}"
    );
    assert_error(&source, "match is not exhaustive");
}

#[test]
fn test_capture_match_is_exhaustive() {
    let source = format!(
        "primitive P1\nprimitive P2\nprimitive Go\n  fun f(x: (P1 | P2)): U8 =>\n    match x\n    | let p: (P1 val | P2 val) => 0\n    end\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_tuple_match_patterns() {
    let source = format!(
        "primitive P1\nprimitive P2\nprimitive Go\n  fun f(x: (P1, P2)): U8 =>\n    match x\n    | (P1, P2) => 0\n    end\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_interface_is_structural() {
    let source = format!(
        "interface box HasSize\n  fun size(): USize\nprimitive Go\n  fun f(s: String val): USize =>\n    let h: HasSize box = s\n    h.size()\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_trait_is_nominal_only() {
    let source = format!(
        "trait box Sized\n  fun size(): USize\nclass C\n  new create() =>\n    true\n  fun size(): USize =>\n    0\nprimitive Go\n  fun f(c: C box): Sized box =>\n    c\n{MAIN_STUB}"
    );
    assert_error(&source, "expected Sized box");
}

#[test]
fn test_generic_class_reifies_members() {
    let source = "class Cell[A: Any val]\n  var value: A\n  new create(value': A) =>\n    value = value'\n  fun get(): A =>\n    value\nactor Main\n  new create(env: Env) =>\n    let c: Cell[U32] ref = Cell[U32].create(7)\n    let n: U32 = c.get()\n";
    compile_ok(source);
}

#[test]
fn test_type_alias_expands_in_subtyping() {
    let source = format!(
        "primitive P1\nprimitive P2\ntype Either is (P1 | P2)\nprimitive Go\n  fun f(x: P1): Either =>\n    x\n{MAIN_STUB}"
    );
    compile_ok(&source);
}

#[test]
fn test_repeat_condition_sees_body_locals() {
    let source = format!(
        "primitive Go\n  fun f(): U32 =>\n    repeat\n      let done: Bool = true\n    until done end\n    9\n{MAIN_STUB}"
    );
    compile_ok(&source);
}
