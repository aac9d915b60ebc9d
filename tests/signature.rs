//! Signature stability: equal programs hash equal, semantic changes flip
//! the hash, cosmetic changes do not.

mod common;

use common::{compile_ok, MAIN_STUB};
use maru_lang::signature::to_hex;

#[test]
fn test_identical_programs_share_a_signature() {
    let source = format!("class C\n  var n: U32 = 0\n{MAIN_STUB}");
    let (_, first) = compile_ok(&source);
    let (_, second) = compile_ok(&source);
    assert_eq!(to_hex(&first.signature), to_hex(&second.signature));
}

#[test]
fn test_docstrings_do_not_change_the_signature() {
    let bare = format!("class C\n  fun go(): U32 =>\n    1\n{MAIN_STUB}");
    let documented = format!(
        "class C\n  \"\"\"A documented class.\"\"\"\n  fun go(): U32 =>\n    \"docs for go\"\n    1\n{MAIN_STUB}"
    );

    let (_, first) = compile_ok(&bare);
    let (_, second) = compile_ok(&documented);
    assert_eq!(first.signature, second.signature);
}

#[test]
fn test_whitespace_and_comments_do_not_change_the_signature() {
    let tight = format!("class C\n  fun go(): U32 =>\n    1\n{MAIN_STUB}");
    let airy = format!(
        "// a comment\nclass C\n\n  fun go(): U32 =>\n    /* block */ 1\n{MAIN_STUB}"
    );

    let (_, first) = compile_ok(&tight);
    let (_, second) = compile_ok(&airy);
    assert_eq!(first.signature, second.signature);
}

#[test]
fn test_semantic_change_flips_the_signature() {
    let one = format!("class C\n  fun go(): U32 =>\n    1\n{MAIN_STUB}");
    let two = format!("class C\n  fun go(): U32 =>\n    2\n{MAIN_STUB}");

    let (_, first) = compile_ok(&one);
    let (_, second) = compile_ok(&two);
    assert_ne!(first.signature, second.signature);
}

#[test]
fn test_signature_change_on_type_change() {
    let narrow = format!("class C\n  var n: U32 = 0\n{MAIN_STUB}");
    let wide = format!("class C\n  var n: U64 = 0\n{MAIN_STUB}");

    let (_, first) = compile_ok(&narrow);
    let (_, second) = compile_ok(&wide);
    assert_ne!(first.signature, second.signature);
}

#[test]
fn test_entity_order_does_not_change_the_signature() {
    let ab = format!("class A\nclass B\n{MAIN_STUB}");
    let ba = format!("class B\nclass A\n{MAIN_STUB}");

    let (_, first) = compile_ok(&ab);
    let (_, second) = compile_ok(&ba);
    assert_eq!(first.signature, second.signature);
}
