//! Helpers shared by the integration suites: compile a program held in
//! memory and hand back the session for inspection.

use maru_lang::pkg::MapProvider;
use maru_lang::session::Session;
use maru_lang::target::Target;
use maru_lang::CompiledProgram;

pub fn compile_with(
    target: Target,
    packages: &[(&str, &str)],
) -> (Session, Result<CompiledProgram, ()>) {
    let mut provider = MapProvider::new();
    for (path, source) in packages {
        provider.add(path, &format!("{path}/main.maru"), source);
    }

    let mut session = Session::new(target);
    let result = maru_lang::compile(&mut session, &provider, packages[0].0);
    (session, result)
}

pub fn compile_source(source: &str) -> (Session, Result<CompiledProgram, ()>) {
    compile_with(Target::default(), &[("main", source)])
}

#[allow(dead_code)]
pub fn compile_ok(source: &str) -> (Session, CompiledProgram) {
    let (session, result) = compile_source(source);

    if session.reporter.has_errors() {
        panic!(
            "expected a clean compile:\n{}",
            session.reporter.render_all(&session.sources)
        );
    }

    let compiled = result.expect("compilation succeeded");
    (session, compiled)
}

#[allow(dead_code)]
pub fn compile_errors(source: &str) -> Vec<String> {
    let (session, result) = compile_source(source);
    assert!(
        result.is_err() || session.reporter.has_errors(),
        "expected errors, but the program compiled"
    );

    session
        .reporter
        .diagnostics()
        .map(|d| d.message.clone())
        .collect()
}

#[allow(dead_code)]
pub fn assert_error(source: &str, fragment: &str) {
    let errors = compile_errors(source);
    assert!(
        errors.iter().any(|e| e.contains(fragment)),
        "no error containing {fragment:?} in {errors:#?}"
    );
}

/// A minimal valid program to splice test entities next to.
#[allow(dead_code)]
pub const MAIN_STUB: &str = "actor Main\n  new create(env: Env) =>\n    None\n";
