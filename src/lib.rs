//! Compiler front-end for the Maru programming language.
//!
//! A [`Session`](session::Session) owns all cross-pass state. Programs are
//! loaded through a [`SourceProvider`](pkg::SourceProvider), run through
//! the pass pipeline, and come out as a typed AST with a stable signature.

pub mod ast;
pub mod interner;
pub mod lexer;
pub mod parser;
pub mod pass;
pub mod pkg;
pub mod reporter;
pub mod session;
pub mod signature;
pub mod source;
pub mod target;

use log::debug;

use ast::Program;
use pass::{Context, Pass};
use pkg::SourceProvider;
use session::Session;

pub struct CompiledProgram {
    pub program: Program,
    pub signature: signature::Signature,
}

/// Compile one program: load builtin and the root package, run the whole
/// pipeline, compute the signature. Diagnostics land in the session's
/// reporter either way.
pub fn compile(
    session: &mut Session,
    provider: &dyn SourceProvider,
    root_path: &str,
) -> Result<CompiledProgram, ()> {
    let mut program = Program::new();

    pkg::load_program(&mut program, session, provider, root_path)?;
    if session.reporter.has_errors() {
        return Err(());
    }

    {
        let mut ctx = Context::new(session, provider);
        pass::run(&mut program, &mut ctx, Pass::Verify)?;
    }

    let signature = signature::program_signature(&program, &session.interner);
    debug!("program signature {}", signature::to_hex(&signature));

    Ok(CompiledProgram { program, signature })
}
