//! The pass pipeline.
//!
//! Passes run in a fixed order over the whole program. Every pass records
//! how far each entity has come, so subtrees synthesized mid-pipeline can
//! be caught up individually with [`pass_through`] instead of leaking
//! "current pass" state.

pub mod expr;
pub mod names;
pub mod refer;
pub mod scope;
pub mod sugar;
pub mod traits;
pub mod verify;

use log::debug;

use crate::ast::{checker, EntityId, Program};
use crate::pkg::SourceProvider;
use crate::session::Session;

/// The compilation stages covered by the front-end, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Pass {
    Parse,
    Sugar,
    Scope,
    Import,
    Name,
    Traits,
    Refer,
    Expr,
    Verify,
}

impl Pass {
    pub const SEQUENCE: [Pass; 9] = [
        Pass::Parse,
        Pass::Sugar,
        Pass::Scope,
        Pass::Import,
        Pass::Name,
        Pass::Traits,
        Pass::Refer,
        Pass::Expr,
        Pass::Verify,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pass::Parse => "parse",
            Pass::Sugar => "sugar",
            Pass::Scope => "scope",
            Pass::Import => "import",
            Pass::Name => "name",
            Pass::Traits => "traits",
            Pass::Refer => "refer",
            Pass::Expr => "expr",
            Pass::Verify => "verify",
        }
    }
}

/// Outcome of a pass over one node or one whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    Ok,
    /// Nothing applied; treated as success.
    Ignore,
    /// Errors were reported; later passes may still run on other nodes.
    Error,
    /// The pass cannot continue at all.
    Fatal,
}

/// Everything a pass may touch besides the program itself.
pub struct Context<'a> {
    pub session: &'a mut Session,
    pub provider: &'a dyn SourceProvider,
    hygienic: u32,
}

impl<'a> Context<'a> {
    pub fn new(session: &'a mut Session, provider: &'a dyn SourceProvider) -> Self {
        Context {
            session,
            provider,
            hygienic: 0,
        }
    }

    /// A fresh `$`-name, unique within this compilation. Hygienic names can
    /// never collide with source names because `$` never survives the
    /// lexer outside test mode.
    pub fn hygienic_name(&mut self) -> crate::interner::Symbol {
        let name = format!("${}", self.hygienic);
        self.hygienic += 1;
        self.session.interner.intern(&name)
    }

    /// Run `f` with a scratch reporter. The closure's diagnostics are
    /// returned alongside its result instead of being published, which is
    /// how speculative checks stay silent unless they fail for real.
    pub fn probe<T>(&mut self, f: impl FnOnce(&mut Context) -> T) -> (T, crate::reporter::Reporter) {
        let saved = std::mem::take(&mut self.session.reporter);
        let result = f(self);
        let scratch = std::mem::replace(&mut self.session.reporter, saved);
        (result, scratch)
    }
}

/// Run the pipeline up to and including `upto`. Compilation stops at the
/// end of the first pass that reported errors, so one run surfaces as many
/// independent problems as it safely can.
pub fn run(program: &mut Program, ctx: &mut Context, upto: Pass) -> Result<(), ()> {
    for pass in Pass::SEQUENCE {
        if pass > upto {
            break;
        }

        let before = ctx.session.reporter.error_count();
        debug!("running {} pass", pass.name());

        let result = run_pass(program, ctx, pass);
        advance_entities(program, pass);

        if result == PassResult::Fatal || ctx.session.reporter.error_count() > before {
            debug!("{} pass failed", pass.name());
            return Err(());
        }

        if cfg!(debug_assertions) {
            checker::check_program(program, pass, &mut ctx.session.reporter);
        }
    }

    Ok(())
}

fn run_pass(program: &mut Program, ctx: &mut Context, pass: Pass) -> PassResult {
    match pass {
        // Parsing happened while the program was loaded.
        Pass::Parse => PassResult::Ignore,
        Pass::Sugar => sugar::run(program, ctx),
        Pass::Scope => scope::run(program, ctx),
        Pass::Import => scope::run_imports(program, ctx),
        Pass::Name => names::run(program, ctx),
        Pass::Traits => traits::run(program, ctx),
        Pass::Refer => refer::run(program, ctx),
        Pass::Expr => expr::run(program, ctx),
        Pass::Verify => verify::run(program, ctx),
    }
}

fn advance_entities(program: &mut Program, pass: Pass) {
    for entity in &mut program.entities {
        if entity.pass_reached < pass {
            entity.pass_reached = pass;
        }
    }
}

/// Bring one entity (typically synthesized by sugar) up to `upto`. Passes
/// that only make sense program-wide (import) are skipped; the entity's
/// `pass_reached` keeps this idempotent.
pub fn pass_through(
    program: &mut Program,
    ctx: &mut Context,
    entity: EntityId,
    upto: Pass,
) -> PassResult {
    for pass in Pass::SEQUENCE {
        if pass > upto {
            break;
        }
        if program.entity(entity).pass_reached >= pass {
            continue;
        }

        let result = match pass {
            Pass::Parse | Pass::Import => PassResult::Ignore,
            Pass::Sugar => sugar::entity(program, ctx, entity),
            Pass::Scope => scope::entity(program, ctx, entity),
            Pass::Name => names::entity(program, ctx, entity),
            Pass::Traits => traits::entity(program, ctx, entity),
            Pass::Refer => refer::entity(program, ctx, entity),
            Pass::Expr => expr::entity(program, ctx, entity),
            Pass::Verify => verify::entity(program, ctx, entity),
        };

        program.entity_mut(entity).pass_reached = pass;

        if matches!(result, PassResult::Fatal) {
            return result;
        }
    }

    PassResult::Ok
}
