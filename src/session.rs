//! The compiler session: owner of all state that outlives a single pass.
//!
//! One session compiles any number of programs serially. Creating the
//! session initialises the interner and well-known names; dropping it
//! releases everything.

use crate::interner::{Interner, Symbol};
use crate::reporter::Reporter;
use crate::source::SourceMap;
use crate::target::Target;

pub struct Session {
    pub interner: Interner,
    pub sources: SourceMap,
    pub reporter: Reporter,
    pub target: Target,
    pub allow_test_symbols: bool,
    pub names: Names,
}

impl Session {
    pub fn new(target: Target) -> Self {
        let mut interner = Interner::new();
        let names = Names::new(&mut interner);

        Session {
            interner,
            sources: SourceMap::new(),
            reporter: Reporter::new(),
            target,
            allow_test_symbols: false,
            names,
        }
    }

    pub fn with_test_symbols(mut self) -> Self {
        self.allow_test_symbols = true;
        self
    }
}

/// Names the passes refer to constantly, interned once at session start.
#[derive(Debug, Clone, Copy)]
pub struct Names {
    pub builtin: Symbol,
    pub main_actor: Symbol,
    pub env_type: Symbol,
    pub none_type: Symbol,
    pub bool_type: Symbol,
    pub string_type: Symbol,
    pub usize_type: Symbol,
    pub create: Symbol,
    pub apply: Symbol,
    pub update: Symbol,
    pub dispose: Symbol,
    pub has_next: Symbol,
    pub next: Symbol,
    pub eq: Symbol,
    pub ne: Symbol,
    pub value: Symbol,
    pub underscore: Symbol,
    pub init_method: Symbol,
    pub final_method: Symbol,
    pub file: Symbol,
    pub method: Symbol,
    pub line: Symbol,
    pub pos: Symbol,
}

impl Names {
    fn new(interner: &mut Interner) -> Self {
        Names {
            builtin: interner.intern("builtin"),
            main_actor: interner.intern("Main"),
            env_type: interner.intern("Env"),
            none_type: interner.intern("None"),
            bool_type: interner.intern("Bool"),
            string_type: interner.intern("String"),
            usize_type: interner.intern("USize"),
            create: interner.intern("create"),
            apply: interner.intern("apply"),
            update: interner.intern("update"),
            dispose: interner.intern("dispose"),
            has_next: interner.intern("has_next"),
            next: interner.intern("next"),
            eq: interner.intern("eq"),
            ne: interner.intern("ne"),
            value: interner.intern("value"),
            underscore: interner.intern("_"),
            init_method: interner.intern("_init"),
            final_method: interner.intern("_final"),
            file: interner.intern("file"),
            method: interner.intern("method"),
            line: interner.intern("line"),
            pos: interner.intern("pos"),
        }
    }
}
