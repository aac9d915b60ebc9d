//! Package loading: the seam between the pipeline and the outside world.
//!
//! A [`SourceProvider`] yields module sources grouped into packages; the
//! loader lexes and parses them into the program. The `builtin` package is
//! baked into the compiler and always loaded first.

mod builtin;

pub use builtin::BUILTIN_SOURCE;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;

use crate::ast::{Def, PackageId, Program};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::reporter::DiagnosticKind;
use crate::session::Session;
use crate::source::Span;

/// Yields the module sources of a package: `(file name, code)` pairs in a
/// stable order.
pub trait SourceProvider {
    fn package(&self, path: &str) -> Option<Vec<(String, String)>>;
}

/// In-memory provider used by tests and tooling.
#[derive(Debug, Default)]
pub struct MapProvider {
    packages: HashMap<String, Vec<(String, String)>>,
}

impl MapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &str, file: &str, code: &str) -> &mut Self {
        self.packages
            .entry(path.to_string())
            .or_default()
            .push((file.to_string(), code.to_string()));
        self
    }
}

impl SourceProvider for MapProvider {
    fn package(&self, path: &str) -> Option<Vec<(String, String)>> {
        self.packages.get(path).cloned()
    }
}

/// Reads packages from directories on disk; one directory per package,
/// one module per `.maru` file, sorted by name.
#[derive(Debug)]
pub struct DirProvider {
    root: PathBuf,
}

impl DirProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirProvider { root: root.into() }
    }

    fn read_dir(&self, dir: &Path) -> Option<Vec<(String, String)>> {
        let entries = std::fs::read_dir(dir).ok()?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "maru"))
            .collect();
        files.sort();

        let mut sources = vec![];
        for file in files {
            let code = std::fs::read_to_string(&file).ok()?;
            sources.push((file.to_string_lossy().into_owned(), code));
        }

        if sources.is_empty() {
            None
        } else {
            Some(sources)
        }
    }
}

impl SourceProvider for DirProvider {
    fn package(&self, path: &str) -> Option<Vec<(String, String)>> {
        if path == "." || path.is_empty() {
            return self.read_dir(&self.root);
        }
        self.read_dir(&self.root.join(path))
    }
}

/// Load one package's sources into the program: register, lex, parse.
pub fn load_package(
    program: &mut Program,
    session: &mut Session,
    path: &str,
    sources: Vec<(String, String)>,
) -> PackageId {
    debug!("loading package '{path}' ({} modules)", sources.len());

    let package_name = path.rsplit('/').next().unwrap_or(path);
    let name = session.interner.intern(package_name);
    let package = program.add_package(name, path.to_string());

    for (file, code) in sources {
        let source = session.sources.add(file, code);
        let tokens = Lexer::new(
            &session.sources,
            source,
            &mut session.interner,
            &mut session.reporter,
            session.allow_test_symbols,
        )
        .lex();

        let names = session.names;
        let parser = Parser::new(&tokens, package, names, &mut session.reporter);
        let (mut module, entities) = parser.module(source);

        for entity in entities {
            let entity_name = entity.name;
            let span = entity.span;
            let id = program.add_entity(entity);
            module.entities.push(id);

            if program
                .package_mut(package)
                .symbols
                .add(entity_name, Def::Entity(id))
                .is_err()
            {
                session.reporter.error(
                    DiagnosticKind::Semantic,
                    span,
                    format!(
                        "type '{}' is defined twice in package '{path}'",
                        session.interner.get(entity_name)
                    ),
                );
            }
        }

        if module.docstring.is_some() && program.package(package).docstring.is_none() {
            program.package_mut(package).docstring = module.docstring;
        }

        program.package_mut(package).modules.push(module);
    }

    package
}

/// Load the builtin package followed by the root package. The root package
/// is the compilation unit; its id is returned.
pub fn load_program(
    program: &mut Program,
    session: &mut Session,
    provider: &dyn SourceProvider,
    root_path: &str,
) -> Result<PackageId, ()> {
    let builtin_sources = vec![("builtin/builtin.maru".to_string(), BUILTIN_SOURCE.to_string())];
    let builtin = load_package(program, session, "builtin", builtin_sources);
    program.builtin = Some(builtin);

    let Some(sources) = provider.package(root_path) else {
        session.reporter.error(
            DiagnosticKind::Semantic,
            Span::default(),
            format!("couldn't locate package '{root_path}'"),
        );
        return Err(());
    };

    let root = load_package(program, session, root_path, sources);
    program.root = Some(root);
    Ok(root)
}
