//! The scope pass populates symbol tables, and the import pass loads used
//! packages and links their names into the importing module.

use log::debug;

use crate::ast::id;
use crate::ast::{Def, EntityId, PackageId, Program, UseScheme};
use crate::pkg;
use crate::reporter::{DiagnosticKind, Frame};
use crate::source::Span;
use crate::target;

use super::{pass_through, Context, Pass, PassResult};

pub fn run(program: &mut Program, ctx: &mut Context) -> PassResult {
    for index in 0..program.entities.len() {
        entity(program, ctx, EntityId(index));
    }

    PassResult::Ok
}

/// Fill one entity's symbol table: type parameters, fields, methods.
pub fn entity(program: &mut Program, ctx: &mut Context, id: EntityId) -> PassResult {
    let crate::ast::Entity {
        name,
        span,
        type_params,
        fields,
        methods,
        symbols,
        ..
    } = program.entity_mut(id);
    let reporter = &mut ctx.session.reporter;
    let interner = &ctx.session.interner;

    if let Err(message) = id::check_name(interner.get(*name), &id::TYPE_NAME) {
        reporter.error(DiagnosticKind::Semantic, *span, message);
    }

    // Entity-level type parameters share the member namespace.
    for (index, tp) in type_params.iter().enumerate() {
        if let Err(message) = id::check_name(interner.get(tp.name), &id::TYPE_PARAM_NAME) {
            reporter.error(DiagnosticKind::Semantic, tp.span, message);
        }

        if symbols
            .add(tp.name, Def::TypeParam { method: false, index })
            .is_err()
        {
            reporter.error(
                DiagnosticKind::Semantic,
                tp.span,
                format!("type parameter '{}' is defined twice", interner.get(tp.name)),
            );
        }
    }

    for (index, field) in fields.iter().enumerate() {
        if let Err(message) = id::check_name(interner.get(field.name), &id::FIELD_NAME) {
            reporter.error(DiagnosticKind::Semantic, field.span, message);
        }

        if symbols
            .add(field.name, Def::Field { entity: id, index })
            .is_err()
        {
            let prior = fields[..index].iter().find(|f| f.name == field.name);
            duplicate_member(
                reporter,
                field.span,
                interner.get(field.name),
                prior.map(|f| f.span),
            );
        }
    }

    for (index, method) in methods.iter().enumerate() {
        if let Err(message) = id::check_name(interner.get(method.name), &id::METHOD_NAME) {
            reporter.error(DiagnosticKind::Semantic, method.span, message);
        }

        for tp in &method.type_params {
            if let Err(message) = id::check_name(interner.get(tp.name), &id::TYPE_PARAM_NAME) {
                reporter.error(DiagnosticKind::Semantic, tp.span, message);
            }
        }

        for param in &method.params {
            if let Err(message) = id::check_name(interner.get(param.name), &id::PARAM_NAME) {
                reporter.error(DiagnosticKind::Semantic, param.span, message);
            }
        }

        if symbols
            .add(method.name, Def::Method { entity: id, index })
            .is_err()
        {
            let prior = fields
                .iter()
                .find(|f| f.name == method.name)
                .map(|f| f.span)
                .or_else(|| {
                    methods[..index]
                        .iter()
                        .find(|m| m.name == method.name)
                        .map(|m| m.span)
                });
            duplicate_member(reporter, method.span, interner.get(method.name), prior);
        }
    }

    PassResult::Ok
}

fn duplicate_member(
    reporter: &mut crate::reporter::Reporter,
    span: Span,
    name: &str,
    prior: Option<Span>,
) {
    let frames = prior
        .map(|prior_span| {
            vec![Frame {
                span: prior_span,
                message: "previously defined here".to_string(),
            }]
        })
        .unwrap_or_default();

    reporter.error_with(
        DiagnosticKind::Semantic,
        span,
        format!("'{name}' is already defined in this type"),
        frames,
    );
}

/// The import pass: evaluate guards, load used packages, bind their
/// exported names into the module.
pub fn run_imports(program: &mut Program, ctx: &mut Context) -> PassResult {
    for package_index in 0..program.packages.len() {
        let package = PackageId(package_index);

        for module_index in 0..program.package(package).modules.len() {
            run_module_imports(program, ctx, package, module_index);
        }
    }

    PassResult::Ok
}

fn run_module_imports(
    program: &mut Program,
    ctx: &mut Context,
    package: PackageId,
    module_index: usize,
) {
    for use_index in 0..program.package(package).modules[module_index].uses.len() {
        let (span, alias, guard_live, path) = {
            let use_ = &program.package(package).modules[module_index].uses[use_index];

            let live = match &use_.guard {
                None => true,
                Some(guard) => {
                    match target::evaluate_guard(guard, &ctx.session.target, &ctx.session.interner)
                    {
                        Ok(live) => live,
                        Err((span, message)) => {
                            ctx.session
                                .reporter
                                .error(DiagnosticKind::Semantic, span, message);
                            false
                        }
                    }
                }
            };

            let path = match &use_.scheme {
                UseScheme::Package { path, .. } => Some(*path),
                UseScheme::Ffi(_) => None,
            };

            (use_.span, use_.alias, live, path)
        };

        if !guard_live {
            continue;
        }

        // FFI declarations stay on the use node; calls look them up there.
        let Some(path) = path else {
            continue;
        };

        let path_text = ctx.session.interner.get(path).to_string();
        let Some(imported) = import_package(program, ctx, &path_text) else {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                span,
                format!("couldn't locate package '{path_text}'"),
            );
            continue;
        };

        if let UseScheme::Package { package: slot, .. } =
            &mut program.packages[package.0].modules[module_index].uses[use_index].scheme
        {
            *slot = Some(imported);
        }

        bind_import(program, ctx, package, module_index, imported, alias, span);
    }
}

fn bind_import(
    program: &mut Program,
    ctx: &mut Context,
    package: PackageId,
    module_index: usize,
    imported: PackageId,
    alias: Option<crate::interner::Symbol>,
    span: Span,
) {
    if let Some(alias) = alias {
        let module = &mut program.packages[package.0].modules[module_index];
        if module.symbols.add(alias, Def::Package(imported)).is_err() {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                span,
                format!(
                    "import alias '{}' conflicts with an earlier name",
                    ctx.session.interner.get(alias)
                ),
            );
        }
        return;
    }

    // Unaliased imports splice the package's public types into the module.
    let exported: Vec<(crate::interner::Symbol, Def)> = program
        .package(imported)
        .symbols
        .iter()
        .filter(|(name, _)| !id::is_private(ctx.session.interner.get(*name)))
        .map(|(name, entry)| (name, entry.def))
        .collect();

    let module = &mut program.packages[package.0].modules[module_index];
    for (name, def) in exported {
        if module.symbols.add(name, def).is_err() {
            ctx.session.reporter.error(
                DiagnosticKind::Semantic,
                span,
                format!(
                    "imported name '{}' conflicts with an earlier import",
                    ctx.session.interner.get(name)
                ),
            );
        }
    }
}

/// Load a package on first use and bring its entities up to this pass.
/// Registering the package before recursing keeps import cycles finite.
fn import_package(program: &mut Program, ctx: &mut Context, path: &str) -> Option<PackageId> {
    if let Some(existing) = program.find_package(path) {
        return Some(existing);
    }

    debug!("importing package '{path}'");
    let sources = ctx.provider.package(path)?;
    let imported = pkg::load_package(program, ctx.session, path, sources);

    let entity_ids: Vec<EntityId> = program
        .package(imported)
        .modules
        .iter()
        .flat_map(|m| m.entities.iter().copied())
        .collect();

    for id in entity_ids {
        pass_through(program, ctx, id, Pass::Scope);
    }

    // The imported package's own imports load transitively.
    for module_index in 0..program.package(imported).modules.len() {
        run_module_imports(program, ctx, imported, module_index);
    }

    Some(imported)
}

/// Names visible in a module, used by the name pass: module imports, the
/// package's own types, then builtin.
pub fn lookup_module_name(
    program: &Program,
    package: PackageId,
    module_index: usize,
    name: crate::interner::Symbol,
) -> Option<Def> {
    let module = &program.package(package).modules[module_index];
    if let Some(entry) = module.symbols.get(name) {
        return Some(entry.def);
    }

    if let Some(entry) = program.package(package).symbols.get(name) {
        return Some(entry.def);
    }

    let builtin = program.builtin?;
    if builtin != package {
        if let Some(entry) = program.package(builtin).symbols.get(name) {
            return Some(entry.def);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::parse_source;
    use crate::pkg::MapProvider;

    fn scope_errors(input: &str) -> Vec<String> {
        let (mut session, _module, entities) = parse_source(input);
        let mut program = Program::new();
        let pkg_id = program.add_package(session.names.builtin, "main".to_string());

        for entity in entities {
            let name = entity.name;
            let id = program.add_entity(entity);
            let _ = program.package_mut(pkg_id).symbols.add(name, Def::Entity(id));
        }

        let provider = MapProvider::new();
        let mut ctx = Context::new(&mut session, &provider);
        run(&mut program, &mut ctx);

        session
            .reporter
            .diagnostics()
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn test_scope_accepts_wellformed_entity() {
        let errors = scope_errors("class Wombat\n  var _hidden: U32\n  fun size(): U32 => 1");
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_scope_rejects_duplicate_members() {
        let errors = scope_errors("class Wombat\n  var x: U32\n  fun x(): U32 => 1");
        assert!(errors.iter().any(|e| e.contains("already defined")));
    }

    #[test]
    fn test_scope_rejects_bad_names() {
        let errors = scope_errors("class wombat");
        assert!(errors.iter().any(|e| e.contains("must start A-Z")));

        let errors = scope_errors("class Wombat\n  fun Go(): U32 => 1");
        assert!(errors.iter().any(|e| e.contains("must start a-z")));
    }

    #[test]
    fn test_entity_kind_alias_is_scoped() {
        // Aliases carry no members but still get their name checked.
        let errors = scope_errors("type bad is U32");
        assert!(errors.iter().any(|e| e.contains("must start A-Z")));
    }
}
