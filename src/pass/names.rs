//! The name pass: every identifier reference is resolved to its
//! definition, every nominal type to its entity, with "did you mean"
//! suggestions for near-misses.

use std::collections::HashMap;

use crate::ast::expr::*;
use crate::ast::id;
use crate::ast::types::Type;
use crate::ast::{Def, EntityId, LocalId, Method, PackageId, Program};
use crate::interner::{Interner, Symbol};
use crate::reporter::{DiagnosticKind, Reporter};
use crate::source::Span;

use super::{scope, Context, PassResult};

pub fn run(program: &mut Program, ctx: &mut Context) -> PassResult {
    for index in 0..program.entities.len() {
        entity(program, ctx, EntityId(index));
    }

    resolve_ffi_decls(program, ctx);
    PassResult::Ok
}

/// FFI declarations live on modules, outside any entity; their signature
/// types resolve against the module scope alone.
fn resolve_ffi_decls(program: &mut Program, ctx: &mut Context) {
    for package_index in 0..program.packages.len() {
        let package = PackageId(package_index);

        for module_index in 0..program.package(package).modules.len() {
            let mut uses =
                std::mem::take(&mut program.packages[package.0].modules[module_index].uses);

            {
                let mut resolver = Resolver::new(program, ctx, package, module_index, None);

                for use_ in &mut uses {
                    if let crate::ast::UseScheme::Ffi(decl) = &mut use_.scheme {
                        resolver.resolve_type(&mut decl.ret);
                        for param in &mut decl.params {
                            resolver.resolve_type(&mut param.ty);
                        }
                    }
                }
            }

            program.packages[package.0].modules[module_index].uses = uses;
        }
    }
}

pub fn entity(program: &mut Program, ctx: &mut Context, id: EntityId) -> PassResult {
    let package = program.entity(id).package;
    let module = program
        .package(package)
        .modules
        .iter()
        .position(|m| m.entities.contains(&id))
        .unwrap_or(0);
    let owner = Some(id);

    // Signatures first: provides, alias target, constraints, field types.
    let mut provides = std::mem::take(&mut program.entity_mut(id).provides);
    let mut alias_of = program.entity_mut(id).alias_of.take();
    let mut type_params = std::mem::take(&mut program.entity_mut(id).type_params);
    let mut fields = std::mem::take(&mut program.entity_mut(id).fields);

    {
        let mut resolver = Resolver::new(program, ctx, package, module, owner);

        for ty in &mut provides {
            resolver.resolve_type(ty);
        }
        if let Some(ty) = &mut alias_of {
            resolver.resolve_type(ty);
        }
        for tp in &mut type_params {
            if let Some(constraint) = &mut tp.constraint {
                resolver.resolve_type(constraint);
            }
            if let Some(default) = &mut tp.default {
                resolver.resolve_type(default);
            }
        }
        for field in &mut fields {
            resolver.resolve_type(&mut field.ty);
        }
    }

    program.entity_mut(id).provides = provides;
    program.entity_mut(id).alias_of = alias_of;
    program.entity_mut(id).type_params = type_params;
    program.entity_mut(id).fields = fields;

    // Methods one at a time, so the rest of the program stays readable.
    for index in 0..program.entity(id).methods.len() {
        let mut method = std::mem::replace(
            &mut program.entity_mut(id).methods[index],
            Method::new(crate::ast::MethodKind::Function, ctx.session.names.create, Span::default()),
        );

        let mut resolver = Resolver::new(program, ctx, package, module, owner);
        resolver.resolve_method(&mut method);

        program.entity_mut(id).methods[index] = method;
    }

    PassResult::Ok
}

struct Resolver<'a> {
    program: &'a Program,
    reporter: &'a mut Reporter,
    interner: &'a Interner,
    underscore: Symbol,
    package: PackageId,
    module: usize,
    entity: Option<EntityId>,
    method_type_params: HashMap<Symbol, usize>,
    params: HashMap<Symbol, usize>,
    scopes: Vec<HashMap<Symbol, Def>>,
    next_local: u32,
}

impl<'a> Resolver<'a> {
    fn new(
        program: &'a Program,
        ctx: &'a mut Context<'_>,
        package: PackageId,
        module: usize,
        entity: Option<EntityId>,
    ) -> Self {
        Resolver {
            program,
            reporter: &mut ctx.session.reporter,
            interner: &ctx.session.interner,
            underscore: ctx.session.names.underscore,
            package,
            module,
            entity,
            method_type_params: HashMap::new(),
            params: HashMap::new(),
            scopes: vec![],
            next_local: 0,
        }
    }

    fn resolve_method(&mut self, method: &mut Method) {
        self.method_type_params = method
            .type_params
            .iter()
            .enumerate()
            .map(|(i, tp)| (tp.name, i))
            .collect();
        self.params = method
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name, i))
            .collect();

        for tp in &mut method.type_params {
            if let Some(constraint) = &mut tp.constraint {
                self.resolve_type(constraint);
            }
            if let Some(default) = &mut tp.default {
                self.resolve_type(default);
            }
        }

        for param in &mut method.params {
            self.resolve_type(&mut param.ty);
        }
        if let Some(ret) = &mut method.ret {
            self.resolve_type(ret);
        }

        // Parameter defaults see the surrounding type, not earlier params.
        for param in &mut method.params {
            if let Some(default) = &mut param.default {
                let saved = std::mem::take(&mut self.params);
                self.resolve_expr(default);
                self.params = saved;
            }
        }

        if let Some(body) = &mut method.body {
            self.resolve_expr(body);
        }
    }

    /// Walk enclosing scopes outward until something binds the name.
    fn lookup(&self, name: Symbol) -> Option<Def> {
        for scope in self.scopes.iter().rev() {
            if let Some(def) = scope.get(&name) {
                return Some(*def);
            }
        }

        if let Some(index) = self.params.get(&name) {
            return Some(Def::Param { index: *index });
        }

        if let Some(index) = self.method_type_params.get(&name) {
            return Some(Def::TypeParam {
                method: true,
                index: *index,
            });
        }

        if let Some(entity) = self.entity {
            if let Some(entry) = self.program.entity(entity).symbols.get(name) {
                return Some(entry.def);
            }
        }

        scope::lookup_module_name(self.program, self.package, self.module, name)
    }

    /// Everything visible, for suggestion search.
    fn visible_names(&self) -> Vec<Symbol> {
        let mut out = vec![];

        for scope in &self.scopes {
            out.extend(scope.keys().copied());
        }
        out.extend(self.params.keys().copied());
        out.extend(self.method_type_params.keys().copied());
        if let Some(entity) = self.entity {
            out.extend(self.program.entity(entity).symbols.names());
        }

        let package = self.program.package(self.package);
        out.extend(package.modules[self.module].symbols.names());
        out.extend(package.symbols.names());

        if let Some(builtin) = self.program.builtin {
            if builtin != self.package {
                out.extend(self.program.package(builtin).symbols.names());
            }
        }

        out
    }

    /// Case-folded or underscore-stripped near-miss.
    fn suggest(&self, name: Symbol) -> Option<Symbol> {
        let wanted = self.interner.get(name);
        let folded = wanted.to_lowercase();

        self.visible_names().into_iter().find(|candidate| {
            let text = self.interner.get(*candidate);
            text.to_lowercase() == folded
                || text.strip_prefix('_') == Some(wanted)
                || wanted.strip_prefix('_') == Some(text)
        })
    }

    fn unresolved(&mut self, name: Symbol, span: Span) {
        let text = self.interner.get(name);

        let message = match self.suggest(name) {
            Some(suggestion) => format!(
                "can't find declaration of '{text}'; did you mean '{}'?",
                self.interner.get(suggestion)
            ),
            None => format!("can't find declaration of '{text}'"),
        };

        self.reporter
            .error(DiagnosticKind::Semantic, span, message);
    }

    fn declare_local(&mut self, name: Symbol, span: Span) -> Option<LocalId> {
        // Don't-care bindings get an identity but never a scope entry, so
        // any number of them coexist.
        if name == self.underscore {
            let local = LocalId(self.next_local);
            self.next_local += 1;
            return Some(local);
        }

        if let Err(message) = id::check_name(self.interner.get(name), &id::LOCAL_NAME) {
            self.reporter.error(DiagnosticKind::Semantic, span, message);
        }

        if let Some(top) = self.scopes.last() {
            if top.contains_key(&name) {
                self.reporter.error(
                    DiagnosticKind::Semantic,
                    span,
                    format!(
                        "'{}' is already declared in this scope",
                        self.interner.get(name)
                    ),
                );
                return None;
            }
        }

        // A local may shadow an outer local or parameter, never a field,
        // method, type or package name.
        match self.lookup(name) {
            Some(Def::Local(_)) | Some(Def::Param { .. }) | None => {}
            Some(_) => {
                self.reporter.error(
                    DiagnosticKind::Semantic,
                    span,
                    format!(
                        "'{}' shadows a name that is not a local or parameter",
                        self.interner.get(name)
                    ),
                );
                return None;
            }
        }

        let local = LocalId(self.next_local);
        self.next_local += 1;

        if let Some(top) = self.scopes.last_mut() {
            top.insert(name, Def::Local(local));
        }

        Some(local)
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(HashMap::new());
        f(self);
        self.scopes.pop();
    }

    pub fn resolve_type(&mut self, ty: &mut Type) {
        match ty {
            Type::Nominal(nominal) => {
                for arg in &mut nominal.args {
                    self.resolve_type(arg);
                }

                // Already resolved, e.g. a cloned type-parameter default.
                if nominal.entity.is_some() {
                    return;
                }

                if let Some(qualifier) = nominal.package {
                    self.resolve_qualified_nominal(ty, qualifier);
                    return;
                }

                let name = nominal.name;
                let span = nominal.span;

                match self.lookup(name) {
                    Some(Def::Entity(id)) => {
                        nominal.entity = Some(id);
                        self.check_type_args(ty);
                    }
                    Some(Def::TypeParam { method, index }) => {
                        if !nominal.args.is_empty() {
                            self.reporter.error(
                                DiagnosticKind::Semantic,
                                span,
                                "a type parameter cannot take type arguments",
                            );
                        }
                        *ty = Type::TypeParamRef {
                            name,
                            cap: nominal.cap,
                            eph: nominal.eph,
                            def: Some((method, index)),
                            span,
                        };
                    }
                    Some(_) => {
                        self.reporter.error(
                            DiagnosticKind::Semantic,
                            span,
                            format!("'{}' is not a type", self.interner.get(name)),
                        );
                    }
                    None => self.unresolved(name, span),
                }
            }
            Type::Union(types) | Type::Isect(types) | Type::Tuple(types) => {
                for t in types {
                    self.resolve_type(t);
                }
            }
            Type::Arrow { left, right } => {
                self.resolve_type(left);
                self.resolve_type(right);
            }
            Type::Fun { params, ret, .. } => {
                for p in params {
                    self.resolve_type(p);
                }
                self.resolve_type(ret);
            }
            Type::This { .. } | Type::TypeParamRef { .. } | Type::DontCare { .. } => {}
        }
    }

    fn resolve_qualified_nominal(&mut self, ty: &mut Type, qualifier: Symbol) {
        let Type::Nominal(nominal) = ty else {
            return;
        };
        let span = nominal.span;

        let Some(Def::Package(package)) = self.lookup(qualifier) else {
            self.reporter.error(
                DiagnosticKind::Semantic,
                span,
                format!(
                    "'{}' is not an imported package",
                    self.interner.get(qualifier)
                ),
            );
            return;
        };

        if id::is_private(self.interner.get(nominal.name)) {
            self.reporter.error(
                DiagnosticKind::Semantic,
                span,
                format!(
                    "'{}' is private to its package",
                    self.interner.get(nominal.name)
                ),
            );
            return;
        }

        match self.program.find_entity(package, nominal.name) {
            Some(id) => {
                nominal.entity = Some(id);
                self.check_type_args(ty);
            }
            None => {
                let message = format!(
                    "package '{}' has no type '{}'",
                    self.interner.get(qualifier),
                    self.interner.get(nominal.name)
                );
                self.reporter.error(DiagnosticKind::Semantic, span, message);
            }
        }
    }

    /// Arity check, filling omitted arguments from declared defaults.
    fn check_type_args(&mut self, ty: &mut Type) {
        let (entity, name, span, given) = match ty {
            Type::Nominal(nominal) => match nominal.entity {
                Some(entity) => (entity, nominal.name, nominal.span, nominal.args.len()),
                None => return,
            },
            _ => return,
        };

        let wanted = self.program.entity(entity).type_params.len();

        if given > wanted {
            self.reporter.error(
                DiagnosticKind::Semantic,
                span,
                format!(
                    "'{}' takes {wanted} type arguments, {given} given",
                    self.interner.get(name),
                ),
            );
            return;
        }

        let defaults: Vec<Option<Type>> = self.program.entity(entity).type_params[given..]
            .iter()
            .map(|p| p.default.clone())
            .collect();

        for default in defaults {
            let Some(mut default) = default else {
                self.reporter.error(
                    DiagnosticKind::Semantic,
                    span,
                    format!(
                        "'{}' takes {wanted} type arguments, {given} given",
                        self.interner.get(name),
                    ),
                );
                return;
            };

            self.resolve_type(&mut default);
            if let Type::Nominal(nominal) = ty {
                nominal.args.push(default);
            }
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr) {
        let span = expr.span;

        match &mut expr.kind {
            ExprKind::Seq(exprs) => {
                self.scopes.push(HashMap::new());
                for e in exprs {
                    self.resolve_expr(e);
                }
                self.scopes.pop();
            }
            ExprKind::Reference { name, def } => {
                if *name == self.underscore {
                    return;
                }

                match self.lookup(*name) {
                    Some(found) => *def = Some(found),
                    None => self.unresolved(*name, span),
                }
            }
            ExprKind::Local { name, ty, id, .. } => {
                if let Some(ty) = ty {
                    self.resolve_type(ty);
                }
                *id = self.declare_local(*name, span);
            }
            ExprKind::MatchCapture { name, ty, id } => {
                self.resolve_type(ty);
                *id = self.declare_local(*name, span);
            }
            ExprKind::Dot { expr: inner, member } => {
                self.resolve_expr(inner);

                // `pkg.Type` collapses to a direct entity reference.
                let qualified = match &inner.kind {
                    ExprKind::Reference {
                        def: Some(Def::Package(pkg)),
                        ..
                    } => Some((*pkg, *member)),
                    _ => None,
                };

                if let Some((pkg, member)) = qualified {
                    if id::is_private(self.interner.get(member)) {
                        self.reporter.error(
                            DiagnosticKind::Semantic,
                            span,
                            format!(
                                "'{}' is private to its package",
                                self.interner.get(member)
                            ),
                        );
                        return;
                    }

                    match self.program.find_entity(pkg, member) {
                        Some(found) => {
                            expr.kind = ExprKind::Reference {
                                name: member,
                                def: Some(Def::Entity(found)),
                            };
                        }
                        None => {
                            let message = format!(
                                "the package has no type '{}'",
                                self.interner.get(member)
                            );
                            self.reporter.error(DiagnosticKind::Semantic, span, message);
                        }
                    }
                }
            }
            ExprKind::Qualify { expr, args } => {
                self.resolve_expr(expr);
                for arg in args {
                    self.resolve_type(arg);
                }
            }
            ExprKind::Call(call) => {
                self.resolve_expr(&mut call.receiver);
                for arg in &mut call.positional {
                    self.resolve_expr(arg);
                }
                for (_, arg) in &mut call.named {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::FfiCall { ret, args, .. } => {
                if let Some(ret) = ret {
                    self.resolve_type(ret);
                }
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Tuple(exprs) => {
                for e in exprs {
                    self.resolve_expr(e);
                }
            }
            ExprKind::Array { elem_type, elems } => {
                if let Some(ty) = elem_type {
                    self.resolve_type(ty);
                }
                for e in elems {
                    self.resolve_expr(e);
                }
            }
            ExprKind::If(node) => {
                self.scoped(|this| {
                    this.resolve_expr(&mut node.cond);
                    this.resolve_expr(&mut node.then_body);
                });
                if let Some(e) = &mut node.else_body {
                    self.scoped(|this| this.resolve_expr(e));
                }
            }
            ExprKind::IfDef(node) => {
                // The condition names build flags, not values.
                self.scoped(|this| this.resolve_expr(&mut node.then_body));
                if let Some(e) = &mut node.else_body {
                    self.scoped(|this| this.resolve_expr(e));
                }
            }
            ExprKind::IfType(node) => {
                self.resolve_type(&mut node.sub);
                self.resolve_type(&mut node.sup);
                self.scoped(|this| this.resolve_expr(&mut node.then_body));
                if let Some(e) = &mut node.else_body {
                    self.scoped(|this| this.resolve_expr(e));
                }
            }
            ExprKind::While(node) => {
                self.scoped(|this| {
                    this.resolve_expr(&mut node.cond);
                    this.resolve_expr(&mut node.body);
                });
                if let Some(e) = &mut node.else_body {
                    self.scoped(|this| this.resolve_expr(e));
                }
            }
            ExprKind::Repeat(node) => {
                // Locals from the body stay visible in the until condition.
                self.scopes.push(HashMap::new());
                if let ExprKind::Seq(exprs) = &mut node.body.kind {
                    for e in exprs {
                        self.resolve_expr(e);
                    }
                } else {
                    self.resolve_expr(&mut node.body);
                }
                self.resolve_expr(&mut node.cond);
                self.scopes.pop();

                if let Some(e) = &mut node.else_body {
                    self.scoped(|this| this.resolve_expr(e));
                }
            }
            ExprKind::Match(node) => {
                self.resolve_expr(&mut node.scrutinee);
                for case in &mut node.cases {
                    self.scoped(|this| {
                        this.resolve_expr(&mut case.pattern);
                        if let Some(guard) = &mut case.guard {
                            this.resolve_expr(guard);
                        }
                        if let Some(body) = &mut case.body {
                            this.resolve_expr(body);
                        }
                    });
                }
                if let Some(e) = &mut node.else_body {
                    self.scoped(|this| this.resolve_expr(e));
                }
            }
            ExprKind::Try {
                body,
                else_body,
                then_body,
                ..
            } => {
                self.scoped(|this| this.resolve_expr(body));
                if let Some(e) = else_body {
                    self.scoped(|this| this.resolve_expr(e));
                }
                if let Some(e) = then_body {
                    self.scoped(|this| this.resolve_expr(e));
                }
            }
            ExprKind::Recover { body, .. } => {
                self.scoped(|this| this.resolve_expr(body));
            }
            ExprKind::Consume { expr } => self.resolve_expr(expr),
            ExprKind::Assign { lhs, rhs } => {
                // Right side first: `let x = x` refers to the outer x.
                self.resolve_expr(rhs);
                self.resolve_expr(lhs);
            }
            ExprKind::Binop { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            ExprKind::Unop { expr, .. } => self.resolve_expr(expr),
            ExprKind::As { expr, ty } => {
                self.resolve_expr(expr);
                self.resolve_type(ty);
            }
            ExprKind::Break(Some(e)) | ExprKind::Return(Some(e)) => self.resolve_expr(e),
            ExprKind::This
            | ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::StringLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::ErrorExpr
            | ExprKind::CompileIntrinsic
            | ExprKind::Break(None)
            | ExprKind::Continue
            | ExprKind::Return(None)
            | ExprKind::Loc
            | ExprKind::Object { .. }
            | ExprKind::Lambda(_)
            | ExprKind::For(_)
            | ExprKind::With(_) => {}
        }
    }
}
