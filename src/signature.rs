//! Program signatures: a canonical byte rendering of the typed AST,
//! hashed to a stable identity.
//!
//! Docstrings and source positions never reach the hash, so programs that
//! differ only in comments, whitespace or documentation share a
//! signature. Entities hash in name order, packages through their own
//! digests, so module file layout does not leak into the identity.

use sha2::{Digest, Sha256};

use crate::ast::expr::*;
use crate::ast::types::Type;
use crate::ast::{Entity, EntityId, Method, PackageId, Param, Program, TypeParam, UseScheme};
use crate::interner::Interner;

pub const SIGNATURE_LENGTH: usize = 32;

pub type Signature = [u8; SIGNATURE_LENGTH];

pub fn program_signature(program: &Program, interner: &Interner) -> Signature {
    let mut hasher = Sha256::new();

    // Dependencies contribute through their own digests, in path order.
    let mut package_ids: Vec<PackageId> = program.packages.iter().map(|p| p.id).collect();
    package_ids.sort_by(|a, b| program.package(*a).path.cmp(&program.package(*b).path));

    for id in package_ids {
        let digest = package_signature(program, id, interner);
        hasher.update(program.package(id).path.as_bytes());
        hasher.update([0]);
        hasher.update(digest);
    }

    hasher.finalize().into()
}

pub fn package_signature(program: &Program, id: PackageId, interner: &Interner) -> Signature {
    let package = program.package(id);
    let mut writer = SigWriter::new(interner);

    writer.tag("package");
    writer.text(&package.path);

    // Entities in name order, independent of module layout. Hygienic
    // anonymous types keep their synthesis order inside one name.
    let mut entities: Vec<EntityId> = package
        .modules
        .iter()
        .flat_map(|m| m.entities.iter().copied())
        .collect();
    entities.sort_by(|a, b| {
        interner
            .get(program.entity(*a).name)
            .cmp(interner.get(program.entity(*b).name))
    });

    for entity in entities {
        writer.entity(program.entity(entity), program);
    }

    // FFI declarations are part of the package surface.
    for module in &package.modules {
        for use_ in &module.uses {
            if let UseScheme::Ffi(decl) = &use_.scheme {
                writer.tag("ffi");
                writer.symbol(decl.name);
                writer.type_expr(&decl.ret, program);
                for param in &decl.params {
                    writer.param(param, program);
                }
                writer.bool(decl.variadic);
                writer.bool(decl.partial);
            }
        }
    }

    writer.finish()
}

struct SigWriter<'a> {
    interner: &'a Interner,
    hasher: Sha256,
}

impl<'a> SigWriter<'a> {
    fn new(interner: &'a Interner) -> Self {
        SigWriter {
            interner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> Signature {
        self.hasher.finalize().into()
    }

    fn tag(&mut self, tag: &str) {
        self.hasher.update(tag.as_bytes());
        self.hasher.update([0xff]);
    }

    fn text(&mut self, text: &str) {
        self.hasher.update((text.len() as u64).to_le_bytes());
        self.hasher.update(text.as_bytes());
    }

    fn symbol(&mut self, sym: crate::interner::Symbol) {
        self.text(self.interner.get(sym));
    }

    fn bool(&mut self, value: bool) {
        self.hasher.update([value as u8]);
    }

    fn int(&mut self, value: i128) {
        self.hasher.update(value.to_le_bytes());
    }

    fn entity(&mut self, entity: &Entity, program: &Program) {
        self.tag("entity");
        self.text(entity.kind.describe());
        self.symbol(entity.name);

        for tp in &entity.type_params {
            self.type_param(tp, program);
        }

        if let Some(cap) = entity.default_cap {
            self.text(&cap.to_string());
        }

        for provided in &entity.provides {
            self.type_expr(provided, program);
        }
        if let Some(alias_of) = &entity.alias_of {
            self.tag("alias");
            self.type_expr(alias_of, program);
        }

        for annotation in &entity.annotations {
            self.tag("annotation");
            self.symbol(*annotation);
        }

        for field in &entity.fields {
            self.tag("field");
            self.text(match field.kind {
                crate::ast::FieldKind::Var => "var",
                crate::ast::FieldKind::Let => "let",
                crate::ast::FieldKind::Embed => "embed",
            });
            self.symbol(field.name);
            self.type_expr(&field.ty, program);
        }

        for method in &entity.methods {
            self.method(method, program);
        }
    }

    fn method(&mut self, method: &Method, program: &Program) {
        self.tag("method");
        self.text(method.kind.describe());
        if let Some(cap) = method.cap {
            self.text(&cap.to_string());
        }
        self.symbol(method.name);

        for tp in &method.type_params {
            self.type_param(tp, program);
        }
        for param in &method.params {
            self.param(param, program);
        }
        if let Some(ret) = &method.ret {
            self.type_expr(ret, program);
        }
        self.bool(method.partial);

        // Inherited bodies hash on the donor; rehashing them here would
        // make the signature depend on flattening order.
        if method.inherited_from.is_some() {
            self.tag("inherited");
            return;
        }

        if let Some(body) = &method.body {
            self.expr(body, program);
        }
    }

    fn type_param(&mut self, tp: &TypeParam, program: &Program) {
        self.tag("typeparam");
        self.symbol(tp.name);
        if let Some(constraint) = &tp.constraint {
            self.type_expr(constraint, program);
        }
        if let Some(default) = &tp.default {
            self.type_expr(default, program);
        }
    }

    fn param(&mut self, param: &Param, program: &Program) {
        self.tag("param");
        self.symbol(param.name);
        self.type_expr(&param.ty, program);
        if let Some(default) = &param.default {
            self.expr(default, program);
        }
    }

    /// A nominal hashes as its defining package path plus name, so entity
    /// ids (which depend on load order) stay out of the digest.
    fn type_expr(&mut self, ty: &Type, program: &Program) {
        match ty {
            Type::Nominal(nominal) => {
                self.tag("nominal");
                match nominal.entity {
                    Some(id) => {
                        let entity = program.entity(id);
                        self.text(&program.package(entity.package).path);
                        self.symbol(entity.name);
                    }
                    None => self.symbol(nominal.name),
                }
                for arg in &nominal.args {
                    self.type_expr(arg, program);
                }
                if let Some(cap) = nominal.cap {
                    self.text(&cap.to_string());
                }
                self.text(&nominal.eph.to_string());
            }
            Type::Union(types) => {
                self.tag("union");
                for t in types {
                    self.type_expr(t, program);
                }
            }
            Type::Isect(types) => {
                self.tag("isect");
                for t in types {
                    self.type_expr(t, program);
                }
            }
            Type::Tuple(types) => {
                self.tag("tuple");
                for t in types {
                    self.type_expr(t, program);
                }
            }
            Type::Arrow { left, right } => {
                self.tag("arrow");
                self.type_expr(left, program);
                self.type_expr(right, program);
            }
            Type::This { .. } => self.tag("this-type"),
            Type::TypeParamRef { name, cap, eph, .. } => {
                self.tag("typeparamref");
                self.symbol(*name);
                if let Some(cap) = cap {
                    self.text(&cap.to_string());
                }
                self.text(&eph.to_string());
            }
            Type::Fun {
                cap,
                params,
                ret,
                partial,
                ..
            } => {
                self.tag("fun");
                self.text(&cap.to_string());
                for p in params {
                    self.type_expr(p, program);
                }
                self.type_expr(ret, program);
                self.bool(*partial);
            }
            Type::DontCare { .. } => self.tag("dontcare"),
        }
    }

    fn expr(&mut self, expr: &Expr, program: &Program) {
        match &expr.kind {
            ExprKind::Seq(exprs) => {
                self.tag("seq");
                for e in exprs {
                    self.expr(e, program);
                }
                self.tag("end");
            }
            ExprKind::Reference { name, .. } => {
                self.tag("ref");
                self.symbol(*name);
            }
            ExprKind::This => self.tag("this"),
            ExprKind::Tuple(exprs) => {
                self.tag("tuple");
                for e in exprs {
                    self.expr(e, program);
                }
                self.tag("end");
            }
            ExprKind::Array { elem_type, elems } => {
                self.tag("array");
                if let Some(ty) = elem_type {
                    self.type_expr(ty, program);
                }
                for e in elems {
                    self.expr(e, program);
                }
                self.tag("end");
            }
            ExprKind::Dot { expr: inner, member } => {
                self.tag("dot");
                self.expr(inner, program);
                self.symbol(*member);
            }
            ExprKind::Qualify { expr: inner, args } => {
                self.tag("qualify");
                self.expr(inner, program);
                for arg in args {
                    self.type_expr(arg, program);
                }
            }
            ExprKind::Call(call) => {
                self.tag("call");
                self.expr(&call.receiver, program);
                for arg in &call.positional {
                    self.expr(arg, program);
                }
                for (name, arg) in &call.named {
                    self.symbol(*name);
                    self.expr(arg, program);
                }
                self.bool(call.partial);
                self.tag("end");
            }
            ExprKind::FfiCall { name, args, partial, .. } => {
                self.tag("fficall");
                self.symbol(*name);
                for arg in args {
                    self.expr(arg, program);
                }
                self.bool(*partial);
                self.tag("end");
            }
            ExprKind::Binop { op, lhs, rhs } => {
                self.tag("binop");
                self.text(op.symbol());
                self.expr(lhs, program);
                self.expr(rhs, program);
            }
            ExprKind::If(node) | ExprKind::IfDef(node) => {
                self.tag(if matches!(expr.kind, ExprKind::If(_)) {
                    "if"
                } else {
                    "ifdef"
                });
                self.expr(&node.cond, program);
                self.expr(&node.then_body, program);
                if let Some(e) = &node.else_body {
                    self.expr(e, program);
                }
                self.tag("end");
            }
            ExprKind::IfType(node) => {
                self.tag("iftype");
                self.type_expr(&node.sub, program);
                self.type_expr(&node.sup, program);
                self.expr(&node.then_body, program);
                if let Some(e) = &node.else_body {
                    self.expr(e, program);
                }
                self.tag("end");
            }
            ExprKind::While(node) | ExprKind::Repeat(node) => {
                self.tag(if matches!(expr.kind, ExprKind::While(_)) {
                    "while"
                } else {
                    "repeat"
                });
                self.expr(&node.cond, program);
                self.expr(&node.body, program);
                if let Some(e) = &node.else_body {
                    self.expr(e, program);
                }
                self.tag("end");
            }
            ExprKind::Match(node) => {
                self.tag("match");
                self.expr(&node.scrutinee, program);
                for case in &node.cases {
                    self.tag("case");
                    self.expr(&case.pattern, program);
                    if let Some(guard) = &case.guard {
                        self.expr(guard, program);
                    }
                    if let Some(body) = &case.body {
                        self.expr(body, program);
                    }
                }
                if let Some(e) = &node.else_body {
                    self.expr(e, program);
                }
                self.tag("end");
            }
            ExprKind::Try {
                body,
                else_body,
                then_body,
                no_check,
            } => {
                self.tag("try");
                self.bool(*no_check);
                self.expr(body, program);
                if let Some(e) = else_body {
                    self.expr(e, program);
                }
                if let Some(e) = then_body {
                    self.expr(e, program);
                }
                self.tag("end");
            }
            ExprKind::Recover { cap, body } => {
                self.tag("recover");
                if let Some(cap) = cap {
                    self.text(&cap.to_string());
                }
                self.expr(body, program);
            }
            ExprKind::Consume { expr: inner } => {
                self.tag("consume");
                self.expr(inner, program);
            }
            ExprKind::Assign { lhs, rhs } => {
                self.tag("assign");
                self.expr(lhs, program);
                self.expr(rhs, program);
            }
            ExprKind::Local { kind, name, ty, .. } => {
                self.tag(match kind {
                    LocalKind::Let => "let",
                    LocalKind::Var => "var",
                });
                self.symbol(*name);
                if let Some(ty) = ty {
                    self.type_expr(ty, program);
                }
            }
            ExprKind::MatchCapture { name, ty, .. } => {
                self.tag("capture");
                self.symbol(*name);
                self.type_expr(ty, program);
            }
            ExprKind::IntLit(value) => {
                self.tag("int");
                self.int(*value);
            }
            ExprKind::FloatLit(value) => {
                self.tag("float");
                self.hasher.update(value.to_le_bytes());
            }
            ExprKind::StringLit(sym) => {
                self.tag("string");
                self.symbol(*sym);
            }
            ExprKind::BoolLit(value) => {
                self.tag("bool");
                self.bool(*value);
            }
            ExprKind::ErrorExpr => self.tag("error"),
            ExprKind::CompileIntrinsic => self.tag("intrinsic"),
            ExprKind::Break(value) => {
                self.tag("break");
                if let Some(v) = value {
                    self.expr(v, program);
                }
            }
            ExprKind::Continue => self.tag("continue"),
            ExprKind::Return(value) => {
                self.tag("return");
                if let Some(v) = value {
                    self.expr(v, program);
                }
            }
            ExprKind::Unop { .. }
            | ExprKind::As { .. }
            | ExprKind::Object { .. }
            | ExprKind::Lambda(_)
            | ExprKind::For(_)
            | ExprKind::With(_)
            | ExprKind::Loc => {
                // Gone after sugar; nothing stable to hash.
                self.tag("surface");
            }
        }
    }
}

pub fn to_hex(signature: &Signature) -> String {
    signature.iter().map(|b| format!("{b:02x}")).collect()
}
