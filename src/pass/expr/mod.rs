//! The expr pass: bidirectional type inference under the reference
//! capability discipline.
//!
//! Types flow bottom-up; an antecedent (expected type) flows top-down at
//! the positions that fix one: assignment right-hand sides, arguments,
//! returns, literal elements. Literals stay polymorphic until an
//! antecedent lands on them.

pub mod cap;
pub mod matchtype;
pub mod subtype;

use std::collections::HashMap;

use crate::ast::expr::*;
use crate::ast::types::{Cap, Eph, Nominal, Type};
use crate::ast::{
    Def, EntityId, EntityKind, FieldKind, LocalId, Method, MethodKind, PackageId, Program,
    UseScheme,
};
use crate::interner::{Interner, Symbol};
use crate::reporter::{DiagnosticKind, Reporter};
use crate::session::Names;
use crate::source::Span;
use crate::target::{self, Target};

use self::matchtype::{CaseShape, MatchResult};
use super::{Context, PassResult};

pub fn run(program: &mut Program, ctx: &mut Context) -> PassResult {
    for index in 0..program.entities.len() {
        entity(program, ctx, EntityId(index));
    }

    PassResult::Ok
}

pub fn entity(program: &mut Program, ctx: &mut Context, id: EntityId) -> PassResult {
    for index in 0..program.entity(id).methods.len() {
        if program.entity(id).methods[index].inherited_from.is_some() {
            // Inherited bodies were checked on their donor.
            continue;
        }

        check_method(program, ctx, id, index);
    }

    PassResult::Ok
}

fn check_method(program: &mut Program, ctx: &mut Context, id: EntityId, index: usize) {
    let mut method = std::mem::replace(
        &mut program.entity_mut(id).methods[index],
        Method::new(MethodKind::Function, ctx.session.names.create, Span::default()),
    );

    {
        let module = program
            .package(program.entity(id).package)
            .modules
            .iter()
            .position(|m| m.entities.contains(&id))
            .unwrap_or(0);

        let mut typer = Typer {
            program,
            reporter: &mut ctx.session.reporter,
            interner: &ctx.session.interner,
            names: ctx.session.names,
            target: &ctx.session.target,
            entity: id,
            package: program.entity(id).package,
            module,
            method_kind: method.kind,
            method_cap: method.cap.unwrap_or(Cap::Box),
            method_partial: method.partial,
            method_ret: method.ret.clone(),
            params: method.params.clone(),
            locals: HashMap::new(),
            recover_barrier: None,
            try_depth: 0,
            loop_depth: 0,
        };

        // Parameter defaults are checked against their parameter type.
        for param in &mut method.params {
            if let Some(default) = &mut param.default {
                let ty = param.ty.clone();
                let _ = typer.infer(default, Some(&ty));
            }
        }

        if let Some(body) = &mut method.body {
            let antecedent = match method.kind {
                MethodKind::Function => method.ret.clone(),
                // Constructor and behaviour body values are discarded.
                _ => None,
            };

            if let Ok(body_ty) = typer.infer(body, antecedent.as_ref()) {
                if method.kind == MethodKind::Function {
                    if let Some(ret) = &method.ret {
                        if !subtype::is_subtype(typer.program, &body_ty, ret) {
                            typer.type_mismatch(body.span, ret, &body_ty);
                        }
                    }
                }
            }
        }
    }

    program.entity_mut(id).methods[index] = method;
}

struct Typer<'a> {
    program: &'a Program,
    reporter: &'a mut Reporter,
    interner: &'a Interner,
    names: Names,
    target: &'a Target,
    entity: EntityId,
    package: PackageId,
    module: usize,
    method_kind: MethodKind,
    method_cap: Cap,
    method_partial: bool,
    method_ret: Option<Type>,
    params: Vec<crate::ast::Param>,
    locals: HashMap<LocalId, LocalInfo>,
    /// Locals declared before this id are outside the innermost recover
    /// block and may only be touched when sendable.
    recover_barrier: Option<u32>,
    try_depth: usize,
    loop_depth: usize,
}

#[derive(Clone)]
struct LocalInfo {
    name: Symbol,
    kind: LocalKind,
    ty: Option<Type>,
}

impl<'a> Typer<'a> {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.reporter
            .error(DiagnosticKind::Semantic, span, message.into());
    }

    fn type_mismatch(&mut self, span: Span, expected: &Type, actual: &Type) {
        let expected = self.describe(expected);
        let actual = self.describe(actual);
        self.error(span, format!("expected {expected}, got {actual}"));
    }

    fn describe(&self, ty: &Type) -> String {
        let mut printer = crate::ast::pretty::Printer::new(self.interner);
        printer.type_expr(ty);
        printer.into_text()
    }

    /// The type of `this` inside the current method.
    fn this_type(&self) -> Type {
        let entity = self.program.entity(self.entity);
        let mut nominal = Nominal::new(entity.name, entity.span);
        nominal.entity = Some(self.entity);
        nominal.cap = Some(self.method_cap);
        nominal.args = entity
            .type_params
            .iter()
            .enumerate()
            .map(|(index, tp)| Type::TypeParamRef {
                name: tp.name,
                cap: None,
                eph: Eph::None,
                def: Some((false, index)),
                span: tp.span,
            })
            .collect();
        Type::Nominal(nominal)
    }

    fn bool_type(&self, span: Span) -> Type {
        self.builtin_type(self.names.bool_type, span)
    }

    fn none_type(&self, span: Span) -> Type {
        self.builtin_type(self.names.none_type, span)
    }

    fn builtin_type(&self, name: Symbol, span: Span) -> Type {
        let mut nominal = Nominal::new(name, span);
        nominal.entity = self
            .program
            .builtin
            .and_then(|b| self.program.find_entity(b, name));
        Type::Nominal(nominal)
    }

    fn is_numeric(&self, nominal: &Nominal) -> bool {
        let Some(id) = nominal.entity else {
            return false;
        };
        if Some(self.program.entity(id).package) != self.program.builtin {
            return false;
        }

        matches!(
            self.interner.get(nominal.name),
            "I8" | "I16" | "I32" | "I64" | "I128" | "ISize" | "U8" | "U16" | "U32" | "U64"
                | "U128" | "USize" | "F32" | "F64"
        )
    }

    fn is_float(&self, nominal: &Nominal) -> bool {
        matches!(self.interner.get(nominal.name), "F32" | "F64")
    }

    /// A further alias of a value of this type.
    fn alias_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Nominal(nominal) => {
                if nominal.eph == Eph::Ephemeral {
                    Type::Nominal(Nominal {
                        eph: Eph::None,
                        ..nominal.clone()
                    })
                } else {
                    let aliased = cap::alias(subtype::nominal_cap(self.program, nominal));
                    Type::Nominal(Nominal {
                        cap: Some(aliased),
                        eph: Eph::None,
                        ..nominal.clone()
                    })
                }
            }
            Type::TypeParamRef { name, cap: Some(c), eph, def, span } => {
                if *eph == Eph::Ephemeral {
                    Type::TypeParamRef {
                        name: *name,
                        cap: Some(*c),
                        eph: Eph::None,
                        def: *def,
                        span: *span,
                    }
                } else {
                    Type::TypeParamRef {
                        name: *name,
                        cap: Some(cap::alias(*c)),
                        eph: Eph::None,
                        def: *def,
                        span: *span,
                    }
                }
            }
            Type::Union(types) => Type::union(types.iter().map(|t| self.alias_type(t)).collect()),
            Type::Tuple(types) => {
                Type::Tuple(types.iter().map(|t| self.alias_type(t)).collect())
            }
            other => other.clone(),
        }
    }

    /// The type a binding site stores: ephemerality is used up.
    fn bind_type(&self, ty: &Type) -> Type {
        ty.clone().with_eph(Eph::None)
    }

    fn is_sendable_type(&self, ty: &Type) -> bool {
        match ty {
            Type::Nominal(nominal) => cap::is_sendable(subtype::nominal_cap(self.program, nominal)),
            Type::TypeParamRef { cap: Some(c), .. } => cap::is_sendable(*c),
            Type::TypeParamRef { cap: None, .. } => false,
            Type::Union(types) | Type::Isect(types) | Type::Tuple(types) => {
                types.iter().all(|t| self.is_sendable_type(t))
            }
            Type::Fun { cap, .. } => cap::is_sendable(*cap),
            Type::DontCare { .. } => true,
            _ => false,
        }
    }

    /// Viewpoint-adapt a member type as seen through `origin`.
    fn adapt(&mut self, origin: Cap, ty: &Type, span: Span) -> Result<Type, ()> {
        match ty {
            Type::Nominal(nominal) => {
                let field_cap = subtype::nominal_cap(self.program, nominal);
                match cap::viewpoint(origin, field_cap) {
                    Some(adapted) => Ok(Type::Nominal(Nominal {
                        cap: Some(adapted),
                        ..nominal.clone()
                    })),
                    None => {
                        self.error(span, format!("cannot read this field through {origin}"));
                        Err(())
                    }
                }
            }
            Type::TypeParamRef { name, cap: c, eph, def, span: tspan } => {
                let field_cap = c.unwrap_or(Cap::Any);
                match cap::viewpoint(origin, field_cap) {
                    Some(adapted) => Ok(Type::TypeParamRef {
                        name: *name,
                        cap: Some(adapted),
                        eph: *eph,
                        def: *def,
                        span: *tspan,
                    }),
                    None => {
                        self.error(span, format!("cannot read this field through {origin}"));
                        Err(())
                    }
                }
            }
            Type::Union(types) => {
                let mut adapted = vec![];
                for t in types {
                    adapted.push(self.adapt(origin, t, span)?);
                }
                Ok(Type::union(adapted))
            }
            Type::Tuple(types) => {
                let mut adapted = vec![];
                for t in types {
                    adapted.push(self.adapt(origin, t, span)?);
                }
                Ok(Type::Tuple(adapted))
            }
            Type::Arrow { left, right } => {
                // `this->T` adapts through the receiver that reaches it.
                match left.as_ref() {
                    Type::This { .. } => self.adapt(origin, right, span),
                    _ => self.adapt(origin, right, span),
                }
            }
            other => Ok(other.clone()),
        }
    }

    fn done(&mut self, expr: &mut Expr, ty: Type) -> Result<Type, ()> {
        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn infer(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;

        match &mut expr.kind {
            ExprKind::Seq(_) => self.infer_seq(expr, antecedent),
            ExprKind::IntLit(_) => {
                let ty = self.literal_type(antecedent, span, false)?;
                self.done(expr, ty)
            }
            ExprKind::FloatLit(_) => {
                let ty = self.literal_type(antecedent, span, true)?;
                self.done(expr, ty)
            }
            ExprKind::StringLit(_) => {
                let ty = self.builtin_type(self.names.string_type, span);
                self.done(expr, ty)
            }
            ExprKind::BoolLit(_) => {
                let ty = self.bool_type(span);
                self.done(expr, ty)
            }
            ExprKind::This => {
                if self.recover_barrier.is_some() && !cap::is_sendable(self.method_cap) {
                    self.error(span, "cannot access this inside a recover expression");
                    return Err(());
                }
                let ty = self.this_type();
                self.done(expr, ty)
            }
            ExprKind::Reference { .. } => self.infer_reference(expr),
            ExprKind::Local { .. } => self.infer_local_decl(expr),
            ExprKind::Dot { .. } => self.infer_field_read(expr),
            ExprKind::Qualify { .. } => {
                // Bare type application outside a call; treat like the
                // reference itself.
                let inner_ty = {
                    let ExprKind::Qualify { expr: inner, .. } = &mut expr.kind else {
                        unreachable!()
                    };
                    self.infer(inner, None)?
                };
                self.done(expr, inner_ty)
            }
            ExprKind::Call(_) => self.infer_call(expr, antecedent),
            ExprKind::FfiCall { .. } => self.infer_ffi_call(expr),
            ExprKind::Tuple(_) => self.infer_tuple(expr, antecedent),
            ExprKind::Array { .. } => self.infer_array(expr, antecedent),
            ExprKind::Binop { op, lhs, rhs } => {
                // Only identity comparison survives sugar.
                debug_assert!(op.method_name().is_none());
                let _ = self.infer(lhs, None)?;
                let _ = self.infer(rhs, None)?;
                let ty = self.bool_type(span);
                self.done(expr, ty)
            }
            ExprKind::Consume { .. } => self.infer_consume(expr),
            ExprKind::Recover { .. } => self.infer_recover(expr, antecedent),
            ExprKind::Assign { .. } => self.infer_assign(expr),
            ExprKind::If(_) => self.infer_if(expr, antecedent),
            ExprKind::IfDef(_) => self.infer_ifdef(expr, antecedent),
            ExprKind::IfType(_) => self.infer_iftype(expr, antecedent),
            ExprKind::While(_) | ExprKind::Repeat(_) => self.infer_loop(expr, antecedent),
            ExprKind::Match(_) => self.infer_match(expr, antecedent),
            ExprKind::Try { .. } => self.infer_try(expr, antecedent),
            ExprKind::ErrorExpr => {
                self.raise_error(span);
                self.done(expr, Type::DontCare { span })
            }
            ExprKind::CompileIntrinsic => self.done(expr, Type::DontCare { span }),
            ExprKind::Break(value) => {
                if self.loop_depth == 0 {
                    self.error(span, "break must appear inside a loop");
                }
                if let Some(value) = value {
                    let mut value = std::mem::replace(
                        value,
                        Box::new(Expr::new(ExprKind::Continue, span)),
                    );
                    let _ = self.infer(&mut value, None);
                    let ExprKind::Break(slot) = &mut expr.kind else {
                        unreachable!()
                    };
                    *slot = Some(value);
                }
                self.done(expr, Type::DontCare { span })
            }
            ExprKind::Continue => {
                if self.loop_depth == 0 {
                    self.error(span, "continue must appear inside a loop");
                }
                self.done(expr, Type::DontCare { span })
            }
            ExprKind::Return(value) => {
                let ret = self.method_ret.clone();
                if let Some(value) = value {
                    let mut value = std::mem::replace(
                        value,
                        Box::new(Expr::new(ExprKind::Continue, span)),
                    );
                    if let Ok(ty) = self.infer(&mut value, ret.as_ref()) {
                        if let Some(ret) = &ret {
                            if self.method_kind == MethodKind::Function
                                && !subtype::is_subtype(self.program, &ty, ret)
                            {
                                self.type_mismatch(span, ret, &ty);
                            }
                        }
                    }
                    let ExprKind::Return(slot) = &mut expr.kind else {
                        unreachable!()
                    };
                    *slot = Some(value);
                }
                self.done(expr, Type::DontCare { span })
            }
            ExprKind::MatchCapture { .. } => {
                // Only reachable as a pattern; handled by infer_pattern.
                self.error(span, "a capture is only legal inside a match pattern");
                Err(())
            }
            ExprKind::Object { .. }
            | ExprKind::Lambda(_)
            | ExprKind::For(_)
            | ExprKind::With(_)
            | ExprKind::As { .. }
            | ExprKind::Unop { .. }
            | ExprKind::Loc => {
                self.reporter.error(
                    DiagnosticKind::Internal,
                    span,
                    "surface form survived the sugar pass",
                );
                Err(())
            }
        }
    }

    fn infer_seq(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::Seq(exprs) = &mut expr.kind else {
            unreachable!()
        };

        let mut taken = std::mem::take(exprs);
        let count = taken.len();
        let mut last_ty = self.none_type(span);
        let mut failed = false;

        for (index, child) in taken.iter_mut().enumerate() {
            let wanted = if index + 1 == count { antecedent } else { None };
            match self.infer(child, wanted) {
                Ok(ty) => last_ty = ty,
                Err(()) => failed = true,
            }
        }

        let ExprKind::Seq(exprs) = &mut expr.kind else {
            unreachable!()
        };
        *exprs = taken;

        if failed {
            return Err(());
        }
        self.done(expr, last_ty)
    }

    fn literal_type(
        &mut self,
        antecedent: Option<&Type>,
        span: Span,
        float: bool,
    ) -> Result<Type, ()> {
        let Some(antecedent) = antecedent else {
            self.error(span, "could not infer the type of this literal");
            return Err(());
        };

        for member in antecedent.union_members() {
            if let Type::Nominal(nominal) = member {
                if self.is_numeric(nominal) && (!float || self.is_float(nominal)) {
                    return Ok(Type::Nominal(Nominal {
                        eph: Eph::None,
                        cap: Some(Cap::Val),
                        ..nominal.clone()
                    }));
                }
            }
        }

        self.error(span, "could not infer the type of this literal");
        Err(())
    }

    fn check_recover_barrier(&mut self, local: LocalId, ty: &Type, name: Symbol, span: Span) {
        let Some(barrier) = self.recover_barrier else {
            return;
        };

        if local.0 < barrier && !self.is_sendable_type(ty) {
            self.error(
                span,
                format!(
                    "cannot access non-sendable '{}' from inside a recover expression",
                    self.interner.get(name)
                ),
            );
        }
    }

    fn infer_reference(&mut self, expr: &mut Expr) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::Reference { name, def } = &expr.kind else {
            unreachable!()
        };
        let name = *name;

        match def {
            None => {
                // The don't-care reference has no readable value.
                self.error(span, "cannot read from '_'");
                Err(())
            }
            Some(Def::Local(local)) => {
                let local = *local;
                let Some(info) = self.locals.get(&local).cloned() else {
                    self.error(
                        span,
                        format!("'{}' is used before a value is assigned", self.interner.get(name)),
                    );
                    return Err(());
                };
                let Some(ty) = info.ty else {
                    self.error(
                        span,
                        format!("'{}' is used before a value is assigned", self.interner.get(name)),
                    );
                    return Err(());
                };

                self.check_recover_barrier(local, &ty, name, span);
                let ty = self.alias_type(&ty);
                self.done(expr, ty)
            }
            Some(Def::Param { index }) => {
                let ty = self.params[*index].ty.clone();
                if self.recover_barrier.is_some() && !self.is_sendable_type(&ty) {
                    self.error(
                        span,
                        format!(
                            "cannot access non-sendable '{}' from inside a recover expression",
                            self.interner.get(name)
                        ),
                    );
                }
                let ty = self.alias_type(&ty);
                self.done(expr, ty)
            }
            Some(Def::Field { entity, index }) => {
                if self.recover_barrier.is_some() && !cap::is_sendable(self.method_cap) {
                    self.error(
                        span,
                        "cannot access a field from inside a recover expression",
                    );
                    return Err(());
                }

                let field_ty = self.program.entity(*entity).fields[*index].ty.clone();
                let adapted = self.adapt(self.method_cap, &field_ty, span)?;
                let ty = self.alias_type(&adapted);
                self.done(expr, ty)
            }
            Some(Def::Entity(id)) => {
                let id = *id;
                let entity = self.program.entity(id);

                match entity.kind {
                    EntityKind::Primitive => {
                        let mut nominal = Nominal::new(entity.name, span);
                        nominal.entity = Some(id);
                        nominal.cap = Some(Cap::Val);
                        let ty = Type::Nominal(nominal);
                        self.done(expr, ty)
                    }
                    EntityKind::Class | EntityKind::Actor | EntityKind::Struct => {
                        // A bare type in value position is a call to its
                        // default constructor.
                        let receiver = std::mem::replace(
                            expr,
                            Expr::new(ExprKind::Continue, span),
                        );
                        *expr = crate::ast::builder::call(
                            crate::ast::builder::dot(receiver, self.names.create, span),
                            vec![],
                            span,
                        );
                        self.infer_call(expr, None)
                    }
                    _ => {
                        self.error(
                            span,
                            format!(
                                "{} '{}' is not a value",
                                entity.kind.describe(),
                                self.interner.get(entity.name)
                            ),
                        );
                        Err(())
                    }
                }
            }
            Some(Def::Method { .. }) => {
                // An unapplied method; calls are intercepted earlier.
                self.error(span, "a method must be called");
                Err(())
            }
            Some(Def::TypeParam { .. }) => {
                self.error(span, "a type parameter is not a value");
                Err(())
            }
            Some(Def::Package(_)) => {
                self.error(span, "a package name is not a value");
                Err(())
            }
        }
    }

    fn infer_local_decl(&mut self, expr: &mut Expr) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::Local { kind, name, ty, id } = &expr.kind else {
            unreachable!()
        };

        if let Some(id) = id {
            self.locals.insert(
                *id,
                LocalInfo {
                    name: *name,
                    kind: *kind,
                    ty: ty.clone(),
                },
            );
        }

        // A bare declaration has no value; as an assignment target the
        // assign case handles it before getting here.
        self.done(expr, Type::DontCare { span })
    }

    /// The members of a receiver type: the defining entity plus the type
    /// arguments to reify its signatures with.
    fn receiver_entity(&mut self, ty: &Type, span: Span) -> Result<(EntityId, Vec<Type>, Cap), ()> {
        match ty {
            Type::Nominal(nominal) => {
                let Some(id) = nominal.entity else {
                    return Err(());
                };
                if self.program.entity(id).kind == EntityKind::Alias {
                    let expanded = self
                        .program
                        .entity(id)
                        .alias_of
                        .clone()
                        .unwrap_or(Type::DontCare { span });
                    return self.receiver_entity(&expanded, span);
                }
                Ok((
                    id,
                    nominal.args.clone(),
                    subtype::nominal_cap(self.program, nominal),
                ))
            }
            Type::TypeParamRef { cap, def, .. } => {
                let constraint = self.type_param_constraint(*def);
                match constraint {
                    Some(constraint) => {
                        let (id, args, ccap) = self.receiver_entity(&constraint, span)?;
                        Ok((id, args, cap.unwrap_or(ccap)))
                    }
                    None => {
                        self.error(span, "this type parameter has no usable constraint");
                        Err(())
                    }
                }
            }
            Type::Isect(types) => {
                for t in types {
                    if let Ok(found) = self.receiver_entity(t, span) {
                        return Ok(found);
                    }
                }
                Err(())
            }
            _ => {
                let shown = self.describe(ty);
                self.error(span, format!("{shown} has no members"));
                Err(())
            }
        }
    }

    fn type_param_constraint(&self, def: Option<(bool, usize)>) -> Option<Type> {
        let (method_level, index) = def?;
        let entity = self.program.entity(self.entity);

        let param = if method_level {
            // The current method's type parameters were cloned into the
            // typer state via `params`' owner; look them up on the entity.
            return None;
        } else {
            entity.type_params.get(index)?
        };

        param.constraint.clone()
    }

    fn find_method(
        &self,
        entity: EntityId,
        name: Symbol,
    ) -> Option<(usize, &Method)> {
        self.program.entity(entity).find_method(name)
    }

    fn infer_field_read(&mut self, expr: &mut Expr) -> Result<Type, ()> {
        let span = expr.span;

        let (receiver_ty, member) = {
            let ExprKind::Dot { expr: inner, member } = &mut expr.kind else {
                unreachable!()
            };
            (self.infer(inner, None)?, *member)
        };

        let (entity, args, receiver_cap) = self.receiver_entity(&receiver_ty, span)?;
        let entity_ref = self.program.entity(entity);

        if let Some((_, field)) = entity_ref.find_field(member) {
            if receiver_cap == Cap::Tag {
                self.error(span, "cannot read a field through tag");
                return Err(());
            }

            let field_ty =
                subtype::reify(&field.ty, &entity_ref.type_params, &args, false);
            let adapted = self.adapt(receiver_cap, &field_ty, span)?;
            let ty = self.alias_type(&adapted);
            return self.done(expr, ty);
        }

        if let Some((_, method)) = self.find_method(entity, member) {
            let ty = Type::Fun {
                cap: method.cap.unwrap_or(Cap::Box),
                params: method.params.iter().map(|p| p.ty.clone()).collect(),
                ret: Box::new(method.ret.clone().unwrap_or(Type::DontCare { span })),
                partial: method.partial,
                span,
            };
            return self.done(expr, ty);
        }

        self.member_not_found(entity, member, span);
        Err(())
    }

    fn member_not_found(&mut self, entity: EntityId, member: Symbol, span: Span) {
        self.error(
            span,
            format!(
                "'{}' has no member '{}'",
                self.interner.get(self.program.entity(entity).name),
                self.interner.get(member)
            ),
        );
    }

    fn raise_error(&mut self, span: Span) {
        if self.try_depth == 0 && !self.method_partial {
            self.error(
                span,
                "an error here cannot be handled; enclose it in a try or mark the method partial",
            );
        }
    }

    fn infer_consume(&mut self, expr: &mut Expr) -> Result<Type, ()> {
        let span = expr.span;

        let inner_ty = {
            let ExprKind::Consume { expr: inner } = &mut expr.kind else {
                unreachable!()
            };

            match &inner.kind {
                ExprKind::Reference { name, def } => match def {
                    Some(Def::Local(local)) => {
                        let info = self.locals.get(local).cloned();
                        match info.and_then(|i| i.ty) {
                            Some(ty) => {
                                inner.ty = Some(ty.clone());
                                ty
                            }
                            None => {
                                let text = self.interner.get(*name).to_string();
                                self.error(
                                    span,
                                    format!("'{text}' is consumed before a value is assigned"),
                                );
                                return Err(());
                            }
                        }
                    }
                    Some(Def::Param { index }) => {
                        let ty = self.params[*index].ty.clone();
                        inner.ty = Some(ty.clone());
                        ty
                    }
                    Some(Def::Field { entity, index }) => {
                        // The refer pass checks the same-expression
                        // reassignment; here only the type matters.
                        let field = &self.program.entity(*entity).fields[*index];
                        if field.kind != FieldKind::Var {
                            self.error(span, "only var fields can be consumed");
                            return Err(());
                        }
                        let ty = field.ty.clone();
                        inner.ty = Some(ty.clone());
                        ty
                    }
                    _ => {
                        self.error(span, "consume must name a local, parameter or field");
                        return Err(());
                    }
                },
                ExprKind::This => {
                    let ty = self.this_type();
                    inner.ty = Some(ty.clone());
                    ty
                }
                _ => {
                    self.error(span, "consume must name a local, parameter or field");
                    return Err(());
                }
            }
        };

        let ty = inner_ty.with_eph(Eph::Ephemeral);
        self.done(expr, ty)
    }

    fn infer_recover(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::Recover { cap: wanted, body } = &mut expr.kind else {
            unreachable!()
        };
        let wanted = wanted.unwrap_or(Cap::Iso);

        let mut body = std::mem::replace(body, Box::new(Expr::new(ExprKind::Continue, span)));

        let saved = self.recover_barrier;
        let barrier = self.locals.keys().map(|l| l.0 + 1).max().unwrap_or(0);
        self.recover_barrier = Some(saved.map_or(barrier, |b| b.min(barrier)));

        let inner = antecedent.cloned();
        let result = self.infer(&mut body, inner.as_ref());

        self.recover_barrier = saved;

        let ExprKind::Recover { body: slot, .. } = &mut expr.kind else {
            unreachable!()
        };
        *slot = body;

        let body_ty = result?;
        let ty = body_ty.with_cap(wanted, Eph::Ephemeral);
        self.done(expr, ty)
    }

    fn infer_assign(&mut self, expr: &mut Expr) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::Assign { lhs, rhs } = &mut expr.kind else {
            unreachable!()
        };

        let mut lhs = std::mem::replace(lhs, Box::new(Expr::new(ExprKind::Continue, span)));
        let mut rhs = std::mem::replace(rhs, Box::new(Expr::new(ExprKind::Continue, span)));

        let result = self.infer_assign_parts(&mut lhs, &mut rhs, span);

        let ExprKind::Assign { lhs: lslot, rhs: rslot } = &mut expr.kind else {
            unreachable!()
        };
        *lslot = lhs;
        *rslot = rhs;

        let ty = result?;
        self.done(expr, ty)
    }

    fn infer_assign_parts(
        &mut self,
        lhs: &mut Expr,
        rhs: &mut Expr,
        span: Span,
    ) -> Result<Type, ()> {
        match &mut lhs.kind {
            ExprKind::Local { kind, name, ty, id } => {
                let declared = ty.clone();
                let name = *name;
                let id = *id;
                let kind = *kind;

                let rhs_ty = self.infer(rhs, declared.as_ref())?;

                let stored = match &declared {
                    Some(declared) => {
                        if !subtype::is_subtype(self.program, &rhs_ty, declared) {
                            self.auto_recover(rhs, &rhs_ty, declared, span)?
                        } else {
                            declared.clone()
                        }
                    }
                    None => self.bind_type(&rhs_ty),
                };

                if let Some(id) = id {
                    self.locals.insert(
                        id,
                        LocalInfo {
                            name,
                            kind,
                            ty: Some(stored.clone()),
                        },
                    );
                }
                lhs.ty = Some(stored);

                Ok(self.none_type(span))
            }
            ExprKind::Tuple(elems) => {
                let rhs_ty = self.infer(rhs, None)?;
                let Type::Tuple(member_types) = &rhs_ty else {
                    let shown = self.describe(&rhs_ty);
                    self.error(span, format!("cannot destructure {shown} into a tuple"));
                    return Err(());
                };

                if member_types.len() != elems.len() {
                    self.error(span, "tuple arity mismatch in destructuring assignment");
                    return Err(());
                }

                let member_types = member_types.clone();
                let mut elems_taken = std::mem::take(elems);
                for (elem, member_ty) in elems_taken.iter_mut().zip(member_types.iter()) {
                    self.bind_tuple_element(elem, member_ty, span)?;
                }
                let ExprKind::Tuple(slot) = &mut lhs.kind else {
                    unreachable!()
                };
                *slot = elems_taken;

                Ok(self.none_type(span))
            }
            ExprKind::Reference { name, def } => {
                let name = *name;
                match def {
                    None => {
                        // Assignment to the don't-care name discards.
                        let _ = self.infer(rhs, None)?;
                        Ok(self.none_type(span))
                    }
                    Some(Def::Local(local)) => {
                        let local = *local;
                        let info = self.locals.get(&local).cloned();
                        let Some(info) = info else {
                            self.error(
                                span,
                                format!("'{}' is assigned before its declaration", self.interner.get(name)),
                            );
                            return Err(());
                        };

                        let declared = info.ty.clone();
                        let rhs_ty = self.infer(rhs, declared.as_ref())?;

                        let stored = match declared {
                            Some(declared) => {
                                if !subtype::is_subtype(self.program, &rhs_ty, &declared) {
                                    self.auto_recover(rhs, &rhs_ty, &declared, span)?
                                } else {
                                    declared
                                }
                            }
                            None => self.bind_type(&rhs_ty),
                        };

                        let old = stored.clone().with_eph(Eph::Ephemeral);
                        self.locals.insert(
                            local,
                            LocalInfo {
                                name: info.name,
                                kind: info.kind,
                                ty: Some(stored),
                            },
                        );
                        lhs.ty = Some(old.clone());
                        Ok(old)
                    }
                    Some(Def::Param { index }) => {
                        let declared = self.params[*index].ty.clone();
                        let rhs_ty = self.infer(rhs, Some(&declared))?;
                        if !subtype::is_subtype(self.program, &rhs_ty, &declared) {
                            self.type_mismatch(span, &declared, &rhs_ty);
                        }
                        Ok(declared.with_eph(Eph::Ephemeral))
                    }
                    Some(Def::Field { entity, index }) => {
                        let field = self.program.entity(*entity).fields[*index].clone();
                        self.check_field_write(&field, self.method_cap, rhs, span)
                    }
                    _ => {
                        self.error(span, "this is not assignable");
                        Err(())
                    }
                }
            }
            ExprKind::Dot { .. } => {
                let (receiver_ty, member) = {
                    let ExprKind::Dot { expr: inner, member } = &mut lhs.kind else {
                        unreachable!()
                    };
                    (self.infer(inner, None)?, *member)
                };

                let (entity, args, receiver_cap) = self.receiver_entity(&receiver_ty, span)?;
                let Some((_, field)) = self.program.entity(entity).find_field(member) else {
                    self.member_not_found(entity, member, span);
                    return Err(());
                };

                let mut field = field.clone();
                field.ty = subtype::reify(
                    &field.ty,
                    &self.program.entity(entity).type_params,
                    &args,
                    false,
                );
                self.check_field_write(&field, receiver_cap, rhs, span)
            }
            _ => {
                self.error(span, "this is not assignable");
                Err(())
            }
        }
    }

    fn bind_tuple_element(&mut self, elem: &mut Expr, member_ty: &Type, span: Span) -> Result<(), ()> {
        match &mut elem.kind {
            ExprKind::Local { name, ty, id, kind } => {
                let stored = match ty {
                    Some(declared) => {
                        if !subtype::is_subtype(self.program, member_ty, declared) {
                            let declared = declared.clone();
                            let member = member_ty.clone();
                            self.type_mismatch(span, &declared, &member);
                        }
                        ty.clone().unwrap_or_else(|| self.bind_type(member_ty))
                    }
                    None => self.bind_type(member_ty),
                };

                if let Some(id) = id {
                    self.locals.insert(
                        *id,
                        LocalInfo {
                            name: *name,
                            kind: *kind,
                            ty: Some(stored.clone()),
                        },
                    );
                }
                elem.ty = Some(stored);
                Ok(())
            }
            ExprKind::Reference { def: None, .. } => Ok(()),
            ExprKind::Seq(exprs) if exprs.len() == 1 => {
                let mut inner = exprs.pop().expect("just checked");
                let result = self.bind_tuple_element(&mut inner, member_ty, span);
                exprs.push(inner);
                result
            }
            _ => {
                self.error(span, "tuple destructuring expects local declarations");
                Err(())
            }
        }
    }

    fn check_field_write(
        &mut self,
        field: &crate::ast::Field,
        receiver_cap: Cap,
        rhs: &mut Expr,
        span: Span,
    ) -> Result<Type, ()> {
        let rhs_ty = self.infer(rhs, Some(&field.ty))?;

        if !matches!(receiver_cap, Cap::Ref | Cap::Trn | Cap::Iso) {
            self.error(span, format!("cannot write through {receiver_cap}"));
            return Err(());
        }

        // Writes to let and embed fields are constructor-only; the refer
        // pass enforces the once-ness.
        if field.kind != FieldKind::Var && self.method_kind != MethodKind::Constructor {
            self.error(span, "a let or embed field can only be set in a constructor");
            return Err(());
        }

        let stored = if !subtype::is_subtype(self.program, &rhs_ty, &field.ty) {
            self.auto_recover(rhs, &rhs_ty, &field.ty.clone(), span)?
        } else {
            field.ty.clone()
        };

        let rhs_cap = match &stored {
            Type::Nominal(nominal) => Some(subtype::nominal_cap(self.program, nominal)),
            Type::TypeParamRef { cap, .. } => *cap,
            _ => None,
        };

        if let Some(rhs_cap) = rhs_cap {
            if !cap::safe_to_write(receiver_cap, rhs_cap) {
                self.error(
                    span,
                    format!("writing {rhs_cap} into {receiver_cap} is not safe"),
                );
                return Err(());
            }
        }

        // Assignment yields the previous value, ephemerally.
        Ok(field.ty.clone().with_eph(Eph::Ephemeral))
    }

    /// Implicit recover at a sendable binding site: a fresh constructor
    /// call whose arguments are all sendable may be lifted to the wanted
    /// cap. Returns the stored type, reporting on failure.
    fn auto_recover(
        &mut self,
        rhs: &mut Expr,
        rhs_ty: &Type,
        wanted: &Type,
        span: Span,
    ) -> Result<Type, ()> {
        let wanted_cap = wanted.cap();

        let applies = matches!(wanted_cap, Some(Cap::Iso) | Some(Cap::Trn) | Some(Cap::Val))
            && self.is_fresh_sendable_constructor(rhs);

        if applies {
            let recovered_ty = rhs_ty.clone().with_cap(
                wanted_cap.unwrap_or(Cap::Iso),
                Eph::Ephemeral,
            );

            if subtype::is_subtype(self.program, &recovered_ty, wanted) {
                let inner = std::mem::replace(rhs, Expr::new(ExprKind::Continue, span));
                *rhs = Expr::new(
                    ExprKind::Recover {
                        cap: wanted_cap,
                        body: Box::new(inner),
                    },
                    span,
                );
                rhs.ty = Some(recovered_ty);
                return Ok(wanted.clone());
            }
        }

        self.type_mismatch(span, wanted, rhs_ty);
        Err(())
    }

    /// A constructor call with only sendable arguments, safe to lift.
    fn is_fresh_sendable_constructor(&self, rhs: &Expr) -> bool {
        let ExprKind::Call(call) = &rhs.kind else {
            return false;
        };

        let ExprKind::Dot { expr: inner, member } = &call.receiver.kind else {
            return false;
        };

        let target = match &inner.kind {
            ExprKind::Reference { def: Some(Def::Entity(id)), .. } => Some(*id),
            ExprKind::Qualify { expr, .. } => match &expr.kind {
                ExprKind::Reference { def: Some(Def::Entity(id)), .. } => Some(*id),
                _ => None,
            },
            _ => None,
        };

        let Some(entity) = target else {
            return false;
        };
        let Some((_, method)) = self.program.entity(entity).find_method(*member) else {
            return false;
        };
        if method.kind != MethodKind::Constructor {
            return false;
        }

        call.positional
            .iter()
            .chain(call.named.iter().map(|(_, e)| e))
            .all(|arg| {
                arg.ty
                    .as_ref()
                    .map(|ty| self.is_sendable_type(ty))
                    .unwrap_or(false)
            })
    }

    fn infer_if(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::If(node) = &mut expr.kind else {
            unreachable!()
        };
        let mut node = std::mem::replace(
            node,
            Box::new(IfExpr {
                cond: Expr::new(ExprKind::Continue, span),
                then_body: Expr::new(ExprKind::Continue, span),
                else_body: None,
                annotations: vec![],
            }),
        );

        let result = (|this: &mut Self| -> Result<Type, ()> {
            let bool_ty = this.bool_type(span);
            let cond_ty = this.infer(&mut node.cond, Some(&bool_ty))?;
            if !subtype::is_subtype(this.program, &cond_ty, &bool_ty) {
                this.type_mismatch(node.cond.span, &bool_ty, &cond_ty);
            }

            let then_ty = this.infer(&mut node.then_body, antecedent)?;
            let else_ty = match &mut node.else_body {
                Some(else_body) => this.infer(else_body, antecedent)?,
                None => this.none_type(span),
            };

            Ok(Type::union(vec![then_ty, else_ty]))
        })(self);

        let ExprKind::If(slot) = &mut expr.kind else {
            unreachable!()
        };
        *slot = node;

        let ty = result?;
        self.done(expr, ty)
    }

    fn infer_ifdef(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::IfDef(node) = &mut expr.kind else {
            unreachable!()
        };

        let live = match target::evaluate_guard(&node.cond, self.target, self.interner) {
            Ok(live) => live,
            Err((guard_span, message)) => {
                let message = message.clone();
                self.error(guard_span, message);
                return Err(());
            }
        };

        let mut node = std::mem::replace(
            node,
            Box::new(IfExpr {
                cond: Expr::new(ExprKind::Continue, span),
                then_body: Expr::new(ExprKind::Continue, span),
                else_body: None,
                annotations: vec![],
            }),
        );

        // Only the branch selected by the target configuration is live;
        // the other one may reference platform-specific declarations.
        let result = if live {
            self.infer(&mut node.then_body, antecedent)
        } else {
            match &mut node.else_body {
                Some(else_body) => self.infer(else_body, antecedent),
                None => Ok(self.none_type(span)),
            }
        };

        let ExprKind::IfDef(slot) = &mut expr.kind else {
            unreachable!()
        };
        *slot = node;

        let ty = result?;
        self.done(expr, ty)
    }

    fn infer_iftype(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::IfType(node) = &mut expr.kind else {
            unreachable!()
        };
        let mut node = std::mem::replace(
            node,
            Box::new(IfTypeExpr {
                sub: Type::DontCare { span },
                sup: Type::DontCare { span },
                then_body: Expr::new(ExprKind::Continue, span),
                else_body: None,
            }),
        );

        let holds = subtype::is_subtype(self.program, &node.sub, &node.sup);

        let result = if holds {
            self.infer(&mut node.then_body, antecedent)
        } else {
            match &mut node.else_body {
                Some(else_body) => self.infer(else_body, antecedent),
                None => Ok(self.none_type(span)),
            }
        };

        let ExprKind::IfType(slot) = &mut expr.kind else {
            unreachable!()
        };
        *slot = node;

        let ty = result?;
        self.done(expr, ty)
    }

    fn infer_loop(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let is_while = matches!(expr.kind, ExprKind::While(_));

        let node = match &mut expr.kind {
            ExprKind::While(node) | ExprKind::Repeat(node) => node,
            _ => unreachable!(),
        };
        let mut node = std::mem::replace(
            node,
            Box::new(LoopExpr {
                cond: Expr::new(ExprKind::Continue, span),
                body: Expr::new(ExprKind::Continue, span),
                else_body: None,
                annotations: vec![],
            }),
        );

        let result = (|this: &mut Self| -> Result<Type, ()> {
            let bool_ty = this.bool_type(span);

            this.loop_depth += 1;
            let ordered: Result<Type, ()> = if is_while {
                let cond_ty = this.infer(&mut node.cond, Some(&bool_ty))?;
                if !subtype::is_subtype(this.program, &cond_ty, &bool_ty) {
                    this.type_mismatch(node.cond.span, &bool_ty, &cond_ty);
                }
                this.infer(&mut node.body, antecedent)
            } else {
                let body_ty = this.infer(&mut node.body, antecedent)?;
                let cond_ty = this.infer(&mut node.cond, Some(&bool_ty))?;
                if !subtype::is_subtype(this.program, &cond_ty, &bool_ty) {
                    this.type_mismatch(node.cond.span, &bool_ty, &cond_ty);
                }
                Ok(body_ty)
            };
            this.loop_depth -= 1;
            let body_ty = ordered?;

            let else_ty = match &mut node.else_body {
                Some(else_body) => this.infer(else_body, antecedent)?,
                None => this.none_type(span),
            };

            Ok(Type::union(vec![body_ty, else_ty]))
        })(self);

        let slot = match &mut expr.kind {
            ExprKind::While(node) | ExprKind::Repeat(node) => node,
            _ => unreachable!(),
        };
        *slot = node;

        let ty = result?;
        self.done(expr, ty)
    }

    fn infer_try(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::Try { body, else_body, then_body, no_check } = &mut expr.kind else {
            unreachable!()
        };
        let no_check = *no_check;

        let mut body = std::mem::replace(body, Box::new(Expr::new(ExprKind::Continue, span)));
        let mut else_body = else_body.take();
        let mut then_body = then_body.take();

        let result = (|this: &mut Self| -> Result<Type, ()> {
            this.try_depth += 1;
            let body_ty = this.infer(&mut body, antecedent);
            this.try_depth -= 1;
            let body_ty = body_ty?;

            // A control-flow try (loop sugar, with blocks) rethrows from
            // its else arm; that rethrow only fires if the body threw, so
            // it is not an independent error source.
            if no_check {
                this.try_depth += 1;
            }
            let else_ty = match &mut else_body {
                Some(else_body) => this.infer(else_body, antecedent)?,
                None => this.none_type(span),
            };
            if no_check {
                this.try_depth -= 1;
            }

            if let Some(then_body) = &mut then_body {
                let _ = this.infer(then_body, None)?;
            }

            Ok(Type::union(vec![body_ty, else_ty]))
        })(self);

        let ExprKind::Try {
            body: body_slot,
            else_body: else_slot,
            then_body: then_slot,
            ..
        } = &mut expr.kind
        else {
            unreachable!()
        };
        *body_slot = body;
        *else_slot = else_body;
        *then_slot = then_body;

        let ty = result?;
        self.done(expr, ty)
    }

    fn infer_tuple(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let ExprKind::Tuple(elems) = &mut expr.kind else {
            unreachable!()
        };

        let wanted: Vec<Option<&Type>> = match antecedent {
            Some(Type::Tuple(types)) if types.len() == elems.len() => {
                types.iter().map(Some).collect()
            }
            _ => vec![None; elems.len()],
        };

        let mut taken = std::mem::take(elems);
        let mut types = vec![];
        let mut failed = false;

        for (elem, want) in taken.iter_mut().zip(wanted) {
            match self.infer(elem, want) {
                Ok(ty) => types.push(ty),
                Err(()) => failed = true,
            }
        }

        let ExprKind::Tuple(slot) = &mut expr.kind else {
            unreachable!()
        };
        *slot = taken;

        if failed {
            return Err(());
        }
        self.done(expr, Type::Tuple(types))
    }

    fn infer_array(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let array_sym = self.interner.find("Array");

        // The element antecedent comes from an explicit `[as T:`, or from
        // an Array[T] antecedent.
        let from_antecedent = antecedent.and_then(|ty| match ty {
            Type::Nominal(nominal)
                if Some(nominal.name) == array_sym && nominal.args.len() == 1 =>
            {
                Some(nominal.args[0].clone())
            }
            _ => None,
        });

        let ExprKind::Array { elem_type, elems } = &mut expr.kind else {
            unreachable!()
        };

        let wanted = elem_type.clone().or(from_antecedent);
        let mut taken = std::mem::take(elems);
        let mut types = vec![];
        let mut failed = false;

        for elem in taken.iter_mut() {
            match self.infer(elem, wanted.as_ref()) {
                Ok(ty) => types.push(ty),
                Err(()) => failed = true,
            }
        }

        let ExprKind::Array { elems: slot, .. } = &mut expr.kind else {
            unreachable!()
        };
        *slot = taken;

        if failed {
            return Err(());
        }

        let elem_ty = match wanted {
            Some(ty) => ty,
            None => {
                if types.is_empty() {
                    self.error(span, "an empty array literal needs an element type");
                    return Err(());
                }
                Type::union(types.iter().map(|t| self.bind_type(t)).collect())
            }
        };

        let mut nominal = Nominal::new(
            array_sym.unwrap_or(self.names.none_type),
            span,
        );
        nominal.entity = self
            .program
            .builtin
            .and_then(|b| array_sym.and_then(|s| self.program.find_entity(b, s)));
        nominal.args = vec![elem_ty];
        nominal.cap = Some(Cap::Ref);
        nominal.eph = Eph::Ephemeral;
        self.done(expr, Type::Nominal(nominal))
    }

    fn infer_match(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::Match(node) = &mut expr.kind else {
            unreachable!()
        };
        let mut node = std::mem::replace(
            node,
            Box::new(MatchExpr {
                scrutinee: Expr::new(ExprKind::Continue, span),
                cases: vec![],
                else_body: None,
            }),
        );

        let result = (|this: &mut Self| -> Result<Type, ()> {
            let operand_ty = this.infer(&mut node.scrutinee, None)?;

            let mut arm_types = vec![];
            let mut shapes = vec![];
            let mut failed = false;

            for case in &mut node.cases {
                let shape = this.infer_pattern(&mut case.pattern, &operand_ty);

                match shape {
                    Ok(mut shape) => {
                        shape.guarded = case.guard.is_some();
                        shapes.push(shape);
                    }
                    Err(()) => failed = true,
                }

                if let Some(guard) = &mut case.guard {
                    let bool_ty = this.bool_type(span);
                    if let Ok(guard_ty) = this.infer(guard, Some(&bool_ty)) {
                        if !subtype::is_subtype(this.program, &guard_ty, &bool_ty) {
                            this.type_mismatch(guard.span, &bool_ty, &guard_ty);
                        }
                    } else {
                        failed = true;
                    }
                }

                match &mut case.body {
                    Some(body) => match this.infer(body, antecedent) {
                        Ok(ty) => arm_types.push(ty),
                        Err(()) => failed = true,
                    },
                    None => failed = true,
                }
            }

            let exhaustive =
                !failed && matchtype::is_exhaustive(this.program, &operand_ty, &shapes);

            match &mut node.else_body {
                Some(else_body) => {
                    let else_ty = this.infer(else_body, antecedent)?;
                    arm_types.push(else_ty);
                }
                None => {
                    if !exhaustive {
                        this.error(
                            span,
                            "match is not exhaustive; an else clause is required",
                        );
                        failed = true;
                    }
                }
            }

            if failed {
                return Err(());
            }
            Ok(Type::union(arm_types))
        })(self);

        let ExprKind::Match(slot) = &mut expr.kind else {
            unreachable!()
        };
        *slot = node;

        let ty = result?;
        self.done(expr, ty)
    }

    /// Check one pattern against the operand type, binding captures.
    fn infer_pattern(&mut self, pattern: &mut Expr, operand: &Type) -> Result<CaseShape, ()> {
        let span = pattern.span;

        match &mut pattern.kind {
            ExprKind::MatchCapture { name, ty, id } => {
                let capture_ty = ty.clone();

                match matchtype::could_match(self.program, operand, &capture_ty) {
                    MatchResult::Accept => {}
                    MatchResult::Reject => {
                        self.error(span, "this pattern can never match");
                        return Err(());
                    }
                    MatchResult::Deny => {
                        self.error(
                            span,
                            "the capability of the matched value prevents this pattern",
                        );
                        return Err(());
                    }
                }

                if let Some(id) = id {
                    self.locals.insert(
                        *id,
                        LocalInfo {
                            name: *name,
                            kind: LocalKind::Let,
                            ty: Some(capture_ty.clone()),
                        },
                    );
                }
                pattern.ty = Some(capture_ty.clone());

                Ok(CaseShape {
                    pattern_ty: capture_ty,
                    guarded: false,
                    by_value: false,
                })
            }
            ExprKind::Reference { name, def } if def.is_none() => {
                // Don't-care matches anything.
                let _ = name;
                pattern.ty = Some(Type::DontCare { span });
                Ok(CaseShape {
                    pattern_ty: Type::DontCare { span },
                    guarded: false,
                    by_value: false,
                })
            }
            ExprKind::Tuple(elems) => {
                let operand_elems: Vec<Type> = match operand {
                    Type::Tuple(types) if types.len() == elems.len() => types.clone(),
                    _ => {
                        let members: Vec<&Type> = operand.union_members();
                        let matching = members.iter().find_map(|m| match m {
                            Type::Tuple(types) if types.len() == elems.len() => {
                                Some(types.clone())
                            }
                            _ => None,
                        });

                        match matching {
                            Some(types) => types,
                            None => {
                                self.error(span, "this pattern can never match");
                                return Err(());
                            }
                        }
                    }
                };

                let mut taken = std::mem::take(elems);
                let mut member_types = vec![];
                let mut by_value = false;
                let mut failed = false;

                for (elem, op_ty) in taken.iter_mut().zip(operand_elems.iter()) {
                    match self.infer_pattern(elem, op_ty) {
                        Ok(shape) => {
                            by_value |= shape.by_value;
                            member_types.push(shape.pattern_ty);
                        }
                        Err(()) => failed = true,
                    }
                }

                let ExprKind::Tuple(slot) = &mut pattern.kind else {
                    unreachable!()
                };
                *slot = taken;

                if failed {
                    return Err(());
                }

                let pattern_ty = Type::Tuple(member_types);
                pattern.ty = Some(pattern_ty.clone());
                Ok(CaseShape {
                    pattern_ty,
                    guarded: false,
                    by_value,
                })
            }
            _ => {
                // A value pattern: matched by calling eq on it.
                let antecedent = operand.clone();
                let pattern_ty = self.infer(pattern, Some(&antecedent))?;

                let covers = matchtype::primitive_value_covers(self.program, &pattern_ty)
                    && matches!(pattern.kind, ExprKind::Reference { .. });

                match matchtype::could_match(self.program, operand, &self.alias_type(&pattern_ty)) {
                    MatchResult::Reject => {
                        self.error(span, "this pattern can never match");
                        return Err(());
                    }
                    MatchResult::Deny => {
                        self.error(
                            span,
                            "the capability of the matched value prevents this pattern",
                        );
                        return Err(());
                    }
                    MatchResult::Accept => {}
                }

                Ok(CaseShape {
                    pattern_ty,
                    guarded: false,
                    by_value: !covers,
                })
            }
        }
    }

    fn infer_ffi_call(&mut self, expr: &mut Expr) -> Result<Type, ()> {
        let span = expr.span;
        let name = match &expr.kind {
            ExprKind::FfiCall { name, .. } => *name,
            _ => unreachable!(),
        };

        // Exactly one declaration must be live under the current target.
        let mut live: Vec<crate::ast::FfiDecl> = vec![];
        for use_ in &self.program.package(self.package).modules[self.module].uses {
            let UseScheme::Ffi(decl) = &use_.scheme else {
                continue;
            };
            if decl.name != name {
                continue;
            }

            let guard_live = match &use_.guard {
                None => true,
                Some(guard) => {
                    target::evaluate_guard(guard, self.target, self.interner).unwrap_or(false)
                }
            };

            if guard_live {
                live.push(decl.clone());
            }
        }

        let text = self.interner.get(name).trim_start_matches('@').to_string();

        if live.len() > 1 {
            self.error(
                span,
                format!("multiple declarations of '@{text}' are live for this target"),
            );
            return Err(());
        }

        let Some(decl) = live.pop() else {
            self.error(span, format!("no declaration of '@{text}' is live for this target"));
            return Err(());
        };

        let ExprKind::FfiCall { ret, args, partial, .. } = &mut expr.kind else {
            unreachable!()
        };

        if let Some(annotated) = ret {
            if *annotated != decl.ret {
                let annotated = annotated.clone();
                let declared = decl.ret.clone();
                let annotated_text = self.describe(&annotated);
                let declared_text = self.describe(&declared);
                self.error(
                    span,
                    format!(
                        "the call's return type {annotated_text} conflicts with the declaration's {declared_text}"
                    ),
                );
            }
        }
        *partial = decl.partial;

        let mut taken = std::mem::take(args);

        if taken.len() < decl.params.len() || (taken.len() > decl.params.len() && !decl.variadic) {
            self.error(
                span,
                format!(
                    "'@{text}' takes {} arguments, {} given",
                    decl.params.len(),
                    taken.len()
                ),
            );
        }

        let mut failed = false;
        for (index, arg) in taken.iter_mut().enumerate() {
            let wanted = decl.params.get(index).map(|p| p.ty.clone());
            match self.infer(arg, wanted.as_ref()) {
                Ok(ty) => {
                    if let Some(wanted) = wanted {
                        if !subtype::is_subtype(self.program, &ty, &wanted) {
                            self.type_mismatch(arg.span, &wanted, &ty);
                        }
                    }
                }
                Err(()) => failed = true,
            }
        }

        let ExprKind::FfiCall { args: slot, .. } = &mut expr.kind else {
            unreachable!()
        };
        *slot = taken;

        if decl.partial {
            self.raise_error(span);
        }

        if failed {
            return Err(());
        }
        self.done(expr, decl.ret)
    }

    fn infer_call(&mut self, expr: &mut Expr, antecedent: Option<&Type>) -> Result<Type, ()> {
        let span = expr.span;
        let ExprKind::Call(call) = &mut expr.kind else {
            unreachable!()
        };
        let mut call = std::mem::replace(
            call,
            Box::new(CallExpr {
                receiver: Expr::new(ExprKind::Continue, span),
                positional: vec![],
                named: vec![],
                partial: false,
            }),
        );

        let result = self.infer_call_parts(&mut call, antecedent, span);

        let ExprKind::Call(slot) = &mut expr.kind else {
            unreachable!()
        };
        *slot = call;

        let ty = result?;
        self.done(expr, ty)
    }

    /// Whether an expression is a literal, or arithmetic built purely from
    /// literals. Operator calls on such receivers pass the antecedent
    /// through, which is what keeps `(1 + 2) * 3` polymorphic until a
    /// concrete numeric type lands on it.
    fn is_literal_arithmetic(&self, expr: &Expr) -> bool {
        const ARITHMETIC: [&str; 12] = [
            "add", "sub", "mul", "div", "mod", "shl", "shr", "op_and", "op_or", "op_xor", "neg",
            "op_not",
        ];

        match &expr.kind {
            ExprKind::IntLit(_) | ExprKind::FloatLit(_) => true,
            ExprKind::Seq(exprs) if exprs.len() == 1 => self.is_literal_arithmetic(&exprs[0]),
            ExprKind::Call(call) => match &call.receiver.kind {
                ExprKind::Dot { expr: inner, member } => {
                    ARITHMETIC.contains(&self.interner.get(*member))
                        && self.is_literal_arithmetic(inner)
                        && call.positional.iter().all(|a| self.is_literal_arithmetic(a))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Resolve the callee: a static receiver (type), a member access on a
    /// value, an implicit-this method, or an applicable object.
    fn infer_call_parts(
        &mut self,
        call: &mut CallExpr,
        antecedent: Option<&Type>,
        span: Span,
    ) -> Result<Type, ()> {
        // `X(args)` is `X.create(args)`.
        if let ExprKind::Reference { def: Some(Def::Entity(_)), .. } = &call.receiver.kind {
            let inner = std::mem::replace(
                &mut call.receiver,
                Expr::new(ExprKind::Continue, span),
            );
            call.receiver = crate::ast::builder::dot(inner, self.names.create, span);
        }

        match &call.receiver.kind {
            ExprKind::Dot { .. } => {}
            ExprKind::Reference { def: Some(Def::Method { .. }), .. } => {
                // An implicit-this call; rebuild as this.m(args).
                let member = match &call.receiver.kind {
                    ExprKind::Reference { name, .. } => *name,
                    _ => unreachable!(),
                };
                call.receiver = crate::ast::builder::dot(
                    crate::ast::builder::this_expr(span),
                    member,
                    span,
                );
            }
            _ => {
                // A value being applied: sugar to .apply.
                let inner = std::mem::replace(
                    &mut call.receiver,
                    Expr::new(ExprKind::Continue, span),
                );
                call.receiver = crate::ast::builder::dot(inner, self.names.apply, span);
            }
        }

        let (inner_is_static, member, type_args) = {
            let ExprKind::Dot { expr: inner, member } = &call.receiver.kind else {
                unreachable!()
            };

            let (is_static, type_args) = match &inner.kind {
                ExprKind::Reference { def: Some(Def::Entity(id)), .. } => {
                    (Some((*id, vec![])), vec![])
                }
                ExprKind::Qualify { expr, args } => match &expr.kind {
                    ExprKind::Reference { def: Some(Def::Entity(id)), .. } => {
                        (Some((*id, args.clone())), vec![])
                    }
                    _ => (None, args.clone()),
                },
                _ => (None, vec![]),
            };

            (is_static, *member, type_args)
        };
        let _ = type_args;

        let (entity, entity_args, receiver_cap, is_static) = match inner_is_static {
            Some((id, args)) => {
                // Fill default type arguments on a static receiver.
                let wanted = self.program.entity(id).type_params.len();
                let mut args = args;
                if args.len() < wanted {
                    for tp in self.program.entity(id).type_params[args.len()..].iter() {
                        if let Some(default) = &tp.default {
                            args.push(default.clone());
                        }
                    }
                }
                (id, args, None, true)
            }
            None => {
                let receiver_ty = {
                    let literalish = {
                        let ExprKind::Dot { expr: inner, member } = &call.receiver.kind else {
                            unreachable!()
                        };
                        // Only an arithmetic result carries the antecedent
                        // back into its operands.
                        let arithmetic_member = matches!(
                            self.interner.get(*member),
                            "add" | "sub" | "mul" | "div" | "mod" | "shl" | "shr" | "op_and"
                                | "op_or" | "op_xor" | "neg" | "op_not"
                        );
                        arithmetic_member && self.is_literal_arithmetic(inner)
                    };

                    let ExprKind::Dot { expr: inner, .. } = &mut call.receiver.kind else {
                        unreachable!()
                    };
                    let wanted = if literalish { antecedent } else { None };
                    self.infer(inner, wanted)?
                };
                let (entity, args, receiver_cap) = self.receiver_entity(&receiver_ty, span)?;
                (entity, args, Some(receiver_cap), false)
            }
        };

        let Some((_, method)) = self.find_method(entity, member) else {
            // A static reference without the member may still be a field
            // read through a primitive value; report as missing member.
            self.member_not_found(entity, member, span);
            return Err(());
        };
        let method = method.clone();

        match method.kind {
            MethodKind::Constructor => {
                if !is_static {
                    self.error(span, "a constructor is called on a type, not a value");
                    return Err(());
                }
            }
            MethodKind::Behaviour => {
                // Callable through any alias; behaviours run on tag.
            }
            MethodKind::Function => {
                if let Some(receiver_cap) = receiver_cap {
                    let wanted = method.cap.unwrap_or(Cap::Box);
                    if !cap::is_sub_cap(receiver_cap, wanted) {
                        self.error(
                            span,
                            format!(
                                "a {receiver_cap} receiver cannot call a {wanted} method"
                            ),
                        );
                        return Err(());
                    }
                } else if method.kind == MethodKind::Function && !is_static {
                    // Unreachable; static function calls happen on
                    // primitives through their value path.
                }
            }
        }

        let entity_params = &self.program.entity(entity).type_params;
        let reify_ty =
            |ty: &Type| -> Type { subtype::reify(ty, entity_params, &entity_args, false) };

        // Build the full argument list: positional, then named, then
        // defaults.
        let mut arg_slots: Vec<Option<Expr>> = vec![None; method.params.len()];
        let positional = std::mem::take(&mut call.positional);

        if positional.len() > method.params.len() {
            self.error(
                span,
                format!(
                    "'{}' takes {} arguments, {} given",
                    self.interner.get(member),
                    method.params.len(),
                    positional.len()
                ),
            );
            return Err(());
        }

        for (index, arg) in positional.into_iter().enumerate() {
            arg_slots[index] = Some(arg);
        }

        for (name, value) in std::mem::take(&mut call.named) {
            let Some(index) = method.params.iter().position(|p| p.name == name) else {
                self.error(
                    span,
                    format!(
                        "'{}' has no parameter named '{}'",
                        self.interner.get(member),
                        self.interner.get(name)
                    ),
                );
                return Err(());
            };

            if arg_slots[index].is_some() {
                self.error(
                    span,
                    format!("argument '{}' is supplied twice", self.interner.get(name)),
                );
                return Err(());
            }
            arg_slots[index] = Some(value);
        }

        let mut failed = false;
        let mut final_args = vec![];

        for (index, slot) in arg_slots.into_iter().enumerate() {
            let param = &method.params[index];
            let param_ty = reify_ty(&param.ty);

            match slot {
                Some(mut arg) => {
                    match self.infer(&mut arg, Some(&param_ty)) {
                        Ok(arg_ty) => {
                            if !subtype::is_subtype(self.program, &arg_ty, &param_ty) {
                                self.type_mismatch(arg.span, &param_ty, &arg_ty);
                                failed = true;
                            }
                        }
                        Err(()) => failed = true,
                    }
                    final_args.push(arg);
                }
                None => {
                    if param.default.is_none() {
                        self.error(
                            span,
                            format!(
                                "missing argument for parameter '{}'",
                                self.interner.get(param.name)
                            ),
                        );
                        failed = true;
                    }
                    // The back-end materialises the default; nothing to
                    // carry here.
                }
            }
        }

        call.positional = final_args;

        if method.partial {
            self.raise_error(span);
        }

        if failed {
            return Err(());
        }

        // The result type, reified and viewpoint-adapted to the receiver.
        let mut result = method.ret.clone().unwrap_or(Type::DontCare { span });
        result = reify_ty(&result);

        if let Type::Arrow { left, right } = &result {
            if matches!(left.as_ref(), Type::This { .. }) {
                let origin = receiver_cap.unwrap_or(Cap::Ref);
                result = self.adapt(origin, right, span)?;
            }
        }

        Ok(result)
    }
}
