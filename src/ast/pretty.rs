//! Source-shaped printing of the AST.
//!
//! The output is valid Maru that re-parses to a structurally equal tree
//! (positions aside): operands are parenthesized instead of relying on
//! operator precedence, which the language does not have anyway.

use crate::ast::expr::*;
use crate::ast::types::{Cap, Eph, Type};
use crate::ast::{Entity, EntityKind, Field, FieldKind, Method, MethodKind, Module, Param, Program, TypeParam, Use, UseScheme};
use crate::interner::{Interner, Symbol};

pub struct Printer<'a> {
    interner: &'a Interner,
    out: String,
    indent: usize,
}

impl<'a> Printer<'a> {
    pub fn new(interner: &'a Interner) -> Self {
        Printer {
            interner,
            out: String::new(),
            indent: 0,
        }
    }

    pub fn module(mut self, module: &Module, program: &Program) -> String {
        if let Some(doc) = module.docstring {
            self.string_literal(doc);
            self.newline();
        }

        for use_ in &module.uses {
            self.use_directive(use_);
            self.newline();
        }

        for id in &module.entities {
            self.entity(program.entity(*id));
            self.newline();
        }

        self.out
    }

    pub fn entity_to_string(mut self, entity: &Entity) -> String {
        self.entity(entity);
        self.out
    }

    pub fn into_text(self) -> String {
        self.out
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn name(&mut self, sym: Symbol) {
        let text = self.interner.get(sym).to_string();
        self.push(&text);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn string_literal(&mut self, sym: Symbol) {
        let text = self.interner.get(sym).to_string();

        if text.contains('\n') {
            self.push("\"\"\"");
            self.push(&text);
            self.push("\"\"\"");
            return;
        }

        self.push("\"");
        for c in text.chars() {
            match c {
                '"' => self.push("\\\""),
                '\\' => self.push("\\\\"),
                '\n' => self.push("\\n"),
                '\t' => self.push("\\t"),
                '\r' => self.push("\\r"),
                '\0' => self.push("\\0"),
                c => self.out.push(c),
            }
        }
        self.push("\"");
    }

    fn annotations(&mut self, annotations: &[Symbol]) {
        if annotations.is_empty() {
            return;
        }

        self.push("\\");
        for (i, a) in annotations.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.name(*a);
        }
        self.push("\\ ");
    }

    fn use_directive(&mut self, use_: &Use) {
        self.push("use ");

        if let Some(alias) = use_.alias {
            self.name(alias);
            self.push(" = ");
        }

        match &use_.scheme {
            UseScheme::Package { path, .. } => self.string_literal(*path),
            UseScheme::Ffi(decl) => {
                self.push("@");
                self.name(decl.name);
                self.push("[");
                self.type_expr(&decl.ret);
                self.push("](");
                for (i, p) in decl.params.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.name(p.name);
                    self.push(": ");
                    self.type_expr(&p.ty);
                }
                if decl.variadic {
                    if !decl.params.is_empty() {
                        self.push(", ");
                    }
                    self.push("...");
                }
                self.push(")");
                if decl.partial {
                    self.push(" ?");
                }
            }
        }

        if let Some(guard) = &use_.guard {
            self.push(" if ");
            self.expr(guard);
        }
    }

    fn entity(&mut self, entity: &Entity) {
        let keyword = match entity.kind {
            EntityKind::Class => "class",
            EntityKind::Actor => "actor",
            EntityKind::Primitive => "primitive",
            EntityKind::Struct => "struct",
            EntityKind::Trait => "trait",
            EntityKind::Interface => "interface",
            EntityKind::Alias => "type",
        };
        self.push(keyword);
        self.push(" ");
        self.annotations(&entity.annotations);

        if let Some(cap) = entity.default_cap {
            self.cap(cap);
            self.push(" ");
        }

        self.name(entity.name);
        self.type_params(&entity.type_params);

        if let Some(alias_of) = &entity.alias_of {
            self.push(" is ");
            self.type_expr(alias_of);
            return;
        }

        if !entity.provides.is_empty() {
            self.push(" is ");
            if entity.provides.len() == 1 {
                self.type_expr(&entity.provides[0]);
            } else {
                self.push("(");
                for (i, p) in entity.provides.iter().enumerate() {
                    if i > 0 {
                        self.push(" & ");
                    }
                    self.type_expr(p);
                }
                self.push(")");
            }
        }

        self.indent += 1;
        if let Some(doc) = entity.docstring {
            self.newline();
            self.string_literal(doc);
        }

        for f in &entity.fields {
            self.newline();
            self.field(f);
        }

        for m in &entity.methods {
            self.newline();
            self.method(m);
        }
        self.indent -= 1;
    }

    fn field(&mut self, field: &Field) {
        let keyword = match field.kind {
            FieldKind::Var => "var",
            FieldKind::Let => "let",
            FieldKind::Embed => "embed",
        };
        self.push(keyword);
        self.push(" ");
        self.name(field.name);
        self.push(": ");
        self.type_expr(&field.ty);

        if let Some(init) = &field.init {
            self.push(" = ");
            self.expr(init);
        }
    }

    fn method(&mut self, method: &Method) {
        let keyword = match method.kind {
            MethodKind::Constructor => "new",
            MethodKind::Behaviour => "be",
            MethodKind::Function => "fun",
        };
        self.push(keyword);
        self.push(" ");
        self.annotations(&method.annotations);

        if let Some(cap) = method.cap {
            self.cap(cap);
            self.push(" ");
        }

        self.name(method.name);
        self.type_params(&method.type_params);
        self.push("(");
        for (i, p) in method.params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.param(p);
        }
        self.push(")");

        if let Some(ret) = &method.ret {
            self.push(": ");
            self.type_expr(ret);
        }

        if method.partial {
            self.push(" ?");
        }

        if let Some(guard) = &method.guard {
            self.push(" if ");
            self.expr_grouped(guard);
        }

        if let Some(doc) = method.docstring {
            self.push(" ");
            self.string_literal(doc);
        }

        if let Some(body) = &method.body {
            self.push(" =>");
            self.indent += 1;
            self.newline();
            self.seq_lines(body);
            self.indent -= 1;
        }
    }

    fn param(&mut self, param: &Param) {
        if let Some(pattern) = &param.pattern {
            self.expr(pattern);
            return;
        }

        self.name(param.name);
        if !matches!(param.ty, Type::DontCare { .. }) {
            self.push(": ");
            self.type_expr(&param.ty);
        }
        if let Some(default) = &param.default {
            self.push(" = ");
            self.expr(default);
        }
    }

    fn type_params(&mut self, params: &[TypeParam]) {
        if params.is_empty() {
            return;
        }

        self.push("[");
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.name(p.name);
            if let Some(constraint) = &p.constraint {
                self.push(": ");
                self.type_expr(constraint);
            }
            if let Some(default) = &p.default {
                self.push(" = ");
                self.type_expr(default);
            }
        }
        self.push("]");
    }

    fn cap(&mut self, cap: Cap) {
        self.push(&cap.to_string());
    }

    pub fn type_expr(&mut self, ty: &Type) {
        match ty {
            Type::Nominal(n) => {
                if let Some(pkg) = n.package {
                    self.name(pkg);
                    self.push(".");
                }
                self.name(n.name);
                if !n.args.is_empty() {
                    self.push("[");
                    for (i, a) in n.args.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.type_expr(a);
                    }
                    self.push("]");
                }
                if let Some(cap) = n.cap {
                    self.push(" ");
                    self.cap(cap);
                }
                self.eph(n.eph);
            }
            Type::Union(types) => {
                self.push("(");
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        self.push(" | ");
                    }
                    self.type_expr(t);
                }
                self.push(")");
            }
            Type::Isect(types) => {
                self.push("(");
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        self.push(" & ");
                    }
                    self.type_expr(t);
                }
                self.push(")");
            }
            Type::Tuple(types) => {
                self.push("(");
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.type_expr(t);
                }
                self.push(")");
            }
            Type::Arrow { left, right } => {
                self.type_expr(left);
                self.push("->");
                self.type_expr(right);
            }
            Type::This { .. } => self.push("this"),
            Type::TypeParamRef { name, cap, eph, .. } => {
                self.name(*name);
                if let Some(cap) = cap {
                    self.push(" ");
                    self.cap(*cap);
                }
                self.eph(*eph);
            }
            Type::Fun {
                cap,
                params,
                ret,
                partial,
                ..
            } => {
                self.push("{(");
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.type_expr(p);
                }
                self.push("): ");
                self.type_expr(ret);
                if *partial {
                    self.push(" ?");
                }
                self.push("} ");
                self.cap(*cap);
            }
            Type::DontCare { .. } => self.push("_"),
        }
    }

    fn eph(&mut self, eph: Eph) {
        match eph {
            Eph::None => {}
            Eph::Ephemeral => self.push("^"),
            Eph::Borrowed => self.push("!"),
        }
    }

    /// Print a sequence one expression per line at the current indent.
    fn seq_lines(&mut self, seq: &Expr) {
        match &seq.kind {
            ExprKind::Seq(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.newline();
                    }
                    self.expr(e);
                }
            }
            _ => self.expr(seq),
        }
    }

    /// Print a sequence on one line, children separated by semicolons.
    fn seq_inline(&mut self, seq: &Expr) {
        match &seq.kind {
            ExprKind::Seq(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.push("; ");
                    }
                    self.expr(e);
                }
            }
            _ => self.expr(seq),
        }
    }

    /// An operand: parenthesized when it is itself an operator expression.
    fn expr_grouped(&mut self, expr: &Expr) {
        let needs_parens = matches!(
            expr.kind,
            ExprKind::Binop { .. } | ExprKind::As { .. } | ExprKind::Assign { .. }
        );

        if needs_parens {
            self.push("(");
            self.expr(expr);
            self.push(")");
        } else {
            self.expr(expr);
        }
    }

    pub fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Seq(_) => {
                self.push("(");
                self.seq_inline(expr);
                self.push(")");
            }
            ExprKind::Reference { name, .. } => self.name(*name),
            ExprKind::This => self.push("this"),
            ExprKind::Tuple(elems) => {
                self.push("(");
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.seq_inline(e);
                }
                self.push(")");
            }
            ExprKind::Array { elem_type, elems } => {
                self.push("[");
                if let Some(ty) = elem_type {
                    self.push("as ");
                    self.type_expr(ty);
                    self.push(": ");
                }
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.seq_inline(e);
                }
                self.push("]");
            }
            ExprKind::Object {
                cap,
                provides,
                fields,
                methods,
            } => {
                self.push("object");
                if let Some(cap) = cap {
                    self.push(" ");
                    self.cap(*cap);
                }
                if !provides.is_empty() {
                    self.push(" is ");
                    if provides.len() == 1 {
                        self.type_expr(&provides[0]);
                    } else {
                        self.push("(");
                        for (i, p) in provides.iter().enumerate() {
                            if i > 0 {
                                self.push(" & ");
                            }
                            self.type_expr(p);
                        }
                        self.push(")");
                    }
                }
                self.indent += 1;
                for f in fields {
                    self.newline();
                    self.field(f);
                }
                for m in methods {
                    self.newline();
                    self.method(m);
                }
                self.indent -= 1;
                self.newline();
                self.push("end");
            }
            ExprKind::Lambda(lambda) => {
                self.push("{");
                if let Some(cap) = lambda.cap {
                    self.cap(cap);
                }
                if let Some(name) = lambda.name {
                    self.name(name);
                }
                self.push("(");
                for (i, p) in lambda.params.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.param(p);
                }
                self.push(")");
                if !lambda.captures.is_empty() {
                    self.push("(");
                    for (i, c) in lambda.captures.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.name(c.name);
                        if let Some(ty) = &c.ty {
                            self.push(": ");
                            self.type_expr(ty);
                        }
                        if let Some(value) = &c.value {
                            self.push(" = ");
                            self.expr(value);
                        }
                    }
                    self.push(")");
                }
                if let Some(ret) = &lambda.ret {
                    self.push(": ");
                    self.type_expr(ret);
                }
                if lambda.partial {
                    self.push(" ?");
                }
                self.push(" => ");
                self.seq_inline(&lambda.body);
                self.push("}");
                if let Some(cap) = lambda.obj_cap {
                    self.push(" ");
                    self.cap(cap);
                }
            }
            ExprKind::Dot { expr, member } => {
                self.expr_grouped(expr);
                self.push(".");
                self.name(*member);
            }
            ExprKind::Qualify { expr, args } => {
                self.expr_grouped(expr);
                self.push("[");
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.type_expr(a);
                }
                self.push("]");
            }
            ExprKind::Call(call) => {
                self.expr_grouped(&call.receiver);
                self.push("(");
                for (i, a) in call.positional.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(a);
                }
                if !call.named.is_empty() {
                    self.push(" where ");
                    for (i, (name, value)) in call.named.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.name(*name);
                        self.push(" = ");
                        self.expr(value);
                    }
                }
                self.push(")");
                if call.partial {
                    self.push(" ?");
                }
            }
            ExprKind::FfiCall {
                name,
                ret,
                args,
                partial,
            } => {
                self.push("@");
                let text = self.interner.get(*name).trim_start_matches('@').to_string();
                self.push(&text);
                if let Some(ret) = ret {
                    self.push("[");
                    self.type_expr(ret);
                    self.push("]");
                }
                self.push("(");
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(a);
                }
                self.push(")");
                if *partial {
                    self.push(" ?");
                }
            }
            ExprKind::Binop { op, lhs, rhs } => {
                self.expr_grouped(lhs);
                self.push(" ");
                self.push(op.symbol());
                self.push(" ");
                self.expr_grouped(rhs);
            }
            ExprKind::Unop { op, expr } => {
                match op {
                    UnOp::Neg => self.push("-"),
                    UnOp::Not => self.push("not "),
                }
                self.expr_grouped(expr);
            }
            ExprKind::As { expr, ty } => {
                self.expr_grouped(expr);
                self.push(" as ");
                self.type_expr(ty);
            }
            ExprKind::If(node) => self.if_like("if", node),
            ExprKind::IfDef(node) => self.if_like("ifdef", node),
            ExprKind::IfType(node) => {
                self.push("iftype ");
                self.type_expr(&node.sub);
                self.push(" <: ");
                self.type_expr(&node.sup);
                self.push(" then ");
                self.seq_inline(&node.then_body);
                if let Some(e) = &node.else_body {
                    self.push(" else ");
                    self.seq_inline(e);
                }
                self.push(" end");
            }
            ExprKind::While(node) => {
                self.push("while ");
                self.seq_inline(&node.cond);
                self.push(" do ");
                self.seq_inline(&node.body);
                if let Some(e) = &node.else_body {
                    self.push(" else ");
                    self.seq_inline(e);
                }
                self.push(" end");
            }
            ExprKind::Repeat(node) => {
                self.push("repeat ");
                self.seq_inline(&node.body);
                self.push(" until ");
                self.seq_inline(&node.cond);
                if let Some(e) = &node.else_body {
                    self.push(" else ");
                    self.seq_inline(e);
                }
                self.push(" end");
            }
            ExprKind::For(node) => {
                self.push("for ");
                self.idseq(&node.binding);
                self.push(" in ");
                self.seq_inline(&node.iterator);
                self.push(" do ");
                self.seq_inline(&node.body);
                if let Some(e) = &node.else_body {
                    self.push(" else ");
                    self.seq_inline(e);
                }
                self.push(" end");
            }
            ExprKind::With(node) => {
                self.push("with ");
                for (i, (binding, init)) in node.bindings.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.idseq(binding);
                    self.push(" = ");
                    self.seq_inline(init);
                }
                self.push(" do ");
                self.seq_inline(&node.body);
                if let Some(e) = &node.else_body {
                    self.push(" else ");
                    self.seq_inline(e);
                }
                self.push(" end");
            }
            ExprKind::Match(node) => {
                self.push("match ");
                self.seq_inline(&node.scrutinee);
                self.indent += 1;
                for case in &node.cases {
                    self.newline();
                    self.push("| ");
                    self.expr(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.push(" if ");
                        self.seq_inline(guard);
                    }
                    if let Some(body) = &case.body {
                        self.push(" => ");
                        self.seq_inline(body);
                    }
                }
                if let Some(e) = &node.else_body {
                    self.newline();
                    self.push("else ");
                    self.seq_inline(e);
                }
                self.indent -= 1;
                self.newline();
                self.push("end");
            }
            ExprKind::Try {
                body,
                else_body,
                then_body,
                ..
            } => {
                self.push("try ");
                self.seq_inline(body);
                if let Some(e) = else_body {
                    self.push(" else ");
                    self.seq_inline(e);
                }
                if let Some(e) = then_body {
                    self.push(" then ");
                    self.seq_inline(e);
                }
                self.push(" end");
            }
            ExprKind::Recover { cap, body } => {
                self.push("recover ");
                if let Some(cap) = cap {
                    self.cap(*cap);
                    self.push(" ");
                }
                self.seq_inline(body);
                self.push(" end");
            }
            ExprKind::Consume { expr } => {
                self.push("consume ");
                self.expr_grouped(expr);
            }
            ExprKind::Assign { lhs, rhs } => {
                self.expr_grouped(lhs);
                self.push(" = ");
                self.expr(rhs);
            }
            ExprKind::Local { kind, name, ty, .. } => {
                self.push(match kind {
                    LocalKind::Let => "let ",
                    LocalKind::Var => "var ",
                });
                self.name(*name);
                if let Some(ty) = ty {
                    self.push(": ");
                    self.type_expr(ty);
                }
            }
            ExprKind::MatchCapture { name, ty, .. } => {
                self.push("let ");
                self.name(*name);
                self.push(": ");
                self.type_expr(ty);
            }
            ExprKind::IntLit(value) => self.push(&value.to_string()),
            ExprKind::FloatLit(value) => {
                let text = if value.fract() == 0.0 {
                    format!("{value:.1}")
                } else {
                    format!("{value}")
                };
                self.push(&text);
            }
            ExprKind::StringLit(sym) => self.string_literal(*sym),
            ExprKind::BoolLit(value) => self.push(if *value { "true" } else { "false" }),
            ExprKind::ErrorExpr => self.push("error"),
            ExprKind::CompileIntrinsic => self.push("compile_intrinsic"),
            ExprKind::Break(value) => {
                self.push("break");
                if let Some(v) = value {
                    self.push(" ");
                    self.expr_grouped(v);
                }
            }
            ExprKind::Continue => self.push("continue"),
            ExprKind::Return(value) => {
                self.push("return");
                if let Some(v) = value {
                    self.push(" ");
                    self.expr_grouped(v);
                }
            }
            ExprKind::Loc => self.push("__loc"),
        }
    }

    fn if_like(&mut self, keyword: &str, node: &IfExpr) {
        self.push(keyword);
        self.push(" ");
        self.annotations(&node.annotations);
        self.seq_inline(&node.cond);
        self.push(" then ");
        self.seq_inline(&node.then_body);
        if let Some(e) = &node.else_body {
            self.push(" else ");
            self.seq_inline(e);
        }
        self.push(" end");
    }

    fn idseq(&mut self, idseq: &IdSeq) {
        match idseq {
            IdSeq::Name { name, .. } => self.name(*name),
            IdSeq::Tuple(elems) => {
                self.push("(");
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.idseq(e);
                }
                self.push(")");
            }
        }
    }
}
