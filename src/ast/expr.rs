use crate::ast::{Def, Field, LocalId, Method, Param};
use crate::ast::types::{Cap, Type};
use crate::interner::Symbol;
use crate::source::Span;

/// One expression node: a kind, its position, and the type attached by the
/// expr pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            span,
            ty: None,
        }
    }

    /// Visit this expression and every nested expression, parents first.
    /// Nested expressions inside synthesized members (object literal
    /// methods) are not visited; those run through the passes on their own.
    pub fn walk(&self, visit: &mut impl FnMut(&Expr)) {
        visit(self);

        match &self.kind {
            ExprKind::Seq(exprs) | ExprKind::Tuple(exprs) => {
                for e in exprs {
                    e.walk(visit);
                }
            }
            ExprKind::Array { elems, .. } => {
                for e in elems {
                    e.walk(visit);
                }
            }
            ExprKind::Dot { expr, .. }
            | ExprKind::Qualify { expr, .. }
            | ExprKind::Unop { expr, .. }
            | ExprKind::As { expr, .. }
            | ExprKind::Consume { expr }
            | ExprKind::Recover { body: expr, .. } => expr.walk(visit),
            ExprKind::Call(call) => {
                call.receiver.walk(visit);
                for arg in &call.positional {
                    arg.walk(visit);
                }
                for (_, arg) in &call.named {
                    arg.walk(visit);
                }
            }
            ExprKind::FfiCall { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            ExprKind::Binop { lhs, rhs, .. } | ExprKind::Assign { lhs, rhs } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            ExprKind::If(node) | ExprKind::IfDef(node) => {
                node.cond.walk(visit);
                node.then_body.walk(visit);
                if let Some(e) = &node.else_body {
                    e.walk(visit);
                }
            }
            ExprKind::IfType(node) => {
                node.then_body.walk(visit);
                if let Some(e) = &node.else_body {
                    e.walk(visit);
                }
            }
            ExprKind::While(node) | ExprKind::Repeat(node) => {
                node.cond.walk(visit);
                node.body.walk(visit);
                if let Some(e) = &node.else_body {
                    e.walk(visit);
                }
            }
            ExprKind::For(node) => {
                node.iterator.walk(visit);
                node.body.walk(visit);
                if let Some(e) = &node.else_body {
                    e.walk(visit);
                }
            }
            ExprKind::With(node) => {
                for (_, init) in &node.bindings {
                    init.walk(visit);
                }
                node.body.walk(visit);
                if let Some(e) = &node.else_body {
                    e.walk(visit);
                }
            }
            ExprKind::Match(node) => {
                node.scrutinee.walk(visit);
                for case in &node.cases {
                    case.pattern.walk(visit);
                    if let Some(g) = &case.guard {
                        g.walk(visit);
                    }
                    if let Some(b) = &case.body {
                        b.walk(visit);
                    }
                }
                if let Some(e) = &node.else_body {
                    e.walk(visit);
                }
            }
            ExprKind::Try {
                body,
                else_body,
                then_body,
                ..
            } => {
                body.walk(visit);
                if let Some(e) = else_body {
                    e.walk(visit);
                }
                if let Some(e) = then_body {
                    e.walk(visit);
                }
            }
            ExprKind::Lambda(node) => node.body.walk(visit),
            ExprKind::Break(Some(e)) | ExprKind::Return(Some(e)) => e.walk(visit),
            ExprKind::Object { .. }
            | ExprKind::Reference { .. }
            | ExprKind::This
            | ExprKind::Local { .. }
            | ExprKind::MatchCapture { .. }
            | ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::StringLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::ErrorExpr
            | ExprKind::CompileIntrinsic
            | ExprKind::Break(None)
            | ExprKind::Continue
            | ExprKind::Return(None)
            | ExprKind::Loc => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ExprKind {
    /// Expression sequence; its value is the value of the last element.
    Seq(Vec<Expr>),
    Reference {
        name: Symbol,
        def: Option<Def>,
    },
    This,
    Tuple(Vec<Expr>),
    Array {
        elem_type: Option<Type>,
        elems: Vec<Expr>,
    },
    /// `object … end`; removed by the sugar pass.
    Object {
        cap: Option<Cap>,
        provides: Vec<Type>,
        fields: Vec<Field>,
        methods: Vec<Method>,
    },
    /// `{(params) => body}`; removed by the sugar pass.
    Lambda(Box<LambdaExpr>),
    Dot {
        expr: Box<Expr>,
        member: Symbol,
    },
    /// Type application `expr[T1, T2]`.
    Qualify {
        expr: Box<Expr>,
        args: Vec<Type>,
    },
    Call(Box<CallExpr>),
    FfiCall {
        name: Symbol,
        ret: Option<Type>,
        args: Vec<Expr>,
        partial: bool,
    },
    /// Infix operator; rewritten to a method call by the sugar pass except
    /// for the identity comparisons `is`/`isnt`.
    Binop {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Prefix operator; removed by the sugar pass.
    Unop {
        op: UnOp,
        expr: Box<Expr>,
    },
    /// `expr as T`; removed by the sugar pass.
    As {
        expr: Box<Expr>,
        ty: Type,
    },
    If(Box<IfExpr>),
    IfDef(Box<IfExpr>),
    IfType(Box<IfTypeExpr>),
    While(Box<LoopExpr>),
    Repeat(Box<LoopExpr>),
    /// Removed by the sugar pass.
    For(Box<ForExpr>),
    /// Removed by the sugar pass.
    With(Box<WithExpr>),
    Match(Box<MatchExpr>),
    Try {
        body: Box<Expr>,
        else_body: Option<Box<Expr>>,
        then_body: Option<Box<Expr>>,
        /// Set when the try exists only for control flow (`for`, `with`,
        /// `try…then` without `else`): no error-possibility check applies.
        no_check: bool,
    },
    Recover {
        cap: Option<Cap>,
        body: Box<Expr>,
    },
    Consume {
        expr: Box<Expr>,
    },
    Assign {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Local declaration, usable as an assignment left-hand side and in
    /// match patterns until sugar normalises pattern captures.
    Local {
        kind: LocalKind,
        name: Symbol,
        ty: Option<Type>,
        id: Option<LocalId>,
    },
    /// A typed capture inside a match pattern.
    MatchCapture {
        name: Symbol,
        ty: Type,
        id: Option<LocalId>,
    },
    IntLit(i128),
    FloatLit(f64),
    StringLit(Symbol),
    BoolLit(bool),
    /// The `error` expression.
    ErrorExpr,
    /// Builtin-only method body marker.
    CompileIntrinsic,
    Break(Option<Box<Expr>>),
    Continue,
    Return(Option<Box<Expr>>),
    /// `__loc`; removed by the sugar pass.
    Loc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LocalKind {
    Let,
    Var,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallExpr {
    pub receiver: Expr,
    pub positional: Vec<Expr>,
    pub named: Vec<(Symbol, Expr)>,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IfExpr {
    pub cond: Expr,
    pub then_body: Expr,
    pub else_body: Option<Expr>,
    pub annotations: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IfTypeExpr {
    pub sub: Type,
    pub sup: Type,
    pub then_body: Expr,
    pub else_body: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoopExpr {
    pub cond: Expr,
    pub body: Expr,
    pub else_body: Option<Expr>,
    pub annotations: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForExpr {
    pub binding: IdSeq,
    pub iterator: Expr,
    pub body: Expr,
    pub else_body: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WithExpr {
    pub bindings: Vec<(IdSeq, Expr)>,
    pub body: Expr,
    pub else_body: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchExpr {
    pub scrutinee: Expr,
    pub cases: Vec<MatchCase>,
    pub else_body: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MatchCase {
    pub pattern: Expr,
    pub guard: Option<Expr>,
    /// Empty bodies fall through to the next non-empty case body in sugar.
    pub body: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LambdaExpr {
    /// Receiver cap of the generated `apply`.
    pub cap: Option<Cap>,
    /// Cap of the generated object, written after the closing brace.
    pub obj_cap: Option<Cap>,
    pub name: Option<Symbol>,
    pub params: Vec<Param>,
    pub captures: Vec<Capture>,
    pub ret: Option<Type>,
    pub partial: bool,
    pub body: Expr,
}

/// A value captured by a lambda or object literal, `name [: type] [= value]`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Capture {
    pub name: Symbol,
    pub ty: Option<Type>,
    pub value: Option<Expr>,
    pub span: Span,
}

/// Binding forms on the left of `for … in` and `with … =`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum IdSeq {
    Name {
        name: Symbol,
        span: Span,
    },
    Tuple(Vec<IdSeq>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    Isnt,
}

impl BinOp {
    /// The method an operator rewrites to; `is`/`isnt` stay primitive.
    pub fn method_name(&self) -> Option<&'static str> {
        match self {
            BinOp::Add => Some("add"),
            BinOp::Sub => Some("sub"),
            BinOp::Mul => Some("mul"),
            BinOp::Div => Some("div"),
            BinOp::Rem => Some("mod"),
            BinOp::Shl => Some("shl"),
            BinOp::Shr => Some("shr"),
            BinOp::And => Some("op_and"),
            BinOp::Or => Some("op_or"),
            BinOp::Xor => Some("op_xor"),
            BinOp::Eq => Some("eq"),
            BinOp::Ne => Some("ne"),
            BinOp::Lt => Some("lt"),
            BinOp::Le => Some("le"),
            BinOp::Gt => Some("gt"),
            BinOp::Ge => Some("ge"),
            BinOp::Is | BinOp::Isnt => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Is => "is",
            BinOp::Isnt => "isnt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn method_name(&self) -> &'static str {
        match self {
            UnOp::Neg => "neg",
            UnOp::Not => "op_not",
        }
    }
}
