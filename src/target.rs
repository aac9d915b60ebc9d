//! Build-target description and `use`/`ifdef` guard evaluation.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;

use crate::ast::{BinOp, Expr, ExprKind, UnOp};
use crate::interner::Interner;
use crate::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Os {
    Linux,
    Windows,
    Freebsd,
    Macosx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Arch {
    X86,
    Arm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Bits {
    Lp64,
    Llp64,
    Ilp32,
}

/// Flag names with fixed meanings; user flags must not collide with these,
/// case-sensitively.
pub static RESERVED_FLAGS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "linux", "windows", "freebsd", "macosx", "posix", "lp64", "llp64", "ilp32", "x86", "arm",
        "debug", "ndebug",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone)]
pub struct Target {
    pub os: Os,
    pub arch: Arch,
    pub bits: Bits,
    pub debug: bool,
    user_flags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetError(pub String);

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TargetError {}

impl Default for Target {
    fn default() -> Self {
        Target {
            os: Os::Linux,
            arch: Arch::X86,
            bits: Bits::Lp64,
            debug: false,
            user_flags: BTreeSet::new(),
        }
    }
}

impl Target {
    pub fn new(os: Os, arch: Arch, bits: Bits, debug: bool) -> Self {
        Target {
            os,
            arch,
            bits,
            debug,
            user_flags: BTreeSet::new(),
        }
    }

    pub fn define(&mut self, flag: &str) -> Result<(), TargetError> {
        if RESERVED_FLAGS.contains(flag) {
            return Err(TargetError(format!(
                "build flag '{flag}' collides with a reserved flag name"
            )));
        }

        self.user_flags.insert(flag.to_string());
        Ok(())
    }

    /// Whether a reserved flag holds on this target.
    pub fn entails(&self, flag: &str) -> Option<bool> {
        let value = match flag {
            "linux" => self.os == Os::Linux,
            "windows" => self.os == Os::Windows,
            "freebsd" => self.os == Os::Freebsd,
            "macosx" => self.os == Os::Macosx,
            "posix" => matches!(self.os, Os::Linux | Os::Macosx | Os::Freebsd),
            "lp64" => self.bits == Bits::Lp64,
            "llp64" => self.bits == Bits::Llp64,
            "ilp32" => self.bits == Bits::Ilp32,
            "x86" => self.arch == Arch::X86,
            "arm" => self.arch == Arch::Arm,
            "debug" => self.debug,
            "ndebug" => !self.debug,
            _ => return None,
        };

        Some(value)
    }

    pub fn has_user_flag(&self, flag: &str) -> bool {
        self.user_flags.contains(flag)
    }
}

/// Check that a guard only uses the forms that survive normalisation:
/// `and`/`or`/`not`, reserved flag references and user flag strings.
pub fn check_guard(expr: &Expr) -> Result<(), (Span, String)> {
    match &expr.kind {
        ExprKind::Reference { .. } | ExprKind::StringLit(_) | ExprKind::BoolLit(_) => Ok(()),
        ExprKind::Seq(exprs) => {
            for e in exprs {
                check_guard(e)?;
            }
            Ok(())
        }
        ExprKind::Binop {
            op: BinOp::And | BinOp::Or | BinOp::Xor,
            lhs,
            rhs,
        } => {
            check_guard(lhs)?;
            check_guard(rhs)
        }
        ExprKind::Unop { op: UnOp::Not, expr } => check_guard(expr),
        _ => Err((
            expr.span,
            "a build guard may only use flags, 'and', 'or', 'xor' and 'not'".to_string(),
        )),
    }
}

/// Evaluate a guard against a concrete target.
pub fn evaluate_guard(
    expr: &Expr,
    target: &Target,
    interner: &Interner,
) -> Result<bool, (Span, String)> {
    match &expr.kind {
        ExprKind::BoolLit(value) => Ok(*value),
        ExprKind::Seq(exprs) => match exprs.as_slice() {
            [single] => evaluate_guard(single, target, interner),
            _ => Err((expr.span, "invalid build guard expression".to_string())),
        },
        ExprKind::Reference { name, .. } => {
            let flag = interner.get(*name);
            target.entails(flag).ok_or_else(|| {
                (
                    expr.span,
                    format!("unknown build flag '{flag}'; user flags are quoted strings"),
                )
            })
        }
        ExprKind::StringLit(name) => Ok(target.has_user_flag(interner.get(*name))),
        ExprKind::Binop { op, lhs, rhs } => {
            let l = evaluate_guard(lhs, target, interner)?;
            let r = evaluate_guard(rhs, target, interner)?;
            match op {
                BinOp::And => Ok(l && r),
                BinOp::Or => Ok(l || r),
                BinOp::Xor => Ok(l ^ r),
                _ => Err((expr.span, "invalid operator in build guard".to_string())),
            }
        }
        ExprKind::Unop { op: UnOp::Not, expr } => Ok(!evaluate_guard(expr, target, interner)?),
        _ => Err((expr.span, "invalid build guard expression".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder;

    #[test]
    fn test_reserved_flag_collision() {
        let mut target = Target::default();
        assert!(target.define("my_flag").is_ok());
        assert!(target.define("linux").is_err());
        // Reserved names are case-sensitive; a different case is a plain
        // user flag.
        assert!(target.define("Linux").is_ok());
    }

    #[test]
    fn test_posix_is_derived() {
        let mut target = Target::default();
        target.os = Os::Macosx;
        assert_eq!(target.entails("posix"), Some(true));
        target.os = Os::Windows;
        assert_eq!(target.entails("posix"), Some(false));
        assert_eq!(target.entails("no_such"), None);
    }

    #[test]
    fn test_evaluate_guard() {
        let mut interner = Interner::new();
        let target = Target::default();
        let span = Span::default();

        let linux = builder::reference(interner.intern("linux"), span);
        assert_eq!(evaluate_guard(&linux, &target, &interner), Ok(true));

        let not_linux = Expr::new(
            ExprKind::Unop {
                op: UnOp::Not,
                expr: Box::new(linux),
            },
            span,
        );
        assert_eq!(evaluate_guard(&not_linux, &target, &interner), Ok(false));

        let user = builder::string_lit(interner.intern("fancy"), span);
        assert_eq!(evaluate_guard(&user, &target, &interner), Ok(false));
    }
}
