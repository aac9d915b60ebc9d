use std::fmt;

use colored::Colorize;

use crate::source::{SourceMap, Span};

/// The channel a diagnostic was reported on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DiagnosticKind {
    Lex,
    Syntax,
    Semantic,
    Internal,
    Warning,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticKind::Lex => "lex error",
            DiagnosticKind::Syntax => "syntax error",
            DiagnosticKind::Semantic => "error",
            DiagnosticKind::Internal => "internal error",
            DiagnosticKind::Warning => "warning",
        };
        f.write_str(label)
    }
}

/// A secondary location attached to a diagnostic ("defined here", "clashing
/// use here").
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
    pub related: Vec<Frame>,
}

/// Collects diagnostics for one compilation. Iteration order is insertion
/// order, so identical inputs report identically.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, kind: DiagnosticKind, span: Span, message: impl Into<String>) {
        self.push(kind, span, message.into(), vec![]);
    }

    pub fn error_with(
        &mut self,
        kind: DiagnosticKind,
        span: Span,
        message: impl Into<String>,
        related: Vec<Frame>,
    ) {
        self.push(kind, span, message.into(), related);
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.push(DiagnosticKind::Warning, span, message.into(), vec![]);
    }

    fn push(&mut self, kind: DiagnosticKind, span: Span, message: String, related: Vec<Frame>) {
        if kind != DiagnosticKind::Warning {
            self.errors += 1;
        }
        self.diagnostics.push(Diagnostic {
            kind,
            span,
            message,
            related,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Move every diagnostic of `other` into this reporter, preserving the
    /// order they were recorded in. Used when a probe pass fails for real.
    pub fn absorb(&mut self, other: Reporter) {
        self.errors += other.errors;
        self.diagnostics.extend(other.diagnostics);
    }

    /// Render one diagnostic with its source line and a caret marker.
    pub fn render(&self, diagnostic: &Diagnostic, sources: &SourceMap) -> String {
        let mut out = render_frame(
            &diagnostic.kind.to_string(),
            diagnostic.span,
            &diagnostic.message,
            sources,
        );

        for frame in &diagnostic.related {
            out.push('\n');
            out.push_str(&render_frame("note", frame.span, &frame.message, sources));
        }

        out
    }

    pub fn render_all(&self, sources: &SourceMap) -> String {
        self.diagnostics
            .iter()
            .map(|d| self.render(d, sources))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render_frame(label: &str, span: Span, message: &str, sources: &SourceMap) -> String {
    let file = sources.file_name(span.source);
    let line_str = sources.line(span.source, span.line);

    let left_margin = format!("{}", span.line).len();
    let left_margin_fill = " ".repeat(left_margin);
    let left_padding_fill = " ".repeat(span.col.saturating_sub(1));

    format!(
        "{label}: {message}\n{left_margin_fill}--> {file}:{span}\n{left_margin_fill} |\n{line} |{line_str}\n{left_margin_fill} |{left_padding_fill}{caret}",
        label = label.red(),
        line = span.line,
        caret = "^".red(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_only_errors() {
        let mut reporter = Reporter::new();
        reporter.warning(Span::default(), "meh");
        assert!(!reporter.has_errors());

        reporter.error(DiagnosticKind::Semantic, Span::default(), "bad");
        assert!(reporter.has_errors());
        assert_eq!(reporter.error_count(), 1);
        assert_eq!(reporter.diagnostics().count(), 2);
    }

    #[test]
    fn test_absorb_keeps_order() {
        let mut first = Reporter::new();
        first.error(DiagnosticKind::Lex, Span::default(), "one");

        let mut second = Reporter::new();
        second.error(DiagnosticKind::Syntax, Span::default(), "two");
        second.error(DiagnosticKind::Semantic, Span::default(), "three");

        first.absorb(second);

        let messages: Vec<_> = first.diagnostics().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
        assert_eq!(first.error_count(), 3);
    }
}
