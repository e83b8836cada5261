#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use strata_ast::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    pub fn display(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Hint => "hint",
        }
    }

    fn glyph(&self) -> &'static str {
        match self {
            Severity::Error => "✖",
            Severity::Warning => "⚠",
            Severity::Info => "ℹ",
            Severity::Hint => "➜",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Related {
    pub message: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    /// Stable code such as `VER003` or `SEC002`; asserted on by tests.
    pub code: Option<String>,
    pub hint: Option<String>,
    pub related: Vec<Related>,
}

/// Appends diagnostics in order; hints and related notes attach to the most
/// recently added entry.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticBuilder {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, message: String, span: Span, code: Option<&str>) {
        self.diagnostics.push(Diagnostic {
            severity,
            message,
            span,
            code: code.map(str::to_string),
            hint: None,
            related: Vec::new(),
        });
    }

    pub fn error(&mut self, message: impl Into<String>, span: Span, code: Option<&str>) -> &mut Self {
        self.push(Severity::Error, message.into(), span, code);
        self
    }

    pub fn warning(
        &mut self,
        message: impl Into<String>,
        span: Span,
        code: Option<&str>,
    ) -> &mut Self {
        self.push(Severity::Warning, message.into(), span, code);
        self
    }

    pub fn info(&mut self, message: impl Into<String>, span: Span, code: Option<&str>) -> &mut Self {
        self.push(Severity::Info, message.into(), span, code);
        self
    }

    pub fn hint(&mut self, message: impl Into<String>, span: Span, code: Option<&str>) -> &mut Self {
        self.push(Severity::Hint, message.into(), span, code);
        self
    }

    /// Attach a hint line to the last diagnostic.
    pub fn with_hint(&mut self, hint: impl Into<String>) -> &mut Self {
        if let Some(last) = self.diagnostics.last_mut() {
            last.hint = Some(hint.into());
        }
        self
    }

    /// Attach a related note to the last diagnostic.
    pub fn with_related(&mut self, message: impl Into<String>, span: Span) -> &mut Self {
        if let Some(last) = self.diagnostics.last_mut() {
            last.related.push(Related {
                message: message.into(),
                span,
            });
        }
        self
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Render one diagnostic with a three-line source snippet and a caret
/// underline for single-line ranges.
pub fn render_diagnostic(diag: &Diagnostic, source: &str) -> String {
    let mut out = String::new();
    out.push_str(diag.severity.glyph());
    out.push(' ');
    out.push_str(&diag.message);
    if let Some(code) = &diag.code {
        out.push_str(&format!(" [{code}]"));
    }
    out.push('\n');
    out.push_str(&format!(
        "  --> line {}, column {}\n",
        diag.span.start.line, diag.span.start.column
    ));

    let lines: Vec<&str> = source.lines().collect();
    let line_idx = diag.span.start.line as usize;
    let first = line_idx.saturating_sub(1).max(1);
    let last = (line_idx + 1).min(lines.len());
    for n in first..=last {
        let Some(text) = lines.get(n - 1) else {
            continue;
        };
        out.push_str(&format!("  {n:>4} | {text}\n"));
        if n == line_idx && diag.span.start.line == diag.span.end.line {
            let pad = " ".repeat(diag.span.start.column.saturating_sub(1) as usize);
            let width = (diag.span.end.column - diag.span.start.column).max(1) as usize;
            out.push_str(&format!("       | {pad}{}\n", "^".repeat(width)));
        }
    }

    if let Some(hint) = &diag.hint {
        out.push_str(&format!("  hint: {hint}\n"));
    }
    if !diag.related.is_empty() {
        out.push_str("  related:\n");
        for r in &diag.related {
            out.push_str(&format!(
                "    - {} (line {}, column {})\n",
                r.message, r.span.start.line, r.span.start.column
            ));
        }
    }
    out
}
