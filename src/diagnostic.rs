use crate::span::Span;

/// A compiler diagnostic (error or warning).
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Position of the offending token in the input stream.
    pub token_index: usize,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: String, token_index: usize, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message,
            token_index,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: String, token_index: usize, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            token_index,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        // Spans from a file that failed to load may fall outside the source.
        let start = (self.span.start as usize).min(source.len());
        let end = (self.span.end as usize).clamp(start, source.len());

        let mut report = Report::build(kind, filename, start)
            .with_message(format!("token {}: {}", self.token_index, self.message))
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }
}

/// Accumulates diagnostics for one compilation unit and renders them at the
/// end. Errors are never fatal here; a downstream build treats a nonzero
/// error count as failure.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, token_index: usize, span: Span, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(message.into(), token_index, span));
    }

    pub fn warning(&mut self, token_index: usize, span: Span, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::warning(message.into(), token_index, span));
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Render every accumulated diagnostic to stderr.
    pub fn render_all(&self, filename: &str, source: &str) {
        for diag in &self.diagnostics {
            diag.render(filename, source);
        }
    }
}
