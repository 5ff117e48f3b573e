//! Diagnostic message handling for the Basalt compiler
//!
//! Diagnostics are collected into an explicitly threaded [`Diagnostics`]
//! context rather than a global sink. A fatal diagnostic is recorded and
//! simultaneously returned as a [`BasaltError`] so that the raising pass can
//! propagate it with `?`; compilation of the current unit stops at the first
//! fatal message.

use crate::{BasaltError, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for diagnostic messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Note,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warn => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A diagnostic message with an optional source attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: Option<String>,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file: None,
            span: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;

        match (&self.file, &self.span) {
            (Some(file), Some(span)) => write!(f, " at {}:{}", file, span),
            (Some(file), None) => write!(f, " in {}", file),
            (None, Some(span)) => write!(f, " at {}", span),
            (None, None) => Ok(()),
        }
    }
}

/// Collection of diagnostic messages for one compiler invocation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.messages.push(diagnostic);
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.add(Diagnostic::new(Severity::Note, message));
    }

    pub fn warn(&mut self, message: impl Into<String>, file: &str, span: Span) {
        self.add(Diagnostic::new(Severity::Warn, message).with_file(file).with_span(span));
    }

    pub fn error(&mut self, message: impl Into<String>, file: &str, span: Span) {
        self.add(Diagnostic::new(Severity::Error, message).with_file(file).with_span(span));
    }

    /// Record a fatal diagnostic and hand the underlying error back to the
    /// caller for propagation.
    pub fn fatal(&mut self, error: BasaltError, file: &str, span: Span) -> BasaltError {
        self.add(
            Diagnostic::new(Severity::Fatal, error.message())
                .with_file(file)
                .with_span(span),
        );
        error
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|d| matches!(d.severity, Severity::Error | Severity::Fatal))
    }

    pub fn error_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|d| matches!(d.severity, Severity::Error | Severity::Fatal))
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages.iter().filter(|d| d.severity == Severity::Warn).count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.messages.extend(other.messages);
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Warn)
    }

    /// Write every collected message to `out`, one per line.
    pub fn report(&self, out: &mut impl std::io::Write) -> std::io::Result<()> {
        for message in &self.messages {
            writeln!(out, "{}", message)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;
    use pretty_assertions::assert_eq;

    #[test]
    fn fatal_records_and_returns() {
        let mut diags = Diagnostics::new();
        let err = diags.fatal(
            BasaltError::parse("expected ';'"),
            "main.bas",
            Span::single(Position::new(2, 10)),
        );

        assert_eq!(err.message(), "expected ';'");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.has_errors());
        assert_eq!(
            diags.messages[0].to_string(),
            "fatal: expected ';' at main.bas:2:10"
        );
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut diags = Diagnostics::new();
        diags.warn("duplicate 'mut' keyword", "a.bas", Span::default());
        assert!(!diags.has_errors());
        assert_eq!(diags.warning_count(), 1);
    }
}
