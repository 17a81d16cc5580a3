//! Diagnostics collection and reporting (§6, §7).
//!
//! The compiler reports as many errors as it can while remaining
//! structurally coherent, and never partially writes output: it either
//! returns a fully-formed AST accepted by the emitter, or returns failure
//! with at least one diagnostic attached. Nothing is recovered silently.

use std::fmt;

use pamplemousse_core::ErrorSink;

/// The closed set of error kinds (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed XML or a missing required attribute.
    ParseError,
    /// An enum attribute value outside its closed set.
    UnknownAttributeValue,
    /// A coercion the catalogue cannot perform.
    TypeMismatch,
    /// A requested input/output binding does not exist in the model.
    BindingFailure,
    DuplicateName,
    /// E.g. `sum` requested on a classification ensemble.
    UnsupportedCombination,
    /// The AST builder's stack discipline was violated.
    InternalInvariant,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ParseError => "parse-error",
            ErrorKind::UnknownAttributeValue => "unknown-attribute-value",
            ErrorKind::TypeMismatch => "type-mismatch",
            ErrorKind::BindingFailure => "binding-failure",
            ErrorKind::DuplicateName => "duplicate-name",
            ErrorKind::UnsupportedCombination => "unsupported-combination",
            ErrorKind::InternalInvariant => "internal-invariant",
        };
        f.write_str(s)
    }
}

/// One diagnostic: a human-readable message, an optional argument, the
/// source line number (when known), and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub argument: Option<String>,
    pub line: Option<u32>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, &self.argument) {
            (Some(line), Some(arg)) => write!(f, "{} ({arg}) at line {line}: {}", self.kind, self.message),
            (Some(line), None) => write!(f, "{} at line {line}: {}", self.kind, self.message),
            (None, Some(arg)) => write!(f, "{} ({arg}): {}", self.kind, self.message),
            (None, None) => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// An accumulating sink of diagnostics for one compilation. Implements
/// [`pamplemousse_core::ErrorSink`] so the AST builder can report through
/// it directly.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, kind: ErrorKind, message: impl Into<String>, line: Option<u32>) {
        self.entries.push(Diagnostic { kind, message: message.into(), argument: None, line });
    }

    pub fn report_with_arg(&mut self, kind: ErrorKind, message: impl Into<String>, argument: impl Into<String>, line: Option<u32>) {
        self.entries.push(Diagnostic { kind, message: message.into(), argument: Some(argument.into()), line });
    }

    pub fn has_errors(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }

    /// Render every diagnostic as one line per entry, suitable for CLI
    /// output.
    pub fn render(&self) -> String {
        self.entries.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n")
    }
}

/// Adapts a builder-reported error (message + optional argument + line)
/// into a [`Diagnostic`] of kind [`ErrorKind::ParseError`]. Model
/// compilers that need a more specific kind call
/// [`Diagnostics::report`]/[`Diagnostics::report_with_arg`] directly
/// instead of going through the builder.
impl ErrorSink for Diagnostics {
    fn error(&mut self, message: String, argument: Option<String>, line: Option<u32>) {
        self.entries.push(Diagnostic { kind: ErrorKind::ParseError, message, argument, line });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let diag = Diagnostics::new();
        assert!(!diag.has_errors());
    }

    #[test]
    fn accumulates_multiple_reports() {
        let mut diag = Diagnostics::new();
        diag.report(ErrorKind::ParseError, "missing attribute", Some(10));
        diag.report(ErrorKind::DuplicateName, "x", Some(11));
        assert_eq!(diag.iter().count(), 2);
    }

    #[test]
    fn display_includes_line_number() {
        let mut diag = Diagnostics::new();
        diag.report(ErrorKind::ParseError, "bad node", Some(4));
        assert!(diag.render().contains("line 4"));
    }
}
