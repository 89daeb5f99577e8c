//! User-facing diagnostic records.
//!
//! Every problem found during resolution is reported as a [`Diagnostic`]
//! naming the fact or conflict group it concerns, so one run can surface
//! every inconsistency for a target instead of stopping at the first.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when an unknown fact shows up in probe input.
    pub const UNKNOWN_FACT: &str = "Run `capgen registry` to list known facts";

    /// Suggestion when a conflict group cannot be tie-broken.
    pub const UNRESOLVED_CONFLICT: &str =
        "Fix the probe for one member or declare a precedence for the group";

    /// Suggestion when a required derivation is missing inputs.
    pub const MISSING_INPUT: &str =
        "Probe the missing facts or mark the rule advisory in .capgen/config.toml";

    /// Suggestion when a failed manifest is about to be emitted.
    pub const FAILED_MANIFEST: &str =
        "Run `capgen explain <FACT>` to inspect how a fact was resolved";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// Classifies a resolution problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    /// Probe input names a fact the registry does not know
    UnknownFact,
    /// Raw value does not fit the fact's kind
    TypeMismatch,
    /// Two or more conflict group members enabled with no tie-break
    UnresolvedConflict,
    /// A required rule had undefined inputs
    DerivationFailed,
    /// A cross-fact sanity check failed
    InvariantViolation,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::UnknownFact => "unknown-fact",
            DiagnosticCode::TypeMismatch => "type-mismatch",
            DiagnosticCode::UnresolvedConflict => "unresolved-conflict",
            DiagnosticCode::DerivationFailed => "derivation-failed",
            DiagnosticCode::InvariantViolation => "invariant-violation",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<DiagnosticCode>,
    /// Fact or conflict group implicated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Additional context lines
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    /// Suggested fixes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Related location (file path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            code: None,
            subject: None,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Name the fact or group this diagnostic is about.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// One-line form: `error[unresolved-conflict] curses: message`.
    pub fn format_line(&self) -> String {
        let mut line = self.severity.to_string();
        if let Some(code) = self.code {
            line.push_str(&format!("[{}]", code));
        }
        if let Some(ref subject) = self.subject {
            line.push(' ');
            line.push_str(subject);
        }
        line.push_str(": ");
        line.push_str(&self.message);
        line
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        // Severity prefix with optional color
        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
            }
        };

        let code = self.code.map(|c| format!("[{}]", c)).unwrap_or_default();
        let subject = self
            .subject
            .as_ref()
            .map(|s| format!(" {}", s))
            .unwrap_or_default();
        output.push_str(&format!("{}{}{}: {}\n", severity_str, code, subject, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_line())
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, verbose: bool, color: bool) {
    if verbose {
        eprint!("{}", diagnostic.format(color));
    } else {
        eprintln!("{}", diagnostic.format_line());
    }
}

/// Count diagnostics by severity: (errors, warnings).
pub fn tally(diagnostics: &[Diagnostic]) -> (usize, usize) {
    diagnostics.iter().fold((0, 0), |(e, w), d| match d.severity {
        Severity::Error => (e + 1, w),
        Severity::Warning => (e, w + 1),
        Severity::Note => (e, w),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let diag = Diagnostic::error("HAVE_GETHOSTBYNAME_R_3_ARG and HAVE_GETHOSTBYNAME_R_5_ARG are both enabled")
            .with_code(DiagnosticCode::UnresolvedConflict)
            .with_subject("gethostbyname_r");
        assert_eq!(
            diag.format_line(),
            "error[unresolved-conflict] gethostbyname_r: HAVE_GETHOSTBYNAME_R_3_ARG and HAVE_GETHOSTBYNAME_R_5_ARG are both enabled"
        );
        assert_eq!(diag.to_string(), diag.format_line());
    }

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("derived fact has undefined inputs")
            .with_code(DiagnosticCode::DerivationFailed)
            .with_subject("HAVE_LARGEFILE_SUPPORT")
            .with_context("SIZEOF_LONG is undefined")
            .with_suggestion("Probe SIZEOF_LONG");

        let output = diag.format(false);
        assert!(output.starts_with("error[derivation-failed] HAVE_LARGEFILE_SUPPORT:"));
        assert!(output.contains("= SIZEOF_LONG is undefined"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Probe SIZEOF_LONG"));
    }

    #[test]
    fn test_tally() {
        let diags = vec![
            Diagnostic::error("a"),
            Diagnostic::warning("b"),
            Diagnostic::error("c"),
            Diagnostic::note("d"),
        ];
        assert_eq!(tally(&diags), (2, 1));
    }
}
