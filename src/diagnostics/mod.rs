//! Structural validation.
//!
//! [`check_file`] runs every validation pass over one file and returns
//! ranged, kind-discriminated diagnostics. The kind is part of the public
//! contract: code-action providers match on it to offer targeted fixes
//! (add an import, renumber a field, drop an unused import), and `data`
//! carries the machine-readable payload such fixes need.

mod discouraged;
mod imports;
mod naming;
mod references;
mod tags;

use protonav_parse::ast::Range;

use crate::workspace::Workspace;

/// How strongly a diagnostic is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

/// The category of a diagnostic, stable across message wording changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Propagated from the parser.
    Syntax,
    /// Field number out of range, reserved, or colliding.
    TagNumber,
    /// Field numbers not strictly increasing in source order.
    NonIncreasing,
    /// Enum-specific rules.
    Enum,
    /// Naming convention drift.
    Naming,
    /// Unknown or unimported type reference.
    Reference,
    /// Unresolved, non-canonical or unused import.
    Import,
    /// Legacy or out-of-place language constructs.
    Discouraged,
    /// Use of a deprecated declaration.
    Deprecated,
    /// Overlapping proto2 extension ranges.
    ExtensionRange,
}

/// One validator finding.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub message: String,
    pub kind: DiagnosticKind,
    /// Machine-readable payload for fix providers, e.g. the import path to
    /// add or the canonical spelling to replace with.
    pub data: Option<String>,
}

impl Diagnostic {
    fn new(
        range: Range,
        severity: Severity,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Diagnostic {
        Diagnostic {
            range,
            severity,
            message: message.into(),
            kind,
            data: None,
        }
    }

    fn with_data(mut self, data: impl Into<String>) -> Diagnostic {
        self.data = Some(data.into());
        self
    }
}

/// Validates one file against the current workspace state.
///
/// Returns an empty list for unknown URIs; an unknown file has nothing to
/// validate, not an error.
pub fn check_file(workspace: &Workspace, uri: &str) -> Vec<Diagnostic> {
    let Some(file) = workspace.file(uri) else {
        return Vec::new();
    };
    let mut diagnostics = Vec::new();

    for note in &file.notes {
        diagnostics.push(Diagnostic::new(
            note.range,
            Severity::Error,
            DiagnosticKind::Syntax,
            note.message.clone(),
        ));
    }

    tags::check(file, &mut diagnostics);
    naming::check(file, &mut diagnostics);
    discouraged::check(file, &mut diagnostics);
    imports::check(workspace, file, &mut diagnostics);
    references::check(workspace, file, &mut diagnostics);

    diagnostics.sort_by(|a, b| {
        (a.range.start, a.range.end)
            .cmp(&(b.range.start, b.range.end))
            .then_with(|| a.message.cmp(&b.message))
    });
    diagnostics
}
