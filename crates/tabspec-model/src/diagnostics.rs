//! Non-fatal diagnostics
//!
//! Every recoverable problem (unknown reference code, broken logic
//! expression, dependency cycle, failed fetch, aborted commit) is recorded
//! here and mirrored as a `tracing` warning. The window keeps working with a
//! safe default.

use parking_lot::Mutex;
use std::fmt::{self, Display, Formatter};

/// Category of a recovered problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Reference code not in the registry; the field falls back to text
    UnresolvedReferenceType,
    /// Logic expression failed to parse or evaluate; treated as `false`
    ExpressionEvaluation,
    /// Dependency cycle broken at its lowest-sort edge
    DependencyCycle,
    /// Remote fetch failed or timed out
    DataSourceFetch,
    /// Selector commit aborted; the store kept its previous values
    SelectorCommit,
    /// A second field with the same name and role was dropped
    DuplicateField,
    /// A section, logic field or mapping points at an unknown field
    UnresolvedField,
    /// An `onChangeFunction`/`validationFn` name has no registered callback
    UnknownCallback,
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnresolvedReferenceType => "unresolved-reference-type",
            Self::ExpressionEvaluation => "expression-evaluation",
            Self::DependencyCycle => "dependency-cycle",
            Self::DataSourceFetch => "datasource-fetch",
            Self::SelectorCommit => "selector-commit",
            Self::DuplicateField => "duplicate-field",
            Self::UnresolvedField => "unresolved-field",
            Self::UnknownCallback => "unknown-callback",
        };
        f.write_str(name)
    }
}

/// One recovered problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Category
    pub kind: DiagnosticKind,
    /// What it is about (field name, expression text, tab id)
    pub subject: String,
    /// Details
    pub message: String,
}

/// Shared sink for diagnostics
///
/// Interior mutability lets every component report through `&self`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    /// Create empty sink
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and emit it as a warning event
    pub fn report(
        &self,
        kind: DiagnosticKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic {
            kind,
            subject: subject.into(),
            message: message.into(),
        };
        tracing::warn!(
            kind = %diagnostic.kind,
            subject = %diagnostic.subject,
            "{}",
            diagnostic.message
        );
        self.entries.lock().push(diagnostic);
    }

    /// Snapshot of all recorded diagnostics
    #[must_use]
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Number of diagnostics of one kind
    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.lock().iter().filter(|d| d.kind == kind).count()
    }

    /// Total number of diagnostics
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if nothing was reported
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}
