//! Error types for specification loading
//!
//! Normalization is fail-fast: the first structural problem aborts the load
//! with a [`SpecValidationError`] naming where it was found.

use std::fmt::{self, Display, Formatter};

/// Where in the raw specification a problem was detected
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecLocation {
    /// The document root (`window`, `processes`)
    Window,
    /// A tab, identified by its `tabId` (or a positional marker when absent)
    Tab(String),
    /// A field inside a tab or process parameter list
    Field {
        /// Owning tab id or process id
        owner: String,
        /// Field name (or positional marker when absent)
        field: String,
    },
    /// A process definition, identified by its `processId`
    Process(String),
}

impl Display for SpecLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window => write!(f, "window"),
            Self::Tab(id) => write!(f, "tab '{id}'"),
            Self::Field { owner, field } => write!(f, "field '{field}' of '{owner}'"),
            Self::Process(id) => write!(f, "process '{id}'"),
        }
    }
}

/// Malformed input: a required key is missing or an invariant does not hold
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid specification at {location}: {reason}")]
pub struct SpecValidationError {
    /// Where the problem was found
    pub location: SpecLocation,
    /// Human readable reason
    pub reason: String,
}

impl SpecValidationError {
    /// Error at document level
    pub fn window(reason: impl Into<String>) -> Self {
        Self {
            location: SpecLocation::Window,
            reason: reason.into(),
        }
    }

    /// Error attached to a tab
    pub fn tab(tab_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: SpecLocation::Tab(tab_id.into()),
            reason: reason.into(),
        }
    }

    /// Error attached to a field
    pub fn field(
        owner: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            location: SpecLocation::Field {
                owner: owner.into(),
                field: field.into(),
            },
            reason: reason.into(),
        }
    }

    /// Error attached to a process definition
    pub fn process(process_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: SpecLocation::Process(process_id.into()),
            reason: reason.into(),
        }
    }
}

/// Result type alias for specification loading
pub type SpecResult<T> = Result<T, SpecValidationError>;
