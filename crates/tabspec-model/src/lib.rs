//! Tabspec Model - window specification data model
//!
//! Loads the raw window document an ERP back end emits and turns it into
//! typed, immutable records:
//! - Reference codes resolve to editor kinds with validation and formatting
//! - Tabs, fields, datasources and selectors become [`spec`] records
//! - Recoverable problems land in a shared [`Diagnostics`] sink
//!
//! # Example
//!
//! ```rust,ignore
//! use tabspec_model::{Diagnostics, SpecNormalizer};
//!
//! let diagnostics = Diagnostics::new();
//! let spec = SpecNormalizer::with_global_registry(&diagnostics).normalize_str(raw)?;
//! println!("root tab {}", spec.root.tab_id);
//! ```

#![warn(unreachable_pub)]

pub mod diagnostics;
pub mod error;
pub mod normalize;
pub mod reference;
pub mod serialize;
pub mod spec;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{SpecLocation, SpecResult, SpecValidationError};
pub use normalize::SpecNormalizer;
pub use reference::{
    EditorKind, Formatter, ReferenceType, ReferenceTypeRegistry, Validator, TEXT_REFERENCE,
};
pub use serialize::to_raw;
pub use spec::{
    identifier_of, DataSourceField, DataSourceSpec, FieldRole, FieldSpec, InField, LogicKind,
    OutField, ProcessDefinition, SectionGroup, SelectorDefinition, TabSpec, TextMatchStyle,
    ToolbarButton, WindowSpec,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with window specifications
    pub use crate::{
        DiagnosticKind, Diagnostics, FieldRole, FieldSpec, ReferenceTypeRegistry, SpecNormalizer,
        SpecValidationError, TabSpec, WindowSpec,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
