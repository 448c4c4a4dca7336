//! Reference types
//!
//! A field's `type` is a reference code such as `_id_19` (table-dir foreign
//! key) or `_id_20` (yes/no). [`ReferenceTypeRegistry`] maps those codes to
//! an [`EditorKind`] plus validation and formatting behavior. Unknown codes
//! resolve to a generic text type and produce a diagnostic.

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Code of the generic text reference used as fallback
pub const TEXT_REFERENCE: &str = "_id_10";

/// Editor family a reference code resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorKind {
    /// Single-line text
    Text,
    /// Multi-line text
    Memo,
    /// Whole number
    Integer,
    /// Monetary amount
    Amount,
    /// General decimal number
    Number,
    /// Quantity
    Quantity,
    /// Unit price
    Price,
    /// Calendar date
    Date,
    /// Date and time
    DateTime,
    /// Time of day
    Time,
    /// Yes/No flag
    Boolean,
    /// Fixed value list
    List,
    /// Foreign key picked from a combo (table / table-dir)
    ForeignKey,
    /// Foreign key picked from a popup selector
    Search,
    /// Process button
    Button,
    /// Image reference
    Image,
    /// Hyperlink
    Link,
    /// Primary key
    Id,
}

impl EditorKind {
    /// Check if values of this kind are foreign keys with an `$_identifier` label
    #[inline]
    #[must_use]
    pub const fn is_foreign_key(self) -> bool {
        matches!(self, Self::ForeignKey | Self::Search | Self::Image)
    }

    /// Check if values of this kind are numeric
    #[inline]
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Amount | Self::Number | Self::Quantity | Self::Price
        )
    }
}

/// Value check applied before a value reaches a field store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Any scalar accepted
    Any,
    /// Whole numbers
    Integer,
    /// Decimal numbers
    Decimal,
    /// `yyyy-MM-dd` or `dd-MM-yyyy`
    Date,
    /// ISO date-time (date alone accepted)
    DateTime,
    /// `HH:mm[:ss]`
    Time,
    /// `true`/`false`/`Y`/`N`
    Boolean,
}

impl Validator {
    /// Validate a value; `null` always passes (mandatory checks are separate)
    ///
    /// # Errors
    /// Returns a human readable reason when the value does not fit
    pub fn validate(self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            Self::Any => match value {
                Value::Array(_) | Value::Object(_) => Err("expected a scalar value".to_string()),
                _ => Ok(()),
            },
            Self::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
                Value::String(s) if s.trim().parse::<i64>().is_ok() => Ok(()),
                _ => Err(format!("expected an integer, got {value}")),
            },
            Self::Decimal => match value {
                Value::Number(_) => Ok(()),
                Value::String(s) if s.trim().parse::<f64>().is_ok() => Ok(()),
                _ => Err(format!("expected a number, got {value}")),
            },
            Self::Date => match value.as_str().and_then(parse_date) {
                Some(_) => Ok(()),
                None => Err(format!("expected a date, got {value}")),
            },
            Self::DateTime => match value.as_str() {
                Some(s) if parse_date_time(s).is_some() || parse_date(s).is_some() => Ok(()),
                _ => Err(format!("expected a date-time, got {value}")),
            },
            Self::Time => match value.as_str() {
                Some(s)
                    if NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
                        || NaiveTime::parse_from_str(s, "%H:%M").is_ok() =>
                {
                    Ok(())
                }
                _ => Err(format!("expected a time, got {value}")),
            },
            Self::Boolean => match value {
                Value::Bool(_) => Ok(()),
                Value::String(s) if matches!(s.as_str(), "Y" | "N" | "true" | "false") => Ok(()),
                _ => Err(format!("expected a yes/no value, got {value}")),
            },
        }
    }
}

/// Display formatting for a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    /// Value as-is
    Plain,
    /// Fixed number of decimals
    Decimal(u8),
    /// `dd-MM-yyyy`
    Date,
    /// `Y` / `N`
    Boolean,
}

impl Formatter {
    /// Format a value for display; `null` becomes the empty string
    #[must_use]
    pub fn format(self, value: &Value) -> String {
        match (self, value) {
            (_, Value::Null) => String::new(),
            (Self::Decimal(precision), v) => match as_f64(v) {
                Some(n) => format!("{n:.prec$}", prec = usize::from(precision)),
                None => plain(v),
            },
            (Self::Date, Value::String(s)) => match parse_date(s) {
                Some(date) => date.format("%d-%m-%Y").to_string(),
                None => s.clone(),
            },
            (Self::Boolean, Value::Bool(b)) => (if *b { "Y" } else { "N" }).to_string(),
            (Self::Boolean, Value::String(s)) if s == "true" => "Y".to_string(),
            (Self::Boolean, Value::String(s)) if s == "false" => "N".to_string(),
            (_, v) => plain(v),
        }
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .ok()
}

fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Resolved reference type descriptor
///
/// Equality is by code.
#[derive(Debug, Clone)]
pub struct ReferenceType {
    code: String,
    kind: EditorKind,
    precision: Option<u8>,
    validator: Validator,
    formatter: Formatter,
}

impl ReferenceType {
    /// Build a descriptor whose validator and formatter follow from the kind
    #[must_use]
    pub fn new(code: impl Into<String>, kind: EditorKind, precision: Option<u8>) -> Self {
        let validator = match kind {
            EditorKind::Integer => Validator::Integer,
            EditorKind::Amount | EditorKind::Number | EditorKind::Quantity | EditorKind::Price => {
                Validator::Decimal
            }
            EditorKind::Date => Validator::Date,
            EditorKind::DateTime => Validator::DateTime,
            EditorKind::Time => Validator::Time,
            EditorKind::Boolean => Validator::Boolean,
            _ => Validator::Any,
        };
        let formatter = match (kind, precision) {
            (_, Some(p)) => Formatter::Decimal(p),
            (EditorKind::Date, None) => Formatter::Date,
            (EditorKind::Boolean, None) => Formatter::Boolean,
            _ => Formatter::Plain,
        };
        Self {
            code: code.into(),
            kind,
            precision,
            validator,
            formatter,
        }
    }

    /// Reference code (`_id_*`)
    #[inline]
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Editor family
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EditorKind {
        self.kind
    }

    /// Display precision for numeric kinds
    #[inline]
    #[must_use]
    pub fn precision(&self) -> Option<u8> {
        self.precision
    }

    /// Validator for this reference
    #[inline]
    #[must_use]
    pub fn validator(&self) -> Validator {
        self.validator
    }

    /// Formatter for this reference
    #[inline]
    #[must_use]
    pub fn formatter(&self) -> Formatter {
        self.formatter
    }

    /// Validate a value
    ///
    /// # Errors
    /// Returns the validator's reason on mismatch
    #[inline]
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        self.validator.validate(value)
    }

    /// Format a value for display
    #[inline]
    #[must_use]
    pub fn format(&self, value: &Value) -> String {
        self.formatter.format(value)
    }
}

impl PartialEq for ReferenceType {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for ReferenceType {}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.code, self.kind)
    }
}

static GLOBAL: Lazy<ReferenceTypeRegistry> = Lazy::new(ReferenceTypeRegistry::with_defaults);

/// Registry of reference codes
///
/// Populated once, then read-only. [`ReferenceTypeRegistry::global`] is
/// shared process-wide without locking.
#[derive(Debug, Clone)]
pub struct ReferenceTypeRegistry {
    types: HashMap<String, ReferenceType>,
    fallback: ReferenceType,
}

impl ReferenceTypeRegistry {
    /// Create registry with only the text fallback
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
            fallback: ReferenceType::new(TEXT_REFERENCE, EditorKind::Text, None),
        }
    }

    /// Create registry with the built-in reference codes
    #[must_use]
    pub fn with_defaults() -> Self {
        use EditorKind as K;

        let mut registry = Self::new();
        let builtin: [(&str, EditorKind, Option<u8>); 27] = [
            ("_id_10", K::Text, None),
            ("_id_11", K::Integer, None),
            ("_id_12", K::Amount, Some(2)),
            ("_id_13", K::Id, None),
            ("_id_14", K::Memo, None),
            ("_id_15", K::Date, None),
            ("_id_16", K::DateTime, None),
            ("_id_17", K::List, None),
            ("_id_18", K::ForeignKey, None),
            ("_id_19", K::ForeignKey, None),
            ("_id_20", K::Boolean, None),
            ("_id_21", K::ForeignKey, None),
            ("_id_22", K::Number, None),
            ("_id_24", K::Time, None),
            ("_id_25", K::ForeignKey, None),
            ("_id_28", K::Button, None),
            ("_id_29", K::Quantity, None),
            ("_id_30", K::Search, None),
            ("_id_31", K::Search, None),
            ("_id_32", K::Image, None),
            ("_id_34", K::Memo, None),
            ("_id_35", K::Search, None),
            ("_id_800008", K::Price, None),
            ("_id_800060", K::Search, None),
            ("_id_800101", K::Link, None),
            ("_id_95E2A8B50A254B2AAE6774B8C2F28120", K::Search, None),
            ("_id_478169542A1747BD942DD70C8B45089C", K::DateTime, None),
        ];
        for (code, kind, precision) in builtin {
            registry.register(ReferenceType::new(code, kind, precision));
        }
        registry
    }

    /// Process-wide registry with the built-in codes
    #[inline]
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Register (or replace) a reference type
    pub fn register(&mut self, reference: ReferenceType) {
        self.types.insert(reference.code.clone(), reference);
    }

    /// Check if a code is known
    #[inline]
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.types.contains_key(code)
    }

    /// Number of registered codes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if no codes are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Resolve a code, falling back to text for unknown codes
    #[must_use]
    pub fn resolve(&self, code: &str) -> &ReferenceType {
        self.types.get(code).unwrap_or_else(|| {
            tracing::debug!(code, "unknown reference code, using text editor");
            &self.fallback
        })
    }

    /// Resolve a code and record a diagnostic when it is unknown
    #[must_use]
    pub fn resolve_reported(&self, code: &str, diagnostics: &Diagnostics) -> &ReferenceType {
        match self.types.get(code) {
            Some(reference) => reference,
            None => {
                diagnostics.report(
                    DiagnosticKind::UnresolvedReferenceType,
                    code,
                    format!("unknown reference code '{code}', falling back to text"),
                );
                &self.fallback
            }
        }
    }
}

impl Default for ReferenceTypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_builtin_codes() {
        let registry = ReferenceTypeRegistry::with_defaults();
        assert_eq!(registry.resolve("_id_19").kind(), EditorKind::ForeignKey);
        assert_eq!(registry.resolve("_id_20").kind(), EditorKind::Boolean);
        assert_eq!(registry.resolve("_id_12").kind(), EditorKind::Amount);
        assert_eq!(registry.resolve("_id_12").precision(), Some(2));
    }

    #[test]
    fn unknown_code_falls_back_to_text_and_reports() {
        let registry = ReferenceTypeRegistry::with_defaults();
        let diags = Diagnostics::new();
        let reference = registry.resolve_reported("_id_NOPE", &diags);
        assert_eq!(reference.kind(), EditorKind::Text);
        assert_eq!(diags.count(DiagnosticKind::UnresolvedReferenceType), 1);
    }

    #[test]
    fn resolution_is_deterministic() {
        let registry = ReferenceTypeRegistry::global();
        let a = registry.resolve("_id_30");
        let b = registry.resolve("_id_30");
        assert!(std::ptr::eq(a, b));
        assert_eq!(a, b);
    }

    #[test]
    fn validators_accept_and_reject() {
        assert!(Validator::Integer.validate(&json!(12)).is_ok());
        assert!(Validator::Integer.validate(&json!("x")).is_err());
        assert!(Validator::Decimal.validate(&json!("10.50")).is_ok());
        assert!(Validator::Date.validate(&json!("2024-03-01")).is_ok());
        assert!(Validator::Date.validate(&json!("01-03-2024")).is_ok());
        assert!(Validator::Date.validate(&json!("yesterday")).is_err());
        assert!(Validator::Boolean.validate(&json!("Y")).is_ok());
        assert!(Validator::Boolean.validate(&json!("maybe")).is_err());
        assert!(Validator::Any.validate(&Value::Null).is_ok());
    }

    #[test]
    fn formatters() {
        let registry = ReferenceTypeRegistry::with_defaults();
        assert_eq!(registry.resolve("_id_12").format(&json!(3.5)), "3.50");
        assert_eq!(registry.resolve("_id_15").format(&json!("2024-03-01")), "01-03-2024");
        assert_eq!(registry.resolve("_id_20").format(&json!(true)), "Y");
        assert_eq!(registry.resolve("_id_10").format(&Value::Null), "");
    }
}
