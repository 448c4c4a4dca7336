//! Evaluation scope
//!
//! Expressions read values through three layers: the current record, the
//! parent record, then session attributes. Inside a layer a name matches
//! exactly, then ignoring case, then through the `SNAKE_CASE` form of a
//! camelCase key, then through column aliases taken from field metadata.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use tabspec_model::FieldSpec;

static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new("([a-z0-9])([A-Z])").expect("static pattern compiles"));

/// `allowGroupAccess` → `ALLOW_GROUP_ACCESS`
#[must_use]
pub fn snake_case_alias(key: &str) -> String {
    CAMEL_BOUNDARY.replace_all(key, "${1}_${2}").to_uppercase()
}

/// Named values with alias-tolerant lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValues {
    values: IndexMap<String, Value>,
    aliases: HashMap<String, String>,
}

impl FieldValues {
    /// Create empty value set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register column-name and `inp` aliases of every field
    #[must_use]
    pub fn with_field_aliases<'a>(
        mut self,
        fields: impl IntoIterator<Item = &'a FieldSpec>,
    ) -> Self {
        for field in fields {
            if field.role.is_logic() {
                continue;
            }
            for alias in field.aliases().skip(1) {
                self.register_alias(alias, &field.name);
            }
        }
        self
    }

    /// Map `alias` (any case) to `key`
    pub fn register_alias(&mut self, alias: &str, key: &str) {
        self.aliases
            .entry(alias.to_lowercase())
            .or_insert_with(|| key.to_string());
    }

    /// Set a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Drop all values, keeping registered aliases
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Key a name resolves to, if any
    #[must_use]
    pub fn resolve_key(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.values.get_key_value(name) {
            return Some(key);
        }
        if let Some(key) = self.aliases.get(&name.to_lowercase()) {
            return Some(key);
        }
        self.values
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Exact-key value
    #[inline]
    #[must_use]
    pub fn get_exact(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Alias-tolerant lookup
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.values.get(name) {
            return Some(value);
        }
        if let Some((_, value)) = self
            .values
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            return Some(value);
        }
        if let Some((_, value)) = self.values.iter().find(|(key, _)| {
            !key.starts_with('$')
                && !key.starts_with('#')
                && snake_case_alias(key).eq_ignore_ascii_case(name)
        }) {
            return Some(value);
        }
        self.aliases
            .get(&name.to_lowercase())
            .and_then(|key| self.values.get(key))
    }

    /// Check if a name resolves
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of stored values
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            aliases: HashMap::new(),
        }
    }
}

/// Layered read-only view used during evaluation
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalScope<'a> {
    values: Option<&'a FieldValues>,
    parent: Option<&'a FieldValues>,
    session: Option<&'a FieldValues>,
}

impl<'a> EvalScope<'a> {
    /// Scope over the current record
    #[inline]
    #[must_use]
    pub fn new(values: &'a FieldValues) -> Self {
        Self {
            values: Some(values),
            parent: None,
            session: None,
        }
    }

    /// Scope with no values at all
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add the parent record layer
    #[inline]
    #[must_use]
    pub fn with_parent(mut self, parent: &'a FieldValues) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add the session attribute layer
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session: &'a FieldValues) -> Self {
        self.session = Some(session);
        self
    }

    /// Resolve a name through record, parent and session
    ///
    /// Session attributes are also tried with their `#` / `$` prefixes.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.values
            .and_then(|v| v.get(name))
            .or_else(|| self.parent.and_then(|p| p.get(name)))
            .or_else(|| {
                let session = self.session?;
                session
                    .get(name)
                    .or_else(|| session.get(&format!("#{name}")))
                    .or_else(|| session.get(&format!("${name}")))
            })
    }
}
