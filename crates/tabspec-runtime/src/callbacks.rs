//! Late-bound field callbacks
//!
//! `onChangeFunction` and `validationFn` are names in the metadata. They
//! resolve at call time through a [`CallbackRegistry`]; an unknown name is
//! reported as a diagnostic and the call is skipped.

use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tabspec_expr::EvalScope;
use tabspec_model::{FieldSpec, TabSpec};

/// What a callback sees
#[derive(Debug, Clone, Copy)]
pub struct CallbackContext<'a> {
    /// Tab being edited
    pub tab: &'a TabSpec,
    /// Field the callback is bound to
    pub field: &'a FieldSpec,
    /// Record, parent and session values
    pub scope: EvalScope<'a>,
}

impl CallbackContext<'_> {
    /// Current value of the bound field
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.scope.lookup(&self.field.name)
    }
}

/// Field behavior registered under an `onChangeFunction` / `validationFn` name
pub trait FieldCallback: Send + Sync {
    /// Values to write after the bound field changed
    fn on_change(&self, ctx: &CallbackContext<'_>) -> Vec<(String, Value)> {
        let _ = ctx;
        Vec::new()
    }

    /// Check a value before save
    ///
    /// # Errors
    /// A message shown next to the field
    fn validate(&self, value: &Value, ctx: &CallbackContext<'_>) -> Result<(), String> {
        let _ = (value, ctx);
        Ok(())
    }
}

/// Callback built from a closure returning writes
pub struct OnChangeFn<F>(pub F);

impl<F> FieldCallback for OnChangeFn<F>
where
    F: Fn(&CallbackContext<'_>) -> Vec<(String, Value)> + Send + Sync,
{
    fn on_change(&self, ctx: &CallbackContext<'_>) -> Vec<(String, Value)> {
        (self.0)(ctx)
    }
}

/// Callback built from a validation closure
pub struct ValidateFn<F>(pub F);

impl<F> FieldCallback for ValidateFn<F>
where
    F: Fn(&Value, &CallbackContext<'_>) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &Value, ctx: &CallbackContext<'_>) -> Result<(), String> {
        (self.0)(value, ctx)
    }
}

/// Named callbacks, shared across tabs
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    callbacks: Arc<DashMap<String, Arc<dyn FieldCallback>>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl CallbackRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a callback
    pub fn register(&self, name: impl Into<String>, callback: impl FieldCallback + 'static) {
        self.callbacks.insert(name.into(), Arc::new(callback));
    }

    /// Look up a callback
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn FieldCallback>> {
        self.callbacks.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a name is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    /// Remove a callback
    pub fn remove(&self, name: &str) -> bool {
        self.callbacks.remove(name).is_some()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.callbacks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of callbacks
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
