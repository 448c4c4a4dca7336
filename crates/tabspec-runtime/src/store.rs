//! Field value store
//!
//! One store per tab instance holds the active record's values, the keys
//! edited since the last load (dirty) and the fields whose datasource
//! options must be refetched (stale). Multi-key writes go through a
//! [`WriteBatch`], validated as a whole before anything is written.

use crate::error::StoreError;
use indexmap::IndexSet;
use serde_json::Value;
use tabspec_expr::FieldValues;
use tabspec_model::{ReferenceType, TabSpec};

/// Values of one tab instance
#[derive(Debug, Clone, Default)]
pub struct FieldValueStore {
    values: FieldValues,
    dirty: IndexSet<String>,
    stale: IndexSet<String>,
    record_id: Option<String>,
    revision: u64,
}

impl FieldValueStore {
    /// Empty store resolving column and `inp` aliases of the tab's fields
    #[must_use]
    pub fn for_tab(tab: &TabSpec) -> Self {
        Self {
            values: FieldValues::new().with_field_aliases(&tab.fields),
            ..Self::default()
        }
    }

    /// Replace the contents with a freshly loaded record
    pub fn load(
        &mut self,
        record_id: Option<String>,
        values: impl IntoIterator<Item = (String, Value)>,
    ) {
        self.values.clear();
        for (key, value) in values {
            self.values.insert(key, value);
        }
        self.dirty.clear();
        self.stale.clear();
        self.record_id = record_id;
        self.revision += 1;
    }

    /// Forget the record
    pub fn clear(&mut self) {
        self.load(None, std::iter::empty());
    }

    /// Write one value and mark it dirty
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        self.dirty.insert(key.clone());
        self.revision += 1;
        self.values.insert(key, value)
    }

    /// Apply every write of the batch, or none of them
    ///
    /// # Errors
    /// The first write whose value fails its reference-type check; the
    /// store is left untouched
    pub fn apply_batch(&mut self, batch: WriteBatch) -> Result<Vec<String>, StoreError> {
        for write in &batch.writes {
            if let Some(reference) = &write.check {
                reference
                    .validate(&write.value)
                    .map_err(|reason| StoreError::Rejected {
                        key: write.key.clone(),
                        reason,
                    })?;
            }
        }

        let mut written = Vec::with_capacity(batch.writes.len());
        for write in batch.writes {
            self.dirty.insert(write.key.clone());
            written.push(write.key.clone());
            self.values.insert(write.key, write.value);
        }
        for key in batch.dirty {
            self.dirty.insert(key);
        }
        self.revision += 1;
        tracing::debug!(keys = written.len(), revision = self.revision, "applied write batch");
        Ok(written)
    }

    /// Alias-tolerant read
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Values as an evaluation layer
    #[inline]
    #[must_use]
    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    /// Id of the loaded record
    #[inline]
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    /// Incremented on every change
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Check if a key was edited since load
    #[inline]
    #[must_use]
    pub fn is_dirty(&self, key: &str) -> bool {
        self.dirty.contains(key)
    }

    /// Edited keys in edit order
    pub fn dirty(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Mark a key dirty without writing it
    pub fn mark_dirty(&mut self, key: impl Into<String>) {
        self.dirty.insert(key.into());
    }

    /// Forget edit marks (after save)
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Mark a field's datasource options stale
    pub fn mark_stale(&mut self, field: impl Into<String>) {
        self.stale.insert(field.into());
    }

    /// Check if a field's options are stale
    #[inline]
    #[must_use]
    pub fn is_stale(&self, field: &str) -> bool {
        self.stale.contains(field)
    }

    /// Fields with stale options
    pub fn stale(&self) -> impl Iterator<Item = &str> {
        self.stale.iter().map(String::as_str)
    }

    /// Clear a stale mark after refetching
    pub fn refreshed(&mut self, field: &str) {
        self.stale.shift_remove(field);
    }
}

#[derive(Debug, Clone)]
struct PendingWrite {
    key: String,
    value: Value,
    check: Option<ReferenceType>,
}

/// Writes applied together by [`FieldValueStore::apply_batch`]
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<PendingWrite>,
    dirty: Vec<String>,
}

impl WriteBatch {
    /// Create empty batch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write without a type check (hidden keys, labels)
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.writes.push(PendingWrite {
            key: key.into(),
            value,
            check: None,
        });
        self
    }

    /// Write checked against a reference type
    pub fn set_checked(
        &mut self,
        key: impl Into<String>,
        value: Value,
        reference: &ReferenceType,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            key: key.into(),
            value,
            check: Some(reference.clone()),
        });
        self
    }

    /// Mark a key dirty as part of the batch
    pub fn mark_dirty(&mut self, key: impl Into<String>) -> &mut Self {
        self.dirty.push(key.into());
        self
    }

    /// Keys written, in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.writes.iter().map(|w| w.key.as_str())
    }

    /// Number of writes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabspec_model::ReferenceTypeRegistry;

    #[test]
    fn batch_is_all_or_nothing() {
        let registry = ReferenceTypeRegistry::global();
        let mut store = FieldValueStore::default();
        store.load(Some("L1".into()), [("qty".to_string(), json!(1))]);

        let mut batch = WriteBatch::new();
        batch
            .set("product", json!("P1"))
            .set_checked("uom", json!("KG"), registry.resolve("_id_19"))
            .set_checked("price", json!("cheap"), registry.resolve("_id_800008"))
            .mark_dirty("limit");
        let before = store.revision();

        assert!(matches!(
            store.apply_batch(batch),
            Err(StoreError::Rejected { ref key, .. }) if key == "price"
        ));
        assert_eq!(store.get("product"), None);
        assert_eq!(store.get("uom"), None);
        assert!(!store.is_dirty("limit"));
        assert_eq!(store.revision(), before);
    }

    #[test]
    fn batch_marks_written_and_extra_keys_dirty() {
        let registry = ReferenceTypeRegistry::global();
        let mut store = FieldValueStore::default();
        let mut batch = WriteBatch::new();
        batch
            .set("product", json!("P1"))
            .set_checked("price", json!("12.5"), registry.resolve("_id_800008"))
            .mark_dirty("limit");

        let written = store.apply_batch(batch).unwrap();
        assert_eq!(written, vec!["product".to_string(), "price".to_string()]);
        assert_eq!(store.dirty().collect::<Vec<_>>(), vec!["product", "price", "limit"]);
        assert_eq!(store.get("price"), Some(&json!("12.5")));
    }

    #[test]
    fn load_resets_marks() {
        let mut store = FieldValueStore::default();
        store.set("a", json!(1));
        store.mark_stale("b");
        store.load(Some("R2".into()), [("a".to_string(), json!(2))]);
        assert!(!store.is_dirty("a"));
        assert!(!store.is_stale("b"));
        assert_eq!(store.record_id(), Some("R2"));
        assert_eq!(store.get("a"), Some(&json!(2)));
    }
}
