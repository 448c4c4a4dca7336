//! Session attributes
//!
//! A tab lists the attributes it publishes in `sessionAttributesNames`
//! (`#AD_Org_ID`, `$IsSOTrx`). They are captured from the tab's record each
//! time a record loads and are visible to every evaluation and query in the
//! window. The stored key keeps its `#` / `$` prefix. Fields flagged
//! `sessionProperty` publish their value under their column name.

use serde_json::Value;
use tabspec_expr::FieldValues;
use tabspec_model::TabSpec;

/// Window-wide session values
#[derive(Debug, Clone, Default)]
pub struct SessionAttributes {
    values: FieldValues,
}

impl SessionAttributes {
    /// Create empty attribute set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the tab's published attributes from its record
    ///
    /// Returns the attribute names that received a value. Attributes with no
    /// value in the record are removed.
    pub fn capture(&mut self, tab: &TabSpec, record: &FieldValues) -> Vec<String> {
        let mut captured = Vec::new();
        for name in &tab.session_attribute_names {
            let bare = name.trim_start_matches(['#', '$']);
            match record.get(bare).or_else(|| record.get(name)) {
                Some(value) if !value.is_null() => {
                    self.values.insert(name.clone(), value.clone());
                    captured.push(name.clone());
                }
                _ => {
                    self.values.remove(name);
                }
            }
        }
        for field in tab.fields.iter().filter(|f| f.session_property) {
            if let Some(value) = record.get(&field.name).filter(|v| !v.is_null()) {
                let key = field.column_name.as_deref().unwrap_or(&field.name);
                self.values.insert(key, value.clone());
            }
        }
        tracing::debug!(tab = %tab.tab_id, captured = captured.len(), "captured session attributes");
        captured
    }

    /// Set one attribute
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name, value);
    }

    /// Read an attribute, with or without its prefix
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .or_else(|| self.values.get(&format!("#{name}")))
            .or_else(|| self.values.get(&format!("${name}")))
    }

    /// Values as an evaluation layer
    #[inline]
    #[must_use]
    pub fn values(&self) -> &FieldValues {
        &self.values
    }

    /// Number of attributes
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabspec_model::FieldSpec;

    fn order_tab() -> TabSpec {
        let mut org = FieldSpec::new("organization", "_id_19");
        org.column_name = Some("AD_Org_ID".into());
        let mut trx = FieldSpec::new("salesTransaction", "_id_20");
        trx.column_name = Some("IsSOTrx".into());
        TabSpec {
            tab_id: "186".into(),
            entity: "Order".into(),
            title: None,
            parent_property: None,
            fields: vec![org, trx],
            data_source: None,
            grid_properties: Default::default(),
            standard_properties: Default::default(),
            session_attribute_names: vec!["#AD_Org_ID".into(), "$IsSOTrx".into()],
            has_child_tabs: true,
            sections: Vec::new(),
            toolbar_buttons: Vec::new(),
            children: Vec::new(),
        }
    }

    #[test]
    fn captures_through_column_aliases() {
        let tab = order_tab();
        let record = FieldValues::new()
            .with_field_aliases(&tab.fields)
            .tap_insert("organization", json!("O1"))
            .tap_insert("salesTransaction", json!(true));

        let mut session = SessionAttributes::new();
        let captured = session.capture(&tab, &record);
        assert_eq!(captured, vec!["#AD_Org_ID".to_string(), "$IsSOTrx".to_string()]);
        assert_eq!(session.get("AD_Org_ID"), Some(&json!("O1")));
        assert_eq!(session.get("$IsSOTrx"), Some(&json!(true)));
    }

    #[test]
    fn missing_values_are_removed() {
        let tab = order_tab();
        let mut session = SessionAttributes::new();
        session.set("#AD_Org_ID", json!("O1"));
        let record = FieldValues::new().with_field_aliases(&tab.fields);
        assert!(session.capture(&tab, &record).is_empty());
        assert!(session.is_empty());
    }

    trait TapInsert {
        fn tap_insert(self, key: &str, value: Value) -> Self;
    }

    impl TapInsert for FieldValues {
        fn tap_insert(mut self, key: &str, value: Value) -> Self {
            self.insert(key, value);
            self
        }
    }
}
