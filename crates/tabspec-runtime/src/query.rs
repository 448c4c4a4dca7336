//! Datasource query construction
//!
//! A request is a datasource URL plus flat string parameters and a list of
//! criteria objects. Parameters are layered, later layers winning:
//! 1. static `requestProperties.params`
//! 2. `inFields` values read from the record scope
//! 3. `_extraProperties`, the comma-joined extra projection
//!
//! Every projected foreign-key column `X` also projects `X$_identifier`.
//! An `inFields` entry whose source has no value is left out.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{self, Display, Formatter};
use tabspec_expr::{EvalScope, FieldValues};
use tabspec_model::{
    identifier_of, DataSourceSpec, FieldSpec, ReferenceTypeRegistry, SelectorDefinition, TabSpec,
};

use crate::config::EngineConfig;
use crate::error::QueryError;

/// Stable 32-byte content hash of a request (Blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestFingerprint([u8; 32]);

impl RequestFingerprint {
    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 16 hex chars
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for RequestFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// One datasource fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    /// Datasource URL
    pub data_url: String,
    /// Flat parameters in insertion order
    pub params: IndexMap<String, String>,
    /// Criteria objects, each sent as one `criteria` parameter
    pub criteria: Vec<Value>,
}

impl QueryRequest {
    /// Request without parameters
    #[must_use]
    pub fn new(data_url: impl Into<String>) -> Self {
        Self {
            data_url: data_url.into(),
            params: IndexMap::new(),
            criteria: Vec::new(),
        }
    }

    /// Parameter value
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Set a parameter
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// First requested row (`_startRow`, 0 when absent)
    #[must_use]
    pub fn start_row(&self) -> usize {
        self.param("_startRow")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Content hash independent of parameter order
    #[must_use]
    pub fn fingerprint(&self) -> RequestFingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.data_url.as_bytes());
        hasher.update(&[0]);

        let mut params: Vec<(&String, &String)> = self.params.iter().collect();
        params.sort();
        for (name, value) in params {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            hasher.update(value.as_bytes());
            hasher.update(&[0]);
        }
        for criterion in &self.criteria {
            hasher.update(criterion.to_string().as_bytes());
            hasher.update(&[0]);
        }
        RequestFingerprint(*hasher.finalize().as_bytes())
    }
}

/// Search parameters of a selector page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorQuery {
    /// Search text; empty lists everything
    pub search: String,
    /// First row of the page
    pub start_row: usize,
}

impl SelectorQuery {
    /// First page for a search text
    #[must_use]
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search: text.into(),
            start_row: 0,
        }
    }

    /// Same search from another row
    #[must_use]
    pub fn from_row(mut self, start_row: usize) -> Self {
        self.start_row = start_row;
        self
    }
}

/// Builds [`QueryRequest`]s from datasource metadata and record values
#[derive(Debug, Clone, Copy)]
pub struct DataSourceQueryBuilder<'r> {
    registry: &'r ReferenceTypeRegistry,
    selector_page_size: usize,
    grid_page_size: usize,
}

impl DataSourceQueryBuilder<'static> {
    /// Builder over the global registry
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_registry(ReferenceTypeRegistry::global(), config)
    }
}

impl<'r> DataSourceQueryBuilder<'r> {
    /// Builder over a given registry
    #[must_use]
    pub fn with_registry(registry: &'r ReferenceTypeRegistry, config: &EngineConfig) -> Self {
        Self {
            registry,
            selector_page_size: config.selector_page_size.max(1),
            grid_page_size: config.grid_page_size.max(1),
        }
    }

    /// Rows per selector page
    #[inline]
    #[must_use]
    pub fn selector_page_size(&self) -> usize {
        self.selector_page_size
    }

    /// Rows per grid page
    #[inline]
    #[must_use]
    pub fn grid_page_size(&self) -> usize {
        self.grid_page_size
    }

    /// Request for a field's datasource bound to the current values
    ///
    /// # Errors
    /// [`QueryError::NoDataSource`] when the field has none
    pub fn build(
        &self,
        field: &FieldSpec,
        scope: &EvalScope<'_>,
    ) -> Result<QueryRequest, QueryError> {
        let data_source = field
            .data_source
            .as_ref()
            .ok_or_else(|| QueryError::NoDataSource(field.name.clone()))?;

        let mut request = QueryRequest::new(&data_source.data_url);
        for (name, value) in &data_source.params {
            request.set_param(name, value);
        }

        for input in &field.in_fields {
            match scope.lookup(&input.column_name).and_then(param_value) {
                Some(value) => request.set_param(&input.parameter_name, value),
                None => tracing::debug!(
                    field = %field.name,
                    source = %input.column_name,
                    "inField source has no value, omitted"
                ),
            }
        }

        self.add_projection(&mut request, data_source, None);
        Ok(request)
    }

    /// Page request of a field's selector
    ///
    /// # Errors
    /// [`QueryError::NoDataSource`] when the field has none
    pub fn build_selector(
        &self,
        field: &FieldSpec,
        scope: &EvalScope<'_>,
        query: &SelectorQuery,
    ) -> Result<QueryRequest, QueryError> {
        let mut request = self.build(field, scope)?;
        let default_selector = SelectorDefinition::default();
        let selector = field.selector.as_ref().unwrap_or(&default_selector);

        request.set_param("_operationType", "fetch");
        request.set_param("_startRow", query.start_row.to_string());
        request.set_param(
            "_endRow",
            (query.start_row + self.selector_page_size).to_string(),
        );
        request.set_param("_textMatchStyle", selector.text_match_style.as_str());
        request.set_param("initiatorField", &field.name);
        request.set_param("_constructor", "AdvancedCriteria");
        request.set_param("_OrExpression", "true");
        if let Some(id) = &selector.selector_definition_id {
            request.set_param("_selectorDefinitionId", id);
        }
        if let Some(current) = scope.lookup(&field.name).and_then(param_value) {
            request.set_param("_currentValue", current);
        }

        let search = query.search.trim();
        if !search.is_empty() {
            request.set_param("operator", "or");
            let operator = selector.text_match_style.operator();
            for name in search_fields(selector) {
                request.criteria.push(json!({
                    "fieldName": name,
                    "operator": operator,
                    "value": search,
                }));
            }
        }
        Ok(request)
    }

    /// Grid page request of a tab, filtered on the parent record for child tabs
    ///
    /// # Errors
    /// [`QueryError::NoDataSource`] when the tab has none,
    /// [`QueryError::NoParentProperty`] for a parent filter on a root tab
    pub fn build_grid(
        &self,
        tab: &TabSpec,
        parent_id: Option<&str>,
        session: &FieldValues,
        start_row: usize,
    ) -> Result<QueryRequest, QueryError> {
        let data_source = tab
            .data_source
            .as_ref()
            .ok_or_else(|| QueryError::NoDataSource(tab.tab_id.clone()))?;

        let mut request = QueryRequest::new(&data_source.data_url);
        for (name, value) in &data_source.params {
            request.set_param(name, value);
        }
        for (name, value) in session.iter() {
            if let Some(value) = param_value(value) {
                request.set_param(name, value);
            }
        }

        request.set_param("_operationType", "fetch");
        request.set_param("_startRow", start_row.to_string());
        request.set_param("_endRow", (start_row + self.grid_page_size).to_string());
        request.set_param("tabId", &tab.tab_id);

        if let Some(parent_id) = parent_id {
            let property = tab
                .parent_property
                .as_deref()
                .ok_or_else(|| QueryError::NoParentProperty(tab.tab_id.clone()))?;
            request.criteria.push(json!({
                "fieldName": property,
                "operator": "equals",
                "value": parent_id,
            }));
        }

        self.add_projection(&mut request, data_source, Some(tab));
        Ok(request)
    }

    fn add_projection(
        &self,
        request: &mut QueryRequest,
        data_source: &DataSourceSpec,
        owner: Option<&TabSpec>,
    ) {
        let projection = self.projection(data_source, owner);
        if !projection.is_empty() {
            request.set_param("_extraProperties", projection.join(","));
        }
    }

    /// `_extraProperties` plus `$_identifier` companions of foreign keys
    ///
    /// A column listed without a type takes the reference type of the
    /// `owner` tab's field of the same name.
    #[must_use]
    pub fn projection(
        &self,
        data_source: &DataSourceSpec,
        owner: Option<&TabSpec>,
    ) -> Vec<String> {
        fn push(columns: &mut Vec<String>, name: String) {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }

        let mut columns: Vec<String> = Vec::new();
        for name in &data_source.extra_properties {
            push(&mut columns, name.clone());
        }
        for field in &data_source.fields {
            let code = field.reference_type.as_deref().or_else(|| {
                owner
                    .and_then(|tab| tab.field(&field.name))
                    .map(|f| f.reference_type.as_str())
            });
            let is_key =
                code.is_some_and(|code| self.registry.resolve(code).kind().is_foreign_key());
            if is_key && field.name != "id" && field.name != "_identifier" {
                push(&mut columns, field.name.clone());
                push(&mut columns, identifier_of(&field.name));
            }
        }
        columns
    }
}

/// Columns searched by selector text: extra search fields, then the display field
#[must_use]
pub fn search_fields(selector: &SelectorDefinition) -> Vec<&str> {
    let mut fields: Vec<&str> = selector
        .extra_search_fields
        .iter()
        .map(String::as_str)
        .collect();
    if !fields.contains(&selector.display_field.as_str()) {
        fields.push(&selector.display_field);
    }
    fields
}

/// Wire form of a record value; `null` and empty strings have none
#[must_use]
pub fn param_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some((if *b { "Y" } else { "N" }).to_string()),
        other => Some(other.to_string()),
    }
}
