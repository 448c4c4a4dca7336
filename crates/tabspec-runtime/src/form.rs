//! Per-tab record editing
//!
//! A [`TabForm`] owns the [`FieldValueStore`] of one tab instance and keeps
//! field states in step with it. Every write follows the same order:
//!
//! 1. the value lands in the store
//! 2. fields reachable in the dependency graph get their display and
//!    read-only state recomputed, in topological order
//! 3. reachable fields with an option datasource are marked stale
//! 4. the changed field's `onChangeFunction` is queued once
//!
//! Values written by callouts cascade the same way but never queue another
//! callout.

use crate::callbacks::CallbackContext;
use crate::context::EngineContext;
use crate::error::{FormError, SelectorError};
use crate::query::QueryRequest;
use crate::selector::{PageOutcome, SelectionCommit, SelectorController, SelectorState};
use crate::store::FieldValueStore;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::sync::Arc;
use tabspec_expr::{EvalScope, FieldValues};
use tabspec_graph::FieldDependencyGraph;
use tabspec_model::{DiagnosticKind, FieldRole, FieldSpec, LogicKind, ReferenceType, TabSpec};

/// Computed state of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldState {
    /// Shown in the form
    pub displayed: bool,
    /// Not editable
    pub read_only: bool,
}

/// What one write changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Written field
    pub field: String,
    /// Reachable fields, in evaluation order
    pub affected: Vec<String>,
    /// Fields whose state changed, with the new state
    pub state_changes: Vec<(String, FieldState)>,
    /// Fields marked for an option refetch
    pub stale: Vec<String>,
    /// Field whose callout was queued by this write
    pub queued_callout: Option<String>,
}

/// One row handed to the renderer
#[derive(Debug, Clone)]
pub struct RenderedField<'a> {
    /// Field metadata
    pub spec: &'a FieldSpec,
    /// Resolved editor type
    pub reference: &'static ReferenceType,
    /// Shown in the form
    pub displayed: bool,
    /// Not editable
    pub read_only: bool,
    /// Current value
    pub value: Option<&'a Value>,
    /// Value formatted by the reference type
    pub formatted: String,
}

/// Problem found by [`TabForm::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Field name
    pub field: String,
    /// Message shown next to the field
    pub message: String,
}

/// Editing context of one tab instance
#[derive(Debug)]
pub struct TabForm {
    ctx: Arc<EngineContext>,
    tab: Arc<TabSpec>,
    graph: Arc<FieldDependencyGraph>,
    store: FieldValueStore,
    parent: FieldValues,
    session: FieldValues,
    states: IndexMap<String, FieldState>,
    selectors: IndexMap<String, SelectorController>,
    callouts: IndexSet<String>,
}

impl TabForm {
    /// Form over an empty record
    #[must_use]
    pub fn new(
        ctx: Arc<EngineContext>,
        tab: Arc<TabSpec>,
        graph: Arc<FieldDependencyGraph>,
    ) -> Self {
        let selectors = tab
            .fields
            .iter()
            .filter(|f| f.role.is_editable())
            .filter_map(|f| {
                SelectorController::new(Arc::clone(&ctx), Arc::clone(&tab), &f.name)
                    .ok()
                    .map(|s| (f.name.clone(), s))
            })
            .collect();
        let mut form = Self {
            store: FieldValueStore::for_tab(&tab),
            ctx,
            tab,
            graph,
            parent: FieldValues::new(),
            session: FieldValues::new(),
            states: IndexMap::new(),
            selectors,
            callouts: IndexSet::new(),
        };
        form.recompute_all();
        form
    }

    /// Tab metadata
    #[inline]
    #[must_use]
    pub fn tab(&self) -> &TabSpec {
        &self.tab
    }

    /// Dependency graph of the tab
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &FieldDependencyGraph {
        &self.graph
    }

    /// Record values
    #[inline]
    #[must_use]
    pub fn store(&self) -> &FieldValueStore {
        &self.store
    }

    /// Alias-tolerant value read
    #[inline]
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.store.get(name)
    }

    /// Evaluation scope: record, then parent record, then session
    #[must_use]
    pub fn scope(&self) -> EvalScope<'_> {
        EvalScope::new(self.store.values())
            .with_parent(&self.parent)
            .with_session(&self.session)
    }

    /// Replace the record and recompute every state
    pub fn load_record(
        &mut self,
        record_id: Option<String>,
        values: impl IntoIterator<Item = (String, Value)>,
    ) {
        self.store.load(record_id, values);
        self.callouts.clear();
        for selector in self.selectors.values() {
            let _ = selector.cancel();
        }
        self.recompute_all();
        tracing::debug!(
            tab = %self.tab.tab_id,
            record = ?self.store.record_id(),
            "form record loaded"
        );
    }

    /// Parent record visible to logic and queries
    pub fn set_parent(&mut self, parent: FieldValues) {
        self.parent = parent;
        self.recompute_all();
    }

    /// Session attributes visible to logic and queries
    pub fn set_session(&mut self, session: FieldValues) {
        self.session = session;
        self.recompute_all();
    }

    /// State of a field
    #[must_use]
    pub fn field_state(&self, name: &str) -> Option<FieldState> {
        let spec = self.tab.field_by_alias(name)?;
        self.states.get(&spec.name).copied()
    }

    /// Callouts waiting to run
    #[must_use]
    pub fn pending_callouts(&self) -> Vec<&str> {
        self.callouts.iter().map(String::as_str).collect()
    }

    /// Write a user value and cascade
    ///
    /// # Errors
    /// Unknown field, or a field that is not editable right now
    pub fn set_value(&mut self, field: &str, value: Value) -> Result<CascadeReport, FormError> {
        let name = self.editable_field(field)?;
        self.store.set(name.clone(), value);
        Ok(self.cascade(&name, true))
    }

    fn editable_field(&self, field: &str) -> Result<String, FormError> {
        let spec = self
            .tab
            .field_by_alias(field)
            .ok_or_else(|| FormError::UnknownField(field.to_string()))?;
        let read_only = self.states.get(&spec.name).is_some_and(|s| s.read_only);
        if !spec.is_editable() || read_only {
            return Err(FormError::ReadOnly(spec.name.clone()));
        }
        Ok(spec.name.clone())
    }

    /// Write values returned by a callout; they cascade without queuing callouts
    ///
    /// Keys that name no field are stored as hidden values.
    pub fn apply_callout_values(
        &mut self,
        writes: impl IntoIterator<Item = (String, Value)>,
    ) -> Vec<CascadeReport> {
        let mut reports = Vec::new();
        for (key, value) in writes {
            let field = self
                .tab
                .field_by_alias(&key)
                .filter(|f| !f.role.is_logic())
                .map(|f| f.name.clone());
            match field {
                Some(name) => {
                    self.store.set(name.clone(), value);
                    reports.push(self.cascade(&name, false));
                }
                None => {
                    self.store.set(key, value);
                }
            }
        }
        reports
    }

    /// Run queued callouts in queue order
    ///
    /// A callout name with no registered callback is reported and skipped.
    pub fn run_callouts(&mut self) -> Vec<CascadeReport> {
        let tab = Arc::clone(&self.tab);
        let mut reports = Vec::new();
        while let Some(field_name) = self.callouts.shift_remove_index(0) {
            let Some(field) = tab.field(&field_name) else {
                continue;
            };
            let Some(name) = field.on_change_function.as_deref() else {
                continue;
            };
            let Some(callback) = self.ctx.callbacks().get(name) else {
                self.ctx.diagnostics().report(
                    DiagnosticKind::UnknownCallback,
                    format!("{}.{}", tab.tab_id, field.name),
                    format!("no callback registered as '{name}'"),
                );
                continue;
            };
            let writes = callback.on_change(&CallbackContext {
                tab: &tab,
                field,
                scope: self.scope(),
            });
            tracing::debug!(field = %field.name, callout = name, writes = writes.len(), "ran callout");
            reports.extend(self.apply_callout_values(writes));
        }
        reports
    }

    fn cascade(&mut self, origin: &str, queue_callout: bool) -> CascadeReport {
        let affected: Vec<String> = self
            .graph
            .affected_by(origin)
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut report = CascadeReport {
            field: origin.to_string(),
            ..CascadeReport::default()
        };

        let tab = Arc::clone(&self.tab);
        for name in std::iter::once(origin).chain(affected.iter().map(String::as_str)) {
            let Some(spec) = tab.field(name) else {
                continue;
            };
            let state = self.compute_state(spec);
            if self.states.insert(spec.name.clone(), state) != Some(state) {
                report.state_changes.push((spec.name.clone(), state));
            }
        }

        for name in &affected {
            if tab.field(name).is_some_and(|f| f.data_source.is_some()) {
                self.store.mark_stale(name.clone());
                report.stale.push(name.clone());
            }
        }

        if queue_callout
            && tab
                .field(origin)
                .is_some_and(|f| f.on_change_function.is_some())
            && self.callouts.insert(origin.to_string())
        {
            report.queued_callout = Some(origin.to_string());
        }

        tracing::debug!(
            field = origin,
            affected = affected.len(),
            changed = report.state_changes.len(),
            stale = report.stale.len(),
            "cascade complete"
        );
        report.affected = affected;
        report
    }

    fn recompute_all(&mut self) {
        let tab = Arc::clone(&self.tab);
        self.states = tab
            .fields
            .iter()
            .filter(|f| !f.role.is_logic())
            .map(|f| (f.name.clone(), self.compute_state(f)))
            .collect();
    }

    fn compute_state(&self, spec: &FieldSpec) -> FieldState {
        let evaluator = self.ctx.evaluator();
        let diagnostics = self.ctx.diagnostics();
        let scope = self.scope();

        let logic = |kind: LogicKind| {
            self.tab.fields.iter().filter_map(move |f| match &f.role {
                FieldRole::Logic { target, kind: k } if *k == kind => {
                    let applies = self
                        .tab
                        .field_by_alias(target)
                        .is_some_and(|t| t.name == spec.name);
                    let text = match kind {
                        LogicKind::Display => f.display_logic.as_deref(),
                        LogicKind::ReadOnly => f.read_only_logic.as_deref(),
                    };
                    applies.then_some(text).flatten()
                }
                _ => None,
            })
        };

        let displayed = spec.displayed
            && evaluator.evaluate_or(spec.display_logic.as_deref(), true, &scope, diagnostics)
            && logic(LogicKind::Display).all(|e| evaluator.evaluate(e, &scope, diagnostics));

        let saved_and_fixed = !spec.updatable && self.store.record_id().is_some();
        let read_only = !spec.is_editable()
            || saved_and_fixed
            || evaluator.evaluate_or(spec.read_only_logic.as_deref(), false, &scope, diagnostics)
            || logic(LogicKind::ReadOnly).any(|e| evaluator.evaluate(e, &scope, diagnostics));

        FieldState {
            displayed,
            read_only,
        }
    }

    /// Rows for the renderer, in layout order, logic fields excluded
    #[must_use]
    pub fn render_fields(&self) -> Vec<RenderedField<'_>> {
        let registry = self.ctx.registry();
        let mut rows: Vec<RenderedField<'_>> = self
            .tab
            .fields
            .iter()
            .filter(|f| !f.role.is_logic())
            .map(|spec| {
                let reference = registry.resolve(&spec.reference_type);
                let state = self.states.get(&spec.name).copied().unwrap_or(FieldState {
                    displayed: spec.displayed,
                    read_only: !spec.is_editable(),
                });
                let value = self.store.get(&spec.name);
                RenderedField {
                    spec,
                    reference,
                    displayed: state.displayed,
                    read_only: state.read_only,
                    value,
                    formatted: value.map(|v| reference.format(v)).unwrap_or_default(),
                }
            })
            .collect();
        rows.sort_by_key(|row| row.spec.layout_order);
        rows
    }

    /// Check displayed editable fields before save
    ///
    /// Runs the `required` flag, the reference-type validator and the
    /// field's registered `validationFn`, stopping at the first problem per
    /// field.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let registry = self.ctx.registry();
        let scope = self.scope();
        let mut issues = Vec::new();

        for spec in self.tab.fields.iter().filter(|f| f.role.is_editable()) {
            if !self.states.get(&spec.name).is_some_and(|s| s.displayed) {
                continue;
            }
            let value = self.store.get(&spec.name).unwrap_or(&Value::Null);
            let blank = value.is_null() || value.as_str().is_some_and(str::is_empty);
            let issue = |message: String| ValidationIssue {
                field: spec.name.clone(),
                message,
            };

            if blank {
                if spec.required {
                    issues.push(issue("value is required".to_string()));
                }
                continue;
            }
            if let Err(message) = registry.resolve(&spec.reference_type).validate(value) {
                issues.push(issue(message));
                continue;
            }
            let Some(name) = spec.validation_fn.as_deref() else {
                continue;
            };
            match self.ctx.callbacks().get(name) {
                Some(callback) => {
                    let ctx = CallbackContext {
                        tab: &self.tab,
                        field: spec,
                        scope,
                    };
                    if let Err(message) = callback.validate(value, &ctx) {
                        issues.push(issue(message));
                    }
                }
                None => self.ctx.diagnostics().report(
                    DiagnosticKind::UnknownCallback,
                    format!("{}.{}", self.tab.tab_id, spec.name),
                    format!("no callback registered as '{name}'"),
                ),
            }
        }
        issues
    }

    /// Option request of a field's datasource bound to the current values
    ///
    /// # Errors
    /// Unknown field, or a field without datasource
    pub fn options_request(&self, field: &str) -> Result<QueryRequest, FormError> {
        let spec = self
            .tab
            .field_by_alias(field)
            .ok_or_else(|| FormError::UnknownField(field.to_string()))?;
        Ok(self.ctx.query_builder().build(spec, &self.scope())?)
    }

    /// Note that a field's options were refetched
    pub fn options_refreshed(&mut self, field: &str) {
        self.store.refreshed(field);
    }

    fn selector(&self, field: &str) -> Result<&SelectorController, FormError> {
        let spec = self
            .tab
            .field_by_alias(field)
            .ok_or_else(|| FormError::UnknownField(field.to_string()))?;
        self.selectors
            .get(&spec.name)
            .ok_or_else(|| SelectorError::NoSelector(spec.name.clone()).into())
    }

    /// Selector state of a field
    ///
    /// # Errors
    /// Unknown field, or a field without selector
    pub fn selector_state(&self, field: &str) -> Result<SelectorState, FormError> {
        Ok(self.selector(field)?.state())
    }

    /// Listed selector rows
    ///
    /// # Errors
    /// Unknown field, or a field without selector
    pub fn selector_rows(&self, field: &str) -> Result<Vec<crate::transport::Row>, FormError> {
        Ok(self.selector(field)?.rows())
    }

    /// Open a field's selector
    ///
    /// # Errors
    /// Read-only field, no selector, or a failed first page
    pub async fn open_selector(&self, field: &str) -> Result<PageOutcome, FormError> {
        self.editable_field(field)?;
        Ok(self.selector(field)?.open(&self.scope()).await?)
    }

    /// Search in an open selector; the latest search wins
    ///
    /// # Errors
    /// No selector, a closed selector, or a failed page
    pub async fn search_selector(&self, field: &str, text: &str) -> Result<PageOutcome, FormError> {
        Ok(self.selector(field)?.search(text, &self.scope()).await?)
    }

    /// Load the next selector page
    ///
    /// # Errors
    /// No selector, a selector that is not open, or a failed page
    pub async fn load_more_selector(&self, field: &str) -> Result<PageOutcome, FormError> {
        Ok(self.selector(field)?.load_more(&self.scope()).await?)
    }

    /// Commit a selector row and cascade from the field
    ///
    /// # Errors
    /// No selector, or a failed commit (store unchanged)
    pub fn select(
        &mut self,
        field: &str,
        row_id: &str,
    ) -> Result<(SelectionCommit, CascadeReport), FormError> {
        let name = self.editable_field(field)?;
        let selector = self
            .selectors
            .get(&name)
            .ok_or_else(|| SelectorError::NoSelector(name.clone()))?;
        let commit = selector.select(row_id, &mut self.store, &self.graph)?;
        let report = self.cascade(&name, true);
        Ok((commit, report))
    }

    /// Close a selector without committing
    ///
    /// # Errors
    /// No selector, or a commit in progress
    pub fn cancel_selector(&self, field: &str) -> Result<(), FormError> {
        Ok(self.selector(field)?.cancel()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{OnChangeFn, ValidateFn};
    use crate::config::EngineConfig;
    use crate::error::DataSourceFetchError;
    use crate::transport::DataSourceTransport;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tabspec_model::Diagnostics;

    struct Empty;

    #[async_trait]
    impl DataSourceTransport for Empty {
        async fn fetch(&self, _request: &QueryRequest) -> Result<Value, DataSourceFetchError> {
            Ok(json!({ "response": { "status": 0, "data": [] } }))
        }
    }

    fn logic(target: &str, kind: LogicKind, expression: &str) -> FieldSpec {
        let suffix = match kind {
            LogicKind::Display => "display_logic",
            LogicKind::ReadOnly => "readonly_logic",
        };
        let mut field = FieldSpec::new(format!("{target}_{suffix}"), "_id_20");
        match kind {
            LogicKind::Display => field.display_logic = Some(expression.into()),
            LogicKind::ReadOnly => field.read_only_logic = Some(expression.into()),
        }
        field.role = FieldRole::Logic {
            target: target.into(),
            kind,
        };
        field
    }

    fn invoice_tab() -> TabSpec {
        let mut doc_type = FieldSpec::new("documentType", "_id_10");
        doc_type.on_change_function = Some("OB.Invoice.onDocTypeChange".into());
        doc_type.sort = Some(1);

        let mut payment = FieldSpec::new("paymentMethod", "_id_10");
        payment.display_logic = Some("@documentType@='ARI'".into());
        payment.sort = Some(2);

        let mut amount = FieldSpec::new("grandTotal", "_id_12");
        amount.required = true;
        amount.validation_fn = Some("OB.Invoice.positive".into());
        amount.sort = Some(3);

        let mut bin = FieldSpec::new("storageBin", "_id_19");
        bin.data_source = Some(tabspec_model::DataSourceSpec::new("/ws/datasource/Locator"));
        bin.in_fields.push(tabspec_model::InField {
            column_name: "documentType".into(),
            parameter_name: "inpDocType".into(),
        });

        TabSpec {
            tab_id: "263".into(),
            entity: "Invoice".into(),
            title: None,
            parent_property: None,
            fields: vec![
                doc_type,
                payment,
                amount,
                bin,
                logic("grandTotal", LogicKind::ReadOnly, "@documentType@='ARC'"),
            ],
            data_source: None,
            grid_properties: Default::default(),
            standard_properties: Default::default(),
            session_attribute_names: Vec::new(),
            has_child_tabs: false,
            sections: Vec::new(),
            toolbar_buttons: Vec::new(),
            children: Vec::new(),
        }
    }

    fn form() -> TabForm {
        let ctx = Arc::new(EngineContext::new(EngineConfig::default(), Arc::new(Empty)));
        let tab = Arc::new(invoice_tab());
        let graph = Arc::new(FieldDependencyGraph::build(
            &tab,
            ctx.evaluator(),
            &Diagnostics::new(),
        ));
        TabForm::new(ctx, tab, graph)
    }

    #[test]
    fn write_then_cascade() {
        let mut form = form();
        assert_eq!(
            form.field_state("paymentMethod"),
            Some(FieldState { displayed: false, read_only: false })
        );

        let report = form.set_value("documentType", json!("ARI")).unwrap();
        assert_eq!(report.affected, vec!["grandTotal", "paymentMethod", "storageBin"]);
        assert!(report
            .state_changes
            .contains(&("paymentMethod".to_string(), FieldState { displayed: true, read_only: false })));
        assert_eq!(report.stale, vec!["storageBin"]);
        assert!(form.store().is_stale("storageBin"));
        assert_eq!(report.queued_callout.as_deref(), Some("documentType"));

        form.set_value("documentType", json!("ARC")).unwrap();
        assert_eq!(form.pending_callouts(), vec!["documentType"]);
        assert!(form.field_state("grandTotal").unwrap().read_only);
        assert!(matches!(
            form.set_value("grandTotal", json!(5)),
            Err(FormError::ReadOnly(_))
        ));
    }

    #[test]
    fn callouts_run_once_and_do_not_requeue() {
        let mut form = form();
        form.ctx.callbacks().register(
            "OB.Invoice.onDocTypeChange",
            OnChangeFn(|_: &CallbackContext<'_>| {
                vec![
                    ("documentType".to_string(), json!("ARI")),
                    ("paymentMethod".to_string(), json!("Cash")),
                ]
            }),
        );
        form.set_value("documentType", json!("X")).unwrap();
        let reports = form.run_callouts();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.queued_callout.is_none()));
        assert!(form.pending_callouts().is_empty());
        assert_eq!(form.value("paymentMethod"), Some(&json!("Cash")));
        assert!(form.field_state("paymentMethod").unwrap().displayed);
    }

    #[test]
    fn unknown_callout_is_a_diagnostic() {
        let mut form = form();
        form.set_value("documentType", json!("ARI")).unwrap();
        assert!(form.run_callouts().is_empty());
        assert_eq!(form.ctx.diagnostics().count(DiagnosticKind::UnknownCallback), 1);
    }

    #[test]
    fn validation_checks_required_type_and_callback() {
        let mut form = form();
        assert_eq!(
            form.validate(),
            vec![ValidationIssue {
                field: "grandTotal".into(),
                message: "value is required".into()
            }]
        );

        form.ctx.callbacks().register(
            "OB.Invoice.positive",
            ValidateFn(|value: &Value, _: &CallbackContext<'_>| -> Result<(), String> {
                match value.as_f64() {
                    Some(n) if n > 0.0 => Ok(()),
                    _ => Err("must be positive".to_string()),
                }
            }),
        );
        form.set_value("grandTotal", json!(-3)).unwrap();
        assert_eq!(form.validate()[0].message, "must be positive");

        form.set_value("grandTotal", json!(12.5)).unwrap();
        assert!(form.validate().is_empty());
    }

    #[test]
    fn render_rows_skip_logic_fields() {
        let mut form = form();
        form.set_value("grandTotal", json!(12.5)).unwrap();
        let rows = form.render_fields();
        assert_eq!(rows.len(), 4);
        let total = rows.iter().find(|r| r.spec.name == "grandTotal").unwrap();
        assert_eq!(total.formatted, "12.50");
        assert!(!total.read_only);
    }

    #[test]
    fn options_request_reads_current_values() {
        let mut form = form();
        form.set_value("documentType", json!("ARI")).unwrap();
        let request = form.options_request("storageBin").unwrap();
        assert_eq!(request.param("inpDocType"), Some("ARI"));
        assert!(matches!(
            form.options_request("grandTotal"),
            Err(FormError::Query(_))
        ));
    }
}
