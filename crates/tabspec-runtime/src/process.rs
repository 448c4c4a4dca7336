//! Toolbar process dispatch
//!
//! A toolbar button names a process directly or through its action handler.
//! Dispatch evaluates the button's `displayIf` / `readOnlyIf` against the
//! active record, builds a [`ProcessDispatchRequest`] and hands it to the
//! [`ProcessExecutor`] collaborator.

use crate::context::EngineContext;
use crate::error::DispatchError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tabspec_expr::EvalScope;
use tabspec_model::{ProcessDefinition, TabSpec, ToolbarButton};
use uuid::Uuid;

/// Request handed to the process executor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDispatchRequest {
    /// Unique request id
    pub id: Uuid,
    /// Server-side handler class
    pub action_handler: String,
    /// Process launched
    pub process_id: Option<String>,
    /// UI pattern
    pub ui_pattern: Option<String>,
    /// Window the button belongs to
    pub window_id: Option<String>,
    /// Tab the button belongs to
    pub tab_id: String,
    /// Records the process runs on
    pub record_ids: Vec<String>,
    /// Button backing value
    pub button_value: Option<Value>,
    /// Process parameters, restricted to the declared ones when known
    pub params: IndexMap<String, Value>,
}

/// Collaborator running dispatched processes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run a process; the value is the executor's response body
    async fn execute(&self, request: ProcessDispatchRequest) -> Result<Value, String>;
}

/// Evaluated state of a toolbar button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState {
    /// Shown on the toolbar
    pub displayed: bool,
    /// Shown but disabled
    pub read_only: bool,
}

/// Builds and forwards process dispatch requests
#[derive(Clone)]
pub struct ProcessDispatcher {
    ctx: Arc<EngineContext>,
    executor: Arc<dyn ProcessExecutor>,
    window_id: Option<String>,
    processes: Arc<Vec<ProcessDefinition>>,
}

impl fmt::Debug for ProcessDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDispatcher")
            .field("window_id", &self.window_id)
            .field("processes", &self.processes.len())
            .finish_non_exhaustive()
    }
}

impl ProcessDispatcher {
    /// Dispatcher over a window's process definitions
    #[must_use]
    pub fn new(
        ctx: Arc<EngineContext>,
        executor: Arc<dyn ProcessExecutor>,
        window_id: Option<String>,
        processes: Vec<ProcessDefinition>,
    ) -> Self {
        Self {
            ctx,
            executor,
            window_id,
            processes: Arc::new(processes),
        }
    }

    /// Process definition by id
    #[must_use]
    pub fn process(&self, process_id: &str) -> Option<&ProcessDefinition> {
        self.processes.iter().find(|p| p.process_id == process_id)
    }

    /// Evaluate a button's logic
    #[must_use]
    pub fn button_state(&self, button: &ToolbarButton, scope: &EvalScope<'_>) -> ButtonState {
        let evaluator = self.ctx.evaluator();
        let diagnostics = self.ctx.diagnostics();
        ButtonState {
            displayed: evaluator.evaluate_or(button.display_logic.as_deref(), true, scope, diagnostics),
            read_only: evaluator.evaluate_or(
                button.read_only_logic.as_deref(),
                false,
                scope,
                diagnostics,
            ),
        }
    }

    /// Buttons of a tab with their state, hidden ones left out
    #[must_use]
    pub fn visible_buttons<'t>(
        &self,
        tab: &'t TabSpec,
        scope: &EvalScope<'_>,
    ) -> Vec<(&'t ToolbarButton, ButtonState)> {
        tab.toolbar_buttons
            .iter()
            .map(|button| (button, self.button_state(button, scope)))
            .filter(|(_, state)| state.displayed)
            .collect()
    }

    /// Build the request for a button on the active record
    ///
    /// # Errors
    /// Unknown, hidden or read-only button, no active record, or no handler
    pub fn build_request(
        &self,
        tab: &TabSpec,
        button_id: &str,
        record_id: Option<&str>,
        scope: &EvalScope<'_>,
        params: IndexMap<String, Value>,
    ) -> Result<ProcessDispatchRequest, DispatchError> {
        let button = tab
            .toolbar_button(button_id)
            .ok_or_else(|| DispatchError::UnknownButton(button_id.to_string()))?;
        let state = self.button_state(button, scope);
        if !state.displayed {
            return Err(DispatchError::Hidden(button_id.to_string()));
        }
        if state.read_only {
            return Err(DispatchError::ReadOnly(button_id.to_string()));
        }
        let record_id = record_id.ok_or(DispatchError::NoActiveRecord)?;

        let process = button.process_id.as_deref().and_then(|id| self.process(id));
        let action_handler = button
            .action_handler
            .clone()
            .or_else(|| process.map(|p| p.action_handler.clone()))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DispatchError::NoActionHandler(button_id.to_string()))?;

        let params = match process {
            Some(process) if !process.fields.is_empty() => params
                .into_iter()
                .filter(|(name, _)| process.fields.iter().any(|f| f.aliases().any(|a| a == name)))
                .collect(),
            _ => params,
        };

        Ok(ProcessDispatchRequest {
            id: Uuid::new_v4(),
            action_handler,
            process_id: button.process_id.clone(),
            ui_pattern: button
                .ui_pattern
                .clone()
                .or_else(|| process.and_then(|p| p.ui_pattern.clone())),
            window_id: self.window_id.clone(),
            tab_id: tab.tab_id.clone(),
            record_ids: vec![record_id.to_string()],
            button_value: button
                .property
                .as_deref()
                .and_then(|p| scope.lookup(p))
                .cloned(),
            params,
        })
    }

    /// Build a request and run it
    ///
    /// # Errors
    /// Any [`Self::build_request`] failure, or [`DispatchError::Execution`]
    pub async fn dispatch(
        &self,
        tab: &TabSpec,
        button_id: &str,
        record_id: Option<&str>,
        scope: &EvalScope<'_>,
        params: IndexMap<String, Value>,
    ) -> Result<Value, DispatchError> {
        let request = self.build_request(tab, button_id, record_id, scope, params)?;
        let request_id = request.id;
        tracing::info!(
            tab = %tab.tab_id,
            button = button_id,
            handler = %request.action_handler,
            %request_id,
            "dispatching process"
        );
        self.executor.execute(request).await.map_err(|message| {
            tracing::warn!(%request_id, error = %message, "process execution failed");
            DispatchError::Execution(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::DataSourceFetchError;
    use crate::query::QueryRequest;
    use crate::transport::DataSourceTransport;
    use mockall::predicate::function;
    use serde_json::json;
    use tabspec_expr::FieldValues;
    use tabspec_model::FieldSpec;

    struct NoFetch;

    #[async_trait]
    impl DataSourceTransport for NoFetch {
        async fn fetch(&self, request: &QueryRequest) -> Result<Value, DataSourceFetchError> {
            Err(DataSourceFetchError::Transport {
                url: request.data_url.clone(),
                message: "unused".into(),
            })
        }
    }

    fn tab() -> TabSpec {
        let button = |id: &str, handler: Option<&str>, display: Option<&str>| ToolbarButton {
            id: id.into(),
            title: None,
            property: Some("docAction".into()),
            process_id: Some("104".into()),
            action_handler: handler.map(str::to_string),
            ui_pattern: None,
            display_logic: display.map(str::to_string),
            read_only_logic: Some("@processed@='Y'".into()),
        };
        TabSpec {
            tab_id: "186".into(),
            entity: "Order".into(),
            title: None,
            parent_property: None,
            fields: Vec::new(),
            data_source: None,
            grid_properties: Default::default(),
            standard_properties: Default::default(),
            session_attribute_names: Vec::new(),
            has_child_tabs: false,
            sections: Vec::new(),
            toolbar_buttons: vec![
                button("complete", None, Some("@docStatus@='DR'")),
                button("close", Some("org.example.CloseOrder"), Some("@docStatus@='CO'")),
            ],
            children: Vec::new(),
        }
    }

    fn dispatcher(executor: MockProcessExecutor) -> ProcessDispatcher {
        let ctx = Arc::new(EngineContext::new(EngineConfig::default(), Arc::new(NoFetch)));
        let process = ProcessDefinition {
            process_id: "104".into(),
            action_handler: "org.example.ProcessOrder".into(),
            ui_pattern: Some("A".into()),
            fields: vec![FieldSpec::new("docAction", "_id_17")],
        };
        ProcessDispatcher::new(ctx, Arc::new(executor), Some("143".into()), vec![process])
    }

    fn record(pairs: &[(&str, Value)]) -> FieldValues {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn dispatch_uses_process_handler_and_filters_params() {
        let mut executor = MockProcessExecutor::new();
        executor
            .expect_execute()
            .with(function(|r: &ProcessDispatchRequest| {
                r.action_handler == "org.example.ProcessOrder"
                    && r.ui_pattern.as_deref() == Some("A")
                    && r.record_ids == vec!["O-1".to_string()]
                    && r.params.keys().eq(["docAction"])
                    && r.button_value == Some(json!("CO"))
            }))
            .times(1)
            .returning(|_| Ok(json!({ "message": "done" })));

        let dispatcher = dispatcher(executor);
        let values = record(&[("docStatus", json!("DR")), ("docAction", json!("CO"))]);
        let params: IndexMap<String, Value> = [
            ("docAction".to_string(), json!("CO")),
            ("ignored".to_string(), json!(1)),
        ]
        .into_iter()
        .collect();

        let response = dispatcher
            .dispatch(&tab(), "complete", Some("O-1"), &EvalScope::new(&values), params)
            .await
            .unwrap();
        assert_eq!(response, json!({ "message": "done" }));
    }

    #[test]
    fn logic_gates_the_buttons() {
        let dispatcher = dispatcher(MockProcessExecutor::new());
        let tab = tab();
        let draft = record(&[("docStatus", json!("DR"))]);
        let visible = dispatcher.visible_buttons(&tab, &EvalScope::new(&draft));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0.id, "complete");

        let scope = EvalScope::new(&draft);
        assert_eq!(
            dispatcher.build_request(&tab, "close", Some("O-1"), &scope, IndexMap::new()),
            Err(DispatchError::Hidden("close".into()))
        );
        assert_eq!(
            dispatcher.build_request(&tab, "complete", None, &scope, IndexMap::new()),
            Err(DispatchError::NoActiveRecord)
        );

        let processed = record(&[("docStatus", json!("DR")), ("processed", json!(true))]);
        assert_eq!(
            dispatcher.build_request(
                &tab,
                "complete",
                Some("O-1"),
                &EvalScope::new(&processed),
                IndexMap::new()
            ),
            Err(DispatchError::ReadOnly("complete".into()))
        );
    }

    #[tokio::test]
    async fn executor_failures_surface() {
        let mut executor = MockProcessExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Err("locked".to_string()));
        let dispatcher = dispatcher(executor);
        let completed = record(&[("docStatus", json!("CO"))]);
        let err = dispatcher
            .dispatch(&tab(), "close", Some("O-1"), &EvalScope::new(&completed), IndexMap::new())
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Execution("locked".into()));
    }
}
