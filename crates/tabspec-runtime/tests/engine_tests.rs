//! Engine loading, configuration and process dispatch

use async_trait::async_trait;
use indexmap::IndexMap;
use mockall::mock;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tabspec_expr::EvalScope;
use tabspec_runtime::{
    CallbackContext, ConfigError, DispatchError, EngineConfig, EngineContext, OnChangeFn,
    ProcessDispatchRequest, ProcessExecutor, RuntimeError, ValidateFn, WindowEngine,
};
use tabspec_test_utils::{sales_order_engine, MockTransport, SALES_ORDER_JSON};

mock! {
    Executor {}

    #[async_trait]
    impl ProcessExecutor for Executor {
        async fn execute(&self, request: ProcessDispatchRequest) -> Result<Value, String>;
    }
}

#[test]
fn config_file_round_trip() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
fetch_timeout_ms = 2500
selector_page_size = 40

[cache]
capacity = 16
ttl_secs = 5

[logging]
filter = "tabspec_runtime=debug"
json = true
"#
    )?;

    let config = EngineConfig::load(file.path())?;
    assert_eq!(config.fetch_timeout_ms, 2500);
    assert_eq!(config.selector_page_size, 40);
    assert_eq!(config.grid_page_size, 100);
    assert_eq!(config.cache.capacity, 16);
    assert!(config.logging.json);
    assert_eq!(config.logging.filter, "tabspec_runtime=debug");
    Ok(())
}

#[test]
fn config_errors_are_typed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("engine.toml");
    assert!(matches!(
        EngineConfig::load(&missing),
        Err(ConfigError::Io { .. })
    ));

    std::fs::write(&missing, "selector_page_size = \"many\"")?;
    let err = EngineConfig::load(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(!RuntimeError::from(err).is_retryable());
    Ok(())
}

#[test]
fn invalid_documents_fail_to_load() {
    let transport = MockTransport::new();
    let err = WindowEngine::load("{ not json", EngineConfig::default(), transport.clone())
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Spec(_)));

    let err = WindowEngine::load(r#"{ "processes": [] }"#, EngineConfig::default(), transport)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Spec(_)));
}

#[test]
fn engine_exposes_tabs_graphs_and_forms() -> anyhow::Result<()> {
    let engine = sales_order_engine(MockTransport::new())?;
    assert_eq!(engine.spec().window_id.as_deref(), Some("143"));
    assert_eq!(engine.tree().len(), 4);

    let graph = engine.graph("187")?;
    assert!(graph.is_acyclic());
    assert!(graph.affected_by("product").contains(&"standardPrice"));

    assert!(matches!(
        engine.form("999"),
        Err(RuntimeError::Coordinator(_))
    ));
    let form = engine.form("186")?;
    assert!(form.store().record_id().is_none());
    Ok(())
}

#[tokio::test]
async fn registered_callbacks_drive_the_line_form() -> anyhow::Result<()> {
    let ctx = EngineContext::new(EngineConfig::default(), MockTransport::new());
    ctx.callbacks().register(
        "OB.OrderLine.onQuantityChange",
        OnChangeFn(|ctx: &CallbackContext<'_>| {
            let qty = ctx.value().and_then(Value::as_f64).unwrap_or(0.0);
            let price = ctx
                .scope
                .lookup("standardPrice")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            vec![("lineNetAmount".to_string(), json!(qty * price))]
        }),
    );
    ctx.callbacks().register(
        "OB.OrderLine.validateQuantity",
        ValidateFn(|value: &Value, _: &CallbackContext<'_>| -> Result<(), String> {
            if value.as_f64().is_some_and(|q| q > 0.0) {
                Ok(())
            } else {
                Err("quantity must be positive".to_string())
            }
        }),
    );
    let engine = WindowEngine::load_with(SALES_ORDER_JSON, ctx)?;

    let mut form = engine.form("187")?;
    form.set_value("standardPrice", json!(2.5))?;
    let report = form.set_value("orderedQuantity", json!(4))?;
    assert_eq!(report.queued_callout.as_deref(), Some("orderedQuantity"));

    form.run_callouts();
    assert_eq!(form.value("lineNetAmount"), Some(&json!(10.0)));
    assert!(form.pending_callouts().is_empty());

    form.set_value("orderedQuantity", json!(-1))?;
    let issues = form.validate();
    assert!(issues
        .iter()
        .any(|i| i.field == "orderedQuantity" && i.message == "quantity must be positive"));
    Ok(())
}

#[tokio::test]
async fn toolbar_button_dispatches_to_the_executor() -> anyhow::Result<()> {
    let engine = sales_order_engine(MockTransport::new())?;
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(|request| {
            request.action_handler == "org.erp.sales.process.DocumentActionHandler"
                && request.window_id.as_deref() == Some("143")
                && request.tab_id == "186"
                && request.record_ids == vec!["O-1".to_string()]
                && request.button_value == Some(json!("CO"))
                && request.params.contains_key("docAction")
                && !request.params.contains_key("unrelated")
        })
        .times(1)
        .returning(|_| Ok(json!({ "responseActions": [] })));
    let dispatcher = engine.dispatcher(Arc::new(executor));

    let header = engine.spec().root.clone();
    let mut form = engine.form("186")?;
    form.load_record(
        Some("O-1".into()),
        [
            ("documentAction".to_string(), json!("CO")),
            ("DocStatus".to_string(), json!("DR")),
        ],
    );
    let params: IndexMap<String, Value> = [
        ("docAction".to_string(), json!("CO")),
        ("unrelated".to_string(), json!(true)),
    ]
    .into_iter()
    .collect();

    let response = dispatcher
        .dispatch(&header, "documentAction", form.store().record_id(), &form.scope(), params)
        .await?;
    assert_eq!(response, json!({ "responseActions": [] }));

    let processed: tabspec_expr::FieldValues = [("Processed".to_string(), json!(true))]
        .into_iter()
        .collect();
    assert_eq!(
        dispatcher.build_request(
            &header,
            "documentAction",
            Some("O-1"),
            &EvalScope::new(&processed),
            IndexMap::new(),
        ),
        Err(DispatchError::ReadOnly("documentAction".into()))
    );
    Ok(())
}
