//! Master-detail coordination on the sales order window

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabspec_model::DiagnosticKind;
use tabspec_runtime::{
    CoordinatorError, DataSourceFetchError, EngineConfig, LoadOutcome, RuntimeError,
};
use tabspec_test_utils::{row, sales_order_engine, sales_order_engine_with, MockTransport};

const ORDERS: &str = "/ws/datasource/Order";
const LINES: &str = "/ws/datasource/OrderLine";
const PAYMENTS: &str = "/ws/datasource/FIN_Payment_Schedule";
const TAXES: &str = "/ws/datasource/OrderLineTax";

fn transport() -> Arc<MockTransport> {
    let transport = MockTransport::new();
    transport.respond(
        ORDERS,
        vec![
            json!({ "id": "O-1", "organization": "ORG1", "salesTransaction": true }),
            json!({ "id": "O-2", "organization": "ORG2", "salesTransaction": false }),
        ],
    );
    transport.respond(
        LINES,
        vec![
            json!({ "id": "L-1", "lineNo": 10, "salesOrder": "O-1" }),
            json!({ "id": "L-2", "lineNo": 20, "salesOrder": "O-1" }),
        ],
    );
    transport.respond(TAXES, vec![json!({ "id": "T-1", "tax": "VAT" })]);
    transport
}

#[tokio::test]
async fn child_grids_filter_on_the_active_parent() -> anyhow::Result<()> {
    let transport = transport();
    let engine = sales_order_engine(Arc::clone(&transport))?;
    let coordinator = engine.coordinator();

    assert_eq!(coordinator.load_root().await?, LoadOutcome::Loaded { rows: 2 });
    let loads = coordinator.select_record("186", "O-1").await?;
    let tabs: Vec<&str> = loads.iter().map(|(tab, _)| tab.as_str()).collect();
    assert_eq!(tabs, vec!["187", "188"]);

    let request = transport.calls_to(LINES).pop().unwrap();
    assert_eq!(request.param("tabId"), Some("187"));
    assert_eq!(
        request.criteria,
        vec![json!({ "fieldName": "salesOrder", "operator": "equals", "value": "O-1" })]
    );

    let session = coordinator.session();
    assert_eq!(session.get("#AD_Org_ID"), Some(&json!("ORG1")));
    assert_eq!(session.get("$IsSOTrx"), Some(&json!(true)));
    assert_eq!(request.param("#AD_Org_ID"), Some("ORG1"));

    assert_eq!(engine.tree().node("187").unwrap().row_count(), 2);
    assert!(transport.calls_to(TAXES).is_empty());
    Ok(())
}

#[tokio::test]
async fn sibling_children_load_concurrently() -> anyhow::Result<()> {
    let transport = transport();
    transport.respond_when(
        |r| r.data_url == LINES,
        Duration::from_millis(150),
        vec![json!({ "id": "L-1" })],
    );
    transport.respond_when(
        |r| r.data_url == PAYMENTS,
        Duration::from_millis(150),
        vec![json!({ "id": "PS-1" })],
    );
    let engine = sales_order_engine(transport)?;
    engine.coordinator().load_root().await?;

    let started = Instant::now();
    let loads = engine.coordinator().select_record("186", "O-1").await?;
    let elapsed = started.elapsed();

    assert!(loads.iter().all(|(_, r)| matches!(r, Ok(LoadOutcome::Loaded { rows: 1 }))));
    assert!(elapsed < Duration::from_millis(290), "took {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn reentrant_reloads_keep_the_latest() -> anyhow::Result<()> {
    let transport = transport();
    let first_call = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&first_call);
    transport.respond_when(
        move |r| r.data_url == LINES && counter.fetch_add(1, Ordering::SeqCst) == 0,
        Duration::from_millis(150),
        vec![json!({ "id": "L-OLD" })],
    );

    let engine = sales_order_engine(transport)?;
    let coordinator = engine.coordinator();
    coordinator.load_root().await?;
    // the selection load consumes the slow route
    coordinator.select_record("186", "O-1").await?;
    first_call.store(0, Ordering::SeqCst);

    let (older, newer) = tokio::join!(coordinator.reload("187"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.reload("187").await
    });
    assert_eq!(older?, LoadOutcome::Superseded);
    assert_eq!(newer?, LoadOutcome::Loaded { rows: 2 });

    let ids: Vec<String> = engine
        .tree()
        .node("187")
        .unwrap()
        .rows()
        .iter()
        .map(|r| r["id"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, vec!["L-1", "L-2"]);
    Ok(())
}

#[tokio::test]
async fn failed_reload_keeps_rows_and_leaves_a_notice() -> anyhow::Result<()> {
    let transport = transport();
    let engine = sales_order_engine(Arc::clone(&transport))?;
    let coordinator = engine.coordinator();
    coordinator.load_root().await?;
    coordinator.select_record("186", "O-1").await?;

    transport.fail(
        LINES,
        DataSourceFetchError::Transport {
            url: LINES.into(),
            message: "502 bad gateway".into(),
        },
    );
    let err = coordinator.reload("187").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(RuntimeError::from(err).is_retryable());

    let lines = engine.tree().node("187").unwrap();
    assert_eq!(lines.row_count(), 2);
    let notice = lines.notice().unwrap();
    assert!(notice.retryable);
    assert!(notice.message.contains("502 bad gateway"));
    assert_eq!(engine.diagnostics().count(DiagnosticKind::DataSourceFetch), 1);
    Ok(())
}

#[tokio::test]
async fn slow_fetch_times_out() -> anyhow::Result<()> {
    let transport = transport();
    transport.respond_when(
        |r| r.data_url == ORDERS,
        Duration::from_millis(300),
        Vec::new(),
    );
    let mut config = EngineConfig::default().with_fetch_timeout_ms(20);
    config.cache.capacity = 0;
    let engine = sales_order_engine_with(transport, config)?;

    let err = engine.coordinator().load_root().await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Fetch(DataSourceFetchError::Timeout { timeout_ms: 20, .. })
    ));
    assert!(err.is_retryable());
    assert!(engine.tree().root().notice().is_some());
    Ok(())
}

#[tokio::test]
async fn selecting_another_parent_clears_the_subtree() -> anyhow::Result<()> {
    let engine = sales_order_engine(transport())?;
    let coordinator = engine.coordinator();
    coordinator.load_root().await?;
    coordinator.select_record("186", "O-1").await?;
    coordinator.select_record("187", "L-1").await?;

    let taxes = engine.tree().node("189").unwrap();
    assert_eq!(taxes.row_count(), 1);

    coordinator.select_record("186", "O-2").await?;
    let lines = engine.tree().node("187").unwrap();
    assert!(lines.active_record_id().is_none());
    assert_eq!(lines.loaded_for(), Some(Some("O-2".to_string())));
    assert_eq!(taxes.row_count(), 0);
    assert_eq!(coordinator.session().get("#AD_Org_ID"), Some(&json!("ORG2")));

    assert!(matches!(
        coordinator.load_children("187", "L-1").await,
        Err(CoordinatorError::ParentNotSelected { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn saving_a_record_refreshes_its_children() -> anyhow::Result<()> {
    let transport = transport();
    let engine = sales_order_engine(Arc::clone(&transport))?;
    let coordinator = engine.coordinator();
    coordinator.load_root().await?;
    coordinator.select_record("186", "O-1").await?;
    let line_calls = transport.calls_to(LINES).len();

    coordinator
        .record_saved(
            "186",
            row(json!({ "id": "O-3", "organization": "ORG1", "salesTransaction": true })),
        )
        .await?;

    let header = engine.tree().root();
    assert_eq!(header.active_record_id().as_deref(), Some("O-3"));
    assert_eq!(header.row_count(), 3);
    assert_eq!(transport.calls_to(LINES).len(), line_calls + 1);
    assert_eq!(
        engine.tree().node("187").unwrap().loaded_for(),
        Some(Some("O-3".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn line_form_sees_header_values() -> anyhow::Result<()> {
    let engine = sales_order_engine(transport())?;
    let coordinator = engine.coordinator();
    coordinator.load_root().await?;
    coordinator.select_record("186", "O-1").await?;
    coordinator.select_record("187", "L-2").await?;

    let form = engine.form("187")?;
    assert_eq!(form.store().record_id(), Some("L-2"));
    assert_eq!(form.value("lineNo"), Some(&json!(20)));
    assert_eq!(form.scope().lookup("inpadOrgId"), Some(&json!("ORG1")));
    assert_eq!(form.scope().lookup("IsSOTrx"), Some(&json!(true)));

    let rendered = form.render_fields();
    let sales_order = rendered.iter().find(|f| f.spec.name == "salesOrder").unwrap();
    assert!(!sales_order.displayed);
    assert!(sales_order.read_only);
    Ok(())
}

#[tokio::test]
async fn reloading_a_child_without_a_parent_record_names_both_tabs() -> anyhow::Result<()> {
    let transport = transport();
    let engine = sales_order_engine(Arc::clone(&transport))?;
    engine.coordinator().load_root().await?;

    let err = engine.coordinator().reload("189").await.unwrap_err();
    assert_eq!(
        err,
        CoordinatorError::NoActiveParent {
            tab: "189".into(),
            parent: "187".into(),
        }
    );
    assert_eq!(
        err.to_string(),
        "tab '189' cannot load: parent tab '187' has no active record"
    );
    assert!(!err.is_retryable());
    assert!(transport.calls_to(TAXES).is_empty());
    Ok(())
}
