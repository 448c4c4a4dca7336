//! Testing utilities for the tabspec workspace
//!
//! Shared fixtures and a scriptable datasource transport.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tabspec_model::{Diagnostics, SpecNormalizer, WindowSpec};
use tabspec_runtime::{
    DataSourceFetchError, DataSourceTransport, EngineConfig, EngineContext, QueryRequest,
    WindowEngine,
};

/// Sales order window: header, lines, line taxes and payment plan
pub const SALES_ORDER_JSON: &str = include_str!("../fixtures/sales_order.json");

pub fn sales_order_raw() -> Value {
    serde_json::from_str(SALES_ORDER_JSON).expect("fixture is valid JSON")
}

pub fn sales_order() -> WindowSpec {
    let diagnostics = Diagnostics::new();
    SpecNormalizer::with_global_registry(&diagnostics)
        .normalize_str(SALES_ORDER_JSON)
        .expect("fixture normalizes")
}

/// Engine over the sales order fixture with caching disabled
pub fn sales_order_engine(transport: Arc<MockTransport>) -> anyhow::Result<WindowEngine> {
    let mut config = EngineConfig::default();
    config.cache.capacity = 0;
    sales_order_engine_with(transport, config)
}

pub fn sales_order_engine_with(
    transport: Arc<MockTransport>,
    config: EngineConfig,
) -> anyhow::Result<WindowEngine> {
    let ctx = EngineContext::new(config, transport);
    Ok(WindowEngine::load_with(SALES_ORDER_JSON, ctx)?)
}

/// Datasource body carrying `rows`
pub fn rows_response(rows: &[Value]) -> Value {
    json!({
        "response": {
            "status": 0,
            "startRow": 0,
            "endRow": rows.len().saturating_sub(1),
            "totalRows": rows.len(),
            "data": rows,
        }
    })
}

pub fn row(value: Value) -> tabspec_runtime::Row {
    value.as_object().cloned().expect("row literal is an object")
}

type Matcher = Box<dyn Fn(&QueryRequest) -> bool + Send + Sync>;

struct Route {
    matcher: Matcher,
    delay: Duration,
    reply: Result<Value, DataSourceFetchError>,
}

/// Transport answering from scripted routes
///
/// The most recently added matching route answers. Unmatched requests get
/// an empty page. Every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<QueryRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer requests to `url` with `rows`
    pub fn respond(&self, url: &str, rows: Vec<Value>) {
        let url = url.to_string();
        self.route(
            move |r| r.data_url == url,
            Duration::ZERO,
            Ok(rows_response(&rows)),
        );
    }

    /// Answer matching requests after `delay`
    pub fn respond_when(
        &self,
        matcher: impl Fn(&QueryRequest) -> bool + Send + Sync + 'static,
        delay: Duration,
        rows: Vec<Value>,
    ) {
        self.route(matcher, delay, Ok(rows_response(&rows)));
    }

    /// Fail requests to `url`
    pub fn fail(&self, url: &str, error: DataSourceFetchError) {
        let url = url.to_string();
        self.route(move |r| r.data_url == url, Duration::ZERO, Err(error));
    }

    pub fn route(
        &self,
        matcher: impl Fn(&QueryRequest) -> bool + Send + Sync + 'static,
        delay: Duration,
        reply: Result<Value, DataSourceFetchError>,
    ) {
        self.routes.lock().push(Route {
            matcher: Box::new(matcher),
            delay,
            reply,
        });
    }

    pub fn calls(&self) -> Vec<QueryRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, url: &str) -> Vec<QueryRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.data_url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DataSourceTransport for MockTransport {
    async fn fetch(&self, request: &QueryRequest) -> Result<Value, DataSourceFetchError> {
        self.calls.lock().push(request.clone());
        let answer = self
            .routes
            .lock()
            .iter()
            .rev()
            .find(|route| (route.matcher)(request))
            .map(|route| (route.delay, route.reply.clone()));

        match answer {
            Some((delay, reply)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                reply
            }
            None => Ok(rows_response(&[])),
        }
    }
}
