//! Datasource transport and client
//!
//! [`DataSourceTransport`] is the seam to the HTTP datasource layer, which
//! lives outside this crate. [`DataSourceClient`] wraps a transport with the
//! configured timeout and a response cache keyed by request fingerprint.

use crate::config::EngineConfig;
use crate::error::DataSourceFetchError;
use crate::query::{QueryRequest, RequestFingerprint};
use async_trait::async_trait;
use moka::future::Cache;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One datasource row
pub type Row = Map<String, Value>;

/// Collaborator performing datasource fetches
///
/// Implementations return the raw body:
/// `{ "response": { "status": 0, "data": [ {..}, .. ], "totalRows": n } }`.
#[async_trait]
pub trait DataSourceTransport: Send + Sync {
    /// Perform one fetch
    async fn fetch(&self, request: &QueryRequest) -> Result<Value, DataSourceFetchError>;
}

/// Parsed fetch result
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Returned rows
    pub rows: Vec<Row>,
    /// First row index of the page
    pub start_row: usize,
    /// Server-side row count, when reported
    pub total_rows: Option<usize>,
}

impl FetchResponse {
    /// Parse a raw response body
    ///
    /// # Errors
    /// Negative status ([`DataSourceFetchError::Transport`]) or a body
    /// without a `response.data` array of objects
    pub fn parse(url: &str, body: &Value) -> Result<Self, DataSourceFetchError> {
        let malformed = |message: &str| DataSourceFetchError::MalformedResponse {
            url: url.to_string(),
            message: message.to_string(),
        };

        let response = body
            .get("response")
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("missing 'response' object"))?;

        let status = response.get("status").and_then(Value::as_i64).unwrap_or(0);
        if status < 0 {
            let message = response
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map_or_else(|| format!("status {status}"), str::to_string);
            return Err(DataSourceFetchError::Transport {
                url: url.to_string(),
                message,
            });
        }

        let rows = response
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing 'response.data' array"))?
            .iter()
            .map(|row| row.as_object().cloned().ok_or_else(|| malformed("row is not an object")))
            .collect::<Result<Vec<_>, _>>()?;

        let as_usize = |key: &str| {
            response
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
        };

        Ok(Self {
            rows,
            start_row: as_usize("startRow").unwrap_or(0),
            total_rows: as_usize("totalRows"),
        })
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Transport with timeout and response cache
#[derive(Clone)]
pub struct DataSourceClient {
    transport: Arc<dyn DataSourceTransport>,
    timeout: Duration,
    cache: Option<Cache<RequestFingerprint, Arc<FetchResponse>>>,
}

impl fmt::Debug for DataSourceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceClient")
            .field("timeout", &self.timeout)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl DataSourceClient {
    /// Client configured from the engine config
    #[must_use]
    pub fn new(transport: Arc<dyn DataSourceTransport>, config: &EngineConfig) -> Self {
        let cache = config.cache.enabled().then(|| {
            Cache::builder()
                .max_capacity(config.cache.capacity)
                .time_to_live(config.cache.ttl())
                .build()
        });
        Self {
            transport,
            timeout: config.fetch_timeout(),
            cache,
        }
    }

    /// Fetch, answering from the cache when an identical request is fresh
    ///
    /// # Errors
    /// Timeout, transport failure or malformed body; failures are not cached
    pub async fn fetch(&self, request: &QueryRequest) -> Result<Arc<FetchResponse>, DataSourceFetchError> {
        let key = request.fingerprint();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!(url = %request.data_url, key = %key.short(), "datasource cache hit");
                return Ok(hit);
            }
        }

        let response = self.fetch_fresh(request).await?;
        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::clone(&response)).await;
        }
        Ok(response)
    }

    /// Fetch bypassing the cache
    ///
    /// # Errors
    /// Timeout, transport failure or malformed body
    pub async fn fetch_fresh(
        &self,
        request: &QueryRequest,
    ) -> Result<Arc<FetchResponse>, DataSourceFetchError> {
        let url = request.data_url.as_str();
        let body = match tokio::time::timeout(self.timeout, self.transport.fetch(request)).await {
            Ok(result) => result?,
            Err(_) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(url, timeout_ms, "datasource fetch timed out");
                return Err(DataSourceFetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms,
                });
            }
        };
        let response = FetchResponse::parse(url, &body)?;
        tracing::debug!(url, rows = response.len(), "datasource fetch complete");
        Ok(Arc::new(response))
    }

    /// Drop every cached response
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl DataSourceTransport for Counting {
        async fn fetch(&self, _request: &QueryRequest) -> Result<Value, DataSourceFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(json!({ "response": { "status": 0, "data": [ { "id": "A" } ], "totalRows": 1 } }))
        }
    }

    fn counting(delay_ms: u64) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[test]
    fn parses_rows_and_status() {
        let body = json!({ "response": { "status": 0, "data": [ { "id": "1" } ], "totalRows": 7 } });
        let parsed = FetchResponse::parse("/ds", &body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.total_rows, Some(7));

        let failed = json!({ "response": { "status": -1, "error": { "message": "boom" } } });
        assert_eq!(
            FetchResponse::parse("/ds", &failed).unwrap_err(),
            DataSourceFetchError::Transport {
                url: "/ds".into(),
                message: "boom".into()
            }
        );
        assert!(matches!(
            FetchResponse::parse("/ds", &json!({ "rows": [] })),
            Err(DataSourceFetchError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn identical_requests_hit_the_cache() {
        let transport = counting(0);
        let client = DataSourceClient::new(transport.clone(), &EngineConfig::default());
        let request = QueryRequest::new("/ws/datasource/Order");

        client.fetch(&request).await.unwrap();
        client.fetch(&request).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        client.fetch_fresh(&request).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_transport_times_out() {
        let transport = counting(200);
        let config = EngineConfig::default().with_fetch_timeout_ms(10);
        let client = DataSourceClient::new(transport, &config);
        let err = client
            .fetch(&QueryRequest::new("/ws/datasource/Order"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DataSourceFetchError::Timeout {
                url: "/ws/datasource/Order".into(),
                timeout_ms: 10
            }
        );
        assert!(err.is_retryable());
    }
}
