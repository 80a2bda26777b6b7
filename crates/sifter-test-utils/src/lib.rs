//! Sifter test utilities.
//!
//! Helpers for integration testing: fixture builders for filter
//! configurations and backend responses, a scripted in-memory backend, and
//! assertion utilities.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use sifter_core::backend::ExplorerBackend;
use sifter_core::query::GraphQlRequest;
use sifter_core::{ExplorerError, ExplorerResult};

/// Install a test-writer tracing subscriber once per test binary.
///
/// Honours `RUST_LOG`; defaults to `sifter_core=debug`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sifter_core=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

type Handler = Box<dyn Fn(&GraphQlRequest) -> Value + Send + Sync>;

struct Scripted {
    reply: Result<Value, String>,
    gate: Option<Arc<Notify>>,
}

/// In-memory [`ExplorerBackend`].
///
/// GraphQL requests are answered by a handler when one is set, otherwise by
/// scripted replies in FIFO order. Every request is recorded.
#[derive(Default)]
pub struct MockBackend {
    handler: Option<Handler>,
    scripted: Mutex<VecDeque<Scripted>>,
    status: Mutex<Option<Value>>,
    requests: Mutex<Vec<GraphQlRequest>>,
    status_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `handler`.
    pub fn with_handler(handler: impl Fn(&GraphQlRequest) -> Value + Send + Sync + 'static) -> Self {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::default()
        }
    }

    /// Queue a reply.
    pub fn push(&self, body: Value) -> &Self {
        self.push_scripted(Ok(body), None)
    }

    /// Queue a reply released only once `gate` is notified.
    pub fn push_gated(&self, body: Value, gate: Arc<Notify>) -> &Self {
        self.push_scripted(Ok(body), Some(gate))
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: &str) -> &Self {
        self.push_scripted(Err(message.to_string()), None)
    }

    fn push_scripted(&self, reply: Result<Value, String>, gate: Option<Arc<Notify>>) -> &Self {
        self.scripted.lock().push_back(Scripted { reply, gate });
        self
    }

    /// Body returned by `field_status`.
    pub fn set_status(&self, status: Value) {
        *self.status.lock() = Some(status);
    }

    pub fn requests(&self) -> Vec<GraphQlRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` GraphQL requests have been received.
    pub async fn wait_for_requests(&self, count: usize) {
        while self.request_count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl ExplorerBackend for MockBackend {
    async fn graphql(&self, request: &GraphQlRequest) -> ExplorerResult<Value> {
        self.requests.lock().push(request.clone());

        if let Some(handler) = &self.handler {
            return Ok(handler(request));
        }

        let next = self.scripted.lock().pop_front();
        let Some(Scripted { reply, gate }) = next else {
            return Err(ExplorerError::Decode("no scripted response left".to_string()));
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        reply.map_err(ExplorerError::Decode)
    }

    async fn field_status(&self) -> ExplorerResult<Value> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status
            .lock()
            .clone()
            .ok_or_else(|| ExplorerError::Decode("no status configured".to_string()))
    }
}

/// Builders for configurations and backend response bodies.
pub mod fixtures {
    use serde_json::{Value, json};

    use sifter_core::aggs::{AggsCount, AggsData, FieldHistogram};
    use sifter_core::config::ExplorerConfig;

    /// `{data: {_aggregation: {<data_type>: tree}}}`.
    pub fn aggregation_body(data_type: &str, tree: Value) -> Value {
        json!({ "data": { "_aggregation": { data_type: tree } } })
    }

    /// `{data: {<data_type>: records, _aggregation: {<data_type>: {_totalCount}}}}`.
    pub fn raw_data_body(data_type: &str, records: Vec<Value>, total_count: u64) -> Value {
        json!({
            "data": {
                data_type: records,
                "_aggregation": { data_type: { "_totalCount": total_count } }
            }
        })
    }

    /// Response tree leaf for term buckets.
    pub fn term_leaf(buckets: &[(&str, u64)]) -> Value {
        let histogram: Vec<Value> = buckets
            .iter()
            .map(|(key, count)| json!({ "key": key, "count": count }))
            .collect();
        json!({ "histogram": histogram })
    }

    /// Response tree leaf for a single range bucket.
    pub fn range_leaf(lower: f64, upper: f64, count: u64) -> Value {
        json!({ "histogram": [{ "key": [lower, upper], "count": count }] })
    }

    pub fn term_histogram(buckets: &[(&str, u64)]) -> FieldHistogram {
        FieldHistogram::new(
            buckets
                .iter()
                .map(|(key, count)| AggsCount::new(*key, *count))
                .collect(),
        )
    }

    pub fn aggs(entries: Vec<(&str, FieldHistogram)>) -> AggsData {
        entries
            .into_iter()
            .map(|(field, histogram)| (field.to_string(), histogram))
            .collect()
    }

    /// Two-tab subject explorer with a search field and an anchor on the
    /// visit tab.
    pub fn subject_explorer() -> ExplorerConfig {
        let config = json!({
            "dataType": "subject",
            "filters": {
                "tabs": [
                    {"title": "Subject", "fields": ["gender", "age"], "searchFields": ["site"]},
                    {"title": "Visit", "fields": ["visit.visit_label"]}
                ],
                "anchor": {"field": "visit_type", "tabs": ["Visit"], "options": ["baseline", "follow-up"]}
            },
            "fieldMapping": [{"field": "age", "name": "Age at Enrollment"}]
        });
        serde_json::from_value(config).unwrap_or_default()
    }
}

/// Assertion helpers for JSON content.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value equals expected.
    pub fn json_eq(actual: &Value, expected: &Value) {
        assert_eq!(
            actual,
            expected,
            "JSON mismatch:\nactual: {}\nexpected: {}",
            serde_json::to_string_pretty(actual).unwrap_or_default(),
            serde_json::to_string_pretty(expected).unwrap_or_default()
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }
}
