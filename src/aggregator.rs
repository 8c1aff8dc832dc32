//! Fan-out of one upstream search per tag, merged into a single item list.
//!
//! A whole inbound batch holds one admission gate slot while its tags are
//! searched concurrently. A failing tag is logged and contributes nothing; only
//! a batch that ends up with no items at all is an error.

use crate::error::{AggregationError, ApiError, UpstreamError};
use crate::gate::AdmissionGate;
use crate::metrics::MetricsCollector;
use crate::upstream::QuestionSource;
use crate::validation::{validate_tags, Tag};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

/// Items of every successful per-tag search, in tag submission order.
#[derive(Debug, Default)]
pub struct MergedItems {
    pub items: Vec<Value>,
    /// Tags whose search failed, with the reason
    pub failures: Vec<(String, UpstreamError)>,
}

impl MergedItems {
    /// The merged items as a single result-set payload.
    pub fn into_result_set(self) -> Value {
        let mut payload = serde_json::Map::new();
        payload.insert("items".to_string(), Value::Array(self.items));
        Value::Object(payload)
    }
}

#[derive(Clone)]
pub struct Aggregator {
    source: Arc<dyn QuestionSource>,
    gate: AdmissionGate,
    metrics: Arc<MetricsCollector>,
}

impl Aggregator {
    pub fn new(
        source: Arc<dyn QuestionSource>,
        gate: AdmissionGate,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            source,
            gate,
            metrics,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Validates the tags, then searches them all under one gate slot.
    ///
    /// Validation failures are reported before the gate is touched.
    pub async fn aggregate<S: AsRef<str>>(&self, raw_tags: &[S]) -> Result<MergedItems, ApiError> {
        let tags = validate_tags(raw_tags)?;
        let tag_names: Vec<&str> = tags.iter().map(Tag::as_str).collect();

        tracing::trace!(
            tags = ?tag_names,
            available = self.gate.available(),
            capacity = self.gate.capacity(),
            "Tags are waiting for the admission gate"
        );
        let mut permit = self.gate.acquire().await.map_err(|_| ApiError::ShuttingDown)?;
        tracing::trace!(tags = ?tag_names, "Tags acquired the admission gate");

        if self.gate.is_closed() {
            return Err(ApiError::ShuttingDown);
        }

        let merged = self.fetch_all(&tags).await;

        permit.release();
        tracing::trace!(tags = ?tag_names, "Tags released the admission gate");

        if merged.items.is_empty() {
            return Err(AggregationError {
                failures: merged.failures,
            }
            .into());
        }

        Ok(merged)
    }

    async fn fetch_all(&self, tags: &[Tag]) -> MergedItems {
        tracing::info!(count = tags.len(), "Searching tags");

        let results = join_all(tags.iter().map(|tag| self.source.search(tag))).await;

        let mut merged = MergedItems::default();
        for (tag, result) in tags.iter().zip(results) {
            match result {
                Ok(page) => {
                    if page.items.is_empty() {
                        tracing::debug!(tag = %tag, "Tag returned no questions");
                    }
                    merged.items.extend(page.items);
                }
                Err(err) => {
                    tracing::error!(tag = %tag, error = %err, "Search failed for tag");
                    merged.failures.push((tag.to_string(), err));
                }
            }
        }

        self.metrics
            .record_upstream(tags.len() as u64, merged.failures.len() as u64)
            .await;

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NetworkFailure, ValidationError};
    use crate::upstream::ResultSet;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubSource {
        pages: HashMap<String, Vec<Value>>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn with_page(mut self, tag: &str, items: Vec<Value>) -> Self {
            self.pages.insert(tag.to_string(), items);
            self
        }
    }

    #[async_trait]
    impl QuestionSource for StubSource {
        async fn search(&self, tag: &Tag) -> Result<ResultSet, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(tag.as_str()) {
                Some(items) => Ok(ResultSet {
                    items: items.clone(),
                    ..ResultSet::default()
                }),
                None => Err(UpstreamError::network(NetworkFailure::Connect, "refused")),
            }
        }
    }

    fn aggregator(source: Arc<StubSource>, capacity: usize) -> Aggregator {
        Aggregator::new(
            source,
            AdmissionGate::new(capacity),
            Arc::new(MetricsCollector::new()),
        )
    }

    #[tokio::test]
    async fn test_merges_in_submission_order() {
        let source = Arc::new(
            StubSource::default()
                .with_page("rust", vec![json!({"question_id": 1}), json!({"question_id": 2})])
                .with_page("go", vec![json!({"question_id": 3})]),
        );
        let aggregator = aggregator(source.clone(), 1);

        let merged = aggregator.aggregate(&["go", "rust"]).await.unwrap();
        let ids: Vec<_> = merged.items.iter().map(|q| q["question_id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(1), json!(2)]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(aggregator.gate().available(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_is_swallowed() {
        let source = Arc::new(StubSource::default().with_page("rust", vec![json!({"question_id": 1})]));
        let aggregator = aggregator(source, 2);

        let merged = aggregator.aggregate(&["rust", "broken"]).await.unwrap();
        assert_eq!(merged.items.len(), 1);
        assert_eq!(merged.failures.len(), 1);
        assert_eq!(merged.failures[0].0, "broken");
    }

    #[tokio::test]
    async fn test_merged_items_form_a_result_set() {
        let source = Arc::new(
            StubSource::default()
                .with_page("rust", vec![json!({"tags": ["rust"], "is_answered": true})]),
        );
        let aggregator = aggregator(source, 1);

        let payload = aggregator.aggregate(&["rust"]).await.unwrap().into_result_set();
        assert_eq!(
            payload,
            json!({"items": [{"tags": ["rust"], "is_answered": true}]})
        );

        let stats = crate::extractor::extract(&payload).unwrap();
        assert_eq!(stats.get("rust").map(|c| c.answered), Some(1));
    }

    #[tokio::test]
    async fn test_all_failures_become_aggregation_error() {
        let source = Arc::new(StubSource::default());
        let aggregator = aggregator(source, 1);

        let err = aggregator.aggregate(&["a", "b"]).await.unwrap_err();
        match err {
            ApiError::Aggregation(agg) => assert_eq!(agg.failures.len(), 2),
            other => panic!("expected aggregation error, got {:?}", other),
        }
        assert_eq!(aggregator.gate().available(), 1);
    }

    #[tokio::test]
    async fn test_all_empty_pages_become_aggregation_error() {
        let source = Arc::new(StubSource::default().with_page("quiet", vec![]));
        let aggregator = aggregator(source, 1);

        let err = aggregator.aggregate(&["quiet"]).await.unwrap_err();
        assert!(matches!(err, ApiError::Aggregation(ref agg) if agg.failures.is_empty()));
    }

    #[tokio::test]
    async fn test_invalid_tag_makes_no_upstream_call() {
        let source = Arc::new(StubSource::default());
        let aggregator = aggregator(source.clone(), 1);

        let err = aggregator.aggregate(&["foo!", "python"]).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::InvalidTag(ref tag)) if tag == "foo!"
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_gate_means_shutting_down() {
        let source = Arc::new(StubSource::default().with_page("rust", vec![json!({})]));
        let aggregator = aggregator(source, 1);
        aggregator.gate().close();

        let err = aggregator.aggregate(&["rust"]).await.unwrap_err();
        assert!(matches!(err, ApiError::ShuttingDown));
    }
}
