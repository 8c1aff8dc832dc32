use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub upstream_calls: u64,
    pub upstream_failures: u64,
    /// Unix seconds when counting started
    pub collecting_since: u64,
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            upstream_calls: 0,
            upstream_failures: 0,
            collecting_since: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Process-wide counters reported by `/diag`.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<SearchMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_search(&self, succeeded: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        if succeeded {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
    }

    pub async fn record_upstream(&self, calls: u64, failures: u64) {
        let mut metrics = self.metrics.write().await;
        metrics.upstream_calls += calls;
        metrics.upstream_failures += failures;
    }

    pub async fn snapshot(&self) -> SearchMetrics {
        self.metrics.read().await.clone()
    }
}
