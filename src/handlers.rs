use axum::{
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::config::Settings;
use crate::diag::{DiagReport, GateStatus, Uptime};
use crate::error::{ApiError, Result};
use crate::extractor::{self, TagStatistics};
use crate::gate::AdmissionGate;
use crate::metrics::MetricsCollector;
use crate::response::{NotFoundResponse, PrettyJson};
use crate::upstream::QuestionSource;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Service context built once at startup and handed to every handler.
pub struct AppState {
    pub settings: Settings,
    pub aggregator: Aggregator,
    pub metrics: Arc<MetricsCollector>,
    uptime: Uptime,
    running: AtomicBool,
}

impl AppState {
    pub fn new(settings: Settings, source: Arc<dyn QuestionSource>) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let gate = AdmissionGate::new(settings.network.max_requests);

        Self {
            aggregator: Aggregator::new(source, gate, metrics.clone()),
            settings,
            metrics,
            uptime: Uptime::start(),
            running: AtomicBool::new(true),
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        self.aggregator.gate()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops accepting searches and wakes every batch still waiting at the gate.
    pub fn begin_shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Service is shutting down");
        }
        self.gate().close();
    }
}

/// `POST /search?tag=..&tag=..`
pub async fn search(
    State(state): State<SharedState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<PrettyJson<TagStatistics>> {
    let result = search_tags(&state, &params).await;
    state.metrics.record_search(result.is_ok()).await;
    result.map(PrettyJson)
}

async fn search_tags(state: &AppState, params: &[(String, String)]) -> Result<TagStatistics> {
    if !state.is_running() {
        return Err(ApiError::ShuttingDown);
    }

    let tags: Vec<&str> = params
        .iter()
        .filter(|(key, _)| key == "tag")
        .map(|(_, value)| value.as_str())
        .collect();

    let merged = state.aggregator.aggregate(&tags).await?;
    if !merged.failures.is_empty() {
        tracing::warn!(
            failed = merged.failures.len(),
            requested = tags.len(),
            "Some tags were skipped after upstream failures"
        );
    }

    let stats = extractor::extract(&merged.into_result_set())?;
    tracing::info!(tags = ?tags, found = stats.len(), "Search request done");
    Ok(stats)
}

/// `GET /diag`
pub async fn diag(State(state): State<SharedState>) -> impl IntoResponse {
    let gate = state.gate();

    Json(DiagReport {
        res: "ok".to_string(),
        app: state.settings.app.service_name.clone(),
        version: state.settings.version.clone(),
        uptime: state.uptime.formatted(),
        is_running: state.is_running(),
        gate: GateStatus {
            capacity: gate.capacity(),
            available: gate.available(),
            in_use: gate.in_use(),
        },
        metrics: state.metrics.snapshot().await,
    })
}

/// `GET /config`, only in TEST mode
pub async fn config(State(state): State<SharedState>) -> Result<Json<Settings>> {
    if !state.settings.is_test_mode() {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(state.settings.clone()))
}

pub async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    let body = NotFoundResponse::new(method.as_str(), &uri.to_string());
    tracing::warn!(msg = %body.msg, "Unknown route");
    (StatusCode::NOT_FOUND, Json(body))
}
