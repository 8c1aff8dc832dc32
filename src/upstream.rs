//! Client for the StackExchange question search API.

use crate::config::{NetworkSettings, StackOverflowSettings};
use crate::error::{NetworkFailure, UpstreamError};
use crate::validation::Tag;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Upstream quota violations come back with this `error_id`.
const THROTTLE_ERROR_ID: i64 = 502;
const THROTTLE_ERROR_NAME: &str = "throttle_violation";

/// One page of search results.
///
/// Items stay untyped: a question with missing fields must not fail the whole
/// page, so per-question parsing is left to the statistics extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSet {
    pub items: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub quota_max: Option<u64>,
    #[serde(default)]
    pub quota_remaining: Option<u64>,
}

/// Anything that can answer "questions for this tag".
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn search(&self, tag: &Tag) -> Result<ResultSet, UpstreamError>;
}

/// Error payload the upstream attaches to rejected requests
#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error_id: Option<i64>,
    error_name: Option<String>,
    error_message: Option<String>,
}

/// Shared HTTP client for the search endpoint.
///
/// Besides the reqwest pool it holds `max_requests` connection permits, so the
/// number of in-flight outbound calls is capped independently of the
/// admission gate. Waiting longer than the request timeout for a permit is a
/// [`NetworkFailure::PoolTimeout`].
pub struct StackExchangeClient {
    http: reqwest::Client,
    connections: Arc<Semaphore>,
    pool_timeout: Duration,
    settings: StackOverflowSettings,
}

impl StackExchangeClient {
    pub fn new(
        network: &NetworkSettings,
        settings: StackOverflowSettings,
        proxy: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(network.timeout())
            .pool_max_idle_per_host(network.max_alive_requests)
            .pool_idle_timeout(network.keep_alive());

        if let Some(proxy) = proxy {
            tracing::info!(proxy = %proxy, "Using outbound proxy");
            builder = builder
                .proxy(reqwest::Proxy::all(proxy)?)
                .danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            connections: Arc::new(Semaphore::new(network.max_requests)),
            pool_timeout: network.timeout(),
            settings,
        })
    }

    fn query_params(&self, tag: &Tag) -> Vec<(&str, String)> {
        vec![
            ("pagesize", self.settings.pagesize.to_string()),
            ("order", self.settings.order.clone()),
            ("sort", self.settings.sort.clone()),
            (self.settings.tag_param.as_str(), tag.to_string()),
            ("site", self.settings.site.clone()),
        ]
    }

    async fn fetch(&self, tag: &Tag) -> Result<ResultSet, UpstreamError> {
        let _connection =
            match tokio::time::timeout(self.pool_timeout, self.connections.clone().acquire_owned())
                .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => {
                    return Err(UpstreamError::network(
                        NetworkFailure::Other,
                        "connection pool is closed",
                    ))
                }
                Err(_) => {
                    return Err(UpstreamError::network(
                        NetworkFailure::PoolTimeout,
                        format!(
                            "no outbound connection freed up within {:?}, try increasing max_requests",
                            self.pool_timeout
                        ),
                    ))
                }
            };

        let response = self
            .http
            .get(&self.settings.url)
            .query(&self.query_params(tag))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify_transport_error)?;

        if status >= 400 {
            return Err(classify_rejection(status, &body));
        }

        let result = parse_result_set(&body)?;
        if result.items.is_empty() && self.settings.empty_result_is_error {
            return Err(UpstreamError::EmptyResult(tag.to_string()));
        }

        Ok(result)
    }
}

#[async_trait]
impl QuestionSource for StackExchangeClient {
    async fn search(&self, tag: &Tag) -> Result<ResultSet, UpstreamError> {
        tracing::debug!(tag = %tag, "Searching questions");

        let result = self.fetch(tag).await;
        match &result {
            Ok(page) => tracing::debug!(
                tag = %tag,
                items = page.items.len(),
                quota_remaining = ?page.quota_remaining,
                "Search succeeded"
            ),
            Err(err) => tracing::warn!(
                tag = %tag,
                error = %err,
                retriable = err.retriable(),
                "Search failed"
            ),
        }
        result
    }
}

fn classify_transport_error(err: reqwest::Error) -> UpstreamError {
    let kind = if err.is_timeout() {
        NetworkFailure::Timeout
    } else if err.is_connect() {
        NetworkFailure::Connect
    } else {
        NetworkFailure::Other
    };
    UpstreamError::network(kind, err.to_string())
}

/// Maps a >= 400 response to a rejection, spotting quota violations when the
/// error payload is readable.
pub fn classify_rejection(status: u16, body: &[u8]) -> UpstreamError {
    let parsed: Option<UpstreamErrorBody> = serde_json::from_slice(body).ok();

    let throttled = status == 429
        || parsed.as_ref().is_some_and(|b| {
            b.error_id == Some(THROTTLE_ERROR_ID)
                || b.error_name.as_deref() == Some(THROTTLE_ERROR_NAME)
        });

    let message = parsed
        .and_then(|b| b.error_message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(200).collect());

    if throttled {
        UpstreamError::Throttled { message }
    } else {
        UpstreamError::Rejected { status, message }
    }
}

/// Parses a success body. A missing `items` key or a non-JSON body is malformed.
pub fn parse_result_set(body: &[u8]) -> Result<ResultSet, UpstreamError> {
    serde_json::from_slice(body).map_err(|e| UpstreamError::MalformedResponse(e.to_string()))
}
