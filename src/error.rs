use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Bad caller input. Always rendered as a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("empty tag list")]
    EmptyTagList,
    #[error("tag \"{0}\" is not alphanumeric")]
    InvalidTag(String),
}

/// Transport-level failure flavours, used to pick between 502, 503 and 504.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFailure {
    /// No outbound connection slot freed up in time
    PoolTimeout,
    /// The upstream did not answer within the request timeout
    Timeout,
    Connect,
    Other,
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkFailure::PoolTimeout => "pool timeout",
            NetworkFailure::Timeout => "timeout",
            NetworkFailure::Connect => "connect",
            NetworkFailure::Other => "transport",
        };
        f.write_str(name)
    }
}

/// Coarse classification of an [`UpstreamError`], mostly for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Network,
    Rejected,
    MalformedResponse,
    EmptyResult,
}

/// Failure of a single call to the question search API.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("network failure ({kind}): {message}")]
    Network { kind: NetworkFailure, message: String },

    /// Quota or throttle violation signalled by the upstream
    #[error("upstream throttled the request: {message}")]
    Throttled { message: String },

    #[error("upstream rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("empty upstream result for tag \"{0}\"")]
    EmptyResult(String),
}

impl UpstreamError {
    pub fn network(kind: NetworkFailure, message: impl Into<String>) -> Self {
        UpstreamError::Network {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> UpstreamErrorKind {
        match self {
            UpstreamError::Network { .. } => UpstreamErrorKind::Network,
            UpstreamError::Throttled { .. } | UpstreamError::Rejected { .. } => {
                UpstreamErrorKind::Rejected
            }
            UpstreamError::MalformedResponse(_) => UpstreamErrorKind::MalformedResponse,
            UpstreamError::EmptyResult(_) => UpstreamErrorKind::EmptyResult,
        }
    }

    /// Whether the same call could plausibly succeed if repeated later.
    pub fn retriable(&self) -> bool {
        match self {
            UpstreamError::Network { .. } => true,
            UpstreamError::Throttled { .. } => false,
            UpstreamError::Rejected { status, .. } => *status >= 500,
            UpstreamError::MalformedResponse(_) | UpstreamError::EmptyResult(_) => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            UpstreamError::Network { kind, .. } => match kind {
                NetworkFailure::PoolTimeout => StatusCode::SERVICE_UNAVAILABLE,
                NetworkFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
                NetworkFailure::Connect | NetworkFailure::Other => StatusCode::BAD_GATEWAY,
            },
            UpstreamError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            UpstreamError::Rejected { .. }
            | UpstreamError::MalformedResponse(_)
            | UpstreamError::EmptyResult(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Every per-tag upstream call of a batch failed or came back empty.
#[derive(Debug, Clone, Default)]
pub struct AggregationError {
    pub failures: Vec<(String, UpstreamError)>,
}

impl AggregationError {
    /// The first per-tag failure decides the status; with no failure at all
    /// (every tag returned zero items) it is a plain 500.
    pub fn status_code(&self) -> StatusCode {
        self.failures
            .first()
            .map(|(_, err)| err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for AggregationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "something went wrong with request / response")?;
        if let Some((tag, err)) = self.failures.first() {
            write!(f, " (tag \"{}\": {})", tag, err)?;
            if self.failures.len() > 1 {
                write!(f, " and {} more failed tag(s)", self.failures.len() - 1)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AggregationError {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("missing items in upstream payload")]
    MissingItems,
    #[error("empty statistics: no tags found in returned questions")]
    EmptyStatistics,
}

/// Errors that reach the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("service is shutting down")]
    ShuttingDown,
    #[error("unauthorized access to config")]
    Unauthorized,
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(err) => err.status_code(),
            ApiError::Aggregation(err) => err.status_code(),
            ApiError::Extraction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Upstream(err) => match err.kind() {
                UpstreamErrorKind::Network => "upstream_network_error",
                UpstreamErrorKind::Rejected => "upstream_rejected",
                UpstreamErrorKind::MalformedResponse => "upstream_malformed_response",
                UpstreamErrorKind::EmptyResult => "upstream_empty_result",
            },
            ApiError::Aggregation(_) => "aggregation_error",
            ApiError::Extraction(_) => "extraction_error",
            ApiError::ShuttingDown => "service_unavailable",
            ApiError::Unauthorized => "unauthorized",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_api_error(err: &ApiError) -> Self {
        Self::new(err.slug(), &err.to_string(), err.status_code().as_u16())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "Request rejected");
        }

        (status, Json(ErrorResponse::from_api_error(&self))).into_response()
    }
}

/// Startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0} not found")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration file {0} is empty")]
    Empty(PathBuf),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("version file error: {0}")]
    Version(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_unprocessable() {
        let err = ApiError::from(ValidationError::InvalidTag("foo!".to_string()));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().contains("foo!"));

        let err = ApiError::from(ValidationError::EmptyTagList);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_network_failures_map_to_gateway_statuses() {
        let pool = UpstreamError::network(NetworkFailure::PoolTimeout, "no free slot");
        let timeout = UpstreamError::network(NetworkFailure::Timeout, "too slow");
        let connect = UpstreamError::network(NetworkFailure::Connect, "refused");

        assert_eq!(pool.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(connect.status_code(), StatusCode::BAD_GATEWAY);
        assert!(pool.retriable() && timeout.retriable() && connect.retriable());
    }

    #[test]
    fn test_throttle_maps_to_too_many_requests() {
        let err = UpstreamError::Throttled {
            message: "too many requests from this IP".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.kind(), UpstreamErrorKind::Rejected);
        assert!(!err.retriable());
    }

    #[test]
    fn test_rejected_retriable_only_for_server_errors() {
        let bad_request = UpstreamError::Rejected {
            status: 400,
            message: "bad parameter".to_string(),
        };
        let unavailable = UpstreamError::Rejected {
            status: 503,
            message: "down".to_string(),
        };
        assert!(!bad_request.retriable());
        assert!(unavailable.retriable());
        assert_eq!(bad_request.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_aggregation_status_follows_first_failure() {
        let err = AggregationError {
            failures: vec![
                (
                    "rust".to_string(),
                    UpstreamError::network(NetworkFailure::Timeout, "slow"),
                ),
                (
                    "go".to_string(),
                    UpstreamError::MalformedResponse("not json".to_string()),
                ),
            ],
        };
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.to_string().contains("1 more failed tag"));

        assert_eq!(
            AggregationError::default().status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_body() {
        let body = ErrorResponse::from_api_error(&ApiError::ShuttingDown);
        assert_eq!(body.code, 503);
        assert_eq!(body.error, "service_unavailable");

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["message"], "service is shutting down");
    }
}
