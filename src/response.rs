use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// JSON response rendered with two-space indentation.
#[derive(Debug)]
pub struct PrettyJson<T>(pub T);

impl<T: Serialize> IntoResponse for PrettyJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec_pretty(&self.0) {
            Ok(body) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )],
                body,
            )
                .into_response(),
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize response");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

/// Body for unknown routes
#[derive(Debug, Serialize)]
pub struct NotFoundResponse {
    pub res: String,
    pub msg: String,
}

impl NotFoundResponse {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            res: "Error".to_string(),
            msg: format!("Not found {} API handler for {}", method, uri),
        }
    }
}
