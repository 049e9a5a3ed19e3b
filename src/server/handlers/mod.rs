/// Variant detail and streaming export handlers.
pub mod export;
/// Health and readiness probe handlers.
pub mod health;
/// Batch ingestion handler.
pub mod ingest;
/// Prometheus metrics exposition handler.
pub mod metrics;
/// Project CRUD handlers.
pub mod project;
/// Filter query and facet handlers.
pub mod query;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::LocusError;

/// Wrapper that converts `LocusError` into an HTTP response.
pub struct ApiError(pub LocusError);

impl From<LocusError> for ApiError {
    fn from(e: LocusError) -> Self {
        ApiError(e)
    }
}

/// Maps `ApiError` to an HTTP response with a JSON body and appropriate status code.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let status_code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status_code.is_server_error() {
            tracing::error!(error = %self.0, status, "server error");
        } else if status_code.is_client_error() {
            tracing::warn!(error = %self.0, status, "client error");
        }
        let body = json!({
            "error": self.0.to_string(),
            "status": status,
        });
        (status_code, axum::Json(body)).into_response()
    }
}
