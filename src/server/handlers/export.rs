use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use axum::Json;
use tracing::instrument;

use crate::error::LocusError;
use crate::export::{get_variant, start_export, ExportRequest};
use crate::server::AppState;
use crate::types::VariantRecord;

use super::ApiError;

/// GET /api/variant/:project/:variant_id
#[instrument(skip(state), fields(project = project_id, variant = variant_id))]
pub async fn get_variant_detail(
    State(state): State<AppState>,
    Path((project_id, variant_id)): Path<(String, String)>,
) -> Result<Json<VariantRecord>, ApiError> {
    let record = get_variant(&state.store, &state.projects, &project_id, &variant_id).await?;
    Ok(Json(record))
}

/// POST /api/export
///
/// Streams the matching variants as the response body. The export id and the
/// exact match count are exposed as headers since the body is not JSON.
#[instrument(skip(state, body), fields(project = body.project_id))]
pub async fn export(
    State(state): State<AppState>,
    Json(body): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let export = start_export(&state.store, &state.projects, &state.config.query, body).await?;

    let filename = format!("locus-export-{}.{}", export.export_id, export.format.extension());
    Response::builder()
        .header(header::CONTENT_TYPE, export.format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .header("x-export-id", export.export_id.as_str())
        .header("x-total-count", export.total.to_string())
        .body(Body::from_stream(export.stream))
        .map_err(|e| ApiError(LocusError::Index(format!("failed to build response: {e}"))))
}
