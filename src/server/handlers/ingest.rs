use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;

use crate::ingest::{ingest_batch, IngestReport, RawRecord};
use crate::server::AppState;

use super::ApiError;

/// Request body for batch ingestion.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub records: Vec<RawRecord>,
}

/// POST /api/projects/:project/ingest
#[instrument(skip(state, body), fields(project = project_id, batch = body.records.len()))]
pub async fn ingest(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ApiError> {
    let report = ingest_batch(
        &state.store,
        &state.projects,
        &state.config.ingest,
        &project_id,
        body.records,
    )
    .await?;
    Ok(Json(report))
}
