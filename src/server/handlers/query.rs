use axum::extract::State;
use axum::Json;
use tracing::instrument;

use crate::facet::{compute_facets, FacetRequest, FacetResponse};
use crate::query::{execute_query, QueryRequest, QueryResultPage};
use crate::server::AppState;

use super::ApiError;

/// POST /api/filter/query
#[instrument(skip(state, body), fields(project = body.project_id))]
pub async fn filter_query(
    State(state): State<AppState>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryResultPage>, ApiError> {
    let page = execute_query(&state.store, &state.projects, &state.config.query, &body).await?;
    Ok(Json(page))
}

/// POST /api/facets
#[instrument(skip(state, body), fields(project = body.project_id))]
pub async fn facets(
    State(state): State<AppState>,
    Json(body): Json<FacetRequest>,
) -> Result<Json<FacetResponse>, ApiError> {
    let response =
        compute_facets(&state.store, &state.projects, &state.config.query, &body).await?;
    Ok(Json(response))
}
