use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::project::ProjectMetadata;
use crate::server::AppState;

use super::ApiError;

/// Request body for creating a new project.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    /// Unique project identifier.
    pub project_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Response body containing project metadata.
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Total number of variants stored in this project.
    pub variant_count: u64,
    /// RFC 3339 timestamp of project creation.
    pub created_at: String,
    /// RFC 3339 timestamp of the last ingestion.
    pub updated_at: String,
}

impl From<ProjectMetadata> for ProjectResponse {
    fn from(meta: ProjectMetadata) -> Self {
        Self {
            project_id: meta.project_id,
            description: meta.description,
            variant_count: meta.variant_count,
            created_at: meta.created_at.to_rfc3339(),
            updated_at: meta.updated_at.to_rfc3339(),
        }
    }
}

/// POST /api/projects
#[instrument(skip(state, body), fields(project = body.project_id))]
pub async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let meta = state
        .projects
        .create(&body.project_id, body.description)
        .await?;
    Ok((StatusCode::CREATED, Json(meta.into())))
}

/// GET /api/projects
#[instrument(skip(state))]
pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    let projects = state.projects.list().await?;
    Ok(Json(projects.into_iter().map(Into::into).collect()))
}

/// GET /api/projects/:project
#[instrument(skip(state), fields(project = project_id))]
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let meta = state.projects.get(&project_id).await?;
    Ok(Json(meta.into()))
}

/// DELETE /api/projects/:project
#[instrument(skip(state), fields(project = project_id))]
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.projects.delete(&project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
