use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::error::{LocusError, Result};
use crate::storage::LocusStore;

/// Metadata for a project, stored as meta.json in object storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub variant_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectMetadata {
    pub fn meta_key(project_id: &str) -> String {
        format!("projects/{project_id}/meta.json")
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let json = serde_json::to_vec_pretty(self)?;
        Ok(Bytes::from(json))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Prefixes reserved for non-partition data; a project id must not collide
/// with them since partitions live under `{project_id}/`.
const RESERVED_IDS: &[&str] = &["projects", "audit"];

fn is_valid_project_id(id: &str) -> bool {
    !RESERVED_IDS.contains(&id)
        && !id.starts_with("variants-")
        && !id.is_empty()
        && id.len() <= 64
        && id.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Manages project CRUD with an in-memory registry backed by object storage.
///
/// Also hands out the per-project ingestion locks that serialize batch
/// ingestion into a project's partitions and index.
pub struct ProjectManager {
    store: LocusStore,
    /// In-memory registry for fast lookups.
    registry: DashMap<String, ProjectMetadata>,
    ingest_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProjectManager {
    pub fn new(store: LocusStore) -> Self {
        Self {
            store,
            registry: DashMap::new(),
            ingest_locks: DashMap::new(),
        }
    }

    /// Create a new project.
    #[instrument(skip(self, description), fields(project = project_id))]
    pub async fn create(
        &self,
        project_id: &str,
        description: Option<String>,
    ) -> Result<ProjectMetadata> {
        if !is_valid_project_id(project_id) {
            return Err(LocusError::Validation(format!(
                "invalid project id '{project_id}': must be 1-64 chars, start with alphanumeric, \
                 and contain only lowercase alphanumeric, dash, or underscore characters",
            )));
        }

        let now = Utc::now();
        let meta = ProjectMetadata {
            project_id: project_id.to_string(),
            description,
            variant_count: 0,
            created_at: now,
            updated_at: now,
        };

        // Atomic create: write meta.json only if it doesn't already exist
        // (PutMode::Create), so two concurrent creators cannot both succeed.
        let key = ProjectMetadata::meta_key(project_id);
        self.store
            .put_if_not_exists(&key, meta.to_bytes()?, project_id)
            .await?;

        self.registry.insert(project_id.to_string(), meta.clone());
        info!(project = project_id, "created project");
        Ok(meta)
    }

    /// Get project metadata, checking the registry before storage.
    #[instrument(skip(self), fields(project = project_id))]
    pub async fn get(&self, project_id: &str) -> Result<ProjectMetadata> {
        if let Some(meta) = self.registry.get(project_id) {
            return Ok(meta.clone());
        }

        let key = ProjectMetadata::meta_key(project_id);
        match self.store.get(&key).await {
            Ok(data) => {
                let meta = ProjectMetadata::from_bytes(&data)?;
                self.registry.insert(project_id.to_string(), meta.clone());
                Ok(meta)
            }
            Err(LocusError::NotFound { .. }) => Err(LocusError::ProjectNotFound {
                project: project_id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Error unless the project exists.
    pub async fn ensure_exists(&self, project_id: &str) -> Result<()> {
        self.get(project_id).await.map(|_| ())
    }

    /// List all projects.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<ProjectMetadata>> {
        let keys = self.store.list_prefix("projects").await?;

        let mut projects = Vec::new();
        for key in &keys {
            if let Some(project_id) = key
                .strip_prefix("projects/")
                .and_then(|rest| rest.strip_suffix("/meta.json"))
            {
                match self.get(project_id).await {
                    Ok(meta) => projects.push(meta),
                    Err(LocusError::ProjectNotFound { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        projects.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        Ok(projects)
    }

    /// Delete a project: its metadata, its partitions, and its index.
    #[instrument(skip(self), fields(project = project_id))]
    pub async fn delete(&self, project_id: &str) -> Result<()> {
        let key = ProjectMetadata::meta_key(project_id);
        if !self.store.exists(&key).await? {
            return Err(LocusError::ProjectNotFound {
                project: project_id.to_string(),
            });
        }

        // Index first so concurrent queries drop to an empty index rather
        // than one referencing deleted partitions.
        let index_prefix = format!("variants-{project_id}/");
        if let Err(e) = self.store.delete_prefix(&index_prefix).await {
            warn!(prefix = %index_prefix, error = %e, "failed to delete index during project deletion");
        }

        let partitions_deleted = self.store.delete_prefix(&format!("{project_id}/")).await?;

        if let Err(e) = self.store.delete(&key).await {
            warn!(key = %key, error = %e, "failed to delete meta.json during project deletion");
        }

        self.registry.remove(project_id);
        self.ingest_locks.remove(project_id);

        info!(
            project = project_id,
            partitions_deleted, "deleted project"
        );
        Ok(())
    }

    /// Update the variant count after an ingestion batch completes.
    pub async fn update_variant_count(&self, project_id: &str, count: u64) -> Result<()> {
        let mut meta = self.get(project_id).await?;
        meta.variant_count = count;
        meta.updated_at = Utc::now();

        let key = ProjectMetadata::meta_key(project_id);
        self.store.put(&key, meta.to_bytes()?).await?;
        self.registry.insert(project_id.to_string(), meta);
        Ok(())
    }

    /// The lock serializing ingestion batches for one project. Concurrent
    /// batches into the same project queue up; different projects proceed
    /// independently.
    pub fn ingest_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        self.ingest_locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Scan storage for existing projects and populate the registry.
    /// Used on startup to discover pre-existing data.
    #[instrument(skip(self))]
    pub async fn scan_and_register(&self) -> Result<usize> {
        let keys = self.store.list_prefix("projects").await?;
        let mut count = 0;

        for key in &keys {
            if key.ends_with("/meta.json") {
                match self.store.get(key).await {
                    Ok(data) => {
                        if let Ok(meta) = ProjectMetadata::from_bytes(&data) {
                            self.registry.insert(meta.project_id.clone(), meta);
                            count += 1;
                        }
                    }
                    Err(_) => continue,
                }
            }
        }

        info!(projects = count, "scanned and registered projects");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_project_ids() {
        assert!(is_valid_project_id("demo"));
        assert!(is_valid_project_id("cohort-2026"));
        assert!(is_valid_project_id("a_b_c"));
        assert!(is_valid_project_id("p1"));
    }

    #[test]
    fn test_invalid_project_ids() {
        assert!(!is_valid_project_id(""));
        assert!(!is_valid_project_id("-leading-dash"));
        assert!(!is_valid_project_id("UPPER"));
        assert!(!is_valid_project_id("has space"));
        assert!(!is_valid_project_id("slash/inside"));
        assert!(!is_valid_project_id(&"x".repeat(65)));
        assert!(!is_valid_project_id("projects"));
        assert!(!is_valid_project_id("variants-demo"));
    }

    #[test]
    fn test_meta_key() {
        assert_eq!(
            ProjectMetadata::meta_key("demo"),
            "projects/demo/meta.json"
        );
    }
}
