pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use crate::config::Config;
use crate::project::ProjectManager;
use crate::storage::LocusStore;

/// Shared application state injected into all handlers via axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: LocusStore,
    pub projects: Arc<ProjectManager>,
    pub config: Arc<Config>,
}
