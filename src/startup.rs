//! Application startup and bootstrap logic.
//!
//! This module extracts initialization logic from `main.rs` to make it testable
//! under `cargo test --lib`. All functions use injected dependencies and can be
//! tested with `StorageBackend::Local` without needing S3 or MinIO.

use std::sync::Arc;

use axum::Router;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::project::ProjectManager;
use crate::server::routes::build_router;
use crate::server::AppState;
use crate::storage::LocusStore;

/// Resolve the configuration file path.
///
/// Priority:
/// 1. `LOCUS_CONFIG` environment variable
/// 2. `./locus.toml` if it exists
/// 3. None (use defaults)
pub fn resolve_config_path() -> Option<String> {
    std::env::var("LOCUS_CONFIG").ok().or_else(|| {
        let default = "locus.toml";
        std::path::Path::new(default)
            .exists()
            .then(|| default.to_string())
    })
}

/// Initialize tracing subscriber from logging config.
///
/// Supports JSON and plain text formats. Uses `RUST_LOG` env var if set,
/// otherwise falls back to `config.logging.level`.
pub fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

/// Build the application router.
///
/// This function:
/// - Initializes metrics
/// - Creates storage and the project manager
/// - Scans existing projects into the registry
/// - Builds `AppState` and the axum `Router`
pub async fn build_app(config: Config) -> Result<Router, Box<dyn std::error::Error>> {
    tracing::info!("locus starting");

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        bucket = %config.storage.bucket,
        backend = ?config.storage.backend,
        max_page_size = config.query.max_page_size,
        max_filter_depth = config.query.max_filter_depth,
        max_batch_size = config.ingest.max_batch_size,
        "configuration loaded"
    );

    crate::metrics::init();

    let store = LocusStore::from_config(&config.storage)?;

    let projects = Arc::new(ProjectManager::new(store.clone()));
    match projects.scan_and_register().await {
        Ok(count) => tracing::info!(count, "registered existing projects"),
        Err(e) => tracing::warn!(error = %e, "failed to scan projects on startup"),
    }

    let state = AppState {
        store,
        projects,
        config: Arc::new(config),
    };

    Ok(build_router(state))
}
