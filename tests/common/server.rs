use std::sync::Arc;

use tokio::net::TcpListener;

use locus::server::routes::build_router;
use locus::server::AppState;

use super::harness::TestHarness;

/// Start a test server on an ephemeral port, returning (base_url, harness).
pub async fn start_test_server() -> (String, TestHarness) {
    // Ensure metrics are registered (idempotent)
    locus::metrics::init();

    let harness = TestHarness::new().await;

    let state = AppState {
        store: harness.store.clone(),
        projects: harness.projects.clone(),
        config: Arc::new(harness.config.clone()),
    };

    let app = build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base_url, harness)
}
