pub use crate::ingest::ingest_handler;

use crate::state::AppState;
use axum::{response::IntoResponse, routing, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub async fn health_handler() -> impl IntoResponse {
    // Simple readiness/health endpoint. Keep it lightweight.
    Json(json!({ "status": "ok" }))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Any method reaches the handler so it can answer 405 itself
        .route("/data", routing::any(ingest_handler))
        .route("/health", routing::get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
