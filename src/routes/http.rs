// GET handlers: root, version, latest snapshot

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;

/// Package version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");

pub(super) async fn root_handler() -> &'static str {
    "Real-time API running"
}

/// GET /version — returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/snapshot — the most recently published snapshot, 503 before the first tick.
pub(super) async fn latest_snapshot_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.broadcaster.latest() {
        Some(snapshot) => Json(snapshot.as_ref().clone()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no snapshot published yet").into_response(),
    }
}
