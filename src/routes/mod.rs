// HTTP + Server-Sent Events routes

mod http;
mod sse;

use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};

use crate::broadcaster::Broadcaster;
use crate::config::AppConfig;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) broadcaster: Broadcaster,
    pub(crate) config: AppConfig,
}

pub fn app(broadcaster: Broadcaster, config: AppConfig) -> Router {
    let state = AppState {
        broadcaster,
        config,
    };
    Router::new()
        .route("/", get(http::root_handler)) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/snapshot", get(http::latest_snapshot_handler)) // GET /api/snapshot
        .route("/realtime", get(sse::realtime)) // SSE /realtime
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
