use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{health_check, list_modules, list_tasks};
use crate::state::AppState;
use crate::sync::handle_websocket;

/// Build the HTTP router: `/ws`, `/health` and the read-only API
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/modules", get(list_modules))
        .route("/api/tasks", get(list_tasks))
        .route("/ws", get(handle_websocket))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// CORS configuration - configurable via CORS_ORIGINS env var
fn cors_layer(origins: &[String]) -> CorsLayer {
    info!("   CORS origins: {:?}", origins);
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    base.allow_origin(origins)
}
