use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::residency::ResidencyManager;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub residency: ResidencyManager,
}

impl AppState {
    pub fn new(residency: ResidencyManager) -> Self {
        Self { residency }
    }
}

/// Assemble the Brain's Axum router.
pub fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(crate::http::health::health_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/router", post(crate::http::router::router_handler))
        .route("/utility/embed", post(crate::http::embed::embed_handler))
        .layer(axum::extract::DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
