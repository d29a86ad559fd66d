use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use studyhall_core::StudyhallConfig;
use studyhall_store::{HistoryStore, MaterialStore, ObjectStore, ProfileStore};

use crate::brain::Brain;
use crate::chat::ChatPipeline;
use crate::queue::ProcessingQueue;
use crate::supervisor::BrainSupervisor;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: StudyhallConfig,
    pub brain: Arc<dyn Brain>,
    pub supervisor: BrainSupervisor,
    pub materials: Arc<MaterialStore>,
    pub history: Arc<HistoryStore>,
    pub profiles: Arc<ProfileStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub queue: ProcessingQueue,
    pub chat: ChatPipeline,
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.uploads.max_bytes + 1024 * 1024;
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route(
            "/courses/{course_id}/materials",
            get(crate::http::materials::list_handler).post(crate::http::materials::upload_handler),
        )
        .route(
            "/courses/{course_id}/materials/search",
            post(crate::http::search::search_handler),
        )
        .route(
            "/materials/{material_id}/retry",
            post(crate::http::materials::retry_handler),
        )
        .route(
            "/admin/brain/restart",
            post(crate::http::health::brain_restart_handler),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
