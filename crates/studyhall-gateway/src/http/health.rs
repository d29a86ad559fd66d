use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;
use crate::auth::require_principal;
use crate::http::ApiResult;

/// GET /health — gateway liveness plus the Brain's supervised state.
///
/// Non-AI functionality stays up regardless of the Brain, so this
/// endpoint always returns 200; `ai_enabled` tells clients whether AI
/// routes will work.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let brain_state = state.supervisor.state().await;
    Json(json!({
        "status": "ok",
        "brain": {
            "state": brain_state.to_string(),
            "ai_enabled": brain_state == crate::supervisor::BrainState::Healthy,
        },
    }))
}

/// POST /admin/brain/restart — explicit administrator action; the only
/// path that recycles the Brain child while the gateway is up.
pub async fn brain_restart_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_principal(&headers)?;
    if let Err(e) = state.supervisor.restart().await {
        warn!(error = %e, "brain restart failed");
    }
    let brain_state = state.supervisor.state().await;
    Ok(Json(json!({
        "brain": {
            "state": brain_state.to_string(),
            "ai_enabled": brain_state == crate::supervisor::BrainState::Healthy,
        },
    })))
}
