use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET / and GET /health — readiness probe.
///
/// `status` is `"Active"` only once the core model is resident and has
/// answered its startup probe; the supervisor gates AI routes on this.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let ready = state.residency.is_ready();
    Json(json!({
        "status": if ready { "Active" } else { "Starting" },
        "core_model": state.residency.core_model(),
        "mode": "Persistent Core",
        "audio_available": state.residency.audio_available(),
    }))
}
