use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::http::{runtime_error_response, ErrorBody};

#[derive(Deserialize)]
pub struct EmbedRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
}

/// POST /utility/embed — embed one text on the embedding specialist.
///
/// Empty text is a 400; the caller has nothing meaningful to index.
pub async fn embed_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, (StatusCode, Json<ErrorBody>)> {
    if req.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "text cannot be empty".to_string(),
            }),
        ));
    }

    let embedding = state
        .residency
        .embed(&req.text)
        .await
        .map_err(runtime_error_response)?;
    Ok(Json(EmbedResponse { embedding }))
}
