//! Material search — POST /courses/{course_id}/materials/search
//!
//! Embeds the query through the Brain, then ranks the course's
//! completed materials by cosine similarity. Unlike chat retrieval this
//! endpoint does not degrade: search *is* the feature, so Brain
//! failures surface to the caller.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use studyhall_core::config::RETRIEVAL_TOPK_CAP;
use studyhall_core::error::CoreError;
use studyhall_store::search;

use crate::app::AppState;
use crate::auth::require_principal;
use crate::http::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResult {
    pub material_id: String,
    pub name: String,
    pub excerpt: String,
    pub similarity: f32,
    pub media_type: String,
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    require_principal(&headers)?;

    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError(CoreError::Validation(
            "query cannot be empty".to_string(),
        )));
    }

    if !state.supervisor.ai_enabled().await {
        return Err(ApiError(CoreError::AiUnavailable(
            "AI features are currently disabled".to_string(),
        )));
    }

    let k = req
        .limit
        .unwrap_or(state.config.retrieval.top_k_default)
        .min(RETRIEVAL_TOPK_CAP);

    let vector = state.brain.generate_embedding(query).await?;
    if vector.len() != state.config.embedding.dim {
        return Err(ApiError(CoreError::DimensionMismatch {
            expected: state.config.embedding.dim,
            got: vector.len(),
        }));
    }

    let candidates = state.materials.search_candidates(&course_id)?;
    let hits = search::rank(candidates, &vector, k, state.config.embedding.dim)?;

    Ok(Json(
        hits.into_iter()
            .map(|h| SearchResult {
                material_id: h.material_id,
                name: h.name,
                excerpt: h.excerpt,
                similarity: h.similarity,
                media_type: h.media_type,
            })
            .collect(),
    ))
}
