//! Material routes: status listing, upload intake, and the explicit
//! retry action. Processing itself happens on the background queue —
//! uploads return as soon as the row is `pending` and the bytes are in
//! the object store.

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use studyhall_core::error::CoreError;
use studyhall_store::types::Material;

use crate::app::AppState;
use crate::auth::require_principal;
use crate::http::{ApiError, ApiResult};
use crate::queue::Task;

#[derive(Serialize)]
pub struct MaterialView {
    pub id: String,
    pub name: String,
    pub media_type: String,
    pub size: u64,
    pub processing_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub has_embedding: bool,
}

impl From<Material> for MaterialView {
    fn from(m: Material) -> Self {
        Self {
            id: m.id,
            name: m.name,
            media_type: m.media_type,
            size: m.size_bytes,
            processing_status: m.processing_status.to_string(),
            processed_at: m.processed_at,
            error_message: m.error_message,
            has_embedding: m.embedding.is_some(),
        }
    }
}

/// GET /courses/{course_id}/materials — core status fields, verbatim.
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Vec<MaterialView>>> {
    require_principal(&headers)?;
    let materials = state.materials.list_for_course(&course_id)?;
    Ok(Json(materials.into_iter().map(MaterialView::from).collect()))
}

/// POST /courses/{course_id}/materials — multipart upload.
///
/// Stores the bytes, creates the `pending` row, and enqueues
/// processing. A full queue is not an error: the row stays `pending`
/// and is picked up by a later retry or upload cycle.
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<MaterialView>)> {
    require_principal(&headers)?;

    let mut upload: Option<(String, String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .unwrap_or("material")
            .to_string();
        let media_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| CoreError::Validation(format!("upload read failed: {e}")))?
            .to_vec();
        upload = Some((name, media_type, bytes));
    }

    let Some((name, media_type, bytes)) = upload else {
        return Err(ApiError(CoreError::Validation(
            "missing 'file' field".to_string(),
        )));
    };

    let uploads = &state.config.uploads;
    if !uploads.allowed_media_types.iter().any(|m| *m == media_type) {
        return Err(ApiError(CoreError::Validation(format!(
            "media type not allowed: {media_type}"
        ))));
    }
    if bytes.is_empty() {
        return Err(ApiError(CoreError::Validation("empty upload".to_string())));
    }
    if bytes.len() > uploads.max_bytes {
        return Err(ApiError(CoreError::Validation(format!(
            "upload exceeds {} bytes",
            uploads.max_bytes
        ))));
    }

    let file_ref = format!("{course_id}/{}", Uuid::new_v4());
    state.objects.put(&file_ref, &bytes).await?;

    let material = state.materials.insert(studyhall_store::materials::NewMaterial {
        course_id: course_id.clone(),
        name,
        file_ref,
        media_type,
        size_bytes: bytes.len() as u64,
    })?;
    info!(material_id = %material.id, course_id = %course_id, "material uploaded");

    if !state
        .queue
        .enqueue(Task::ProcessMaterial {
            material_id: material.id.clone(),
        })
        .await
    {
        debug!(material_id = %material.id, "queue full, material waits as pending");
    }

    Ok((StatusCode::CREATED, Json(MaterialView::from(material))))
}

/// POST /materials/{material_id}/retry — administrative reset back to
/// `pending` (the only path out of `failed`, also unsticks rows
/// orphaned in `processing` by a crash).
pub async fn retry_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(material_id): Path<String>,
) -> ApiResult<Json<MaterialView>> {
    require_principal(&headers)?;

    state.materials.reset_for_retry(&material_id)?;
    info!(material_id = %material_id, "material reset for retry");

    if !state
        .queue
        .enqueue(Task::ProcessMaterial {
            material_id: material_id.clone(),
        })
        .await
    {
        debug!(material_id = %material_id, "queue full, retry waits as pending");
    }

    let material = state
        .materials
        .get(&material_id)?
        .ok_or_else(|| CoreError::Validation(format!("material not found: {material_id}")))?;
    Ok(Json(MaterialView::from(material)))
}
