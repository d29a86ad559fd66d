//! Specialist router — POST /router
//!
//! Multipart fields: `prompt` (text, required), `image` (file,
//! optional), `audio` (file, optional).
//!
//! Exactly one input class is honoured per call: image wins over audio
//! (documented precedence, audio dropped with a warning), and plain
//! text goes straight to the persistent core model.
//!
//! Response: `{"response": "...", "model": "..."}` where `model` names
//! the specialist actually used, or the core model.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use studyhall_core::types::is_pdf_media_type;

use crate::app::AppState;
use crate::http::{runtime_error_response, ErrorBody};
use crate::pdf;
use crate::runtime::RuntimeError;

#[derive(Serialize)]
pub struct RouterResponse {
    pub response: String,
    pub model: String,
}

struct FilePart {
    bytes: Vec<u8>,
    media_type: String,
}

pub async fn router_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<RouterResponse>, (StatusCode, Json<ErrorBody>)> {
    let mut prompt = String::new();
    let mut image: Option<FilePart> = None;
    let mut audio: Option<FilePart> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => {
                prompt = field.text().await.map_err(bad_multipart)?;
            }
            "image" | "audio" => {
                let media_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?.to_vec();
                let part = FilePart { bytes, media_type };
                if name == "image" {
                    image = Some(part);
                } else {
                    audio = Some(part);
                }
            }
            other => {
                warn!(field = %other, "ignoring unknown multipart field");
            }
        }
    }

    if image.is_some() && audio.is_some() {
        warn!("both image and audio supplied to /router — image wins, audio dropped");
        audio = None;
    }

    if let Some(image) = image {
        return extract_image(&state, image, &prompt).await;
    }

    if let Some(audio) = audio {
        let transcript = state
            .residency
            .transcribe(audio.bytes, audio.media_type)
            .await
            .map_err(runtime_error_response)?;
        info!(chars = transcript.len(), "audio transcribed, handing to core model");
        let response = state
            .residency
            .generate(&transcript)
            .await
            .map_err(runtime_error_response)?;
        return Ok(Json(RouterResponse {
            response,
            model: state.residency.core_model().to_string(),
        }));
    }

    if prompt.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "prompt cannot be empty".to_string(),
            }),
        ));
    }

    let response = state
        .residency
        .generate(&prompt)
        .await
        .map_err(runtime_error_response)?;
    Ok(Json(RouterResponse {
        response,
        model: state.residency.core_model().to_string(),
    }))
}

/// Vision path: single images go to one extract call; PDFs are split
/// into pages and each page is read from its text layer or, for scans,
/// through the vision specialist. Per-page results join under
/// `--- Page N ---` markers.
async fn extract_image(
    state: &Arc<AppState>,
    image: FilePart,
    prompt: &str,
) -> Result<Json<RouterResponse>, (StatusCode, Json<ErrorBody>)> {
    let instruction = if prompt.trim().is_empty() {
        "Extract all readable text from this document. Preserve structure."
    } else {
        prompt
    };

    if is_pdf_media_type(&image.media_type) {
        let pages = pdf::split_pages(&image.bytes)
            .map_err(|e| runtime_error_response(RuntimeError::BadInput(e.to_string())))?;

        let mut results: Vec<(u32, String)> = Vec::with_capacity(pages.len());
        let mut vision_used = false;
        for page in pages {
            let text = if !page.text.is_empty() {
                page.text
            } else if let Some(scan) = page.scan {
                vision_used = true;
                state
                    .residency
                    .vision_extract(scan.bytes, scan.media_type, instruction.to_string())
                    .await
                    .map_err(runtime_error_response)?
            } else {
                String::new()
            };
            results.push((page.number, text));
        }
        info!(pages = results.len(), vision_used, "pdf extraction complete");
        // A born-digital PDF never touches the vision specialist; only
        // report it when it actually ran.
        let model = if vision_used {
            state.residency.vision_model()
        } else {
            state.residency.core_model()
        };
        return Ok(Json(RouterResponse {
            response: pdf::join_pages(&results),
            model: model.to_string(),
        }));
    }

    let response = state
        .residency
        .vision_extract(image.bytes, image.media_type, instruction.to_string())
        .await
        .map_err(runtime_error_response)?;
    Ok(Json(RouterResponse {
        response,
        model: state.residency.vision_model().to_string(),
    }))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: format!("malformed multipart body: {e}"),
        }),
    )
}
