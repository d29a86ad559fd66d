//! Chat endpoint — POST /chat
//!
//! Request:  `{"message": "...", "course_id": "...", "attachments": [...]}`
//! where each attachment is `{kind, bytes (base64), media_type, name?}`.
//! Response: `{"response": "...", "model": "...", "warning"?: "..."}`.

use axum::{extract::State, http::HeaderMap, Json};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use studyhall_core::error::CoreError;
use studyhall_core::types::{Attachment, AttachmentKind};

use crate::app::AppState;
use crate::auth::require_principal;
use crate::chat::TurnRequest;
use crate::http::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
}

#[derive(Deserialize)]
pub struct WireAttachment {
    pub kind: AttachmentKind,
    /// Base64-encoded payload.
    pub bytes: String,
    pub media_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct ChatReply {
    pub response: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let user_id = require_principal(&headers)?;

    if !state.supervisor.ai_enabled().await {
        return Err(ApiError(CoreError::AiUnavailable(
            "AI features are currently disabled".to_string(),
        )));
    }

    let attachments = req
        .attachments
        .into_iter()
        .map(decode_attachment)
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = state
        .chat
        .run_turn(
            &user_id,
            TurnRequest {
                course_id: req.course_id,
                message: req.message,
                attachments,
            },
        )
        .await?;

    Ok(Json(ChatReply {
        response: outcome.response,
        model: outcome.model,
        warning: outcome.warning,
    }))
}

fn decode_attachment(wire: WireAttachment) -> Result<Attachment, ApiError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(wire.bytes.as_bytes())
        .map_err(|e| ApiError(CoreError::Validation(format!("bad attachment encoding: {e}"))))?;
    Ok(match wire.kind {
        AttachmentKind::Image => Attachment::Image {
            bytes,
            media_type: wire.media_type,
        },
        AttachmentKind::Audio => Attachment::Audio {
            bytes,
            media_type: wire.media_type,
        },
        AttachmentKind::Document => Attachment::Document {
            bytes,
            media_type: wire.media_type,
            name: wire.name.unwrap_or_else(|| "attachment".to_string()),
        },
    })
}
