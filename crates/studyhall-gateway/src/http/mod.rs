pub mod chat;
pub mod health;
pub mod materials;
pub mod search;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use studyhall_core::error::CoreError;

/// Edge error wrapper: every `CoreError` renders once, here, as a
/// stable machine kind plus a short human sentence. 500s carry a
/// correlation id that also lands in the server log.
pub struct ApiError(pub CoreError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let correlation_id = if status.is_server_error() {
            let id = uuid::Uuid::new_v4().to_string();
            error!(correlation_id = %id, error = %self.0, "request failed");
            Some(id)
        } else {
            None
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
            retryable: self.0.retryable(),
            correlation_id,
        };
        (status, Json(body)).into_response()
    }
}

impl<E: Into<CoreError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
