pub mod embed;
pub mod health;
pub mod router;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::runtime::RuntimeError;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Map adapter errors onto the Brain's HTTP surface:
/// bad input is the caller's fault, everything else is the runtime's.
pub fn runtime_error_response(e: RuntimeError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &e {
        RuntimeError::BadInput(_) => StatusCode::BAD_REQUEST,
        RuntimeError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RuntimeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        RuntimeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}
