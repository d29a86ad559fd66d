//! Principal extraction.
//!
//! Identity lives outside the core: the fronting auth layer verifies
//! the bearer token and injects the authenticated user id into this
//! header. The core never mints or validates credentials — it only
//! refuses to act without a principal.

use axum::http::HeaderMap;

use studyhall_core::error::{CoreError, Result};

pub const PRINCIPAL_HEADER: &str = "x-studyhall-user";

pub fn require_principal(headers: &HeaderMap) -> Result<String> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| CoreError::Auth("missing authenticated principal".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn present_principal_is_returned() {
        let mut headers = HeaderMap::new();
        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_static("u-42"));
        assert_eq!(require_principal(&headers).unwrap(), "u-42");
    }

    #[test]
    fn missing_or_blank_principal_is_auth_error() {
        let headers = HeaderMap::new();
        assert_eq!(require_principal(&headers).unwrap_err().kind(), "AUTH_ERROR");

        let mut headers = HeaderMap::new();
        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_static("   "));
        assert_eq!(require_principal(&headers).unwrap_err().kind(), "AUTH_ERROR");
    }
}
