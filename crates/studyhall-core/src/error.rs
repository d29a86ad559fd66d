use thiserror::Error;

/// Shared error taxonomy. Every user-visible failure maps to one stable
/// machine kind; HTTP mapping happens once, at the gateway edge.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("AI service unavailable: {0}")]
    AiUnavailable(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Bad material: {0}")]
    BadMaterial(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Prompt too large: {len} chars exceeds budget of {budget}")]
    PromptTooLarge { len: usize, budget: usize },

    #[error("Attachment processing failed: {0}")]
    AttachmentProcessingFailed(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine kind sent to clients in error bodies.
    ///
    /// The chat UI renders retry affordances only for
    /// `AI_UNAVAILABLE`, `TIMEOUT`, and `PARTIAL_COMPLETION` (the last
    /// is reported via the success body's warning field, not here).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::Auth(_) => "AUTH_ERROR",
            CoreError::AiUnavailable(_) => "AI_UNAVAILABLE",
            CoreError::Timeout(_) => "TIMEOUT",
            CoreError::BadMaterial(_) => "BAD_MATERIAL",
            CoreError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            CoreError::PromptTooLarge { .. } => "PROMPT_TOO_LARGE",
            CoreError::AttachmentProcessingFailed(_) => "ATTACHMENT_PROCESSING_FAILED",
            CoreError::Database(_) => "DATABASE_ERROR",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the gateway edge.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::Auth(_) => 401,
            CoreError::PromptTooLarge { .. } => 413,
            CoreError::AttachmentProcessingFailed(_) => 422,
            CoreError::AiUnavailable(_) => 503,
            CoreError::Timeout(_) => 504,
            CoreError::BadMaterial(_) => 422,
            CoreError::Config(_)
            | CoreError::DimensionMismatch { .. }
            | CoreError::Database(_)
            | CoreError::Serialization(_)
            | CoreError::Io(_)
            | CoreError::Internal(_) => 500,
        }
    }

    /// Whether the client may usefully retry the same request.
    pub fn retryable(&self) -> bool {
        matches!(self, CoreError::AiUnavailable(_) | CoreError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            CoreError::AiUnavailable("down".into()).kind(),
            "AI_UNAVAILABLE"
        );
        assert_eq!(
            CoreError::DimensionMismatch {
                expected: 1024,
                got: 384
            }
            .kind(),
            "DIMENSION_MISMATCH"
        );
        assert_eq!(
            CoreError::PromptTooLarge {
                len: 9000,
                budget: 8000
            }
            .kind(),
            "PROMPT_TOO_LARGE"
        );
    }

    #[test]
    fn http_mapping_follows_taxonomy() {
        assert_eq!(CoreError::Validation("empty".into()).http_status(), 400);
        assert_eq!(CoreError::Auth("no principal".into()).http_status(), 401);
        assert_eq!(
            CoreError::PromptTooLarge {
                len: 1,
                budget: 0
            }
            .http_status(),
            413
        );
        assert_eq!(CoreError::AiUnavailable("down".into()).http_status(), 503);
        assert_eq!(CoreError::Timeout("generate".into()).http_status(), 504);
        assert_eq!(
            CoreError::DimensionMismatch {
                expected: 1024,
                got: 3
            }
            .http_status(),
            500
        );
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(CoreError::AiUnavailable("x".into()).retryable());
        assert!(CoreError::Timeout("x".into()).retryable());
        assert!(!CoreError::Validation("x".into()).retryable());
        assert!(!CoreError::Internal("x".into()).retryable());
    }
}
