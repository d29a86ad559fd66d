use thiserror::Error;

use studyhall_core::error::CoreError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("material not found: {id}")]
    MaterialNotFound { id: String },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("object not found: {file_ref}")]
    ObjectMissing { file_ref: String },

    #[error("stored vector is corrupt: {0}")]
    CorruptVector(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Edge mapping into the shared taxonomy. Store failures that reach a
/// client are either the caller's fault (missing rows, illegal
/// transitions) or internal.
impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MaterialNotFound { .. } | StoreError::InvalidTransition { .. } => {
                CoreError::Validation(e.to_string())
            }
            StoreError::ObjectMissing { .. } => CoreError::BadMaterial(e.to_string()),
            StoreError::DimensionMismatch { expected, got } => {
                CoreError::DimensionMismatch { expected, got }
            }
            StoreError::Database(inner) => CoreError::Database(inner.to_string()),
            StoreError::CorruptVector(m) => CoreError::Internal(m),
            StoreError::Serialization(inner) => CoreError::Serialization(inner),
            StoreError::Io(inner) => CoreError::Io(inner),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
