use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Material processing lifecycle. Transitions only move forward:
/// `pending -> processing -> {completed, failed}`; `failed -> pending`
/// happens solely through the explicit retry action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown processing status: {other}")),
        }
    }
}

/// A study material row as the core sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub file_ref: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub extracted_text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub processing_status: ProcessingStatus,
    pub processed_at: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
}

impl Material {
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            other => Err(format!("unknown turn role: {other}")),
        }
    }
}

/// One append-only chat turn within a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: i64,
    pub course_id: String,
    pub role: TurnRole,
    pub content: String,
    pub created_at: String,
}

/// Academic profile — read-only to the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcademicProfile {
    pub user_id: String,
    pub grades: Vec<String>,
    pub semester_type: Option<String>,
    pub semester_number: Option<i64>,
    pub subjects: Vec<String>,
}

/// Sparse bag of personalization hints — read-only to the core.
/// Missing fields are elided silently during prompt composition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub detail_level: Option<String>,
    #[serde(default)]
    pub learning_pace: Option<String>,
    #[serde(default)]
    pub prior_experience: Option<String>,
    #[serde(default)]
    pub preferred_examples: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
}

/// One ranked result from per-course vector search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub material_id: String,
    pub name: String,
    pub excerpt: String,
    pub similarity: f32,
    pub media_type: String,
}

/// A search-eligible material row: completed, with a stored vector.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub material_id: String,
    pub name: String,
    pub media_type: String,
    pub created_at: String,
    pub embedding: Vec<f32>,
    pub extracted_text: String,
}

/// Encode an embedding as a little-endian f32 BLOB for SQLite.
pub fn embedding_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode a stored BLOB back into an embedding vector.
pub fn blob_to_embedding(blob: &[u8]) -> crate::error::Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::CorruptVector(format!(
            "blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_roundtrips_through_strings() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            let s = status.to_string();
            assert_eq!(ProcessingStatus::from_str(&s).unwrap(), status);
        }
        assert!(ProcessingStatus::from_str("done").is_err());
    }

    #[test]
    fn embedding_blob_roundtrip() {
        let v = vec![0.0f32, 1.5, -2.25, f32::MIN_POSITIVE];
        let blob = embedding_to_blob(&v);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_embedding(&blob).unwrap(), v);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let blob = embedding_to_blob(&[1.0, 2.0]);
        assert!(blob_to_embedding(&blob[..7]).is_err());
    }
}
