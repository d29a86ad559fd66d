//! Brain client — timeout- and failure-aware HTTP access to the Brain
//! service, behind the `Brain` capability trait so pipelines can be
//! tested against stubs.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use studyhall_core::config::BrainConfig;
use studyhall_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    #[error("brain unavailable: {0}")]
    Unavailable(String),

    #[error("brain call timed out: {0}")]
    Timeout(String),

    #[error("brain rejected input: {0}")]
    BadInput(String),

    #[error("brain internal error: {0}")]
    Internal(String),
}

impl From<BrainError> for CoreError {
    fn from(e: BrainError) -> Self {
        match e {
            BrainError::Unavailable(m) => CoreError::AiUnavailable(m),
            BrainError::Timeout(m) => CoreError::Timeout(m),
            BrainError::BadInput(m) => CoreError::Validation(m),
            BrainError::Internal(m) => CoreError::Internal(m),
        }
    }
}

/// A completed generation, tagged with the model that produced it.
#[derive(Debug, Clone)]
pub struct Generated {
    pub text: String,
    pub model: String,
}

/// Capability seam between the gateway's pipelines and the Brain.
#[async_trait]
pub trait Brain: Send + Sync {
    /// Full prompt in, completion out (chat-class deadline).
    async fn generate_response(&self, prompt: &str) -> Result<Generated, BrainError>;

    /// Embed one text (embed-class deadline).
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, BrainError>;

    /// OCR or transcribe one attachment via the specialist router
    /// (extraction-class deadline). The attachment kind is inferred
    /// from the media type.
    async fn extract_attachment(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
        instruction: &str,
    ) -> Result<Generated, BrainError>;

    /// Fast readiness probe. Never used on the request hot path.
    async fn health_check(&self) -> bool;
}

/// Stateless HTTP client for the Brain service. Holds no caches — every
/// call round-trips.
pub struct BrainClient {
    client: reqwest::Client,
    endpoint: String,
    chat_timeout: Duration,
    embed_timeout: Duration,
    extract_timeout: Duration,
}

impl BrainClient {
    pub fn new(cfg: &BrainConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            chat_timeout: Duration::from_secs(cfg.chat_timeout_secs),
            embed_timeout: Duration::from_secs(cfg.embed_timeout_secs),
            extract_timeout: Duration::from_secs(cfg.extract_timeout_secs),
        }
    }

    async fn post_router(
        &self,
        form: reqwest::multipart::Form,
        timeout: Duration,
    ) -> Result<Generated, BrainError> {
        let url = format!("{}/router", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;
        let resp = check_status(resp).await?;
        let body: RouterResponse = resp
            .json()
            .await
            .map_err(|e| BrainError::Internal(format!("bad router response: {e}")))?;
        Ok(Generated {
            text: body.response,
            model: body.model,
        })
    }
}

#[async_trait]
impl Brain for BrainClient {
    async fn generate_response(&self, prompt: &str) -> Result<Generated, BrainError> {
        debug!(chars = prompt.len(), "brain generate");
        let form = reqwest::multipart::Form::new().text("prompt", prompt.to_string());
        self.post_router(form, self.chat_timeout).await
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, BrainError> {
        debug!(chars = text.len(), "brain embed");
        let url = format!("{}/utility/embed", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .timeout(self.embed_timeout)
            .send()
            .await
            .map_err(map_transport_error)?;
        let resp = check_status(resp).await?;
        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| BrainError::Internal(format!("bad embed response: {e}")))?;
        Ok(body.embedding)
    }

    async fn extract_attachment(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
        instruction: &str,
    ) -> Result<Generated, BrainError> {
        let field = if media_type.starts_with("audio/") {
            "audio"
        } else {
            "image"
        };
        debug!(field, media_type, size = bytes.len(), "brain extract attachment");
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!("attachment.{field}"))
            .mime_str(media_type)
            .map_err(|e| BrainError::BadInput(format!("bad media type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("prompt", instruction.to_string())
            .part(field, part);
        self.post_router(form, self.extract_timeout).await
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .json::<HealthResponse>()
                .await
                .map(|h| h.status == "Active")
                .unwrap_or(false),
            _ => false,
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> BrainError {
    if e.is_timeout() {
        BrainError::Timeout(e.to_string())
    } else if e.is_connect() {
        BrainError::Unavailable(e.to_string())
    } else {
        BrainError::Internal(e.to_string())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BrainError> {
    let status = resp.status().as_u16();
    if resp.status().is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        400 => BrainError::BadInput(body),
        503 => BrainError::Unavailable(body),
        504 => BrainError::Timeout(body),
        _ => BrainError::Internal(format!("brain error ({status}): {body}")),
    })
}

// Brain API response types (private — deserialization only)

#[derive(Deserialize)]
struct RouterResponse {
    response: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brain_errors_map_to_core_kinds() {
        let core: CoreError = BrainError::Unavailable("down".into()).into();
        assert_eq!(core.kind(), "AI_UNAVAILABLE");
        let core: CoreError = BrainError::Timeout("slow".into()).into();
        assert_eq!(core.kind(), "TIMEOUT");
        let core: CoreError = BrainError::BadInput("empty".into()).into();
        assert_eq!(core.kind(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unreachable_brain_reports_unavailable() {
        // Nothing listens on this port; connection must be refused fast.
        let cfg = BrainConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            ..BrainConfig::default()
        };
        let client = BrainClient::new(&cfg);
        match client.generate_embedding("hello").await {
            Err(BrainError::Unavailable(_)) | Err(BrainError::Internal(_)) => {}
            other => panic!("expected transport failure, got {other:?}"),
        }
        assert!(!client.health_check().await);
    }
}
