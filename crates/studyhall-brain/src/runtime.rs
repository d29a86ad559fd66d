use async_trait::async_trait;
use serde::Serialize;

/// How long the runtime should keep a model resident after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    /// Pin the model in accelerator memory indefinitely (the core model).
    Forever,
    /// Keep the model around for the given number of seconds.
    For(u64),
    /// Release the model as soon as the call completes.
    Free,
}

impl Serialize for KeepAlive {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeepAlive::Forever => serializer.serialize_i64(-1),
            KeepAlive::For(secs) => serializer.serialize_u64(*secs),
            KeepAlive::Free => serializer.serialize_i64(0),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("model runtime unavailable: {0}")]
    Unavailable(String),

    #[error("bad input: {0}")]
    BadInput(String),

    #[error("runtime call timed out: {0}")]
    Timeout(String),

    #[error("runtime internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Narrow capability interface over the local model-serving runtime.
///
/// Operations are independent; serialization of specialist loads is the
/// residency manager's job, not the adapter's.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Single-shot completion. Temperature and token limits are fixed
    /// deployment parameters carried by the adapter.
    async fn generate(&self, model: &str, prompt: &str, keep_alive: KeepAlive) -> Result<String>;

    /// Embed one text. Dimension validation happens in the caller —
    /// the adapter returns whatever the model produced.
    async fn embed(&self, model: &str, text: &str, keep_alive: KeepAlive) -> Result<Vec<f32>>;

    /// OCR / structured read of a single image.
    async fn vision_extract(
        &self,
        model: &str,
        image: &[u8],
        media_type: &str,
        instruction: &str,
        keep_alive: KeepAlive,
    ) -> Result<String>;

    /// Audio transcription. Adapters without audio support fail closed
    /// with `Unavailable`.
    async fn transcribe(&self, model: &str, audio: &[u8], media_type: &str) -> Result<String>;

    /// Ask the runtime to (pre)load a model with the given residency.
    async fn load(&self, model: &str, keep_alive: KeepAlive) -> Result<()>;

    /// Reset a model's keep-alive to zero so the runtime can evict it.
    async fn unload(&self, model: &str) -> Result<()>;

    /// Runtime-specific accelerator-memory reclamation hook, invoked
    /// after every specialist eviction.
    async fn reclaim(&self) -> Result<()> {
        Ok(())
    }
}
