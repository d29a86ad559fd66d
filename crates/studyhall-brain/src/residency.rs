use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use studyhall_core::config::ModelsConfig;

use crate::runtime::{KeepAlive, ModelRuntime, Result, RuntimeError};

/// Residency handed to a specialist load — long enough to cover the
/// call it was loaded for, short enough that an abandoned model ages
/// out even if the unload below is lost.
const SPECIALIST_KEEP_ALIVE_SECS: u64 = 300;

/// Enforces the persistent-core / on-demand-specialist policy.
///
/// One chat model stays pinned in accelerator memory for the life of
/// the process; vision, embedding, and audio models are loaded per
/// call, strictly one at a time, and evicted before the response is
/// returned. No cleanup path touches the core model — `shutdown` is
/// the only legal unload.
pub struct ResidencyManager {
    runtime: Arc<dyn ModelRuntime>,
    models: ModelsConfig,
    embed_dim: usize,
    /// Serializes specialist `load -> use -> unload` sequences.
    /// Waiters acquire in arrival order, so no specialist starves.
    specialist_lock: Mutex<()>,
    core_ready: AtomicBool,
}

impl ResidencyManager {
    pub fn new(runtime: Arc<dyn ModelRuntime>, models: ModelsConfig, embed_dim: usize) -> Self {
        Self {
            runtime,
            models,
            embed_dim,
            specialist_lock: Mutex::new(()),
            core_ready: AtomicBool::new(false),
        }
    }

    pub fn core_model(&self) -> &str {
        &self.models.core
    }

    pub fn vision_model(&self) -> &str {
        &self.models.vision
    }

    pub fn audio_available(&self) -> bool {
        self.models.audio.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.core_ready.load(Ordering::Relaxed)
    }

    /// Pin the core model and verify it answers a trivial probe.
    pub async fn ensure_core(&self) -> Result<()> {
        self.runtime
            .load(&self.models.core, KeepAlive::Forever)
            .await?;
        self.runtime
            .generate(&self.models.core, "Reply with OK.", KeepAlive::Forever)
            .await?;
        self.core_ready.store(true, Ordering::Relaxed);
        info!(model = %self.models.core, "core model resident and probed");
        Ok(())
    }

    /// Chat completion on the persistent core model.
    ///
    /// Never gated by the specialist lock — keeping the hot path free
    /// of cold starts is the whole point of the policy.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.runtime
            .generate(&self.models.core, prompt, KeepAlive::Forever)
            .await
    }

    /// Embed one text on the embedding specialist. Exactly `embed_dim`
    /// floats come back or the call fails.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let runtime = Arc::clone(&self.runtime);
        let model = self.models.embed.clone();
        let text = text.to_string();
        let vector = self
            .with_specialist(&self.models.embed, move || async move {
                runtime
                    .embed(&model, &text, KeepAlive::For(SPECIALIST_KEEP_ALIVE_SECS))
                    .await
            })
            .await?;
        if vector.len() != self.embed_dim {
            return Err(RuntimeError::Internal(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.embed_dim,
                vector.len()
            )));
        }
        Ok(vector)
    }

    /// OCR one image on the vision specialist.
    pub async fn vision_extract(
        &self,
        image: Vec<u8>,
        media_type: String,
        instruction: String,
    ) -> Result<String> {
        let runtime = Arc::clone(&self.runtime);
        let model = self.models.vision.clone();
        self.with_specialist(&self.models.vision, move || async move {
            runtime
                .vision_extract(
                    &model,
                    &image,
                    &media_type,
                    &instruction,
                    KeepAlive::For(SPECIALIST_KEEP_ALIVE_SECS),
                )
                .await
        })
        .await
    }

    /// Transcribe audio. Fails closed when no audio model was declared
    /// at startup.
    pub async fn transcribe(&self, audio: Vec<u8>, media_type: String) -> Result<String> {
        let model = match &self.models.audio {
            Some(m) => m.clone(),
            None => {
                return Err(RuntimeError::Unavailable(
                    "audio transcription not configured".to_string(),
                ))
            }
        };
        let runtime = Arc::clone(&self.runtime);
        let call_model = model.clone();
        self.with_specialist(&model, move || async move {
            runtime.transcribe(&call_model, &audio, &media_type).await
        })
        .await
    }

    /// Explicit shutdown — the one path allowed to unload the core.
    pub async fn shutdown(&self) {
        self.core_ready.store(false, Ordering::Relaxed);
        if let Err(e) = self.runtime.unload(&self.models.core).await {
            warn!(error = %e, "core model unload failed during shutdown");
        }
    }

    /// Run one specialist call under the residency policy:
    /// serialize, load, use, then evict and reclaim on every exit path.
    async fn with_specialist<T, F, Fut>(&self, model: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.specialist_lock.lock().await;

        self.runtime
            .load(model, KeepAlive::For(SPECIALIST_KEEP_ALIVE_SECS))
            .await?;

        let result = op().await;

        // Eviction runs whether the call succeeded or not. Failures here
        // are logged, not surfaced — the caller's result matters more,
        // and the keep-alive above bounds the leak.
        if let Err(e) = self.runtime.unload(model).await {
            warn!(model = %model, error = %e, "specialist unload failed");
        }
        if let Err(e) = self.runtime.reclaim().await {
            warn!(error = %e, "accelerator reclaim hook failed");
        }

        result
    }
}
