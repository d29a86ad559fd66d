//! Material processing — drives one material through its status
//! machine: claim, fetch, extract, embed, terminal write.
//!
//! Every outcome is a single terminal write (`completed` with its data,
//! or `failed` with a reason), so partially processed rows cannot
//! exist. Retry is never automatic; the admin retry action is the only
//! path out of `failed`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use studyhall_core::types::{is_image_media_type, is_pdf_media_type};
use studyhall_store::{MaterialStore, ObjectStore, StoreError};

use crate::brain::{Brain, BrainError};

/// Instruction handed to the vision specialist for OCR.
const EXTRACT_INSTRUCTION: &str =
    "Extract all readable text from this document. Preserve headings, lists, and structure.";

pub struct MaterialProcessor {
    materials: Arc<MaterialStore>,
    objects: Arc<dyn ObjectStore>,
    brain: Arc<dyn Brain>,
    embed_dim: usize,
    timeout: Duration,
}

impl MaterialProcessor {
    pub fn new(
        materials: Arc<MaterialStore>,
        objects: Arc<dyn ObjectStore>,
        brain: Arc<dyn Brain>,
        embed_dim: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            materials,
            objects,
            brain,
            embed_dim,
            timeout,
        }
    }

    /// Process one material end to end. Infallible from the caller's
    /// perspective: every failure lands in the material's
    /// `error_message`, never in the queue.
    pub async fn process(&self, material_id: &str, cancel: &CancellationToken) {
        // The pending -> processing guard makes repeat and concurrent
        // attempts no-ops.
        match self.materials.claim_for_processing(material_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(material_id, "material not pending, skipping");
                return;
            }
            Err(e) => {
                warn!(material_id, error = %e, "claim failed");
                return;
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err("cancelled".to_string()),
            res = tokio::time::timeout(self.timeout, self.run(material_id)) => match res {
                Ok(inner) => inner,
                Err(_) => Err("processing timed out".to_string()),
            },
        };

        match outcome {
            Ok(()) => info!(material_id, "material processing completed"),
            Err(reason) => {
                warn!(material_id, reason = %reason, "material processing failed");
                if let Err(e) = self.materials.fail(material_id, &reason) {
                    warn!(material_id, error = %e, "could not record failure");
                }
            }
        }
    }

    /// The fallible middle of the pipeline. Returns the failure reason
    /// that `process` writes into the material row.
    async fn run(&self, material_id: &str) -> Result<(), String> {
        let material = match self.materials.get(material_id) {
            Ok(Some(m)) => m,
            Ok(None) => return Err("material not found".to_string()),
            Err(e) => return Err(format!("store read failed: {e}")),
        };

        let bytes = match self.objects.fetch(&material.file_ref).await {
            Ok(b) => b,
            Err(StoreError::ObjectMissing { .. }) => return Err("material not found".to_string()),
            Err(e) => return Err(format!("object fetch failed: {e}")),
        };

        let extracted = self
            .extract_text(bytes, &material.media_type)
            .await
            .map_err(describe_brain_error)?;
        let trimmed = extracted.trim();

        // Empty text is a valid outcome (blank scan, image with no
        // writing) — the material completes without a vector and is
        // findable by metadata only.
        let embedding = if trimmed.is_empty() {
            None
        } else {
            let vector = self
                .brain
                .generate_embedding(trimmed)
                .await
                .map_err(describe_brain_error)?;
            if vector.len() != self.embed_dim {
                return Err("embedding dimension mismatch".to_string());
            }
            Some(vector)
        };

        let stored_text = if trimmed.is_empty() { "" } else { trimmed };
        self.materials
            .complete(material_id, stored_text, embedding.as_deref())
            .map_err(|e| format!("terminal write failed: {e}"))?;
        Ok(())
    }

    async fn extract_text(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
    ) -> Result<String, BrainError> {
        if is_image_media_type(media_type) || is_pdf_media_type(media_type) {
            let generated = self
                .brain
                .extract_attachment(bytes, media_type, EXTRACT_INSTRUCTION)
                .await?;
            Ok(generated.text)
        } else {
            Err(BrainError::BadInput("unsupported media type".to_string()))
        }
    }
}

fn describe_brain_error(e: BrainError) -> String {
    match e {
        BrainError::Unavailable(_) => "AI service unavailable".to_string(),
        BrainError::Timeout(_) => "extraction timed out".to_string(),
        BrainError::BadInput(m) => m,
        BrainError::Internal(m) => m,
    }
}
