//! Chat pipeline — one user turn end to end: validate, preprocess
//! attachments through the specialist router, gather context, generate,
//! persist the turn pair.
//!
//! Turns within a course are serialized by an in-process lock map; a
//! turn only starts once the previous turn's persistence has returned.
//! Optional context (personalization, retrieval, history) degrades with
//! warnings; generation, validation, and prompt-budget failures surface
//! to the caller. Nothing is persisted unless generation succeeded.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use studyhall_core::config::{ChatConfig, UploadsConfig};
use studyhall_core::error::{CoreError, Result};
use studyhall_core::types::{global_course_id, Attachment, AttachmentKind};
use studyhall_store::search;
use studyhall_store::types::{AcademicProfile, Preferences};
use studyhall_store::{HistoryStore, MaterialStore, ProfileStore, SearchHit};

use crate::brain::Brain;
use crate::compose::{self, ComposeInput};

/// Instruction for attachment preprocessing when the user sent no text.
const DEFAULT_ATTACHMENT_INSTRUCTION: &str = "Transcribe the content of this attachment.";

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub course_id: Option<String>,
    pub message: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: String,
    pub model: String,
    /// Set only on partial completion (generated but not persisted).
    pub warning: Option<String>,
}

pub struct ChatPipeline {
    chat_cfg: ChatConfig,
    uploads_cfg: UploadsConfig,
    top_k: usize,
    embed_dim: usize,
    brain: Arc<dyn Brain>,
    materials: Arc<MaterialStore>,
    history: Arc<HistoryStore>,
    profiles: Arc<ProfileStore>,
    /// Per-course turn serialization (process-local, never persisted).
    course_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChatPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat_cfg: ChatConfig,
        uploads_cfg: UploadsConfig,
        top_k: usize,
        embed_dim: usize,
        brain: Arc<dyn Brain>,
        materials: Arc<MaterialStore>,
        history: Arc<HistoryStore>,
        profiles: Arc<ProfileStore>,
    ) -> Self {
        Self {
            chat_cfg,
            uploads_cfg,
            top_k,
            embed_dim,
            brain,
            materials,
            history,
            profiles,
            course_locks: DashMap::new(),
        }
    }

    pub async fn run_turn(&self, user_id: &str, req: TurnRequest) -> Result<ChatOutcome> {
        let message = req.message.trim().to_string();
        self.validate(&message, &req.attachments)?;

        let effective = self.effective_message(message, req.attachments).await?;

        let course_key = req
            .course_id
            .clone()
            .unwrap_or_else(|| global_course_id(user_id));

        // One turn at a time per course, held through persistence.
        let lock = self
            .course_locks
            .entry(course_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _turn_guard = lock.lock().await;

        let history = self
            .history
            .recent(&course_key, self.chat_cfg.history_turns)
            .unwrap_or_else(|e| {
                warn!(error = %e, "history read failed, composing without it");
                Vec::new()
            });

        let (academic, preferences) = self.read_profiles(user_id).await;

        let excerpts = if compose::should_retrieve(
            &effective,
            req.course_id.as_deref(),
            self.chat_cfg.min_query_len,
        ) {
            self.retrieve(req.course_id.as_deref().unwrap_or_default(), &effective)
                .await
        } else {
            Vec::new()
        };
        let retrieval_degraded_to_empty = excerpts.is_empty();

        let prompt = compose::compose(
            ComposeInput {
                persona: &self.chat_cfg.persona,
                academic,
                preferences,
                excerpts,
                history,
                message: &effective,
            },
            self.chat_cfg.prompt_char_budget,
        )?;

        // Generation failures surface and nothing is persisted.
        let generated = self.brain.generate_response(&prompt).await?;

        info!(
            course = %course_key,
            model = %generated.model,
            degraded = retrieval_degraded_to_empty,
            "chat turn generated"
        );

        if let Err(e) = self
            .history
            .append_turn_pair(&course_key, &effective, &generated.text)
        {
            warn!(course = %course_key, error = %e, "turn persistence failed after generation");
            return Ok(ChatOutcome {
                response: generated.text,
                model: generated.model,
                warning: Some(
                    "response generated but not saved; it will be missing from future context"
                        .to_string(),
                ),
            });
        }

        Ok(ChatOutcome {
            response: generated.text,
            model: generated.model,
            warning: None,
        })
    }

    fn validate(&self, message: &str, attachments: &[Attachment]) -> Result<()> {
        if message.is_empty() && attachments.is_empty() {
            return Err(CoreError::Validation("message cannot be empty".to_string()));
        }
        if attachments.len() > 1 {
            return Err(CoreError::Validation(
                "at most one attachment per turn".to_string(),
            ));
        }
        for att in attachments {
            if att.kind() == AttachmentKind::Document {
                return Err(CoreError::Validation(
                    "document attachments go through material upload".to_string(),
                ));
            }
            if !self
                .uploads_cfg
                .allowed_media_types
                .iter()
                .any(|m| m == att.media_type())
            {
                return Err(CoreError::Validation(format!(
                    "media type not allowed: {}",
                    att.media_type()
                )));
            }
            if att.size_bytes() > self.uploads_cfg.max_bytes {
                return Err(CoreError::Validation(format!(
                    "attachment exceeds {} bytes",
                    self.uploads_cfg.max_bytes
                )));
            }
        }
        Ok(())
    }

    /// Attachment preprocessing: the specialist's extraction replaces
    /// the user message. A failure degrades back to the typed message
    /// when there is one, and surfaces otherwise.
    async fn effective_message(
        &self,
        message: String,
        attachments: Vec<Attachment>,
    ) -> Result<String> {
        let Some(att) = attachments.into_iter().next() else {
            return Ok(message);
        };

        let instruction = if message.is_empty() {
            DEFAULT_ATTACHMENT_INSTRUCTION.to_string()
        } else {
            message.clone()
        };
        let (bytes, media_type) = match att {
            Attachment::Image { bytes, media_type } | Attachment::Audio { bytes, media_type } => {
                (bytes, media_type)
            }
            Attachment::Document { .. } => unreachable!("rejected by validate"),
        };

        match self
            .brain
            .extract_attachment(bytes, &media_type, &instruction)
            .await
        {
            Ok(generated) if !generated.text.trim().is_empty() => {
                Ok(generated.text.trim().to_string())
            }
            Ok(_) if !message.is_empty() => {
                warn!("attachment produced no text, falling back to typed message");
                Ok(message)
            }
            Ok(_) => Err(CoreError::AttachmentProcessingFailed(
                "attachment produced no text".to_string(),
            )),
            Err(e) if !message.is_empty() => {
                warn!(error = %e, "attachment preprocessing failed, falling back to typed message");
                Ok(message)
            }
            Err(e) => Err(CoreError::AttachmentProcessingFailed(e.to_string())),
        }
    }

    /// Profile reads carry a strict per-call timeout and degrade to
    /// nothing — personalization is never worth failing a turn.
    async fn read_profiles(&self, user_id: &str) -> (Option<AcademicProfile>, Option<Preferences>) {
        let timeout = Duration::from_millis(self.chat_cfg.profile_timeout_ms);
        let profiles = Arc::clone(&self.profiles);
        let uid = user_id.to_string();
        let read = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || {
                let academic = profiles.academic(&uid);
                let preferences = profiles.preferences(&uid);
                (academic, preferences)
            }),
        )
        .await;

        match read {
            Ok(Ok((academic, preferences))) => (
                academic.unwrap_or_else(|e| {
                    warn!(error = %e, "academic profile read failed");
                    None
                }),
                preferences.unwrap_or_else(|e| {
                    warn!(error = %e, "preferences read failed");
                    None
                }),
            ),
            Ok(Err(e)) => {
                warn!(error = %e, "profile read task failed");
                (None, None)
            }
            Err(_) => {
                warn!("profile read timed out, composing without personalization");
                (None, None)
            }
        }
    }

    /// Retrieval: embed the message, rank the course's materials.
    /// Every failure path logs and returns no excerpts.
    async fn retrieve(&self, course_id: &str, message: &str) -> Vec<SearchHit> {
        let query = match self.brain.generate_embedding(message).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, skipping retrieval");
                return Vec::new();
            }
        };
        if query.len() != self.embed_dim {
            warn!(
                got = query.len(),
                expected = self.embed_dim,
                "query embedding has wrong dimension, skipping retrieval"
            );
            return Vec::new();
        }

        let candidates = match self.materials.search_candidates(course_id) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "search candidate load failed, skipping retrieval");
                return Vec::new();
            }
        };

        match search::rank(candidates, &query, self.top_k, self.embed_dim) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "vector ranking failed, skipping retrieval");
                Vec::new()
            }
        }
    }
}
