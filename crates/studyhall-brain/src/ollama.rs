use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use studyhall_core::config::RuntimeConfig;

use crate::runtime::{KeepAlive, ModelRuntime, Result, RuntimeError};

/// Outer bound on any single runtime HTTP call. Fine-grained deadlines
/// belong to the gateway's brain client; this only stops a wedged
/// runtime from holding a connection forever.
const CLIENT_TIMEOUT_SECS: u64 = 600;

/// Adapter over an Ollama-compatible runtime.
///
/// Residency is expressed through the API's `keep_alive` field:
/// `-1` pins a model, `0` releases it, a positive value keeps it warm
/// for that many seconds.
pub struct OllamaRuntime {
    client: reqwest::Client,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
}

impl OllamaRuntime {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }

    async fn post_generate(&self, body: serde_json::Value) -> Result<GenerateResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .timeout(std::time::Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "runtime /api/generate error");
            return Err(map_status_error(status, text));
        }

        resp.json::<GenerateResponse>()
            .await
            .map_err(|e| RuntimeError::Internal(format!("bad generate response: {e}")))
    }
}

#[async_trait]
impl ModelRuntime for OllamaRuntime {
    async fn generate(&self, model: &str, prompt: &str, keep_alive: KeepAlive) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(RuntimeError::BadInput("empty prompt".to_string()));
        }
        debug!(model = %model, "runtime generate");
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "keep_alive": keep_alive,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        Ok(self.post_generate(body).await?.response)
    }

    async fn embed(&self, model: &str, text: &str, keep_alive: KeepAlive) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RuntimeError::BadInput("empty text".to_string()));
        }
        debug!(model = %model, chars = text.len(), "runtime embed");
        let url = format!("{}/api/embed", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "input": text,
            "keep_alive": keep_alive,
        });
        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .timeout(std::time::Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "runtime /api/embed error");
            return Err(map_status_error(status, text));
        }

        let api: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| RuntimeError::Internal(format!("bad embed response: {e}")))?;
        api.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::Internal("embed response contained no vectors".into()))
    }

    async fn vision_extract(
        &self,
        model: &str,
        image: &[u8],
        media_type: &str,
        instruction: &str,
        keep_alive: KeepAlive,
    ) -> Result<String> {
        if image.is_empty() {
            return Err(RuntimeError::BadInput("empty image".to_string()));
        }
        debug!(model = %model, media_type = %media_type, bytes = image.len(), "runtime vision extract");
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let body = serde_json::json!({
            "model": model,
            "prompt": instruction,
            "images": [encoded],
            "stream": false,
            "keep_alive": keep_alive,
            "options": {
                "temperature": 0.0,
                "num_predict": self.max_tokens,
            },
        });
        Ok(self.post_generate(body).await?.response)
    }

    async fn transcribe(&self, model: &str, audio: &[u8], media_type: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(RuntimeError::BadInput("empty audio".to_string()));
        }
        debug!(model = %model, bytes = audio.len(), "runtime transcribe");
        // Audio goes through the runtime's OpenAI-compatible
        // transcription endpoint; the chat-native API has no audio slot.
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let file_name = audio_file_name(media_type);
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(file_name)
            .mime_str(media_type)
            .map_err(|e| RuntimeError::BadInput(format!("bad audio media type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .part("file", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(std::time::Duration::from_secs(CLIENT_TIMEOUT_SECS))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "runtime transcription error");
            return Err(map_status_error(status, text));
        }

        let api: TranscriptionResponse = resp
            .json()
            .await
            .map_err(|e| RuntimeError::Internal(format!("bad transcription response: {e}")))?;
        Ok(api.text)
    }

    async fn load(&self, model: &str, keep_alive: KeepAlive) -> Result<()> {
        debug!(model = %model, ?keep_alive, "runtime load");
        // An empty-prompt generate is the runtime's load/evict call.
        let body = serde_json::json!({
            "model": model,
            "keep_alive": keep_alive,
        });
        self.post_generate(body).await.map(|_| ())
    }

    async fn unload(&self, model: &str) -> Result<()> {
        debug!(model = %model, "runtime unload");
        let body = serde_json::json!({
            "model": model,
            "keep_alive": KeepAlive::Free,
        });
        self.post_generate(body).await.map(|_| ())
    }

    async fn reclaim(&self) -> Result<()> {
        // Eviction with keep_alive=0 already frees accelerator memory in
        // this runtime; there is no separate GC endpoint to poke.
        debug!("runtime reclaim (keep_alive eviction)");
        Ok(())
    }
}

fn map_transport_error(e: reqwest::Error) -> RuntimeError {
    if e.is_timeout() {
        RuntimeError::Timeout(e.to_string())
    } else if e.is_connect() {
        RuntimeError::Unavailable(e.to_string())
    } else {
        RuntimeError::Internal(e.to_string())
    }
}

fn map_status_error(status: u16, body: String) -> RuntimeError {
    if (400..500).contains(&status) {
        RuntimeError::BadInput(format!("runtime rejected request ({status}): {body}"))
    } else {
        RuntimeError::Internal(format!("runtime error ({status}): {body}"))
    }
}

fn audio_file_name(media_type: &str) -> String {
    let ext = match media_type {
        "audio/mpeg" => "mp3",
        "audio/wav" => "wav",
        "audio/webm" => "webm",
        "audio/mp4" => "m4a",
        _ => "bin",
    };
    format!("audio.{ext}")
}

// Runtime API response types (private — deserialization only)

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_alive_serializes_to_runtime_values() {
        assert_eq!(serde_json::to_value(KeepAlive::Forever).unwrap(), -1);
        assert_eq!(serde_json::to_value(KeepAlive::Free).unwrap(), 0);
        assert_eq!(serde_json::to_value(KeepAlive::For(300)).unwrap(), 300);
    }

    #[test]
    fn audio_file_names_follow_media_type() {
        assert_eq!(audio_file_name("audio/mpeg"), "audio.mp3");
        assert_eq!(audio_file_name("audio/wav"), "audio.wav");
        assert_eq!(audio_file_name("application/octet-stream"), "audio.bin");
    }

    #[test]
    fn status_errors_split_on_4xx_vs_5xx() {
        assert!(matches!(
            map_status_error(404, "no model".into()),
            RuntimeError::BadInput(_)
        ));
        assert!(matches!(
            map_status_error(500, "oom".into()),
            RuntimeError::Internal(_)
        ));
    }
}
