use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Deployment-wide constants.
pub const DEFAULT_GATEWAY_PORT: u16 = 8400;
pub const DEFAULT_BRAIN_PORT: u16 = 8421;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Hard cap on `limit` for material search, regardless of config.
pub const RETRIEVAL_TOPK_CAP: usize = 10;
/// How long a producer may block waiting for a processing-queue slot
/// before giving up and leaving the material `pending`.
pub const QUEUE_ENQUEUE_WAIT_MS: u64 = 50;

/// Top-level config (studyhall.toml + STUDYHALL_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyhallConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub brain: BrainConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for StudyhallConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            brain: BrainConfig::default(),
            runtime: RuntimeConfig::default(),
            models: ModelsConfig::default(),
            embedding: EmbeddingConfig::default(),
            processing: ProcessingConfig::default(),
            chat: ChatConfig::default(),
            retrieval: RetrievalConfig::default(),
            uploads: UploadsConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_gateway_port(),
        }
    }
}

/// Brain service placement and supervision knobs.
///
/// The gateway spawns the Brain as a child process and health-gates on
/// `endpoint` before enabling AI routes. `executable` may be an absolute
/// path; when unset the binary is resolved from PATH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    #[serde(default = "default_brain_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_brain_port")]
    pub port: u16,
    pub executable: Option<String>,
    /// Max wait for the child's health probe to report ready.
    #[serde(default = "default_startup_deadline_secs")]
    pub startup_deadline_secs: u64,
    /// Soft-termination window before the child is killed.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    /// Per-call deadline for chat generation.
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
    /// Per-call deadline for embedding.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    /// Per-call deadline for OCR / transcription of one attachment.
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            endpoint: default_brain_endpoint(),
            bind: default_bind(),
            port: default_brain_port(),
            executable: None,
            startup_deadline_secs: default_startup_deadline_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            chat_timeout_secs: default_chat_timeout_secs(),
            embed_timeout_secs: default_embed_timeout_secs(),
            extract_timeout_secs: default_extract_timeout_secs(),
        }
    }
}

/// The model runtime the Brain fronts (Ollama-compatible HTTP API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime_base_url")]
    pub base_url: String,
    /// Fixed deployment parameter — not a per-request knob.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Fixed deployment parameter — completion token ceiling.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: default_runtime_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Model handles passed to the runtime. `core` stays resident for the
/// Brain's lifetime; the rest are on-demand specialists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_core_model")]
    pub core: String,
    #[serde(default = "default_vision_model")]
    pub vision: String,
    #[serde(default = "default_embed_model")]
    pub embed: String,
    /// Audio transcription is available only when this is set.
    pub audio: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            core: default_core_model(),
            vision: default_vision_model(),
            embed: default_embed_model(),
            audio: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Constant `D` — must match every stored vector in the deployment.
    #[serde(default = "default_embed_dim")]
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: default_embed_dim(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Upper bound for one material's OCR + embed.
    #[serde(default = "default_processing_timeout_secs")]
    pub timeout_secs: u64,
    /// Worker-pool size. Kept small so vision and embed loads never
    /// stack up on the accelerator.
    #[serde(default = "default_processing_concurrency")]
    pub concurrency: usize,
    /// Bounded queue depth in front of the workers.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_processing_timeout_secs(),
            concurrency: default_processing_concurrency(),
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// `H` — most recent turns included in the prompt.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Total prompt character budget.
    #[serde(default = "default_prompt_char_budget")]
    pub prompt_char_budget: usize,
    /// Messages shorter than this (trimmed) skip retrieval.
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
    /// Fixed persona preamble for every prompt.
    #[serde(default = "default_persona")]
    pub persona: String,
    /// Per-call timeout for profile/preference reads during composition.
    #[serde(default = "default_profile_timeout_ms")]
    pub profile_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            prompt_char_budget: default_prompt_char_budget(),
            min_query_len: default_min_query_len(),
            persona: default_persona(),
            profile_timeout_ms: default_profile_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default `k` for material search when the caller does not pass one.
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_default: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_bytes: usize,
    /// Allow-list for uploads and chat attachments.
    #[serde(default = "default_allowed_media_types")]
    pub allowed_media_types: Vec<String>,
    /// Directory backing the local object store.
    #[serde(default = "default_objects_dir")]
    pub objects_dir: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_upload_bytes(),
            allowed_media_types: default_allowed_media_types(),
            objects_dir: default_objects_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}
fn default_brain_port() -> u16 {
    DEFAULT_BRAIN_PORT
}
fn default_brain_endpoint() -> String {
    format!("http://{}:{}", DEFAULT_BIND, DEFAULT_BRAIN_PORT)
}
fn default_runtime_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_core_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_vision_model() -> String {
    "llama3.2-vision:11b".to_string()
}
fn default_embed_model() -> String {
    "mxbai-embed-large".to_string()
}
fn default_embed_dim() -> usize {
    1024
}
fn default_startup_deadline_secs() -> u64 {
    120
}
fn default_stop_grace_secs() -> u64 {
    10
}
fn default_chat_timeout_secs() -> u64 {
    60
}
fn default_embed_timeout_secs() -> u64 {
    10
}
fn default_extract_timeout_secs() -> u64 {
    300
}
fn default_processing_timeout_secs() -> u64 {
    600
}
fn default_processing_concurrency() -> usize {
    2
}
fn default_queue_depth() -> usize {
    64
}
fn default_history_turns() -> usize {
    10
}
fn default_prompt_char_budget() -> usize {
    24_000
}
fn default_min_query_len() -> usize {
    3
}
fn default_persona() -> String {
    "You are Studyhall, a patient study assistant. Ground every answer in \
     the provided course materials when they are present, and say so when \
     they are not."
        .to_string()
}
fn default_profile_timeout_ms() -> u64 {
    500
}
fn default_top_k() -> usize {
    3
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}
fn default_allowed_media_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/bmp",
        "application/pdf",
        "audio/mpeg",
        "audio/wav",
        "audio/webm",
        "audio/mp4",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_objects_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.studyhall/objects", home)
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.studyhall/studyhall.db", home)
}

impl StudyhallConfig {
    /// Load config from a TOML file with STUDYHALL_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.studyhall/studyhall.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: StudyhallConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("STUDYHALL_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.studyhall/studyhall.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_contract() {
        let cfg = StudyhallConfig::default();
        assert_eq!(cfg.embedding.dim, 1024);
        assert_eq!(cfg.processing.concurrency, 2);
        assert_eq!(cfg.chat.history_turns, 10);
        assert_eq!(cfg.chat.min_query_len, 3);
        assert_eq!(cfg.retrieval.top_k_default, 3);
        assert!(cfg.models.audio.is_none());
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("studyhall-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("studyhall.toml");
        std::fs::write(
            &path,
            "[embedding]\ndim = 384\n\n[processing]\nconcurrency = 4\n",
        )
        .unwrap();

        let cfg = StudyhallConfig::load(path.to_str()).unwrap();
        assert_eq!(cfg.embedding.dim, 384);
        assert_eq!(cfg.processing.concurrency, 4);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.chat.history_turns, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = StudyhallConfig::load(Some("/nonexistent/studyhall.toml")).unwrap();
        assert_eq!(cfg.gateway.port, DEFAULT_GATEWAY_PORT);
    }
}
