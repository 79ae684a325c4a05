use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ForgeError, Result};

/// Placeholder shipped in example `.env` files; never a usable key.
const PLACEHOLDER_API_KEY: &str = "your-openai-api-key-here";

/// Top-level configuration for InsightForge.
///
/// Loaded from `~/.insightforge/config.toml` by default. Each section maps to
/// one component of the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl ForgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ForgeConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply overrides from process environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`,
    /// `EMBEDDING_MODEL`, `CHUNK_SIZE`, `CHUNK_OVERLAP`, `MAX_UPLOAD_SIZE_MB`
    /// and `INSIGHTFORGE_DATA_DIR`. Numeric values that fail to parse are
    /// ignored with a warning.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model_name = model;
        }
        if let Some(dir) = lookup("INSIGHTFORGE_DATA_DIR") {
            self.general.data_dir = dir;
        }
        if let Some(v) = parse_override(&lookup, "CHUNK_SIZE") {
            self.retrieval.chunk_size = v;
        }
        if let Some(v) = parse_override(&lookup, "CHUNK_OVERLAP") {
            self.retrieval.chunk_overlap = v;
        }
        if let Some(v) = parse_override(&lookup, "MAX_UPLOAD_SIZE_MB") {
            self.upload.max_upload_size_mb = v;
        }
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.chunk_size == 0 {
            return Err(ForgeError::Config(
                "retrieval.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(ForgeError::Config(format!(
                "retrieval.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.retrieval.chunk_overlap, self.retrieval.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ForgeError::Config(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(ForgeError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.upload.max_upload_size_mb == 0 {
            return Err(ForgeError::Config(
                "upload.max_upload_size_mb must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved data directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Directory where uploaded files are kept.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir().join("uploads")
    }

    /// Directory where generated sample datasets are written.
    pub fn samples_dir(&self) -> PathBuf {
        self.data_dir().join("samples")
    }

    /// SQLite database holding persisted vector stores.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("insightforge.db")
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable override");
            None
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for uploads, samples and the vector store database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port for the dashboard API.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.insightforge/data".to_string(),
            log_level: "info".to_string(),
            port: 8501,
        }
    }
}

/// Hosted language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key for the OpenAI-compatible endpoint. Empty disables analysis.
    pub api_key: String,
    /// Chat model name.
    pub model: String,
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// HTTP timeout for a single completion call.
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Whether a usable API key has been supplied.
    pub fn is_api_key_set(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != PLACEHOLDER_API_KEY
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "onnx" or "hashing".
    pub provider: String,
    /// Sentence-transformer model name (informational).
    pub model_name: String,
    /// Directory containing `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
    /// Vector dimension used by the hashing provider and as the ONNX fallback.
    pub dimensions: usize,
}

impl EmbeddingConfig {
    pub fn model_dir(&self) -> PathBuf {
        expand_home(&self.model_dir)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "onnx".to_string(),
            model_name: "all-MiniLM-L6-v2".to_string(),
            model_dir: "~/.insightforge/models/all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
        }
    }
}

/// Chunking and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Default number of chunks returned per query.
    pub top_k: usize,
    /// Pull chunk ends back to paragraph/sentence/word boundaries.
    pub prefer_separators: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            prefer_separators: false,
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_upload_size_mb: usize,
    /// Lower-case extensions accepted by the upload store.
    pub allowed_extensions: Vec<String>,
}

impl UploadConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: 200,
            allowed_extensions: [
                "csv", "xlsx", "xls", "json", "pdf", "docx", "txt", "png", "jpg", "jpeg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Analysis and chat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sample rows rendered into the data context.
    pub max_context_rows: usize,
    /// Chat turns kept in the session before the oldest are dropped.
    pub max_chat_history: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_context_rows: 50,
            max_chat_history: 100,
        }
    }
}
