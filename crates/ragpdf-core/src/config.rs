//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys: `APP_RAG__TOP_K=8`). Provides helpers to
//! expand `~` and `${VAR}` and to resolve relative paths against a known base
//! directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{ChainType, GenerationParams, MemoryType};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load `path`, then the `RUST_ENV` overlay next to it, then `APP_*` vars.
    pub fn load_from(path: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(path));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        tracing::debug!(env = %env_name, path = %path.display(), "configuration sources merged");
        Ok(Self::from_figment(figment))
    }

    /// Wrap an already merged figment.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// Extract and validate the full settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pdf: PdfSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub vector_db: VectorDbSettings,
    pub llm: LlmSettings,
    pub rag: RagSettings,
    pub memory: MemorySettings,
    pub cli: CliSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    pub max_file_size_mb: u64,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self { max_file_size_mb: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 150 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_name: String,
    /// Local checkpoint directory; falls back to `APP_MODEL_DIR`, `MODEL_DIR`
    /// and `models/<model>` when unset.
    pub model_dir: Option<String>,
    pub batch_size: usize,
    pub max_length: usize,
    pub cache: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            model_dir: None,
            batch_size: 32,
            max_length: 256,
            cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbSettings {
    pub persist_directory: String,
    pub collection_prefix: String,
}

impl Default for VectorDbSettings {
    fn default() -> Self {
        Self { persist_directory: "./data/lancedb".to_string(), collection_prefix: "pdf".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model_name: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Upper bound on passage characters placed in a single `stuff` prompt.
    pub context_budget_chars: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model_name: "mistral".to_string(),
            base_url: "http://localhost:11434".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 120,
            context_budget_chars: 6000,
        }
    }
}

impl LlmSettings {
    pub fn params(&self) -> GenerationParams {
        GenerationParams { temperature: self.temperature, max_tokens: self.max_tokens }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub chain_type: ChainType,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self { top_k: 5, similarity_threshold: 0.5, chain_type: ChainType::Stuff }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub enabled: bool,
    pub memory_type: MemoryType,
    pub window_size: usize,
    pub summary_max_tokens: u32,
    pub summary_keep_last_turn: bool,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            memory_type: MemoryType::Buffer,
            window_size: 10,
            summary_max_tokens: 256,
            summary_keep_last_turn: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliSettings {
    pub show_sources: bool,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self { show_sources: true }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return invalid("chunking.chunk_size must be greater than 0".into());
        }
        if c.chunk_overlap >= c.chunk_size {
            return invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            ));
        }
        if self.rag.top_k == 0 {
            return invalid("rag.top_k must be greater than 0".into());
        }
        let t = self.rag.similarity_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return invalid(format!("rag.similarity_threshold must be within [0, 1], got {t}"));
        }
        if self.memory.memory_type == MemoryType::Window && self.memory.window_size == 0 {
            return invalid("memory.window_size must be at least 1".into());
        }
        if self.embedding.batch_size == 0 || self.embedding.max_length == 0 {
            return invalid("embedding.batch_size and embedding.max_length must be greater than 0".into());
        }
        if !self.llm.temperature.is_finite() || self.llm.temperature < 0.0 {
            return invalid(format!("llm.temperature must be non-negative, got {}", self.llm.temperature));
        }
        if self.llm.max_tokens == 0 || self.llm.timeout_secs == 0 || self.llm.context_budget_chars == 0 {
            return invalid("llm.max_tokens, llm.timeout_secs and llm.context_budget_chars must be greater than 0".into());
        }
        if self.pdf.max_file_size_mb == 0 {
            return invalid("pdf.max_file_size_mb must be greater than 0".into());
        }
        if self.vector_db.collection_prefix.is_empty() {
            return invalid("vector_db.collection_prefix must not be empty".into());
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
