//! Wiring shared by the `ragpdf` binaries: logging, backend construction and
//! chat command parsing.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use ragpdf_chain::{Backends, Session};
use ragpdf_core::config::{resolve_with_base, Config, Settings};
use ragpdf_core::error::Error;
use ragpdf_core::traits::{Embedder, Generator, VectorStore};
use ragpdf_embed::get_default_embedder;
use ragpdf_llm::OllamaGenerator;
use ragpdf_pdf::PdfExtractor;
use ragpdf_vector::{CachedEmbedder, EmbeddingCache, LanceStore, MemoryStore};

/// Log to stderr, `warn` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Settings from `path` (plus env overlays) and the directory relative
/// paths in them resolve against.
pub fn load_settings(path: &Path) -> Result<(Settings, PathBuf)> {
    let config = Config::load_from(path)?;
    let settings = config
        .settings()
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    let base = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    Ok((settings, base))
}

/// Build a session over the real backends. `ephemeral` keeps collections
/// and the embedding cache in memory instead of LanceDB.
pub fn build_session(settings: Settings, base: &Path, ephemeral: bool) -> Result<Session> {
    let store: Arc<dyn VectorStore>;
    let cache: Arc<dyn EmbeddingCache>;
    if ephemeral {
        let memory = Arc::new(MemoryStore::new());
        store = memory.clone();
        cache = memory;
    } else {
        let dir = resolve_with_base(base, &settings.vector_db.persist_directory);
        let lance = Arc::new(
            LanceStore::open(&dir).with_context(|| format!("opening vector store at {}", dir.display()))?,
        );
        store = lance.clone();
        cache = lance;
    }

    let embedder: Arc<dyn Embedder> = Arc::from(get_default_embedder(&settings.embedding)?);
    let embedder: Arc<dyn Embedder> = if settings.embedding.cache {
        Arc::new(CachedEmbedder::new(embedder, cache))
    } else {
        embedder
    };

    let ollama = OllamaGenerator::new(&settings.llm)?;
    match ollama.check_model() {
        Ok(()) => tracing::info!(model = %settings.llm.model_name, "generation model available"),
        Err(e @ Error::ModelNotFound { .. }) => eprintln!("⚠️  {e}"),
        Err(e) => eprintln!("⚠️  {e} (questions will fail until Ollama is running at {})", ollama.base_url()),
    }
    let generator: Arc<dyn Generator> = Arc::new(ollama);

    let extractor = Arc::new(PdfExtractor::from_settings(&settings.pdf));
    let session = Session::new(settings, Backends { extractor, embedder, generator, store })?;
    Ok(session)
}

/// A line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Ask(String),
    Load(PathBuf),
    Clear,
    Help,
    Exit,
    Empty,
    Unknown(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ChatCommand::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return ChatCommand::Ask(line.to_string());
        };
        let (cmd, arg) = match rest.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (rest, ""),
        };
        match cmd.to_ascii_lowercase().as_str() {
            "exit" | "quit" => ChatCommand::Exit,
            "clear" => ChatCommand::Clear,
            "help" => ChatCommand::Help,
            "load" if !arg.is_empty() => ChatCommand::Load(PathBuf::from(arg)),
            _ => ChatCommand::Unknown(line.to_string()),
        }
    }
}

pub const CHAT_HELP: &str = "Commands:\n  /load <path>  load another PDF\n  /clear        forget the conversation\n  /help         show this help\n  /exit, /quit  leave chat";
