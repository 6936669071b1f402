#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ragpdf_chain::{Backends, Session};
use ragpdf_core::config::Settings;
use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::{Extractor, Generator, VectorStore};
use ragpdf_core::types::{Chunk, GenerationParams, Page, RetrievedPassage};
use ragpdf_embed::HashEmbedder;
use ragpdf_vector::MemoryStore;

/// Replays queued replies (then a default) and records every prompt.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    default_reply: String,
    prompts: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl ScriptedGenerator {
    pub fn new(default_reply: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            prompts: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn with_replies(replies: &[&str]) -> Arc<Self> {
        let g = Self::new("default answer");
        g.push_replies(replies);
        g
    }

    pub fn push_replies(&self, replies: &[&str]) {
        self.replies.lock().unwrap().extend(replies.iter().map(|r| r.to_string()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Generator for ScriptedGenerator {
    fn model_id(&self) -> &str { "scripted" }

    fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::GenerationUnavailable("cannot reach Ollama at http://localhost:11434".into()));
        }
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_else(|| self.default_reply.clone()))
    }
}

/// Sleeps before answering; flags when a call has started.
pub struct SlowGenerator {
    pub delay: Duration,
    pub started: Arc<AtomicBool>,
}

impl SlowGenerator {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay, started: Arc::new(AtomicBool::new(false)) })
    }
}

impl Generator for SlowGenerator {
    fn model_id(&self) -> &str { "slow" }

    fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        self.started.store(true, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok("eventually".into())
    }
}

/// Serves canned pages per path; unknown paths are unreadable.
#[derive(Default)]
pub struct StubExtractor {
    docs: Mutex<HashMap<PathBuf, Vec<Page>>>,
}

impl StubExtractor {
    pub fn with(docs: &[(&str, Vec<Page>)]) -> Arc<Self> {
        let map = docs.iter().map(|(p, pages)| (PathBuf::from(p), pages.clone())).collect();
        Arc::new(Self { docs: Mutex::new(map) })
    }
}

impl Extractor for StubExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        let pages = self
            .docs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::UnreadablePdf(format!("{}: not a PDF", path.display())))?;
        if pages.iter().all(|p| p.text.trim().is_empty()) {
            return Err(Error::EmptyDocument(path.display().to_string()));
        }
        Ok(pages)
    }
}

pub fn homestead_pages() -> Vec<Page> {
    vec![
        Page::new(1, "The solar array produces twelve kilowatts at noon. The panels face south and are cleaned every spring."),
        Page::new(2, "Chickens need fresh water daily and a dry coop in winter. Feed the flock grain each morning."),
        Page::new(3, "The well pump draws water from forty meters deep. Replace the pump filter every six months."),
    ]
}

pub fn garden_pages() -> Vec<Page> {
    vec![Page::new(1, "Tomatoes are planted after the last frost. Water the garden beds in the evening.")]
}

pub fn test_settings() -> Settings {
    let mut s = Settings::default();
    s.chunking.chunk_size = 120;
    s.chunking.chunk_overlap = 20;
    s.embedding.batch_size = 2;
    s.rag.top_k = 3;
    s.rag.similarity_threshold = 0.0;
    s.llm.timeout_secs = 5;
    s
}

pub fn extractor() -> Arc<StubExtractor> {
    StubExtractor::with(&[
        ("homestead.pdf", homestead_pages()),
        ("garden.pdf", garden_pages()),
        ("scanned.pdf", vec![Page::new(1, "   ")]),
    ])
}

pub fn session_with(settings: Settings, generator: Arc<dyn Generator>, store: Arc<dyn VectorStore>) -> Session {
    Session::new(
        settings,
        Backends {
            extractor: extractor(),
            embedder: Arc::new(HashEmbedder::new(64)),
            generator,
            store,
        },
    )
    .expect("session")
}

pub fn session(settings: Settings, generator: Arc<dyn Generator>) -> Session {
    session_with(settings, generator, Arc::new(MemoryStore::new()))
}

pub fn passage(rank: usize, text: &str, page: usize) -> RetrievedPassage {
    RetrievedPassage {
        chunk: Chunk {
            id: format!("manual:{}", rank - 1),
            source: "manual".into(),
            ordinal: rank - 1,
            page_start: page,
            page_end: page,
            char_offset: 0,
            text: text.into(),
        },
        score: 1.0 - rank as f32 * 0.1,
        rank,
    }
}
