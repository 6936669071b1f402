//! The question-answering session: ingest one PDF, then answer questions
//! about it with optional conversation memory.
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use ragpdf_core::chunker::Chunker;
use ragpdf_core::config::Settings;
use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::{Embedder, Extractor, Generator, VectorStore};
use ragpdf_core::types::{Chunk, CollectionInfo, Document, IndexEntry, RetrievedPassage, Turn};
use ragpdf_vector::{collection_name, VectorIndex};

use crate::chains::{build_chain, AnswerChain, ChainInput};
use crate::generation::TimedGenerator;
use crate::memory::{MemoryContext, MemoryManager};
use crate::prompt::{condense_prompt, render_history, INSUFFICIENT_CONTEXT};
use crate::retriever::Retriever;

/// External services a session talks to.
pub struct Backends {
    pub extractor: Arc<dyn Extractor>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub store: Arc<dyn VectorStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Ingesting,
    Ready,
    Querying,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Ingesting => "ingesting",
            SessionState::Ready => "ready",
            SessionState::Querying => "querying",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub collection: String,
    pub document_id: String,
    pub pages: usize,
    pub chunks: usize,
    pub dim: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    /// Passages the answer was built from, best first. Empty when ungrounded.
    pub passages: Vec<RetrievedPassage>,
    /// The rewritten question used for retrieval, when a follow-up was condensed.
    pub standalone_question: Option<String>,
    /// False when nothing relevant was retrieved and no generation happened.
    pub grounded: bool,
}

pub struct Session {
    settings: Settings,
    extractor: Arc<dyn Extractor>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn VectorStore>,
    chunker: Chunker,
    retriever: Retriever,
    chain: Box<dyn AnswerChain>,
    memory: Option<MemoryManager>,
    index: Option<Arc<VectorIndex>>,
    collection: Option<String>,
    state: SessionState,
    show_progress: bool,
}

impl Session {
    /// Validates `settings` before anything else happens.
    pub fn new(settings: Settings, backends: Backends) -> Result<Self> {
        settings.validate()?;
        let chunker = Chunker::from_settings(&settings.chunking)?;
        let generator: Arc<dyn Generator> = Arc::new(TimedGenerator::new(
            backends.generator,
            Duration::from_secs(settings.llm.timeout_secs),
        ));
        let memory = if settings.memory.enabled {
            Some(MemoryManager::new(&settings.memory, Some(Arc::clone(&generator)))?)
        } else {
            None
        };
        let chain = build_chain(settings.rag.chain_type, &settings.llm);
        tracing::info!(
            chain = %settings.rag.chain_type,
            memory = settings.memory.enabled,
            embedder = backends.embedder.model_id(),
            generator = generator.model_id(),
            "session created"
        );
        Ok(Self {
            retriever: Retriever::new(Arc::clone(&backends.embedder)),
            extractor: backends.extractor,
            embedder: backends.embedder,
            store: backends.store,
            generator,
            chunker,
            chain,
            memory,
            index: None,
            collection: None,
            state: SessionState::Idle,
            show_progress: false,
            settings,
        })
    }

    /// Show an embedding progress bar on stderr during `load`.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn state(&self) -> SessionState { self.state }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn collection(&self) -> Option<&str> { self.collection.as_deref() }

    pub fn index_len(&self) -> usize {
        self.index.as_ref().map(|i| i.len()).unwrap_or(0)
    }

    pub fn memory_context(&self) -> MemoryContext {
        self.memory.as_ref().map(|m| m.context()).unwrap_or_default()
    }

    fn ensure_available(&self) -> Result<()> {
        match self.state {
            SessionState::Terminated => Err(Error::InvalidState(self.state.to_string())),
            SessionState::Ingesting | SessionState::Querying => Err(Error::Busy(self.state.to_string())),
            SessionState::Idle | SessionState::Ready => Ok(()),
        }
    }

    pub fn collections(&self) -> Result<Vec<CollectionInfo>> {
        if self.state == SessionState::Terminated {
            return Err(Error::InvalidState(self.state.to_string()));
        }
        self.store.collections()
    }

    /// Extract, chunk, embed, index and persist `path`, then make it the
    /// active document. On failure the previous document stays active.
    pub fn load(&mut self, path: &Path) -> Result<LoadReport> {
        self.ensure_available()?;
        self.state = SessionState::Ingesting;
        match self.ingest(path) {
            Ok((index, report)) => {
                self.activate(index, report.collection.clone());
                tracing::info!(
                    collection = %report.collection,
                    pages = report.pages,
                    chunks = report.chunks,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "document loaded"
                );
                Ok(report)
            }
            Err(e) => {
                self.state = if self.index.is_some() { SessionState::Ready } else { SessionState::Idle };
                tracing::warn!(path = %path.display(), error = %e, "load failed");
                Err(e)
            }
        }
    }

    /// Reopen a persisted collection without re-reading its PDF.
    pub fn resume(&mut self, collection: &str) -> Result<usize> {
        self.ensure_available()?;
        let prior = self.state;
        self.state = SessionState::Ingesting;
        match VectorIndex::load(self.store.as_ref(), collection, Some(self.embedder.dim())) {
            Ok(index) => {
                let n = index.len();
                self.activate(index, collection.to_string());
                Ok(n)
            }
            Err(e) => {
                self.state = prior;
                Err(e)
            }
        }
    }

    fn activate(&mut self, index: VectorIndex, collection: String) {
        self.index = Some(Arc::new(index));
        self.collection = Some(collection);
        if let Some(memory) = &mut self.memory {
            memory.clear();
        }
        self.state = SessionState::Ready;
    }

    fn ingest(&self, path: &Path) -> Result<(VectorIndex, LoadReport)> {
        let start = Instant::now();
        let pages = self.extractor.extract(path)?;
        let document = Document { id: Document::id_for(path), path: path.to_path_buf(), pages };
        let chunks = self.chunker.chunk_document(&document);
        if chunks.is_empty() {
            return Err(Error::EmptyDocument(path.display().to_string()));
        }
        let chunk_count = chunks.len();

        let vectors = self.embed_chunks(&chunks)?;
        let dim = self.embedder.dim();
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        let index = VectorIndex::build(dim, entries)?;

        let collection = collection_name(&self.settings.vector_db.collection_prefix, &document.id);
        index.persist(self.store.as_ref(), &collection)?;

        let report = LoadReport {
            collection,
            document_id: document.id,
            pages: document.pages.len(),
            chunks: chunk_count,
            dim,
            elapsed: start.elapsed(),
        };
        Ok((index, report))
    }

    /// Embed every chunk in `embedding.batch_size` batches. Nothing is
    /// returned unless all batches succeed.
    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let dim = self.embedder.dim();
        let batch_size = self.settings.embedding.batch_size;
        let pb = if self.show_progress { ProgressBar::new(chunks.len() as u64) } else { ProgressBar::hidden() };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let out = self.embedder.embed_batch(&texts)?;
            if out.len() != texts.len() {
                return Err(Error::EmbeddingUnavailable(format!(
                    "embedder returned {} vectors for {} chunks",
                    out.len(),
                    texts.len()
                )));
            }
            if let Some(bad) = out.iter().find(|v| v.len() != dim) {
                return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
            }
            vectors.extend(out);
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("embedded");
        Ok(vectors)
    }

    /// Answer `question` from the active document.
    ///
    /// With memory enabled and non-empty, a follow-up is first rewritten into
    /// a standalone question for retrieval. When nothing relevant is found
    /// the fixed insufficient-context answer is returned without calling the
    /// generator. Memory records only grounded answers.
    pub fn ask(&mut self, question: &str) -> Result<Answer> {
        self.ensure_available()?;
        let index = match (&self.index, self.state) {
            (Some(index), SessionState::Ready) => Arc::clone(index),
            _ => return Err(Error::InvalidState(format!("{} (load a PDF first)", self.state))),
        };
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidConfig("question must not be empty".into()));
        }

        self.state = SessionState::Querying;
        let result = self.answer(&index, question);
        self.state = SessionState::Ready;

        if let Ok(answer) = &result {
            if answer.grounded {
                if let Some(memory) = &mut self.memory {
                    memory.append(Turn::new(question, answer.answer.clone()));
                }
            }
        }
        result
    }

    fn answer(&self, index: &VectorIndex, question: &str) -> Result<Answer> {
        let params = self.settings.llm.params();
        let history = self
            .memory
            .as_ref()
            .map(|m| m.context())
            .and_then(|ctx| render_history(&ctx));

        let standalone = match &history {
            Some(h) => {
                let rewritten = self.generator.generate(&condense_prompt(h, question), &params)?;
                let rewritten = rewritten.trim();
                (!rewritten.is_empty()).then(|| rewritten.to_string())
            }
            None => None,
        };
        let query = standalone.as_deref().unwrap_or(question);

        let rag = &self.settings.rag;
        let passages = self.retriever.retrieve(index, query, rag.top_k, rag.similarity_threshold)?;
        let input = ChainInput {
            question,
            passages: &passages,
            history: history.as_deref(),
            standalone: standalone.as_deref(),
        };
        match self.chain.answer(self.generator.as_ref(), &params, &input) {
            Ok(text) => Ok(Answer { answer: text.trim().to_string(), passages, standalone_question: standalone, grounded: true }),
            Err(Error::NoRelevantContext) => {
                tracing::info!(question = query, "no passage above threshold");
                Ok(Answer {
                    answer: INSUFFICIENT_CONTEXT.to_string(),
                    passages: Vec::new(),
                    standalone_question: standalone,
                    grounded: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn clear_memory(&mut self) -> Result<()> {
        self.ensure_available()?;
        if let Some(memory) = &mut self.memory {
            memory.clear();
        }
        Ok(())
    }

    pub fn exit(&mut self) -> Result<()> {
        if self.state == SessionState::Terminated {
            return Err(Error::InvalidState(self.state.to_string()));
        }
        self.state = SessionState::Terminated;
        self.index = None;
        if let Some(memory) = &mut self.memory {
            memory.clear();
        }
        tracing::info!("session terminated");
        Ok(())
    }
}

/// A session shared between threads. A call made while another is running
/// is rejected with `Busy`, never queued.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Session>>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self { inner: Arc::new(Mutex::new(session)) }
    }

    fn with<T>(&self, op: &str, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        match self.inner.try_lock() {
            Ok(mut guard) => f(&mut guard),
            Err(TryLockError::WouldBlock) => Err(Error::Busy(op.to_string())),
            Err(TryLockError::Poisoned(poisoned)) => {
                tracing::warn!(op, "session lock poisoned, continuing");
                let mut guard = poisoned.into_inner();
                f(&mut guard)
            }
        }
    }

    pub fn load(&self, path: &Path) -> Result<LoadReport> {
        self.with("load", |s| s.load(path))
    }

    pub fn resume(&self, collection: &str) -> Result<usize> {
        self.with("resume", |s| s.resume(collection))
    }

    pub fn ask(&self, question: &str) -> Result<Answer> {
        self.with("ask", |s| s.ask(question))
    }

    pub fn clear_memory(&self) -> Result<()> {
        self.with("clear_memory", |s| s.clear_memory())
    }

    pub fn collections(&self) -> Result<Vec<CollectionInfo>> {
        self.with("collections", |s| s.collections())
    }

    pub fn state(&self) -> Result<SessionState> {
        self.with("state", |s| Ok(s.state()))
    }

    pub fn exit(&self) -> Result<()> {
        self.with("exit", |s| s.exit())
    }
}
