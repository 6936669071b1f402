//! Domain types shared by the extractor, index, retriever and chains.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// One page of extracted text. `number` is 1-based and keeps the PDF's
/// numbering even when blank pages were skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub text: String,
}

impl Page {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self { number, text: text.into() }
    }
}

/// A loaded PDF.
///
/// - `id`: stable identity (file stem), used as the chunk id prefix
/// - `path`: where the file was read from
/// - `pages`: extracted pages in reading order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
    pub pages: Vec<Page>,
}

impl Document {
    /// Identity of the document at `path`: the file stem, or the file name
    /// when there is no stem.
    pub fn id_for(path: &Path) -> String {
        path.file_stem()
            .or_else(|| path.file_name())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// A contiguous window of document text, the unit of retrieval.
///
/// `char_offset` counts characters into the concatenated page texts.
/// `page_start`/`page_end` are equal unless the window crosses a page break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: String,
    pub ordinal: usize,
    pub page_start: usize,
    pub page_end: usize,
    pub char_offset: usize,
    pub text: String,
}

impl Chunk {
    /// Human readable page reference, `7` or `7-8`.
    pub fn page_label(&self) -> String {
        if self.page_start == self.page_end {
            self.page_start.to_string()
        } else {
            format!("{}-{}", self.page_start, self.page_end)
        }
    }
}

/// A chunk and its embedding, as stored by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Everything a vector store keeps for one collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredIndex {
    pub dim: usize,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub entries: usize,
}

/// A chunk returned for a question. `score` is cosine similarity (higher is
/// better); `rank` starts at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub chunk: Chunk,
    pub score: f32,
    pub rank: usize,
}

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { question: question.into(), answer: answer.into(), at: Utc::now() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 1000 }
    }
}

/// How retrieved passages are combined into one answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainType {
    #[default]
    Stuff,
    MapReduce,
    Refine,
    MapRerank,
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainType::Stuff => "stuff",
            ChainType::MapReduce => "map_reduce",
            ChainType::Refine => "refine",
            ChainType::MapRerank => "map_rerank",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    #[default]
    Buffer,
    Window,
    Summary,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryType::Buffer => "buffer",
            MemoryType::Window => "window",
            MemoryType::Summary => "summary",
        };
        f.write_str(name)
    }
}
