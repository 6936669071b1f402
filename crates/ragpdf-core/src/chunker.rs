//! Fixed-size sliding-window chunking with page provenance.
//!
//! Page texts are concatenated without separators; page boundaries are kept
//! on the side so each chunk can cite the page(s) it came from. Sizes are in
//! characters (Unicode scalar values), never bytes.

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document, Page};

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

/// Character span of one non-empty page inside the concatenated text.
struct PageSpan {
    start: usize,
    number: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than 0".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    pub fn overlap(&self) -> usize { self.overlap }

    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk(&document.id, &document.pages)
    }

    /// Split `pages` into windows of `chunk_size` characters advancing by
    /// `chunk_size - overlap`. Stops at the first window that reaches the end
    /// of the text, so the last chunk may be shorter.
    pub fn chunk(&self, source: &str, pages: &[Page]) -> Vec<Chunk> {
        let mut chars: Vec<char> = Vec::new();
        let mut spans: Vec<PageSpan> = Vec::new();
        for page in pages {
            let before = chars.len();
            chars.extend(page.text.chars());
            if chars.len() > before {
                spans.push(PageSpan { start: before, number: page.number });
            }
        }
        if chars.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let total = chars.len();
        let mut chunks = Vec::with_capacity(expected_count(total, self.chunk_size, self.overlap));
        let mut start = 0usize;
        loop {
            let end = (start + self.chunk_size).min(total);
            let ordinal = chunks.len();
            chunks.push(Chunk {
                id: format!("{}:{}", source, ordinal),
                source: source.to_string(),
                ordinal,
                page_start: page_at(&spans, start),
                page_end: page_at(&spans, end - 1),
                char_offset: start,
                text: chars[start..end].iter().collect(),
            });
            if end >= total {
                break;
            }
            start += step;
        }
        tracing::debug!(source, chunks = chunks.len(), chars = total, "chunked document");
        chunks
    }
}

/// Convenience wrapper over [`Chunker`].
pub fn chunk_pages(source: &str, pages: &[Page], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(chunk_size, overlap)?.chunk(source, pages))
}

/// Number of chunks produced for a text of `len` characters.
pub fn expected_count(len: usize, chunk_size: usize, overlap: usize) -> usize {
    if len == 0 {
        0
    } else if len <= chunk_size {
        1
    } else {
        (len - overlap).div_ceil(chunk_size - overlap)
    }
}

fn page_at(spans: &[PageSpan], pos: usize) -> usize {
    let idx = spans.partition_point(|s| s.start <= pos);
    spans[idx.saturating_sub(1)].number
}
