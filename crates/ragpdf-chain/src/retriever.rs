use std::sync::Arc;

use ragpdf_core::error::Result;
use ragpdf_core::traits::Embedder;
use ragpdf_core::types::RetrievedPassage;
use ragpdf_vector::VectorIndex;

/// Embeds questions and looks them up in an index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Top `k` passages scoring at least `threshold`, ranked from 1. An empty
    /// result is not an error.
    pub fn retrieve(&self, index: &VectorIndex, question: &str, k: usize, threshold: f32) -> Result<Vec<RetrievedPassage>> {
        let vector = self.embedder.embed(question)?;
        let hits = index.query(&vector, k)?;
        let total = hits.len();
        let passages: Vec<RetrievedPassage> = hits
            .into_iter()
            .filter(|h| h.score >= threshold)
            .enumerate()
            .map(|(i, h)| RetrievedPassage { chunk: h.chunk, score: h.score, rank: i + 1 })
            .collect();
        tracing::debug!(k, threshold, candidates = total, kept = passages.len(), "retrieved passages");
        Ok(passages)
    }
}
