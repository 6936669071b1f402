//! Exact in-memory cosine search over one collection.
//!
//! Collections are small (one PDF), so a linear scan is fast enough and keeps
//! results exact and reproducible. Persistence goes through a [`VectorStore`].

use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::VectorStore;
use ragpdf_core::types::{Chunk, IndexEntry};

/// A chunk with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dim: usize,
    entries: Vec<IndexEntry>,
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Index `entries` in the given order. Every vector must have length `dim`.
    pub fn build(dim: usize, entries: Vec<IndexEntry>) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("index dimension must be greater than 0".into()));
        }
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
        }
        let norms = entries.iter().map(|e| l2_norm(&e.vector)).collect();
        Ok(Self { dim, entries, norms })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn entries(&self) -> &[IndexEntry] { &self.entries }

    /// The `k` entries most similar to `vector`, best first. Equal scores keep
    /// insertion order.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(Error::InvalidConfig("k must be greater than 0".into()));
        }
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: vector.len() });
        }
        let qnorm = l2_norm(vector);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (e, &n))| (i, cosine(vector, qnorm, &e.vector, n)))
            .collect();
        // sort_by is stable
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk { chunk: self.entries[i].chunk.clone(), score })
            .collect())
    }

    pub fn persist(&self, store: &dyn VectorStore, collection: &str) -> Result<()> {
        store.save(collection, self.dim, &self.entries)?;
        tracing::info!(collection, entries = self.entries.len(), dim = self.dim, "index persisted");
        Ok(())
    }

    /// Load a persisted collection. With `expected_dim` set, a collection
    /// built by a different embedder is rejected.
    pub fn load(store: &dyn VectorStore, collection: &str, expected_dim: Option<usize>) -> Result<Self> {
        let stored = store
            .load(collection)?
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        if let Some(expected) = expected_dim {
            if stored.dim != expected {
                return Err(Error::DimensionMismatch { expected, actual: stored.dim });
            }
        }
        let index = Self::build(stored.dim, stored.entries)?;
        tracing::info!(collection, entries = index.len(), "index loaded");
        Ok(index)
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], na: f32, b: &[f32], nb: f32) -> f32 {
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (na * nb)
}
