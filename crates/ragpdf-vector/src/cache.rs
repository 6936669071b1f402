//! Embedding cache keyed by `(model id, content hash)`.
//!
//! [`CachedEmbedder`] consults the cache before calling the wrapped embedder
//! and writes misses through, so re-loading an unchanged PDF skips the model.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::Embedder;

pub trait EmbeddingCache: Send + Sync {
    /// Cached vectors for the hashes that are present. Missing hashes are
    /// simply absent from the map.
    fn get_many(&self, model_id: &str, dim: usize, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>>;
    fn put_many(&self, model_id: &str, dim: usize, entries: &[(String, Vec<f32>)]) -> Result<()>;
}

/// blake3 of the exact text, hex encoded.
pub fn hash_content(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Arc<dyn EmbeddingCache>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self { inner, cache }
    }
}

impl Embedder for CachedEmbedder {
    fn model_id(&self) -> &str { self.inner.model_id() }

    fn dim(&self) -> usize { self.inner.dim() }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.inner.model_id();
        let dim = self.inner.dim();
        let hashes: Vec<String> = texts.iter().map(|t| hash_content(t)).collect();

        // cache trouble degrades to a plain embed
        let mut found = match self.cache.get_many(model, dim, &hashes) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "embedding cache lookup failed");
                HashMap::new()
            }
        };
        found.retain(|_, v| v.len() == dim);

        let mut miss_idx = Vec::new();
        let mut miss_texts = Vec::new();
        let mut pending = HashSet::new();
        for (i, h) in hashes.iter().enumerate() {
            if !found.contains_key(h) && pending.insert(h.as_str()) {
                miss_idx.push(i);
                miss_texts.push(texts[i].clone());
            }
        }
        tracing::debug!(hits = texts.len() - miss_texts.len(), misses = miss_texts.len(), "embedding cache");

        if !miss_texts.is_empty() {
            let fresh = self.inner.embed_batch(&miss_texts)?;
            if fresh.len() != miss_texts.len() {
                return Err(Error::EmbeddingUnavailable(format!(
                    "embedder returned {} vectors for {} inputs",
                    fresh.len(),
                    miss_texts.len()
                )));
            }
            let entries: Vec<(String, Vec<f32>)> =
                miss_idx.iter().map(|&i| hashes[i].clone()).zip(fresh).collect();
            if let Err(e) = self.cache.put_many(model, dim, &entries) {
                tracing::warn!(error = %e, "embedding cache write failed");
            }
            found.extend(entries);
        }

        hashes
            .iter()
            .map(|h| {
                found
                    .get(h)
                    .cloned()
                    .ok_or_else(|| Error::EmbeddingUnavailable("missing vector after embedding".into()))
            })
            .collect()
    }
}
