use std::path::Path;

use crate::error::Result;
use crate::types::{CollectionInfo, GenerationParams, IndexEntry, Page, StoredIndex};

/// Turns a document on disk into page-indexed text.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<Page>>;
}

pub trait Embedder: Send + Sync {
    /// Stable identifier for the model (used as the embedding cache key).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    /// One vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        out.pop().ok_or_else(|| crate::error::Error::EmbeddingUnavailable("embedder returned no vector".into()))
    }
}

pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Opaque persistent storage of index entries, addressed by collection.
///
/// `save` replaces the collection atomically: `load` sees either the old or
/// the new entries, never a mix.
pub trait VectorStore: Send + Sync {
    fn save(&self, collection: &str, dim: usize, entries: &[IndexEntry]) -> Result<()>;
    fn load(&self, collection: &str) -> Result<Option<StoredIndex>>;
    fn collections(&self) -> Result<Vec<CollectionInfo>>;
    fn remove(&self, collection: &str) -> Result<()>;
}
