//! Vector index, persistent collection storage and the embedding cache.

pub mod cache;
pub mod index;
pub mod memory;
pub mod schema;
pub mod store;
pub mod table;

pub use cache::{hash_content, CachedEmbedder, EmbeddingCache};
pub use index::{ScoredChunk, VectorIndex};
pub use memory::MemoryStore;
pub use store::LanceStore;

/// Collection name for a document: `<prefix>_<stem>`, with every character
/// outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn collection_name(prefix: &str, document_id: &str) -> String {
    format!("{}_{}", prefix, document_id)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
