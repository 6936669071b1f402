//! Process-local store, used by `--ephemeral` sessions and tests.
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::VectorStore;
use ragpdf_core::types::{CollectionInfo, IndexEntry, StoredIndex};

use crate::cache::EmbeddingCache;

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, StoredIndex>>,
    cache: Mutex<HashMap<(String, String), Vec<f32>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_vectors(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("memory store lock poisoned".into())
}

impl VectorStore for MemoryStore {
    fn save(&self, collection: &str, dim: usize, entries: &[IndexEntry]) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
        }
        let stored = StoredIndex { dim, entries: entries.to_vec() };
        self.collections.lock().map_err(poisoned)?.insert(collection.to_string(), stored);
        Ok(())
    }

    fn load(&self, collection: &str) -> Result<Option<StoredIndex>> {
        Ok(self.collections.lock().map_err(poisoned)?.get(collection).cloned())
    }

    fn collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self
            .collections
            .lock()
            .map_err(poisoned)?
            .iter()
            .map(|(name, s)| CollectionInfo { name: name.clone(), entries: s.entries.len() })
            .collect())
    }

    fn remove(&self, collection: &str) -> Result<()> {
        self.collections.lock().map_err(poisoned)?.remove(collection);
        Ok(())
    }
}

impl EmbeddingCache for MemoryStore {
    fn get_many(&self, model_id: &str, dim: usize, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let cache = self.cache.lock().map_err(poisoned)?;
        Ok(hashes
            .iter()
            .filter_map(|h| {
                cache
                    .get(&(model_id.to_string(), h.clone()))
                    .filter(|v| v.len() == dim)
                    .map(|v| (h.clone(), v.clone()))
            })
            .collect())
    }

    fn put_many(&self, model_id: &str, _dim: usize, entries: &[(String, Vec<f32>)]) -> Result<()> {
        let mut cache = self.cache.lock().map_err(poisoned)?;
        for (h, v) in entries {
            cache.insert((model_id.to_string(), h.clone()), v.clone());
        }
        Ok(())
    }
}
