//! LanceStore tests run on plain threads: the store owns its own runtime.
use tempfile::TempDir;

use ragpdf_core::error::Error;
use ragpdf_core::traits::VectorStore;
use ragpdf_core::types::{Chunk, IndexEntry};
use ragpdf_vector::{EmbeddingCache, LanceStore, VectorIndex};

fn entries(n: usize, dim: usize) -> Vec<IndexEntry> {
    (0..n)
        .map(|i| IndexEntry {
            chunk: Chunk {
                id: format!("manual:{i}"),
                source: "manual".into(),
                ordinal: i,
                page_start: i + 1,
                page_end: i + 2,
                char_offset: i * 350,
                text: format!("text of chunk {i} with 'quotes'"),
            },
            vector: (0..dim).map(|d| ((i + d) % 7) as f32 + 0.5).collect(),
        })
        .collect()
}

#[test]
fn save_then_load_preserves_entries_and_order() {
    let tmp = TempDir::new().unwrap();
    let store = LanceStore::open(tmp.path()).unwrap();
    let saved = entries(25, 8);
    store.save("pdf_manual", 8, &saved).unwrap();

    let loaded = store.load("pdf_manual").unwrap().expect("collection");
    assert_eq!(loaded.dim, 8);
    assert_eq!(loaded.entries, saved);
}

#[test]
fn load_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let store = LanceStore::open(tmp.path()).unwrap();
        VectorIndex::build(4, entries(5, 4)).unwrap().persist(&store, "pdf_manual").unwrap();
    }
    let store = LanceStore::open(tmp.path()).unwrap();
    let index = VectorIndex::load(&store, "pdf_manual", Some(4)).unwrap();
    assert_eq!(index.len(), 5);
}

#[test]
fn missing_collection_loads_as_none() {
    let tmp = TempDir::new().unwrap();
    let store = LanceStore::open(tmp.path()).unwrap();
    assert!(store.load("pdf_absent").unwrap().is_none());
    assert!(store.collections().unwrap().is_empty());
}

#[test]
fn save_replaces_previous_contents() {
    let tmp = TempDir::new().unwrap();
    let store = LanceStore::open(tmp.path()).unwrap();
    store.save("pdf_manual", 4, &entries(10, 4)).unwrap();
    store.save("pdf_manual", 4, &entries(3, 4)).unwrap();
    assert_eq!(store.load("pdf_manual").unwrap().unwrap().entries.len(), 3);
    // a third save reuses the first slot
    store.save("pdf_manual", 4, &entries(6, 4)).unwrap();
    assert_eq!(store.load("pdf_manual").unwrap().unwrap().entries.len(), 6);
}

#[test]
fn save_with_new_dimension_replaces_collection() {
    let tmp = TempDir::new().unwrap();
    let store = LanceStore::open(tmp.path()).unwrap();
    store.save("pdf_manual", 4, &entries(3, 4)).unwrap();
    store.save("pdf_manual", 6, &entries(2, 6)).unwrap();
    let loaded = store.load("pdf_manual").unwrap().unwrap();
    assert_eq!(loaded.dim, 6);
    assert_eq!(loaded.entries.len(), 2);
}

#[test]
fn mismatched_vectors_are_rejected_before_writing() {
    let tmp = TempDir::new().unwrap();
    let store = LanceStore::open(tmp.path()).unwrap();
    store.save("pdf_manual", 4, &entries(2, 4)).unwrap();
    let err = store.save("pdf_manual", 4, &entries(2, 5)).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 5 }));
    assert_eq!(store.load("pdf_manual").unwrap().unwrap().entries.len(), 2);
}

#[test]
fn collections_lists_counts_and_remove_forgets() {
    let tmp = TempDir::new().unwrap();
    let store = LanceStore::open(tmp.path()).unwrap();
    store.save("pdf_b", 4, &entries(2, 4)).unwrap();
    store.save("pdf_a", 4, &entries(5, 4)).unwrap();

    let listed = store.collections().unwrap();
    let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["pdf_a", "pdf_b"]);
    assert_eq!(listed[0].entries, 5);

    store.remove("pdf_a").unwrap();
    assert!(store.load("pdf_a").unwrap().is_none());
    assert_eq!(store.collections().unwrap().len(), 1);
}

#[test]
fn embedding_cache_round_trip_per_model() {
    let tmp = TempDir::new().unwrap();
    let store = LanceStore::open(tmp.path()).unwrap();
    let rows = vec![("h1".to_string(), vec![1.0, 2.0, 3.0]), ("h2".to_string(), vec![4.0, 5.0, 6.0])];
    store.put_many("sentence-transformers/all-MiniLM-L6-v2", 3, &rows).unwrap();

    let wanted = vec!["h1".to_string(), "h3".to_string()];
    let got = store.get_many("sentence-transformers/all-MiniLM-L6-v2", 3, &wanted).unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got["h1"], vec![1.0, 2.0, 3.0]);

    assert!(store.get_many("other-model", 3, &wanted).unwrap().is_empty());
}
