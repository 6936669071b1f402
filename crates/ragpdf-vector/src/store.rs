//! LanceDB-backed [`VectorStore`] and [`EmbeddingCache`].
//!
//! Each collection owns two slot tables per vector dimension
//! (`<name>__<dim>_a`, `<name>__<dim>_b`). A save rewrites the inactive slot
//! and then flips the `active:<name>` pointer in the meta table, so readers
//! only ever see a complete collection.
use anyhow::{anyhow, Result as AnyResult};
use arrow_array::{Int32Array, Int64Array, RecordBatch, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use lancedb::Connection;
use lancedb::query::ExecutableQuery;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::VectorStore;
use ragpdf_core::types::{Chunk, CollectionInfo, IndexEntry, StoredIndex};

use crate::cache::EmbeddingCache;
use crate::schema::{build_cache_schema, build_entries_schema};
use crate::table::{
    append_batch, clear_table, count_rows, delete_meta, ensure_table, get_meta, i32_col, i64_col, list_meta,
    open_db, scan, set_meta, str_col, table_exists, vector_at, vector_col, vectors_to_array,
};

const META_TABLE: &str = "meta";
const ACTIVE_PREFIX: &str = "active:";

/// Value of an `active:<collection>` pointer: `<table>|<dim>`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActivePointer {
    table: String,
    dim: usize,
}

impl ActivePointer {
    fn encode(&self) -> String {
        format!("{}|{}", self.table, self.dim)
    }

    fn decode(raw: &str) -> Option<Self> {
        let (table, dim) = raw.rsplit_once('|')?;
        Some(Self { table: table.to_string(), dim: dim.parse().ok()? })
    }
}

pub struct LanceStore {
    rt: Runtime,
    conn: Connection,
}

impl LanceStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Storage(format!("creating {}: {}", dir.display(), e)))?;
        let rt = Runtime::new().map_err(|e| Error::Storage(e.to_string()))?;
        let uri = dir.to_string_lossy().to_string();
        let conn = rt.block_on(open_db(&uri)).map_err(storage)?;
        tracing::debug!(dir = %dir.display(), "opened lance store");
        Ok(Self { rt, conn })
    }

    fn run<T>(&self, fut: impl Future<Output = AnyResult<T>>) -> Result<T> {
        self.rt.block_on(fut).map_err(storage)
    }

    async fn active(&self, collection: &str) -> AnyResult<Option<ActivePointer>> {
        let key = format!("{ACTIVE_PREFIX}{collection}");
        match get_meta(&self.conn, META_TABLE, &key).await? {
            Some(raw) => ActivePointer::decode(&raw)
                .map(Some)
                .ok_or_else(|| anyhow!("corrupt pointer for {}: {}", collection, raw)),
            None => Ok(None),
        }
    }

    async fn save_async(&self, collection: &str, dim: usize, entries: &[IndexEntry]) -> AnyResult<()> {
        let current = self.active(collection).await?;
        let target = next_slot(collection, dim, current.as_ref());
        let dim_i32 = i32::try_from(dim)?;

        clear_table(&self.conn, &target).await?;
        ensure_table(&self.conn, &target, build_entries_schema(dim_i32)).await?;
        if !entries.is_empty() {
            append_batch(&self.conn, &target, entries_to_batch(entries, dim_i32)?).await?;
        }

        let pointer = ActivePointer { table: target.clone(), dim };
        set_meta(&self.conn, META_TABLE, &format!("{ACTIVE_PREFIX}{collection}"), &pointer.encode()).await?;
        tracing::debug!(collection, table = %target, rows = entries.len(), "collection pointer flipped");
        Ok(())
    }

    async fn load_async(&self, collection: &str) -> AnyResult<Option<StoredIndex>> {
        let Some(pointer) = self.active(collection).await? else {
            return Ok(None);
        };
        if !table_exists(&self.conn, &pointer.table).await? {
            return Err(anyhow!("active table {} for {} is missing", pointer.table, collection));
        }
        let mut rows: Vec<(i32, IndexEntry)> = Vec::new();
        for batch in scan(&self.conn, &pointer.table).await? {
            rows.extend(batch_to_entries(&batch)?);
        }
        rows.sort_by_key(|(pos, _)| *pos);
        Ok(Some(StoredIndex { dim: pointer.dim, entries: rows.into_iter().map(|(_, e)| e).collect() }))
    }

    async fn collections_async(&self) -> AnyResult<Vec<CollectionInfo>> {
        let mut out = Vec::new();
        for (key, raw) in list_meta(&self.conn, META_TABLE, ACTIVE_PREFIX).await? {
            let name = key.trim_start_matches(ACTIVE_PREFIX).to_string();
            let Some(pointer) = ActivePointer::decode(&raw) else {
                tracing::warn!(collection = %name, "skipping collection with corrupt pointer");
                continue;
            };
            let entries = if table_exists(&self.conn, &pointer.table).await? {
                count_rows(&self.conn, &pointer.table).await?
            } else {
                0
            };
            out.push(CollectionInfo { name, entries });
        }
        Ok(out)
    }

    async fn remove_async(&self, collection: &str) -> AnyResult<()> {
        delete_meta(&self.conn, META_TABLE, &format!("{ACTIVE_PREFIX}{collection}")).await?;
        let names = self.conn.table_names().execute().await?;
        for name in names.iter().filter(|n| is_slot_of(collection, n)) {
            clear_table(&self.conn, name).await?;
        }
        Ok(())
    }

    async fn cache_get_async(&self, table: &str, hashes: &[String]) -> AnyResult<HashMap<String, Vec<f32>>> {
        let mut out = HashMap::new();
        if hashes.is_empty() || !table_exists(&self.conn, table).await? {
            return Ok(out);
        }
        let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
        // naive scan; the cache holds one row per distinct chunk text
        for batch in scan(&self.conn, table).await? {
            let hash_col = str_col(&batch, "content_hash")?;
            let vec_col = vector_col(&batch)?;
            for i in 0..batch.num_rows() {
                let h = hash_col.value(i);
                if wanted.contains(h) {
                    out.insert(h.to_string(), vector_at(vec_col, i));
                }
            }
        }
        Ok(out)
    }

    async fn cache_put_async(&self, table: &str, dim: usize, entries: &[(String, Vec<f32>)]) -> AnyResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let dim_i32 = i32::try_from(dim)?;
        ensure_table(&self.conn, table, build_cache_schema(dim_i32)).await?;
        let now = Utc::now().timestamp_millis();
        let vectors: Vec<&[f32]> = entries.iter().map(|(_, v)| v.as_slice()).collect();
        let batch = RecordBatch::try_new(
            build_cache_schema(dim_i32),
            vec![
                Arc::new(StringArray::from(entries.iter().map(|(h, _)| h.clone()).collect::<Vec<_>>())),
                Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
                Arc::new(vectors_to_array(&vectors, dim_i32)),
            ],
        )?;
        append_batch(&self.conn, table, batch).await
    }
}

impl VectorStore for LanceStore {
    fn save(&self, collection: &str, dim: usize, entries: &[IndexEntry]) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
        }
        self.run(self.save_async(collection, dim, entries))
    }

    fn load(&self, collection: &str) -> Result<Option<StoredIndex>> {
        self.run(self.load_async(collection))
    }

    fn collections(&self) -> Result<Vec<CollectionInfo>> {
        self.run(self.collections_async())
    }

    fn remove(&self, collection: &str) -> Result<()> {
        self.run(self.remove_async(collection))
    }
}

impl EmbeddingCache for LanceStore {
    fn get_many(&self, model_id: &str, dim: usize, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        self.run(self.cache_get_async(&cache_table_name(model_id, dim), hashes))
    }

    fn put_many(&self, model_id: &str, dim: usize, entries: &[(String, Vec<f32>)]) -> Result<()> {
        if let Some((_, bad)) = entries.iter().find(|(_, v)| v.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
        }
        self.run(self.cache_put_async(&cache_table_name(model_id, dim), dim, entries))
    }
}

fn storage(e: anyhow::Error) -> Error {
    Error::Storage(format!("{:#}", e))
}

fn slot_name(collection: &str, dim: usize, slot: char) -> String {
    format!("{collection}__{dim}_{slot}")
}

/// The slot to write next: the other slot of the same dimension, or slot `a`
/// when the dimension changes.
fn next_slot(collection: &str, dim: usize, current: Option<&ActivePointer>) -> String {
    let a = slot_name(collection, dim, 'a');
    match current {
        Some(p) if p.table == a => slot_name(collection, dim, 'b'),
        _ => a,
    }
}

fn is_slot_of(collection: &str, table: &str) -> bool {
    let Some(rest) = table.strip_prefix(collection).and_then(|r| r.strip_prefix("__")) else {
        return false;
    };
    match rest.rsplit_once('_') {
        Some((dim, slot)) => !dim.is_empty() && dim.bytes().all(|b| b.is_ascii_digit()) && (slot == "a" || slot == "b"),
        None => false,
    }
}

/// Table holding cached vectors of one embedder.
pub fn cache_table_name(model_id: &str, dim: usize) -> String {
    let clean: String = model_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("cache_{clean}_{dim}")
}

fn to_i32(v: usize, what: &str) -> AnyResult<i32> {
    i32::try_from(v).map_err(|_| anyhow!("{} {} out of range", what, v))
}

fn entries_to_batch(entries: &[IndexEntry], dim: i32) -> AnyResult<RecordBatch> {
    let mut positions = Vec::with_capacity(entries.len());
    let mut ids = Vec::with_capacity(entries.len());
    let mut sources = Vec::with_capacity(entries.len());
    let mut ordinals = Vec::with_capacity(entries.len());
    let mut page_starts = Vec::with_capacity(entries.len());
    let mut page_ends = Vec::with_capacity(entries.len());
    let mut offsets = Vec::with_capacity(entries.len());
    let mut texts = Vec::with_capacity(entries.len());
    for (pos, e) in entries.iter().enumerate() {
        let c = &e.chunk;
        positions.push(to_i32(pos, "position")?);
        ids.push(c.id.clone());
        sources.push(c.source.clone());
        ordinals.push(to_i32(c.ordinal, "ordinal")?);
        page_starts.push(to_i32(c.page_start, "page")?);
        page_ends.push(to_i32(c.page_end, "page")?);
        offsets.push(i64::try_from(c.char_offset)?);
        texts.push(c.text.clone());
    }
    let vectors: Vec<&[f32]> = entries.iter().map(|e| e.vector.as_slice()).collect();
    Ok(RecordBatch::try_new(
        build_entries_schema(dim),
        vec![
            Arc::new(Int32Array::from(positions)),
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(sources)),
            Arc::new(Int32Array::from(ordinals)),
            Arc::new(Int32Array::from(page_starts)),
            Arc::new(Int32Array::from(page_ends)),
            Arc::new(Int64Array::from(offsets)),
            Arc::new(StringArray::from(texts)),
            Arc::new(vectors_to_array(&vectors, dim)),
        ],
    )?)
}

fn batch_to_entries(batch: &RecordBatch) -> AnyResult<Vec<(i32, IndexEntry)>> {
    let positions = i32_col(batch, "position")?;
    let ids = str_col(batch, "id")?;
    let sources = str_col(batch, "source")?;
    let ordinals = i32_col(batch, "ordinal")?;
    let page_starts = i32_col(batch, "page_start")?;
    let page_ends = i32_col(batch, "page_end")?;
    let offsets = i64_col(batch, "char_offset")?;
    let texts = str_col(batch, "text")?;
    let vectors = vector_col(batch)?;
    (0..batch.num_rows())
        .map(|i| {
            let chunk = Chunk {
                id: ids.value(i).to_string(),
                source: sources.value(i).to_string(),
                ordinal: usize::try_from(ordinals.value(i))?,
                page_start: usize::try_from(page_starts.value(i))?,
                page_end: usize::try_from(page_ends.value(i))?,
                char_offset: usize::try_from(offsets.value(i))?,
                text: texts.value(i).to_string(),
            };
            Ok((positions.value(i), IndexEntry { chunk, vector: vector_at(vectors, i) }))
        })
        .collect()
}
