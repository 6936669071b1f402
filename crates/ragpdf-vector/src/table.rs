//! LanceDB connection and housekeeping helpers.
//!
//! Database open, ensure-table, column accessors, and a key/value meta table
//! holding the active table pointer of every collection.
use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::{
    Array, FixedSizeListArray, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMillisecondArray,
};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

use crate::schema::build_meta_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// Remove every row of `name`, keeping the table itself.
pub async fn clear_table(conn: &Connection, name: &str) -> Result<()> {
    if !table_exists(conn, name).await? {
        return Ok(());
    }
    let t = conn.open_table(name).execute().await?;
    t.delete("true").await?;
    Ok(())
}

pub async fn append_batch(conn: &Connection, name: &str, batch: RecordBatch) -> Result<()> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    conn.open_table(name).execute().await?.add(reader).execute().await?;
    Ok(())
}

/// Every batch of a full table scan.
pub async fn scan(conn: &Connection, name: &str) -> Result<Vec<RecordBatch>> {
    let t = conn.open_table(name).execute().await?;
    let stream = t.query().execute().await?;
    Ok(stream.try_collect::<Vec<_>>().await?)
}

pub async fn count_rows(conn: &Connection, name: &str) -> Result<usize> {
    let t = conn.open_table(name).execute().await?;
    Ok(t.count_rows(None).await?)
}

pub fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("{} column missing", name))
}

pub fn i32_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow!("{} column missing", name))
}

pub fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow!("{} column missing", name))
}

pub fn vector_at(col: &FixedSizeListArray, i: usize) -> Vec<f32> {
    col.value(i)
        .as_primitive::<arrow_array::types::Float32Type>()
        .values()
        .iter()
        .copied()
        .collect()
}

pub fn vector_col<'a>(batch: &'a RecordBatch) -> Result<&'a FixedSizeListArray> {
    batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow!("vector column missing"))
}

pub fn vectors_to_array(vectors: &[&[f32]], dim: i32) -> FixedSizeListArray {
    let rows: Vec<Option<Vec<Option<f32>>>> = vectors
        .iter()
        .map(|v| Some(v.iter().map(|&x| Some(x)).collect()))
        .collect();
    FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows.into_iter(), dim)
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub async fn ensure_meta_table(conn: &Connection, name: &str) -> Result<()> {
    ensure_table(conn, name, build_meta_schema()).await
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_meta_table(conn, table).await?;
    let t = conn.open_table(table).execute().await?;
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    // Upsert behavior via merge_insert: key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await?;
    Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, table).await? {
        return Ok(None);
    }
    let t = conn.open_table(table).execute().await?;
    let mut stream = t.query().only_if(format!("key = {}", quote(key))).execute().await?;
    while let Some(batch) = stream.try_next().await? {
        if batch.num_rows() == 0 {
            continue;
        }
        let val = str_col(&batch, "value")?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

pub async fn delete_meta(conn: &Connection, table: &str, key: &str) -> Result<()> {
    if !table_exists(conn, table).await? {
        return Ok(());
    }
    let t = conn.open_table(table).execute().await?;
    t.delete(&format!("key = {}", quote(key))).await?;
    Ok(())
}

/// All `(key, value)` pairs whose key starts with `prefix`, sorted by key.
pub async fn list_meta(conn: &Connection, table: &str, prefix: &str) -> Result<Vec<(String, String)>> {
    if !table_exists(conn, table).await? {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for batch in scan(conn, table).await? {
        let keys = str_col(&batch, "key")?;
        let values = str_col(&batch, "value")?;
        for i in 0..batch.num_rows() {
            if keys.is_valid(i) && keys.value(i).starts_with(prefix) {
                out.push((keys.value(i).to_string(), values.value(i).to_string()));
            }
        }
    }
    out.sort();
    Ok(out)
}
