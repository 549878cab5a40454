//! SQLite-backed vector table for project chunks.
//!
//! Chunk metadata lives in a plain table keyed by `document_id`; embeddings
//! live in a `vec0` virtual table (sqlite-vec) under the same key. A small
//! metadata table stamps the vector dimension so an incompatible embedding
//! model is rejected at open time instead of corrupting search results.

use crate::error::{Result, VectorStoreError};
use rusqlite::{ffi::sqlite3_auto_extension, params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_TABLE_NAME: &str = "software_project_index";

const META_DIMENSION_KEY: &str = "vector_dim";

/// One chunk row, minus its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document_id: String,
    pub file_path: String,
    pub content_hash: String,
    pub last_modified_timestamp: f64,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub extracted_text_chunk: String,
    pub original_path: String,
}

/// A chunk record paired with its embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub record: ChunkRecord,
    pub vector: Vec<f32>,
}

/// A search result: chunk record plus its distance to the query vector.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: ChunkRecord,
    pub distance: f32,
}

/// Vector store over a single project index table.
///
/// All operations serialize on the connection mutex; reads stay consistent
/// under concurrent writes without further coordination from callers.
pub struct VectorStore {
    conn: Mutex<Connection>,
    table: String,
    vec_table: String,
    dimension: usize,
    path: PathBuf,
}

impl VectorStore {
    /// Open the store at `path`, creating the schema if needed. Idempotent.
    ///
    /// Fails with [`VectorStoreError::SchemaMismatch`] when an existing
    /// table was built for a different vector dimension; the operator must
    /// delete the store file to recover.
    pub fn open_or_create(path: &Path, table_name: &str, vector_dim: usize) -> Result<Self> {
        // sqlite-vec must be registered before the first connection opens.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let table = table_name.to_string();
        let vec_table = format!("{table_name}_vec");
        let meta_table = format!("{table_name}_meta");

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                document_id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                last_modified_timestamp REAL NOT NULL,
                chunk_index INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                extracted_text_chunk TEXT NOT NULL,
                original_path TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_file_path ON {table}(file_path);

            CREATE TABLE IF NOT EXISTS {meta_table} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS {vec_table} USING vec0(
                document_id TEXT PRIMARY KEY,
                embedding float[{vector_dim}]
            );"
        ))?;

        let stored_dim: Option<String> = conn
            .query_row(
                &format!("SELECT value FROM {meta_table} WHERE key = ?1"),
                params![META_DIMENSION_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match stored_dim.and_then(|value| value.parse::<usize>().ok()) {
            Some(found) if found != vector_dim => {
                return Err(VectorStoreError::SchemaMismatch {
                    expected: vector_dim,
                    found,
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    &format!("INSERT OR REPLACE INTO {meta_table} (key, value) VALUES (?1, ?2)"),
                    params![META_DIMENSION_KEY, vector_dim.to_string()],
                )?;
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
            table,
            vec_table,
            dimension: vector_dim,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Replace rows matching on `document_id`.
    pub fn upsert(&self, rows: &[EmbeddedChunk]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        self.insert_rows(&tx, rows)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete all rows for `file_path` and upsert `rows` as one write.
    ///
    /// Concurrent readers observe either the old rows or the new rows for
    /// the file, never a partial replacement.
    pub fn replace_file(&self, file_path: &str, rows: &[EmbeddedChunk]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        self.delete_file_rows(&tx, file_path)?;
        self.insert_rows(&tx, rows)?;
        tx.commit()?;
        Ok(())
    }

    /// Remove all rows for one file. Idempotent.
    pub fn delete_for_file(&self, file_path: &str) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = self.delete_file_rows(&tx, file_path)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Bulk variant of [`VectorStore::delete_for_file`].
    pub fn delete_for_files(&self, file_paths: &[String]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        for file_path in file_paths {
            removed += self.delete_file_rows(&tx, file_path)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Remove every row in the table.
    pub fn delete_all(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute(&format!("DELETE FROM {}", self.vec_table), [])?;
        conn.execute(&format!("DELETE FROM {}", self.table), [])?;
        Ok(())
    }

    /// Snapshot the index state for reconciliation: one entry per indexed
    /// file, reading only the columns needed.
    pub fn scan_index_state(&self) -> Result<HashMap<String, (String, u32)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT file_path, content_hash, total_chunks FROM {}",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, String>(1)?, row.get::<_, u32>(2)?),
            ))
        })?;

        let mut state = HashMap::new();
        for row in rows {
            let (file_path, entry) = row?;
            state.insert(file_path, entry);
        }
        Ok(state)
    }

    /// Stored `(content_hash, total_chunks)` for one file, if indexed.
    pub fn file_state(&self, file_path: &str) -> Result<Option<(String, u32)>> {
        let conn = self.lock();
        let state = conn
            .query_row(
                &format!(
                    "SELECT content_hash, total_chunks FROM {} WHERE file_path = ?1 LIMIT 1",
                    self.table
                ),
                params![file_path],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
            )
            .optional()?;
        Ok(state)
    }

    /// Up to `k` rows ordered by ascending distance to `query_vector`.
    /// Ties break on `document_id` ascending.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_vector.len() != self.dimension {
            return Err(VectorStoreError::SchemaMismatch {
                expected: self.dimension,
                found: query_vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector_json = serde_json::to_string(query_vector)?;

        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT c.document_id, c.file_path, c.content_hash, c.last_modified_timestamp,
                    c.chunk_index, c.total_chunks, c.extracted_text_chunk, c.original_path,
                    v.distance
             FROM {vec} v
             INNER JOIN {table} c ON c.document_id = v.document_id
             WHERE v.embedding MATCH ?1 AND k = ?2
             ORDER BY v.distance, c.document_id",
            vec = self.vec_table,
            table = self.table,
        ))?;

        let hits = stmt.query_map(params![vector_json, k as i64], |row| {
            Ok(SearchHit {
                record: record_from_row(row)?,
                distance: row.get(8)?,
            })
        })?;

        hits.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(VectorStoreError::Database)
    }

    /// Total row count.
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn insert_rows(&self, conn: &Connection, rows: &[EmbeddedChunk]) -> Result<()> {
        for row in rows {
            if row.vector.len() != self.dimension {
                return Err(VectorStoreError::SchemaMismatch {
                    expected: self.dimension,
                    found: row.vector.len(),
                });
            }

            let record = &row.record;
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {}
                     (document_id, file_path, content_hash, last_modified_timestamp,
                      chunk_index, total_chunks, extracted_text_chunk, original_path)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    self.table
                ),
                params![
                    record.document_id,
                    record.file_path,
                    record.content_hash,
                    record.last_modified_timestamp,
                    record.chunk_index,
                    record.total_chunks,
                    record.extracted_text_chunk,
                    record.original_path,
                ],
            )?;

            let vector_json = serde_json::to_string(&row.vector)?;
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {} (document_id, embedding) VALUES (?1, ?2)",
                    self.vec_table
                ),
                params![record.document_id, vector_json],
            )?;
        }
        Ok(())
    }

    fn delete_file_rows(&self, conn: &Connection, file_path: &str) -> Result<usize> {
        let mut stmt = conn.prepare(&format!(
            "SELECT document_id FROM {} WHERE file_path = ?1",
            self.table
        ))?;
        let document_ids: Vec<String> = stmt
            .query_map(params![file_path], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        for document_id in &document_ids {
            conn.execute(
                &format!("DELETE FROM {} WHERE document_id = ?1", self.vec_table),
                params![document_id],
            )?;
        }

        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE file_path = ?1", self.table),
            params![file_path],
        )?;
        Ok(deleted)
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        document_id: row.get(0)?,
        file_path: row.get(1)?,
        content_hash: row.get(2)?,
        last_modified_timestamp: row.get(3)?,
        chunk_index: row.get(4)?,
        total_chunks: row.get(5)?,
        extracted_text_chunk: row.get(6)?,
        original_path: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const DIM: usize = 3;

    fn open(dir: &TempDir) -> VectorStore {
        VectorStore::open_or_create(&dir.path().join("index.db"), DEFAULT_TABLE_NAME, DIM).unwrap()
    }

    fn chunk(file: &str, index: u32, total: u32, hash: &str, vector: [f32; DIM]) -> EmbeddedChunk {
        EmbeddedChunk {
            record: ChunkRecord {
                document_id: format!("{file}::{index}"),
                file_path: file.to_string(),
                content_hash: hash.to_string(),
                last_modified_timestamp: 1_700_000_000.0,
                chunk_index: index,
                total_chunks: total,
                extracted_text_chunk: format!("chunk {index} of {file}"),
                original_path: format!("/project/{file}"),
            },
            vector: vector.to_vec(),
        }
    }

    #[test]
    fn open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.upsert(&[chunk("a.txt", 0, 1, "h1", [1.0, 0.0, 0.0])]).unwrap();
        drop(store);

        let store = open(&dir);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        drop(VectorStore::open_or_create(&path, DEFAULT_TABLE_NAME, DIM).unwrap());

        let err = VectorStore::open_or_create(&path, DEFAULT_TABLE_NAME, DIM + 1).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::SchemaMismatch { expected: 4, found: 3 }
        ));
    }

    #[test]
    fn upsert_replaces_on_document_id() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.upsert(&[chunk("a.txt", 0, 1, "h1", [1.0, 0.0, 0.0])]).unwrap();
        store.upsert(&[chunk("a.txt", 0, 1, "h2", [0.0, 1.0, 0.0])]).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let state = store.file_state("a.txt").unwrap();
        assert_eq!(state, Some(("h2".to_string(), 1)));
    }

    #[test]
    fn replace_file_swaps_all_rows() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .upsert(&[
                chunk("a.txt", 0, 2, "h1", [1.0, 0.0, 0.0]),
                chunk("a.txt", 1, 2, "h1", [0.0, 1.0, 0.0]),
            ])
            .unwrap();

        store
            .replace_file("a.txt", &[chunk("a.txt", 0, 1, "h2", [0.0, 0.0, 1.0])])
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.file_state("a.txt").unwrap(), Some(("h2".to_string(), 1)));
    }

    #[test]
    fn delete_for_file_removes_every_row() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .upsert(&[
                chunk("a.txt", 0, 2, "h1", [1.0, 0.0, 0.0]),
                chunk("a.txt", 1, 2, "h1", [0.0, 1.0, 0.0]),
                chunk("b.txt", 0, 1, "h2", [0.0, 0.0, 1.0]),
            ])
            .unwrap();

        let removed = store.delete_for_file("a.txt").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.file_state("a.txt").unwrap(), None);

        // Idempotent on a missing file.
        assert_eq!(store.delete_for_file("a.txt").unwrap(), 0);
    }

    #[test]
    fn delete_for_files_bulk() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .upsert(&[
                chunk("a.txt", 0, 1, "h1", [1.0, 0.0, 0.0]),
                chunk("b.txt", 0, 1, "h2", [0.0, 1.0, 0.0]),
                chunk("c.txt", 0, 1, "h3", [0.0, 0.0, 1.0]),
            ])
            .unwrap();

        store
            .delete_for_files(&["a.txt".to_string(), "c.txt".to_string()])
            .unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.file_state("b.txt").unwrap().is_some());
    }

    #[test]
    fn scan_index_state_maps_files() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .upsert(&[
                chunk("a.txt", 0, 2, "h1", [1.0, 0.0, 0.0]),
                chunk("a.txt", 1, 2, "h1", [0.0, 1.0, 0.0]),
                chunk("b.txt", 0, 1, "h2", [0.0, 0.0, 1.0]),
            ])
            .unwrap();

        let state = store.scan_index_state().unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state["a.txt"], ("h1".to_string(), 2));
        assert_eq!(state["b.txt"], ("h2".to_string(), 1));
    }

    #[test]
    fn search_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .upsert(&[
                chunk("far.txt", 0, 1, "h1", [0.0, 1.0, 0.0]),
                chunk("near.txt", 0, 1, "h2", [0.9, 0.1, 0.0]),
                chunk("exact.txt", 0, 1, "h3", [1.0, 0.0, 0.0]),
            ])
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.file_path, "exact.txt");
        assert_eq!(hits[1].record.file_path, "near.txt");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn search_ties_break_on_document_id() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .upsert(&[
                chunk("b.txt", 0, 1, "h1", [1.0, 0.0, 0.0]),
                chunk("a.txt", 0, 1, "h2", [1.0, 0.0, 0.0]),
            ])
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].record.document_id, "a.txt::0");
        assert_eq!(hits[1].record.document_id, "b.txt::0");
    }

    #[test]
    fn search_on_empty_table_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn search_rejects_wrong_dimension() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let err = store.search(&[1.0, 0.0], 5).unwrap_err();
        assert!(matches!(err, VectorStoreError::SchemaMismatch { .. }));
    }
}
