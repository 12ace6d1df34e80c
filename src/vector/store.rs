//! Memory record stores
//!
//! Records live in an append-only arena searched by brute-force cosine
//! similarity. `SqliteRecordStore` additionally persists every append so the
//! arena can be rebuilt on the next start.

use super::cosine_similarity;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Fixed collection name, also the SQLite table name
pub const COLLECTION_NAME: &str = "sorterra_memory";

const DB_FILE_NAME: &str = "sorterra_memory.db";

#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record store lock poisoned")]
    Poisoned,
}

/// One learned placement: a content chunk and where its document went
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: String,
    pub content_fragment: String,
    pub destination: String,
    pub embedding: Vec<f32>,
    pub learned_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(content_fragment: String, destination: String, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_fragment,
            destination,
            embedding,
            learned_at: Utc::now(),
        }
    }
}

/// A record scored against a query
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub score: f32,
}

pub trait RecordStore: Send + Sync {
    fn append(&self, records: Vec<MemoryRecord>) -> Result<(), MemoryStoreError>;

    /// The `k` records closest to any of the query vectors, best first.
    /// A record's score is its best similarity across the query vectors.
    fn nearest(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<ScoredRecord>, MemoryStoreError>;

    fn len(&self) -> Result<usize, MemoryStoreError>;

    fn is_empty(&self) -> Result<bool, MemoryStoreError> {
        Ok(self.len()? == 0)
    }
}

/// Append-only vector of records behind a lock
#[derive(Default)]
struct RecordArena {
    records: RwLock<Vec<MemoryRecord>>,
}

impl RecordArena {
    fn from_records(records: Vec<MemoryRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    fn append(&self, records: Vec<MemoryRecord>) -> Result<(), MemoryStoreError> {
        let mut arena = self.records.write().map_err(|_| MemoryStoreError::Poisoned)?;
        arena.extend(records);
        Ok(())
    }

    fn nearest(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<ScoredRecord>, MemoryStoreError> {
        let arena = self.records.read().map_err(|_| MemoryStoreError::Poisoned)?;
        if queries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = arena
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let best = queries
                    .iter()
                    .map(|q| cosine_similarity(q, &record.embedding))
                    .fold(f32::MIN, f32::max);
                (idx, best)
            })
            .collect();

        // Sort by similarity (descending)
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(idx, score)| ScoredRecord {
                record: arena[idx].clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> Result<usize, MemoryStoreError> {
        Ok(self.records.read().map_err(|_| MemoryStoreError::Poisoned)?.len())
    }
}

/// Process-local store, lost on exit
#[derive(Default)]
pub struct InMemoryRecordStore {
    arena: RecordArena,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn append(&self, records: Vec<MemoryRecord>) -> Result<(), MemoryStoreError> {
        self.arena.append(records)
    }

    fn nearest(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<ScoredRecord>, MemoryStoreError> {
        self.arena.nearest(queries, k)
    }

    fn len(&self) -> Result<usize, MemoryStoreError> {
        self.arena.len()
    }
}

/// SQLite-backed store
///
/// All rows are loaded into the arena on open; appends are INSERT-only.
pub struct SqliteRecordStore {
    db_path: PathBuf,
    arena: RecordArena,
}

impl SqliteRecordStore {
    /// Open or create `<dir>/sorterra_memory.db`
    pub fn open(dir: &Path) -> Result<Self, MemoryStoreError> {
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join(DB_FILE_NAME);

        let conn = Self::connect(&db_path)?;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                content_fragment TEXT NOT NULL,
                embedding BLOB NOT NULL,
                destination TEXT NOT NULL,
                learned_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_destination ON {table}(destination);
            "#,
            table = COLLECTION_NAME
        ))?;

        let records = Self::load_all(&conn)?;
        tracing::info!(
            "[Memory] Opened {} with {} records",
            db_path.display(),
            records.len()
        );

        Ok(Self {
            db_path,
            arena: RecordArena::from_records(records),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(path: &Path) -> Result<rusqlite::Connection, MemoryStoreError> {
        Ok(rusqlite::Connection::open(path)?)
    }

    fn load_all(conn: &rusqlite::Connection) -> Result<Vec<MemoryRecord>, MemoryStoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, content_fragment, embedding, destination, learned_at FROM {} ORDER BY rowid",
            COLLECTION_NAME
        ))?;

        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(2)?;
            let learned_at: String = row.get(4)?;
            Ok(MemoryRecord {
                id: row.get(0)?,
                content_fragment: row.get(1)?,
                embedding: decode_embedding(&blob),
                destination: row.get(3)?,
                learned_at: DateTime::parse_from_rfc3339(&learned_at)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

impl RecordStore for SqliteRecordStore {
    fn append(&self, records: Vec<MemoryRecord>) -> Result<(), MemoryStoreError> {
        let mut conn = Self::connect(&self.db_path)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, content_fragment, embedding, destination, learned_at) VALUES (?, ?, ?, ?, ?)",
                COLLECTION_NAME
            ))?;
            for record in &records {
                stmt.execute(params![
                    record.id,
                    record.content_fragment,
                    encode_embedding(&record.embedding),
                    record.destination,
                    record.learned_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        self.arena.append(records)
    }

    fn nearest(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<ScoredRecord>, MemoryStoreError> {
        self.arena.nearest(queries, k)
    }

    fn len(&self) -> Result<usize, MemoryStoreError> {
        self.arena.len()
    }
}

/// Little-endian f32 sequence
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(fragment: &str, destination: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord::new(fragment.to_string(), destination.to_string(), embedding)
    }

    #[test]
    fn test_nearest_orders_by_best_query_match() {
        let store = InMemoryRecordStore::new();
        store
            .append(vec![
                record("a", "A", vec![1.0, 0.0]),
                record("b", "B", vec![0.0, 1.0]),
                record("c", "C", vec![0.7071, 0.7071]),
            ])
            .unwrap();

        let hits = store.nearest(&[vec![1.0, 0.0]], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.destination, "A");
        assert_eq!(hits[1].record.destination, "C");

        // A second query vector lifts B to a perfect score
        let hits = store.nearest(&[vec![1.0, 0.0], vec![0.0, 1.0]], 3).unwrap();
        assert!(hits[..2].iter().all(|h| h.score > 0.99));
    }

    #[test]
    fn test_empty_store() {
        let store = InMemoryRecordStore::new();
        assert!(store.is_empty().unwrap());
        assert!(store.nearest(&[vec![1.0]], 5).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteRecordStore::open(dir.path()).unwrap();
            store
                .append(vec![record("Project Alpha kickoff notes", "Projects/Alpha", vec![0.25, -1.5, 3.0])])
                .unwrap();
            assert_eq!(store.len().unwrap(), 1);
        }

        let reopened = SqliteRecordStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        assert!(reopened.db_path().ends_with("sorterra_memory.db"));

        let hits = reopened.nearest(&[vec![0.25, -1.5, 3.0]], 1).unwrap();
        assert_eq!(hits[0].record.destination, "Projects/Alpha");
        assert_eq!(hits[0].record.embedding, vec![0.25, -1.5, 3.0]);
    }

    #[test]
    fn test_embedding_blob_layout() {
        let blob = encode_embedding(&[1.0, -2.0]);
        assert_eq!(blob.len(), 8);
        assert_eq!(decode_embedding(&blob), vec![1.0, -2.0]);
    }
}
