use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use strata_core::{Result, StrataError};

/// A vector plus the document and metadata it was computed from.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: Map<String, Value>,
}

/// A record returned by a lookup. `score` is cosine similarity for
/// similarity queries and 1.0 for exact lookups.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

/// Conjunction of equality conditions on metadata keys. No conditions matches everything.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    conditions: Vec<(String, Value)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `key == value` condition.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.conditions.iter().any(|(key, _)| key.trim().is_empty()) {
            return Err(StrataError::MalformedFilter(
                "condition with an empty metadata key".into(),
            ));
        }
        Ok(())
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// Persistent, filterable similarity index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a record by id.
    async fn upsert(&self, record: IndexRecord) -> Result<()>;

    /// Up to `top_k` records matching `filter`, most similar first.
    async fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexHit>>;

    /// Records with the given ids, in request order. Missing ids are skipped.
    async fn get(&self, ids: &[String]) -> Result<Vec<IndexHit>>;

    /// Delete by id, returning how many records existed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Every record matching `filter`, in insertion order.
    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<IndexHit>>;

    async fn delete_where(&self, filter: &MetadataFilter) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn index_err(e: rusqlite::Error) -> StrataError {
    StrataError::Index(e.to_string())
}

struct Row {
    id: String,
    document: String,
    metadata: Map<String, Value>,
    embedding: Vec<f32>,
}

impl Row {
    fn into_hit(self, score: f32) -> IndexHit {
        IndexHit {
            id: self.id,
            document: self.document,
            metadata: self.metadata,
            score,
        }
    }
}

/// SQLite-backed [`VectorIndex`]: embeddings as little-endian f32 BLOBs,
/// metadata as JSON, brute-force cosine search.
///
/// The first write fixes the index dimensionality; later writes of another
/// length are rejected.
pub struct SqliteVectorIndex {
    db: Arc<Mutex<Connection>>,
}

impl SqliteVectorIndex {
    /// Open or create an index at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening vector index");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(index_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(index_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(index_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS vectors (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                document TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .map_err(index_err)?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Dimensionality fixed by the first write, if any.
    pub fn dimensions(&self) -> Result<Option<usize>> {
        let conn = self.db.lock();
        Self::stored_dims(&conn)
    }

    fn stored_dims(conn: &Connection) -> Result<Option<usize>> {
        let value: Option<String> = conn
            .query_row("SELECT value FROM index_meta WHERE key = 'dims'", [], |r| {
                r.get(0)
            })
            .optional()
            .map_err(index_err)?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    fn load_rows(conn: &Connection) -> Result<Vec<Row>> {
        let mut stmt = conn
            .prepare("SELECT id, document, metadata, embedding FROM vectors ORDER BY seq")
            .map_err(index_err)?;
        let rows = stmt
            .query_map([], |r| {
                let metadata: String = r.get(2)?;
                let blob: Vec<u8> = r.get(3)?;
                Ok(Row {
                    id: r.get(0)?,
                    document: r.get(1)?,
                    metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                    embedding: decode_embedding(&blob),
                })
            })
            .map_err(index_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(index_err)?;
        Ok(rows)
    }

    fn matching_rows(&self, filter: &MetadataFilter) -> Result<Vec<Row>> {
        filter.validate()?;
        let conn = self.db.lock();
        Ok(Self::load_rows(&conn)?
            .into_iter()
            .filter(|row| filter.matches(&row.metadata))
            .collect())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, record: IndexRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(StrataError::Index(format!("record {} has an empty embedding", record.id)));
        }
        let conn = self.db.lock();
        match Self::stored_dims(&conn)? {
            Some(expected) if expected != record.embedding.len() => {
                return Err(StrataError::DimensionMismatch {
                    expected,
                    actual: record.embedding.len(),
                });
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES ('dims', ?1)",
                    params![record.embedding.len().to_string()],
                )
                .map_err(index_err)?;
            }
        }

        let metadata = serde_json::to_string(&record.metadata)?;
        conn.execute(
            "INSERT INTO vectors (id, document, metadata, embedding, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET document = excluded.document,
                 metadata = excluded.metadata, embedding = excluded.embedding,
                 updated_at = excluded.updated_at",
            params![
                record.id,
                record.document,
                metadata,
                encode_embedding(&record.embedding),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(index_err)?;
        debug!(id = %record.id, "vector upserted");
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexHit>> {
        let rows = self.matching_rows(filter)?;
        let mut skipped = 0usize;
        let mut scored: Vec<(Row, f32)> = rows
            .into_iter()
            .filter_map(|row| {
                if row.embedding.len() != embedding.len() {
                    skipped += 1;
                    return None;
                }
                let score = cosine_similarity(embedding, &row.embedding);
                Some((row, score))
            })
            .collect();
        if skipped > 0 {
            warn!(skipped, dims = embedding.len(), "skipped vectors of mismatched length");
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored.into_iter().map(|(row, score)| row.into_hit(score)).collect())
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<IndexHit>> {
        let conn = self.db.lock();
        let mut stmt = conn
            .prepare("SELECT document, metadata FROM vectors WHERE id = ?1")
            .map_err(index_err)?;
        let mut hits = Vec::new();
        for id in ids {
            let found = stmt
                .query_row(params![id], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                })
                .optional()
                .map_err(index_err)?;
            if let Some((document, metadata)) = found {
                hits.push(IndexHit {
                    id: id.clone(),
                    document,
                    metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                    score: 1.0,
                });
            }
        }
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let conn = self.db.lock();
        let mut removed = 0;
        for id in ids {
            removed += conn
                .execute("DELETE FROM vectors WHERE id = ?1", params![id])
                .map_err(index_err)?;
        }
        Ok(removed)
    }

    async fn get_where(&self, filter: &MetadataFilter) -> Result<Vec<IndexHit>> {
        Ok(self
            .matching_rows(filter)?
            .into_iter()
            .map(|row| row.into_hit(1.0))
            .collect())
    }

    async fn delete_where(&self, filter: &MetadataFilter) -> Result<usize> {
        let ids: Vec<String> = self
            .matching_rows(filter)?
            .into_iter()
            .map(|row| row.id)
            .collect();
        self.delete(&ids).await
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.db.lock();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM vectors", [], |r| r.get(0))
            .map_err(index_err)?;
        Ok(n as usize)
    }
}
