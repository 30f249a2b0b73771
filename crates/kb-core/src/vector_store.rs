//! Vector index over passages.
//!
//! Schema:
//! - chunks: id ("{document_id}_chunk_{index}"), document_id, chunk_index,
//!   text, metadata (JSON object of scalars), embedding (LE f32 blob)

use anyhow::{anyhow, Context, Result};
use passage_chunker::{MetaValue, Metadata, Passage};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);
";

/// Restricts a query. Each list matches any of its values; both lists must
/// match when both are set. Empty lists do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub folders: Vec<String>,
    pub document_ids: Vec<String>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.document_ids.is_empty()
    }

    fn matches(&self, document_id: &str, metadata: &Metadata) -> bool {
        let folder_ok = self.folders.is_empty()
            || metadata
                .get("folder")
                .and_then(MetaValue::as_str)
                .is_some_and(|f| self.folders.iter().any(|want| want == f));
        let doc_ok =
            self.document_ids.is_empty() || self.document_ids.iter().any(|id| id == document_id);
        folder_ok && doc_ok
    }
}

/// A passage returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    /// Cosine similarity, higher is closer
    pub score: f32,
    pub metadata: Metadata,
}

/// A stored passage, as listed for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub page: Option<u32>,
}

pub trait VectorStore: Send + Sync {
    /// Replace every stored passage of `document_id` with `passages`.
    fn upsert(&self, document_id: &str, passages: &[Passage], embeddings: &[Vec<f32>])
        -> Result<()>;

    /// Returns the number of passages removed.
    fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Stored passages of one document ordered by chunk index.
    fn document_chunks(&self, document_id: &str) -> Result<Vec<StoredChunk>>;

    /// Up to `top_k` passages by descending cosine similarity.
    fn query(&self, embedding: &[f32], top_k: usize, filter: &SearchFilter)
        -> Result<Vec<VectorHit>>;

    fn count(&self) -> Result<usize>;
}

pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{document_id}_chunk_{index}")
}

/// Cosine similarity of two vectors; 0.0 when either is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Scalar metadata stored with a passage: its storable metadata plus the
/// owning document and chunk index.
fn passage_metadata(document_id: &str, passage: &Passage) -> Metadata {
    let mut metadata = passage.storable_metadata();
    metadata.insert("document_id".to_string(), document_id.into());
    metadata.insert("chunk_index".to_string(), passage.index.into());
    metadata
}

/// SQLite-backed vector store with brute-force cosine search.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open or create the store at path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open vector store: {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Vector store connection lock poisoned"))
    }
}

impl VectorStore for SqliteVectorStore {
    fn upsert(
        &self,
        document_id: &str,
        passages: &[Passage],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        anyhow::ensure!(
            passages.len() == embeddings.len(),
            "Got {} embeddings for {} passages of document {document_id}",
            embeddings.len(),
            passages.len()
        );

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?",
            params![document_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, document_id, chunk_index, text, metadata, embedding)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for (passage, embedding) in passages.iter().zip(embeddings) {
                let metadata = serde_json::to_string(&passage_metadata(document_id, passage))?;
                stmt.execute(params![
                    chunk_id(document_id, passage.index),
                    document_id,
                    passage.index as i64,
                    passage.text,
                    metadata,
                    encode_embedding(embedding),
                ])?;
            }
        }

        tx.commit()
            .with_context(|| format!("Failed to store passages for {document_id}"))?;
        tracing::debug!("Stored {} passages for {}", passages.len(), document_id);
        Ok(())
    }

    fn delete_document(&self, document_id: &str) -> Result<usize> {
        let rows = self.conn()?.execute(
            "DELETE FROM chunks WHERE document_id = ?",
            params![document_id],
        )?;
        Ok(rows)
    }

    fn document_chunks(&self, document_id: &str) -> Result<Vec<StoredChunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, chunk_index, text, metadata FROM chunks
             WHERE document_id = ? ORDER BY chunk_index",
        )?;

        let mut rows = stmt.query(params![document_id])?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next()? {
            let metadata: Metadata = serde_json::from_str(&row.get::<_, String>(3)?)
                .context("Corrupt passage metadata")?;
            chunks.push(StoredChunk {
                chunk_id: row.get(0)?,
                chunk_index: row.get::<_, i64>(1)? as usize,
                text: row.get(2)?,
                page: metadata
                    .get("page")
                    .and_then(MetaValue::as_i64)
                    .and_then(|p| u32::try_from(p).ok()),
            });
        }
        Ok(chunks)
    }

    fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, chunk_index, text, metadata, embedding FROM chunks",
        )?;
        let mut rows = stmt.query([])?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let document_id: String = row.get(1)?;
            let metadata: Metadata = serde_json::from_str(&row.get::<_, String>(4)?)
                .context("Corrupt passage metadata")?;
            if !filter.matches(&document_id, &metadata) {
                continue;
            }

            let stored = decode_embedding(&row.get::<_, Vec<u8>>(5)?);
            anyhow::ensure!(
                stored.len() == embedding.len(),
                "Index holds {}-dimensional vectors but the query has {}; re-index with --full-reindex",
                stored.len(),
                embedding.len()
            );

            hits.push(VectorHit {
                chunk_id: row.get(0)?,
                document_id,
                chunk_index: row.get::<_, i64>(2)? as usize,
                text: row.get(3)?,
                score: cosine_similarity(embedding, &stored),
                metadata,
            });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
