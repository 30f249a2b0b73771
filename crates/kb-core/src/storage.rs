//! SQLite bookkeeping for documents, tags and index jobs
//!
//! Schema:
//! - documents: one row per scanned file, keyed by document ID, unique on path
//! - tags: free-form labels per document
//! - index_jobs: one row per indexing run with progress counters
//!
//! Timestamps are unix seconds.

use crate::scanner::{DocumentType, ScannedDocument};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    filepath TEXT NOT NULL UNIQUE,
    folder TEXT,
    type TEXT NOT NULL,
    size_kb INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    chunks_count INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    indexed_at INTEGER
);

CREATE TABLE IF NOT EXISTS tags (
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (document_id, tag)
);

CREATE TABLE IF NOT EXISTS index_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL DEFAULT 'running',
    total_files INTEGER NOT NULL DEFAULT 0,
    processed_files INTEGER NOT NULL DEFAULT 0,
    failed_files INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    finished_at INTEGER,
    error_log TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
CREATE INDEX IF NOT EXISTS idx_documents_folder ON documents(folder);
";

const DOCUMENT_COLUMNS: &str = "id, filename, filepath, folder, type, size_kb, status, \
                                chunks_count, error, created_at, indexed_at";

/// Indexing state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            other => Err(anyhow!("Unknown document status: {other}")),
        }
    }
}

/// A document row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub filepath: PathBuf,
    pub folder: Option<String>,
    pub doc_type: DocumentType,
    pub size_kb: u64,
    pub status: DocumentStatus,
    pub chunks_count: usize,
    pub error: Option<String>,
    pub created_at: i64,
    pub indexed_at: Option<i64>,
}

impl DocumentRecord {
    /// View as a scanned document for the indexing pipeline.
    pub fn to_scanned(&self) -> ScannedDocument {
        ScannedDocument {
            id: self.id.clone(),
            filename: self.filename.clone(),
            filepath: self.filepath.clone(),
            folder: self.folder.clone(),
            doc_type: self.doc_type,
            size_kb: self.size_kb,
        }
    }
}

/// Filter for [`DB::list_documents`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub statuses: Vec<DocumentStatus>,
    pub folder: Option<String>,
    pub doc_type: Option<DocumentType>,
}

impl DocumentFilter {
    pub fn with_status(status: DocumentStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Default::default()
        }
    }
}

/// Per-folder document counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderStats {
    pub name: String,
    pub count: usize,
    pub indexed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "completed_with_errors" => Self::CompletedWithErrors,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }
}

/// An indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: i64,
    pub status: JobStatus,
    pub total_files: usize,
    pub processed_files: usize,
    pub failed_files: usize,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub error_log: Option<String>,
}

/// Document counts by status plus the most recent job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub indexed: usize,
    pub pending: usize,
    pub failed: usize,
    pub processing: usize,
    pub latest_job: Option<Job>,
}

/// Database connection wrapper
///
/// The connection sits behind a mutex so indexing workers can share one `DB`.
pub struct DB {
    conn: Mutex<Connection>,
}

impl DB {
    /// Open or create database at path
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Insert a scanned document, or refresh its size if the path is known.
    ///
    /// Returns true when the row is new. Status is never reset here.
    pub fn upsert_document(&self, doc: &ScannedDocument) -> Result<bool> {
        let conn = self.conn()?;
        let path = doc.filepath.to_string_lossy();
        let existed = conn
            .query_row(
                "SELECT 1 FROM documents WHERE filepath = ?",
                params![path.as_ref()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        conn.execute(
            "INSERT INTO documents (id, filename, filepath, folder, type, size_kb)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(filepath) DO UPDATE SET size_kb = excluded.size_kb",
            params![
                doc.id,
                doc.filename,
                path.as_ref(),
                doc.folder,
                doc.doc_type.as_str(),
                doc.size_kb as i64,
            ],
        )
        .with_context(|| format!("Failed to record document {}", doc.filepath.display()))?;

        Ok(!existed)
    }

    pub fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?");
        let row = conn
            .query_row(&sql, params![id], read_document_row)
            .optional()
            .context("Failed to load document")?;
        row.map(RawDocument::into_record).transpose()
    }

    pub fn get_document_by_path(&self, path: &Path) -> Result<Option<DocumentRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE filepath = ?");
        let row = conn
            .query_row(&sql, params![path.to_string_lossy().as_ref()], read_document_row)
            .optional()
            .context("Failed to load document")?;
        row.map(RawDocument::into_record).transpose()
    }

    /// Documents matching `filter`, ordered by path.
    pub fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<DocumentRecord>> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if !filter.statuses.is_empty() {
            let marks = vec!["?"; filter.statuses.len()].join(", ");
            clauses.push(format!("status IN ({marks})"));
            values.extend(filter.statuses.iter().map(|s| s.as_str().to_string()));
        }
        if let Some(folder) = &filter.folder {
            clauses.push("folder = ?".to_string());
            values.push(folder.clone());
        }
        if let Some(doc_type) = filter.doc_type {
            clauses.push("type = ?".to_string());
            values.push(doc_type.as_str().to_string());
        }

        let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY filepath");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), read_document_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(RawDocument::into_record).collect()
    }

    pub fn update_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        self.conn()?.execute(
            "UPDATE documents SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    pub fn mark_indexed(&self, id: &str, chunks: usize) -> Result<()> {
        self.conn()?.execute(
            "UPDATE documents
             SET status = 'indexed', chunks_count = ?, error = NULL,
                 indexed_at = strftime('%s', 'now')
             WHERE id = ?",
            params![chunks as i64, id],
        )?;
        Ok(())
    }

    pub fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE documents SET status = 'failed', chunks_count = 0, error = ? WHERE id = ?",
            params![error, id],
        )?;
        Ok(())
    }

    /// Move every indexed document back to pending. Returns the number moved.
    pub fn reset_indexed_to_pending(&self) -> Result<usize> {
        let rows = self.conn()?.execute(
            "UPDATE documents SET status = 'pending' WHERE status = 'indexed'",
            [],
        )?;
        Ok(rows)
    }

    /// Remove a document and its tags. Returns true if a row was deleted.
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM documents WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    /// Replace the tags of a document.
    pub fn set_tags(&self, id: &str, tags: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tags WHERE document_id = ?", params![id])?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO tags (document_id, tag) VALUES (?, ?)")?;
            for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                stmt.execute(params![id, tag])
                    .with_context(|| format!("Failed to tag document {id}"))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_tags(&self, id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT tag FROM tags WHERE document_id = ? ORDER BY tag")?;
        let tags = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    /// Every tag in use, ordered by name.
    pub fn all_tags(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT tag FROM tags ORDER BY tag")?;
        let tags = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    /// Folders with at least one document, ordered by name.
    pub fn folders(&self) -> Result<Vec<FolderStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT folder, COUNT(*), SUM(CASE WHEN status = 'indexed' THEN 1 ELSE 0 END)
             FROM documents WHERE folder IS NOT NULL
             GROUP BY folder ORDER BY folder",
        )?;
        let folders = stmt
            .query_map([], |row| {
                Ok(FolderStats {
                    name: row.get(0)?,
                    count: row.get::<_, i64>(1)? as usize,
                    indexed: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    /// Start a job row. Returns the job ID.
    pub fn create_job(&self, total_files: usize) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO index_jobs (total_files) VALUES (?)",
            params![total_files as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_job_progress(&self, job_id: i64, processed: usize, failed: usize) -> Result<()> {
        self.conn()?.execute(
            "UPDATE index_jobs SET processed_files = ?, failed_files = ? WHERE id = ?",
            params![processed as i64, failed as i64, job_id],
        )?;
        Ok(())
    }

    pub fn finish_job(
        &self,
        job_id: i64,
        status: JobStatus,
        error_log: Option<&str>,
    ) -> Result<()> {
        self.conn()?.execute(
            "UPDATE index_jobs
             SET status = ?, error_log = ?, finished_at = strftime('%s', 'now')
             WHERE id = ?",
            params![status.as_str(), error_log, job_id],
        )?;
        Ok(())
    }

    pub fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                "SELECT id, status, total_files, processed_files, failed_files,
                        started_at, finished_at, error_log
                 FROM index_jobs WHERE id = ?",
                params![job_id],
                read_job_row,
            )
            .optional()?;
        Ok(job)
    }

    pub fn latest_job(&self) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                "SELECT id, status, total_files, processed_files, failed_files,
                        started_at, finished_at, error_log
                 FROM index_jobs ORDER BY id DESC LIMIT 1",
                [],
                read_job_row,
            )
            .optional()?;
        Ok(job)
    }

    pub fn status_counts(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        {
            let conn = self.conn()?;
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM documents GROUP BY status")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let status: String = row.get(0)?;
                let count = row.get::<_, i64>(1)? as usize;
                counts.total += count;
                match status.parse::<DocumentStatus>() {
                    Ok(DocumentStatus::Indexed) => counts.indexed += count,
                    Ok(DocumentStatus::Pending) => counts.pending += count,
                    Ok(DocumentStatus::Failed) => counts.failed += count,
                    Ok(DocumentStatus::Processing) => counts.processing += count,
                    Err(_) => tracing::warn!("Ignoring unknown document status {status}"),
                }
            }
        }
        counts.latest_job = self.latest_job()?;
        Ok(counts)
    }
}

/// Row as stored, before enum parsing
struct RawDocument {
    id: String,
    filename: String,
    filepath: String,
    folder: Option<String>,
    doc_type: String,
    size_kb: i64,
    status: String,
    chunks_count: i64,
    error: Option<String>,
    created_at: i64,
    indexed_at: Option<i64>,
}

impl RawDocument {
    fn into_record(self) -> Result<DocumentRecord> {
        Ok(DocumentRecord {
            doc_type: self
                .doc_type
                .parse()
                .with_context(|| format!("Corrupt document row {}", self.id))?,
            status: self.status.parse()?,
            id: self.id,
            filename: self.filename,
            filepath: PathBuf::from(self.filepath),
            folder: self.folder,
            size_kb: self.size_kb.max(0) as u64,
            chunks_count: self.chunks_count.max(0) as usize,
            error: self.error,
            created_at: self.created_at,
            indexed_at: self.indexed_at,
        })
    }
}

fn read_document_row(row: &rusqlite::Row) -> rusqlite::Result<RawDocument> {
    Ok(RawDocument {
        id: row.get(0)?,
        filename: row.get(1)?,
        filepath: row.get(2)?,
        folder: row.get(3)?,
        doc_type: row.get(4)?,
        size_kb: row.get(5)?,
        status: row.get(6)?,
        chunks_count: row.get(7)?,
        error: row.get(8)?,
        created_at: row.get(9)?,
        indexed_at: row.get(10)?,
    })
}

fn read_job_row(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        status: JobStatus::parse(&row.get::<_, String>(1)?),
        total_files: row.get::<_, i64>(2)? as usize,
        processed_files: row.get::<_, i64>(3)? as usize,
        failed_files: row.get::<_, i64>(4)? as usize,
        started_at: row.get(5)?,
        finished_at: row.get(6)?,
        error_log: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(path: &str, folder: Option<&str>) -> ScannedDocument {
        let filepath = PathBuf::from(path);
        ScannedDocument {
            id: crate::scanner::document_id(&filepath),
            filename: filepath.file_name().unwrap().to_string_lossy().into_owned(),
            doc_type: DocumentType::from_path(&filepath).unwrap(),
            filepath,
            folder: folder.map(String::from),
            size_kb: 1,
        }
    }

    #[test]
    fn test_upsert_inserts_then_refreshes_size() {
        let db = DB::in_memory().unwrap();
        let mut doc = scanned("/kb/notes/a.md", Some("notes"));

        assert!(db.upsert_document(&doc).unwrap());
        db.mark_indexed(&doc.id, 4).unwrap();

        doc.size_kb = 9;
        assert!(!db.upsert_document(&doc).unwrap());

        let record = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(record.size_kb, 9);
        assert_eq!(record.status, DocumentStatus::Indexed);
        assert_eq!(record.chunks_count, 4);
        assert!(record.indexed_at.is_some());
        assert_eq!(
            db.get_document_by_path(Path::new("/kb/notes/a.md"))
                .unwrap()
                .unwrap()
                .id,
            doc.id
        );
    }

    #[test]
    fn test_status_transitions() {
        let db = DB::in_memory().unwrap();
        let doc = scanned("/kb/a.pdf", None);
        db.upsert_document(&doc).unwrap();

        db.update_status(&doc.id, DocumentStatus::Processing).unwrap();
        db.mark_failed(&doc.id, "no passages").unwrap();
        let record = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("no passages"));

        db.mark_indexed(&doc.id, 2).unwrap();
        let record = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(record.error, None);

        assert_eq!(db.reset_indexed_to_pending().unwrap(), 1);
        let record = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Pending);
    }

    #[test]
    fn test_list_documents_filters() {
        let db = DB::in_memory().unwrap();
        let a = scanned("/kb/notes/a.md", Some("notes"));
        let b = scanned("/kb/notes/b.txt", Some("notes"));
        let c = scanned("/kb/papers/c.md", Some("papers"));
        for doc in [&a, &b, &c] {
            db.upsert_document(doc).unwrap();
        }
        db.mark_failed(&b.id, "boom").unwrap();

        assert_eq!(db.list_documents(&DocumentFilter::default()).unwrap().len(), 3);

        let pending = db
            .list_documents(&DocumentFilter::with_status(DocumentStatus::Pending))
            .unwrap();
        let names: Vec<_> = pending.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.md", "c.md"]);

        let filter = DocumentFilter {
            statuses: vec![DocumentStatus::Pending, DocumentStatus::Failed],
            folder: Some("notes".to_string()),
            doc_type: None,
        };
        assert_eq!(db.list_documents(&filter).unwrap().len(), 2);

        let filter = DocumentFilter {
            doc_type: Some(DocumentType::Txt),
            ..Default::default()
        };
        assert_eq!(db.list_documents(&filter).unwrap()[0].id, b.id);
    }

    #[test]
    fn test_tags_replace_and_cascade() {
        let db = DB::in_memory().unwrap();
        let doc = scanned("/kb/a.md", None);
        db.upsert_document(&doc).unwrap();

        db.set_tags(&doc.id, &["rust".into(), "notes".into(), " ".into()])
            .unwrap();
        assert_eq!(db.get_tags(&doc.id).unwrap(), vec!["notes", "rust"]);

        db.set_tags(&doc.id, &["exam".into()]).unwrap();
        assert_eq!(db.get_tags(&doc.id).unwrap(), vec!["exam"]);

        let other = scanned("/kb/b.md", None);
        db.upsert_document(&other).unwrap();
        db.set_tags(&other.id, &["exam".into(), "cjk".into()]).unwrap();
        assert_eq!(db.all_tags().unwrap(), vec!["cjk", "exam"]);

        assert!(db.delete_document(&doc.id).unwrap());
        assert!(db.get_tags(&doc.id).unwrap().is_empty());
        assert!(!db.delete_document(&doc.id).unwrap());
    }

    #[test]
    fn test_folders_and_status_counts() {
        let db = DB::in_memory().unwrap();
        let a = scanned("/kb/notes/a.md", Some("notes"));
        let b = scanned("/kb/notes/b.md", Some("notes"));
        let c = scanned("/kb/root.md", None);
        for doc in [&a, &b, &c] {
            db.upsert_document(doc).unwrap();
        }
        db.mark_indexed(&a.id, 3).unwrap();
        db.mark_failed(&c.id, "bad").unwrap();

        assert_eq!(
            db.folders().unwrap(),
            vec![FolderStats {
                name: "notes".to_string(),
                count: 2,
                indexed: 1
            }]
        );

        let counts = db.status_counts().unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.indexed, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.processing, 0);
        assert!(counts.latest_job.is_none());
    }

    #[test]
    fn test_job_lifecycle() {
        let db = DB::in_memory().unwrap();
        let first = db.create_job(3).unwrap();
        db.finish_job(first, JobStatus::Completed, None).unwrap();

        let job_id = db.create_job(5).unwrap();
        db.update_job_progress(job_id, 4, 1).unwrap();
        db.finish_job(job_id, JobStatus::CompletedWithErrors, Some("a.pdf: empty"))
            .unwrap();

        let job = db.latest_job().unwrap().unwrap();
        assert_eq!(job.id, job_id);
        assert_eq!(job.total_files, 5);
        assert_eq!(job.processed_files, 4);
        assert_eq!(job.failed_files, 1);
        assert_eq!(job.status, JobStatus::CompletedWithErrors);
        assert!(job.finished_at.is_some());
        assert_eq!(job.error_log.as_deref(), Some("a.pdf: empty"));

        assert_eq!(db.get_job(first).unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(db.status_counts().unwrap().latest_job.unwrap().id, job_id);
    }
}
