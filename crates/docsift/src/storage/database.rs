//! SQLite database for analysis results
//!
//! One row per file path; pages, tags and the description hang off the file
//! id and are replaced wholesale whenever the file is re-analyzed.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ResultStore;
use crate::error::{Error, Result};
use crate::types::{Description, ExtractedPage, FileKind, FileRecord, ProcessingOutcome};

/// Row counts across the result tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub files: usize,
    pub pages: usize,
    pub tags: usize,
    pub descriptions: usize,
}

/// A file matched by [`ResultDb::search`]
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file: FileRecord,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// SQLite-based result store
pub struct ResultDb {
    conn: Arc<Mutex<Connection>>,
}

impl ResultDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                content_hash TEXT NOT NULL,
                kind TEXT NOT NULL,
                page_count INTEGER NOT NULL DEFAULT 0,
                size INTEGER NOT NULL DEFAULT 0,
                analyzed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files(content_hash);

            CREATE TABLE IF NOT EXISTS pages (
                file_id INTEGER NOT NULL,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                confidence REAL NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE,
                UNIQUE(file_id, page_number)
            );

            CREATE TABLE IF NOT EXISTS tags (
                file_id INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL,
                confidence REAL NOT NULL,
                model TEXT NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tags_file_id ON tags(file_id);
            CREATE INDEX IF NOT EXISTS idx_tags_text ON tags(text COLLATE NOCASE);

            CREATE TABLE IF NOT EXISTS descriptions (
                file_id INTEGER NOT NULL UNIQUE,
                text TEXT NOT NULL,
                confidence REAL NOT NULL,
                model TEXT NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to create tables: {}", e)))?;

        Ok(())
    }

    /// Get a file record by path
    pub fn file_by_path(&self, path: &Path) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT id, path, content_hash, kind, page_count, size, analyzed_at
             FROM files WHERE path = ?1",
            params![path_to_string(path)],
            row_to_file_record,
        )
        .optional()
        .map_err(|e| Error::Internal(format!("Failed to get file record: {}", e)))
    }

    /// Tags for a file in ordinal order
    pub fn tags_for_file(&self, file_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        Self::tags_with(&conn, file_id)
    }

    fn tags_with(conn: &Connection, file_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT text FROM tags WHERE file_id = ?1 ORDER BY ordinal")
            .map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let tags = stmt
            .query_map(params![file_id], |row| row.get(0))
            .map_err(|e| Error::Internal(format!("Failed to query tags: {}", e)))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| Error::Internal(format!("Failed to read tags: {}", e)))?;

        Ok(tags)
    }

    pub fn description_for_file(&self, file_id: i64) -> Result<Option<Description>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT text, model, confidence FROM descriptions WHERE file_id = ?1",
            params![file_id],
            |row| {
                Ok(Description {
                    text: row.get(0)?,
                    model: row.get(1)?,
                    confidence: row.get::<_, f64>(2)? as f32,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Internal(format!("Failed to get description: {}", e)))
    }

    pub fn pages_for_file(&self, file_id: i64) -> Result<Vec<ExtractedPage>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT page_number, text, confidence FROM pages
                 WHERE file_id = ?1 ORDER BY page_number",
            )
            .map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let pages = stmt
            .query_map(params![file_id], |row| {
                Ok(ExtractedPage {
                    page_number: row.get::<_, i64>(0)? as u32,
                    text: row.get(1)?,
                    confidence: row.get::<_, f64>(2)? as f32,
                })
            })
            .map_err(|e| Error::Internal(format!("Failed to query pages: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Internal(format!("Failed to read pages: {}", e)))?;

        Ok(pages)
    }

    /// Files carrying a tag (case-insensitive)
    pub fn find_by_tag(&self, tag: &str) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT f.id, f.path, f.content_hash, f.kind, f.page_count, f.size, f.analyzed_at
                 FROM files f JOIN tags t ON t.file_id = f.id
                 WHERE t.text = ?1 COLLATE NOCASE
                 ORDER BY f.path",
            )
            .map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![tag.trim()], row_to_file_record)
            .map_err(|e| Error::Internal(format!("Failed to query by tag: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Internal(format!("Failed to read file records: {}", e)))?;

        Ok(records)
    }

    /// Substring search over tags, descriptions and paths
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock();
        let pattern = format!("%{}%", escape_like(query.trim()));

        let records = {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT f.id, f.path, f.content_hash, f.kind, f.page_count, f.size, f.analyzed_at
                    FROM files f
                    WHERE f.path LIKE ?1 ESCAPE '\'
                       OR EXISTS (SELECT 1 FROM tags t
                                  WHERE t.file_id = f.id AND t.text LIKE ?1 ESCAPE '\')
                       OR EXISTS (SELECT 1 FROM descriptions d
                                  WHERE d.file_id = f.id AND d.text LIKE ?1 ESCAPE '\')
                    ORDER BY f.analyzed_at DESC
                    LIMIT ?2
                    "#,
                )
                .map_err(|e| Error::Internal(format!("Failed to prepare search: {}", e)))?;

            let rows = stmt
                .query_map(params![pattern, limit as i64], row_to_file_record)
                .map_err(|e| Error::Internal(format!("Search failed: {}", e)))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::Internal(format!("Failed to read search results: {}", e)))?;
            rows
        };

        let mut hits = Vec::with_capacity(records.len());
        for file in records {
            let id = file.id.unwrap_or_default();
            let tags = Self::tags_with(&conn, id)?;
            let description = conn
                .query_row(
                    "SELECT text FROM descriptions WHERE file_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::Internal(format!("Failed to get description: {}", e)))?;
            hits.push(SearchHit {
                file,
                tags,
                description,
            });
        }

        Ok(hits)
    }
}

impl ResultStore for ResultDb {
    fn has_analysis(&self, content_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM files f
                     WHERE f.content_hash = ?1
                       AND (EXISTS(SELECT 1 FROM tags t WHERE t.file_id = f.id)
                            OR EXISTS(SELECT 1 FROM descriptions d WHERE d.file_id = f.id))
                 )",
                params![content_hash],
                |row| row.get(0),
            )
            .map_err(|e| Error::Internal(format!("Failed to check content hash: {}", e)))?;

        Ok(exists)
    }

    fn save_outcome(&self, record: &FileRecord, outcome: &ProcessingOutcome) -> Result<i64> {
        let mut conn = self.conn.lock();

        let tx = conn
            .transaction()
            .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

        let file_id: i64 = tx
            .query_row(
                r#"
                INSERT INTO files (path, content_hash, kind, page_count, size, analyzed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(path) DO UPDATE SET
                    content_hash = excluded.content_hash,
                    kind = excluded.kind,
                    page_count = excluded.page_count,
                    size = excluded.size,
                    analyzed_at = excluded.analyzed_at
                RETURNING id
                "#,
                params![
                    path_to_string(&record.path),
                    record.content_hash,
                    record.kind.label(),
                    record.page_count as i64,
                    record.size as i64,
                    record.analyzed_at.to_rfc3339(),
                ],
                |row| row.get(0),
            )
            .map_err(|e| Error::Internal(format!("Failed to upsert file record: {}", e)))?;

        for table in ["pages", "tags", "descriptions"] {
            tx.execute(&format!("DELETE FROM {} WHERE file_id = ?1", table), params![file_id])
                .map_err(|e| Error::Internal(format!("Failed to clear {}: {}", table, e)))?;
        }

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO pages (file_id, page_number, text, confidence)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| Error::Internal(format!("Failed to prepare statement: {}", e)))?;
            for page in &outcome.extracted_pages {
                stmt.execute(params![
                    file_id,
                    page.page_number as i64,
                    page.text,
                    page.confidence as f64,
                ])
                .map_err(|e| Error::Internal(format!("Failed to insert page: {}", e)))?;
            }

            let mut stmt = tx
                .prepare(
                    "INSERT INTO tags (file_id, ordinal, text, confidence, model)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(|e| Error::Internal(format!("Failed to prepare statement: {}", e)))?;
            for (ordinal, tag) in outcome.tags.iter().enumerate() {
                stmt.execute(params![
                    file_id,
                    ordinal as i64,
                    tag,
                    outcome.classification_confidence as f64,
                    outcome.tag_model,
                ])
                .map_err(|e| Error::Internal(format!("Failed to insert tag: {}", e)))?;
            }
        }

        if !outcome.description.text.trim().is_empty() {
            tx.execute(
                "INSERT INTO descriptions (file_id, text, confidence, model) VALUES (?1, ?2, ?3, ?4)",
                params![
                    file_id,
                    outcome.description.text,
                    outcome.description.confidence as f64,
                    outcome.description.model,
                ],
            )
            .map_err(|e| Error::Internal(format!("Failed to insert description: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| Error::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(file_id)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();

        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(|e| Error::Internal(format!("Failed to count {}: {}", table, e)))
        };

        Ok(StoreStats {
            files: count("files")?,
            pages: count("pages")?,
            tags: count("tags")?,
            descriptions: count("descriptions")?,
        })
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn escape_like(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn row_to_file_record(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let id: i64 = row.get(0)?;
    let path: String = row.get(1)?;
    let content_hash: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let page_count: i64 = row.get(4)?;
    let size: i64 = row.get(5)?;
    let analyzed_at_str: String = row.get(6)?;

    Ok(FileRecord {
        id: Some(id),
        path: PathBuf::from(path),
        content_hash,
        kind: FileKind::from_label(&kind_str).unwrap_or(FileKind::Text),
        page_count: page_count as u32,
        size: size as u64,
        analyzed_at: DateTime::parse_from_rfc3339(&analyzed_at_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(path: &str, hash: &str, tags: &[&str]) -> ProcessingOutcome {
        ProcessingOutcome {
            path: PathBuf::from(path),
            content_hash: hash.to_string(),
            kind: FileKind::Pdf,
            size: 1200,
            extracted_pages: vec![
                ExtractedPage {
                    page_number: 1,
                    text: "Invoice 42".to_string(),
                    confidence: 0.95,
                },
                ExtractedPage {
                    page_number: 2,
                    text: "Total due".to_string(),
                    confidence: 0.9,
                },
            ],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            classification_confidence: 0.88,
            tag_model: "llama3.2:3b".to_string(),
            description: Description {
                text: "An invoice from ACME".to_string(),
                model: "llama3.2:3b".to_string(),
                confidence: 0.8,
            },
            ocr_confidence: Some(0.925),
            needs_review: false,
            elapsed_seconds: 1.5,
        }
    }

    fn save(db: &ResultDb, outcome: &ProcessingOutcome) -> i64 {
        db.save_outcome(&FileRecord::from_outcome(outcome), outcome).unwrap()
    }

    #[test]
    fn test_save_and_read_back() {
        let db = ResultDb::in_memory().unwrap();
        let out = outcome("/docs/invoice.pdf", "h1", &["invoice", "finance"]);
        let id = save(&db, &out);

        let record = db.file_by_path(Path::new("/docs/invoice.pdf")).unwrap().unwrap();
        assert_eq!(record.id, Some(id));
        assert_eq!(record.page_count, 2);
        assert_eq!(record.kind, FileKind::Pdf);
        assert_eq!(db.tags_for_file(id).unwrap(), vec!["invoice", "finance"]);
        assert_eq!(db.pages_for_file(id).unwrap().len(), 2);
        assert_eq!(
            db.description_for_file(id).unwrap().unwrap().text,
            "An invoice from ACME"
        );
    }

    #[test]
    fn test_has_analysis_is_stable() {
        let db = ResultDb::in_memory().unwrap();
        assert!(!db.has_analysis("h1").unwrap());
        save(&db, &outcome("/docs/a.pdf", "h1", &["a"]));
        assert!(db.has_analysis("h1").unwrap());
        assert!(db.has_analysis("h1").unwrap());
    }

    #[test]
    fn test_bare_file_row_is_not_an_analysis() {
        let db = ResultDb::in_memory().unwrap();
        let mut bare = outcome("/docs/blank.pdf", "h2", &[]);
        bare.description.text = String::new();
        save(&db, &bare);
        assert!(!db.has_analysis("h2").unwrap());

        let mut described = outcome("/docs/described.pdf", "h3", &[]);
        described.description.text = "A blank form".to_string();
        save(&db, &described);
        assert!(db.has_analysis("h3").unwrap());
    }

    #[test]
    fn test_resave_replaces_children() {
        let db = ResultDb::in_memory().unwrap();
        let first = outcome("/docs/a.pdf", "h1", &["a", "b", "c", "d", "e", "f"]);
        let id = save(&db, &first);

        let second = outcome("/docs/a.pdf", "h1", &["x", "y"]);
        let id2 = save(&db, &second);

        assert_eq!(id, id2);
        assert_eq!(db.tags_for_file(id).unwrap(), vec!["x", "y"]);
        let stats = db.stats().unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.tags, 2);
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.descriptions, 1);
    }

    #[test]
    fn test_find_by_tag_and_search() {
        let db = ResultDb::in_memory().unwrap();
        save(&db, &outcome("/docs/a.pdf", "h1", &["Invoice"]));
        save(&db, &outcome("/docs/b.pdf", "h2", &["receipt"]));

        let found = db.find_by_tag("invoice").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, PathBuf::from("/docs/a.pdf"));

        let hits = db.search("receipt", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tags, vec!["receipt"]);

        let hits = db.search("ACME", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(db.search("100%", 10).unwrap().is_empty());
    }

    #[test]
    fn test_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("docsift.db");
        {
            let db = ResultDb::new(&path).unwrap();
            save(&db, &outcome("/docs/a.pdf", "h1", &["a"]));
        }
        let db = ResultDb::new(&path).unwrap();
        assert!(db.has_analysis("h1").unwrap());
    }
}
