//! [`DocumentStore`] – key-addressed blob persistence.
//!
//! The memory stores do not talk to files or databases directly; they go
//! through this narrow get/set contract so the same [`FactStore`] code runs
//! against a per-key JSON file on disk or a local SQLite database. The
//! SQLite backend is the local stand-in for a remote document database: one
//! row per document key, whole-document reads and writes.
//!
//! Both operations are scoped: the backing resource is acquired, used, and
//! released within the call, on error paths included.
//!
//! [`FactStore`]: crate::facts::FactStore

use chrono::Utc;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from document store operations.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid document key: {0:?}")]
    InvalidKey(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// DocumentStore
// ─────────────────────────────────────────────────────────────────────────────

/// Whole-document persistence keyed by an opaque string.
///
/// `get` returns `Ok(None)` for a key that has never been written; absence
/// is not an error. `set` replaces the entire document for the key.
pub trait DocumentStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DocumentError>;
    fn set(&mut self, key: &str, bytes: &[u8]) -> Result<(), DocumentError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// FileDocumentStore
// ─────────────────────────────────────────────────────────────────────────────

/// One JSON file per document key under a data directory.
pub struct FileDocumentStore {
    dir: PathBuf,
}

impl FileDocumentStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// the first `set`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, DocumentError> {
        // Keys become file names; anything that could escape the data
        // directory is rejected.
        if key.is_empty() || key.contains(['/', '\\', '.']) {
            return Err(DocumentError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl DocumentStore for FileDocumentStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DocumentError> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, bytes: &[u8]) -> Result<(), DocumentError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, bytes)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteDocumentStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed document store: one row per key in a `documents` table.
///
/// | column     | type | description                      |
/// |------------|------|----------------------------------|
/// | key        | TEXT | Document key, primary key        |
/// | body       | BLOB | The serialized document         |
/// | updated_at | TEXT | RFC-3339 last-write time (UTC)   |
pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    /// Open (or create) a persistent store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self, DocumentError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), DocumentError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                key        TEXT NOT NULL PRIMARY KEY,
                body       BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DocumentError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM documents WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, Vec<u8>>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, bytes: &[u8]) -> Result<(), DocumentError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO documents (key, body, updated_at) VALUES (?1, ?2, ?3)",
            params![key, bytes, now],
        )?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
