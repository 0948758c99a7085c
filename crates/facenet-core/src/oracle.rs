//! Validity oracle — records whether an image is usable.
//!
//! Keys are derived from the identity directory and file name plus a tag
//! (see [`oracle_key`]), so a store stays valid when the dataset root is
//! moved. Lookups return `None` for images with no recorded entry; callers
//! decide the default through [`ValidityOracle::is_valid`].

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Tag consulted by dataset discovery.
pub const IS_VALID_TAG: &str = "is_valid";

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("validity store not found: {0}")]
    NotFound(String),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Key-value lookup of per-image validity flags.
pub trait ValidityOracle {
    /// Recorded value for `key`, or `None` if nothing was recorded.
    fn lookup(&self, key: &str) -> Result<Option<bool>, OracleError>;

    /// Validity of `path` under the `is_valid` tag.
    ///
    /// `default` is returned when the store has no entry for the image.
    /// Discovery passes `true`: missing information never excludes data.
    fn is_valid(&self, path: &Path, default: bool) -> Result<bool, OracleError> {
        Ok(self
            .lookup(&oracle_key(path, IS_VALID_TAG))?
            .unwrap_or(default))
    }
}

/// Canonical store key: `<identity dir>/<file name>/<tag>`.
pub fn oracle_key(path: &Path, tag: &str) -> String {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let class = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|c| c.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{class}/{file}/{tag}")
}

/// In-process oracle, mostly for tests and programmatic filtering.
#[derive(Debug, Default, Clone)]
pub struct MemoryOracle {
    entries: HashMap<String, bool>,
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the `is_valid` flag for `path`.
    pub fn set_valid(&mut self, path: &Path, valid: bool) {
        self.entries.insert(oracle_key(path, IS_VALID_TAG), valid);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ValidityOracle for MemoryOracle {
    fn lookup(&self, key: &str) -> Result<Option<bool>, OracleError> {
        Ok(self.entries.get(key).copied())
    }
}

/// SQLite-backed validity store.
pub struct SqliteOracle {
    conn: Connection,
}

impl SqliteOracle {
    /// Open an existing store. Fails if the file does not exist.
    pub fn open_existing(path: &Path) -> Result<Self, OracleError> {
        if !path.is_file() {
            return Err(OracleError::NotFound(path.display().to_string()));
        }
        Self::open(path)
    }

    /// Open a store, creating the file and schema if needed.
    pub fn open(path: &Path) -> Result<Self, OracleError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Store that lives only as long as the connection.
    pub fn open_in_memory() -> Result<Self, OracleError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, OracleError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS validity (
                key        TEXT PRIMARY KEY,
                value      INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    /// Record `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, value: bool) -> Result<(), OracleError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO validity (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    /// Record the `is_valid` flag for `path`.
    pub fn set_valid(&self, path: &Path, valid: bool) -> Result<(), OracleError> {
        self.set(&oracle_key(path, IS_VALID_TAG), valid)
    }

    /// Number of recorded entries.
    pub fn len(&self) -> Result<usize, OracleError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM validity", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl ValidityOracle for SqliteOracle {
    fn lookup(&self, key: &str) -> Result<Option<bool>, OracleError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM validity WHERE key = ?1",
                params![key],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(value)
    }
}
