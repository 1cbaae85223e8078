//! Record store - one JSON document per run, keyed by run id
//!
//! The SQLite implementation mirrors a document database with a per-item size
//! ceiling: documents larger than `max_document_bytes` are rejected with
//! [`RecordStoreError::TooLarge`] so the caller can fall back to a smaller
//! record.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use uuid::Uuid;

use crate::models::RunRecord;

/// Hard ceiling enforced by the store (2 MiB)
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("Request size is too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("Record {0} already exists")]
    Conflict(String),
    #[error("Record store error: {0}")]
    Backend(String),
    #[error("Stored record is not valid: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for RecordStoreError {
    fn from(e: rusqlite::Error) -> Self {
        RecordStoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record; existing ids are never overwritten
    async fn create(&self, record: &RunRecord) -> Result<(), RecordStoreError>;

    /// Point lookup by id; `Ok(None)` when absent
    async fn read(&self, id: &Uuid) -> Result<Option<RunRecord>, RecordStoreError>;
}

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    table: String,
    max_document_bytes: usize,
}

impl SqliteRecordStore {
    /// Open (or create) the store at `path`, using `table` as the container
    pub fn open(path: &str, table: &str, max_document_bytes: usize) -> Result<Self, RecordStoreError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RecordStoreError::Backend(format!(
                "Invalid record container name '{}'",
                table
            )));
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(path)?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    document TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
                table
            ),
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            max_document_bytes,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, record: &RunRecord) -> Result<(), RecordStoreError> {
        let document = serde_json::to_string(record)?;
        if document.len() > self.max_document_bytes {
            return Err(RecordStoreError::TooLarge {
                size: document.len(),
                limit: self.max_document_bytes,
            });
        }

        let conn = self.conn.lock();
        let result = conn.execute(
            &format!("INSERT INTO {} (id, document, created_at) VALUES (?1, ?2, ?3)", self.table),
            params![record.id.to_string(), document, record.created_at.to_rfc3339()],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(RecordStoreError::Conflict(record.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, id: &Uuid) -> Result<Option<RunRecord>, RecordStoreError> {
        let document: Option<String> = {
            let conn = self.conn.lock();
            let result = conn.query_row(
                &format!("SELECT document FROM {} WHERE id = ?1", self.table),
                params![id.to_string()],
                |row| row.get(0),
            );
            match result {
                Ok(doc) => Some(doc),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            }
        };

        match document {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }
}
