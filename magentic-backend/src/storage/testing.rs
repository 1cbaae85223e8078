//! In-memory stores with call counters for storage tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use super::blob::{BlobError, BlobStore};
use super::record_store::{RecordStore, RecordStoreError};
use crate::models::RunRecord;

pub struct MemoryRecordStore {
    records: Mutex<HashMap<Uuid, RunRecord>>,
    max_bytes: usize,
    pub creates: AtomicUsize,
    pub reads: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_bytes,
            creates: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<RunRecord> {
        self.records.lock().get(id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: &RunRecord) -> Result<(), RecordStoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let size = record.serialized_len()?;
        if size > self.max_bytes {
            return Err(RecordStoreError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        let mut records = self.records.lock();
        if records.contains_key(&record.id) {
            return Err(RecordStoreError::Conflict(record.id.to_string()));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn read(&self, id: &Uuid) -> Result<Option<RunRecord>, RecordStoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(id))
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_uploads: bool,
    pub ensure_calls: AtomicUsize,
    pub uploads: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn ensure_container(&self) -> Result<(), BlobError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload(&self, blob_name: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, BlobError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads {
            return Err(BlobError::Status {
                status: 403,
                body: "AuthorizationFailure".to_string(),
            });
        }
        let url = format!("https://blob.test/images/{}", blob_name);
        self.blobs.lock().insert(url.clone(), bytes);
        Ok(url)
    }

    async fn download(&self, blob_url: &str) -> Result<Vec<u8>, BlobError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().get(blob_url).cloned().ok_or_else(|| BlobError::Status {
            status: 404,
            body: "BlobNotFound".to_string(),
        })
    }
}
