//! Storage manager - the single boundary to the record store and blob store
//!
//! When persistence is disabled every operation is a no-op that returns
//! `None`/`Disabled` without touching any backend. Transport failures never
//! escape this module; they are logged and converted into return values.

pub mod blob;
pub mod image_cache;
pub mod record_store;
pub mod serializer;
#[cfg(test)]
pub(crate) mod testing;

pub use blob::{BlobError, BlobStore, HttpBlobStore};
pub use image_cache::ImageCache;
pub use record_store::{RecordStore, RecordStoreError, SqliteRecordStore};
pub use serializer::{ImageUploader, ResultSerializer};

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::RunRecord;

/// Result of handing a record to [`StorageManager::store`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    Disabled,
    Stored { size_bytes: u64, images: u32 },
    /// The full record was too large; only the metadata stub was written
    MetadataOnly,
    Failed(String),
}

impl StoreOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StoreOutcome::Stored { .. } | StoreOutcome::MetadataOnly)
    }
}

struct Backends {
    records: Arc<dyn RecordStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    container_ready: AtomicBool,
}

pub struct StorageManager {
    backends: Option<Backends>,
    cache: ImageCache,
}

impl StorageManager {
    pub fn disabled() -> Self {
        Self {
            backends: None,
            cache: ImageCache::default(),
        }
    }

    pub fn new(records: Arc<dyn RecordStore>, blobs: Option<Arc<dyn BlobStore>>) -> Self {
        Self {
            backends: Some(Backends {
                records,
                blobs,
                container_ready: AtomicBool::new(false),
            }),
            cache: ImageCache::default(),
        }
    }

    /// Build the manager described by the environment configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self, String> {
        if !config.enabled {
            log::info!("[STORAGE] Run result storage is disabled (set STORE_RUN_RESULT=true to enable)");
            return Ok(Self::disabled());
        }

        let records = SqliteRecordStore::open(&config.record_store_path, &config.record_container, config.record_max_bytes)
            .map_err(|e| format!("Failed to open record store: {}", e))?;

        let blobs: Option<Arc<dyn BlobStore>> = match &config.blob_account_url {
            Some(url) => Some(Arc::new(HttpBlobStore::new(url, &config.blob_container, config.blob_token.clone())?)),
            None => {
                log::warn!("[STORAGE] AZURE_STORAGE_ACCOUNT_URL is not set; images will not be stored");
                None
            }
        };

        log::info!(
            "[STORAGE] Run results will be stored in {} ({})",
            config.record_store_path,
            config.record_container
        );
        Ok(Self::new(Arc::new(records), blobs))
    }

    pub fn is_enabled(&self) -> bool {
        self.backends.is_some()
    }

    /// Write an image to `{run_id}/image_{index}.png`, returning its URL
    pub async fn upload_image(&self, bytes: Vec<u8>, run_id: Uuid, index: u32) -> Option<String> {
        let backends = self.backends.as_ref()?;
        let Some(blobs) = backends.blobs.as_ref() else {
            log::warn!("[STORAGE] No blob store configured, dropping image {} of run {}", index, run_id);
            return None;
        };

        if !backends.container_ready.load(Ordering::Acquire) {
            if let Err(e) = blobs.ensure_container().await {
                log::error!("[STORAGE] Failed to prepare blob container: {}", e);
                return None;
            }
            backends.container_ready.store(true, Ordering::Release);
        }

        let blob_name = blob::image_blob_name(&run_id, index);
        match blobs.upload(&blob_name, bytes, blob::IMAGE_CONTENT_TYPE).await {
            Ok(url) => {
                log::debug!("[STORAGE] Uploaded {}", blob_name);
                Some(url)
            }
            Err(e) => {
                log::error!("[STORAGE] Failed to upload {}: {}", blob_name, e);
                None
            }
        }
    }

    /// Persist a record; oversized records fall back once to a metadata-only stub
    pub async fn store(&self, record: &RunRecord) -> StoreOutcome {
        let Some(backends) = self.backends.as_ref() else {
            return StoreOutcome::Disabled;
        };

        match backends.records.create(record).await {
            Ok(()) => {
                log::info!(
                    "[STORAGE] Stored run {} ({} bytes, {} images)",
                    record.id,
                    record.document_size_bytes,
                    record.total_images
                );
                StoreOutcome::Stored {
                    size_bytes: record.document_size_bytes,
                    images: record.total_images,
                }
            }
            Err(RecordStoreError::TooLarge { size, limit }) if !record.is_metadata_only => {
                log::warn!(
                    "[STORAGE] Run {} is too large ({} > {} bytes), storing metadata only",
                    record.id,
                    size,
                    limit
                );
                match backends.records.create(&record.metadata_only()).await {
                    Ok(()) => StoreOutcome::MetadataOnly,
                    Err(e) => {
                        log::error!("[STORAGE] Failed to store metadata for run {}: {}", record.id, e);
                        StoreOutcome::Failed(e.to_string())
                    }
                }
            }
            Err(e) => {
                log::error!("[STORAGE] Failed to store run {}: {}", record.id, e);
                StoreOutcome::Failed(e.to_string())
            }
        }
    }

    /// Point lookup by run id; any failure reads as "not found"
    pub async fn load(&self, run_id: &str) -> Option<RunRecord> {
        let backends = self.backends.as_ref()?;
        let id = match Uuid::parse_str(run_id.trim()) {
            Ok(id) => id,
            Err(_) => {
                log::warn!("[STORAGE] Ignoring malformed run id '{}'", run_id);
                return None;
            }
        };

        match backends.records.read(&id).await {
            Ok(record) => record,
            Err(e) => {
                log::error!("[STORAGE] Failed to load run {}: {}", id, e);
                None
            }
        }
    }

    /// Fetch a stored image, reusing recent downloads
    pub async fn download_image(&self, blob_url: &str) -> Option<Vec<u8>> {
        let backends = self.backends.as_ref()?;
        let blobs = backends.blobs.as_ref()?;

        if let Some(bytes) = self.cache.get(blob_url) {
            return Some(bytes);
        }

        match blobs.download(blob_url).await {
            Ok(bytes) => {
                self.cache.insert(blob_url, bytes.clone());
                Some(bytes)
            }
            Err(e) => {
                log::error!("[STORAGE] Failed to download {}: {}", blob_url, e);
                None
            }
        }
    }
}

#[async_trait]
impl ImageUploader for StorageManager {
    async fn upload_image(&self, bytes: Vec<u8>, run_id: Uuid, index: u32) -> Option<String> {
        StorageManager::upload_image(self, bytes, run_id, index).await
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{MemoryBlobStore, MemoryRecordStore};
    use super::*;
    use crate::agents::{AgentEvent, AgentMessage, MessageUsage, TaskOutcome};
    use crate::models::{ResultItem, ResultItemType, RunMetadata, UsageTotals};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn meta() -> RunMetadata {
        RunMetadata {
            run_id: Uuid::new_v4(),
            prompt: "summarize the page".to_string(),
            model_name: "gpt-4o".to_string(),
            use_alternate_provider: false,
            error: None,
        }
    }

    fn enabled(max_bytes: usize) -> (StorageManager, Arc<MemoryRecordStore>, Arc<MemoryBlobStore>) {
        let records = Arc::new(MemoryRecordStore::new(max_bytes));
        let blobs = Arc::new(MemoryBlobStore::default());
        let manager = StorageManager::new(records.clone(), Some(blobs.clone()));
        (manager, records, blobs)
    }

    #[tokio::test]
    async fn test_disabled_storage_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.db");
        let config = StorageConfig {
            enabled: false,
            record_store_path: path.to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let manager = StorageManager::from_config(&config).unwrap();

        assert!(!manager.is_enabled());
        assert_eq!(manager.upload_image(vec![1], Uuid::new_v4(), 0).await, None);
        assert_eq!(manager.load(&Uuid::new_v4().to_string()).await, None);
        assert_eq!(manager.download_image("https://blob.test/images/x.png").await, None);

        let record = RunRecord::new(&meta(), 1.0, UsageTotals::default());
        let outcome = manager.store(&record).await;
        assert_eq!(outcome, StoreOutcome::Disabled);
        assert!(!outcome.is_success());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_serialize_store_load_preserves_run() {
        let (manager, _, blobs) = enabled(2 * 1024 * 1024);
        let meta = meta();
        let events = vec![
            AgentEvent::Message(AgentMessage::text("user", "summarize the page")),
            AgentEvent::Message(AgentMessage::multimodal(
                "WebSurfer",
                Some("screenshot".to_string()),
                Some(BASE64.encode([9u8; 300])),
            )),
            AgentEvent::Message(AgentMessage::text("MagenticOneOrchestrator", "The page is about Rust.")),
            AgentEvent::Final(TaskOutcome {
                messages: vec![AgentMessage::text("MagenticOneOrchestrator", "done").with_usage(MessageUsage {
                    prompt_tokens: 120,
                    completion_tokens: 45,
                })],
                stop_reason: None,
            }),
        ];

        let record = ResultSerializer::default()
            .serialize(&meta, &events, 12.34, UsageTotals::new(120, 45), &manager)
            .await
            .unwrap();
        let outcome = manager.store(&record).await;
        assert_eq!(
            outcome,
            StoreOutcome::Stored {
                size_bytes: record.document_size_bytes,
                images: 1
            }
        );
        assert_eq!(blobs.ensure_calls.load(Ordering::SeqCst), 1);

        let loaded = manager.load(&meta.run_id.to_string()).await.unwrap();
        assert_eq!(loaded.id, meta.run_id);
        assert_eq!(loaded.prompt, meta.prompt);
        assert_eq!(loaded.usage(), UsageTotals::new(120, 45));
        assert_eq!(loaded.elapsed_seconds, 12.34);
        assert_eq!(loaded.results.len(), events.len());
        let types: Vec<_> = loaded.results.iter().map(|r| r.item_type).collect();
        assert_eq!(
            types,
            vec![
                ResultItemType::TextMessage,
                ResultItemType::MultiModalMessage,
                ResultItemType::TextMessage,
                ResultItemType::TaskResult
            ]
        );

        // Stored image is served from the blob store, then from the cache
        let url = loaded.results[1].content.as_image().and_then(|i| i.blob_url.clone()).unwrap();
        assert_eq!(manager.download_image(&url).await, Some(vec![9u8; 300]));
        assert_eq!(manager.download_image(&url).await, Some(vec![9u8; 300]));
        assert_eq!(blobs.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_record_degrades_once() {
        let (manager, records, _) = enabled(4096);
        let mut record = RunRecord::new(&meta(), 3.0, UsageTotals::new(1, 2));
        record.results = (0..20).map(|i| ResultItem::text("Coder", format!("{}{}", i, "z".repeat(400)))).collect();

        assert_eq!(manager.store(&record).await, StoreOutcome::MetadataOnly);
        assert_eq!(records.creates.load(Ordering::SeqCst), 2);

        let stored = records.get(&record.id).unwrap();
        assert!(stored.is_metadata_only);
        assert_eq!(stored.results.len(), 1);
        assert_eq!(stored.results[0].item_type, ResultItemType::MetadataOnly);
        assert_eq!(stored.results[0].original_result_count, Some(20));
        assert_eq!(stored.usage(), record.usage());
    }

    #[tokio::test]
    async fn test_oversized_metadata_is_not_retried() {
        let (manager, records, _) = enabled(64);
        let record = RunRecord::new(&meta(), 3.0, UsageTotals::default());

        let outcome = manager.store(&record).await;
        assert!(matches!(outcome, StoreOutcome::Failed(_)));
        assert_eq!(records.creates.load(Ordering::SeqCst), 2);

        let stub = record.metadata_only();
        assert!(matches!(manager.store(&stub).await, StoreOutcome::Failed(_)));
        assert_eq!(records.creates.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upload_failures_and_bad_ids_become_none() {
        let records = Arc::new(MemoryRecordStore::new(1024 * 1024));
        let blobs = Arc::new(MemoryBlobStore::failing());
        let manager = StorageManager::new(records.clone(), Some(blobs.clone()));

        assert_eq!(manager.upload_image(vec![1, 2], Uuid::new_v4(), 0).await, None);
        assert_eq!(blobs.uploads.load(Ordering::SeqCst), 1);

        assert_eq!(manager.load("not-a-uuid").await, None);
        assert_eq!(records.reads.load(Ordering::SeqCst), 0);

        let no_blobs = StorageManager::new(records, None);
        assert_eq!(no_blobs.upload_image(vec![1], Uuid::new_v4(), 0).await, None);
        assert_eq!(no_blobs.download_image("https://blob.test/images/x.png").await, None);
    }
}
