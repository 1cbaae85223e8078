//! Converts a finished run's events into a bounded `RunRecord`
//!
//! Images are offloaded through an [`ImageUploader`] and replaced by blob
//! references. Items are added in arrival order until the next one would push
//! the document past the byte budget; at that point a single truncation note
//! is appended and serialization stops.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use uuid::Uuid;

use crate::agents::{AgentEvent, AgentMessage, MessageKind};
use crate::models::{ImageRef, ResultItem, RunMetadata, RunRecord, TRUNCATION_MARKER, UsageTotals};

/// Serialized record budget (1.5 MiB), below the store's 2 MiB ceiling
pub const DEFAULT_BUDGET_BYTES: usize = 1_572_864;
/// Text content longer than this is cut and marked
pub const MAX_TEXT_CHARS: usize = 100_000;

pub const NOTE_NO_IMAGE: &str = "No image content available";
pub const NOTE_UNDECODABLE: &str = "Image payload could not be decoded";
pub const NOTE_UPLOAD_FAILED: &str = "Failed to upload image to blob storage";

// Timestamps serialize with a variable number of fractional digits
const TIMESTAMP_SLACK: usize = 16;

/// Destination for image payloads found in run events
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Store the `index`-th image of `run_id`; `None` when it could not be stored
    async fn upload_image(&self, bytes: Vec<u8>, run_id: Uuid, index: u32) -> Option<String>;
}

pub struct ResultSerializer {
    budget_bytes: usize,
}

impl Default for ResultSerializer {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET_BYTES)
    }
}

impl ResultSerializer {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    pub async fn serialize(
        &self,
        meta: &RunMetadata,
        events: &[AgentEvent],
        elapsed_seconds: f64,
        usage: UsageTotals,
        uploader: &dyn ImageUploader,
    ) -> Result<RunRecord, serde_json::Error> {
        let mut record = RunRecord::new(meta, elapsed_seconds, usage);

        // Envelope measured with the widest counters it can end up holding
        let envelope = RunRecord {
            document_size_bytes: u64::MAX,
            total_images: u32::MAX,
            ..record.clone()
        };
        let mut running = envelope.serialized_len()?;
        let note_reserve = serde_json::to_vec(&ResultItem::truncation_note(usize::MAX))?.len() + TIMESTAMP_SLACK + 1;

        let mut image_index: u32 = 0;
        let mut results = Vec::new();
        let mut truncated = false;

        for (position, event) in events.iter().enumerate() {
            let item = match event {
                AgentEvent::Final(_) => ResultItem::task_result(elapsed_seconds),
                AgentEvent::Message(message) => match message.kind {
                    MessageKind::MultiModal => {
                        let (item, stored) = self.image_item(message, meta.run_id, &mut image_index, uploader).await;
                        if stored {
                            record.total_images += 1;
                        }
                        item
                    }
                    MessageKind::Text => ResultItem::text(
                        message.source.clone(),
                        truncate_text(message.text.as_deref().unwrap_or_default()),
                    ),
                },
            };

            let separator = usize::from(!results.is_empty());
            let item_len = serde_json::to_vec(&item)?.len() + separator;
            let is_last = position + 1 == events.len();
            let reserve = if is_last { 0 } else { note_reserve };

            if running + item_len + reserve > self.budget_bytes {
                log::warn!(
                    "[STORAGE] Run {} exceeds the {} byte budget, truncating at {} items",
                    meta.run_id,
                    self.budget_bytes,
                    results.len()
                );
                results.push(ResultItem::truncation_note(results.len()));
                truncated = true;
                break;
            }

            running += item_len;
            results.push(item);
        }

        if truncated {
            // Only kept images count towards the total
            record.total_images = results
                .iter()
                .filter_map(|item| item.content.as_image())
                .filter(|image| image.blob_url.is_some())
                .count() as u32;
        }

        record.results = results;
        record.document_size_bytes = record.serialized_len()? as u64;
        Ok(record)
    }

    async fn image_item(
        &self,
        message: &AgentMessage,
        run_id: Uuid,
        image_index: &mut u32,
        uploader: &dyn ImageUploader,
    ) -> (ResultItem, bool) {
        let Some(encoded) = message.image.as_deref() else {
            return (ResultItem::image(message.source.clone(), ImageRef::unavailable(NOTE_NO_IMAGE)), false);
        };

        let index = *image_index;
        *image_index += 1;

        let bytes = match BASE64.decode(encoded) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            _ => {
                log::warn!("[STORAGE] Image {} of run {} could not be decoded", index, run_id);
                return (
                    ResultItem::image(message.source.clone(), ImageRef::unavailable(NOTE_UNDECODABLE)),
                    false,
                );
            }
        };

        let size_kb = (bytes.len() as f64 / 1024.0 * 10.0).round() / 10.0;
        match uploader.upload_image(bytes, run_id, index).await {
            Some(url) => (ResultItem::image(message.source.clone(), ImageRef::stored(url, size_kb)), true),
            None => (
                ResultItem::image(message.source.clone(), ImageRef::unavailable(NOTE_UPLOAD_FAILED)),
                false,
            ),
        }
    }
}

/// Cut text at [`MAX_TEXT_CHARS`] characters and mark it
pub fn truncate_text(text: &str) -> String {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
