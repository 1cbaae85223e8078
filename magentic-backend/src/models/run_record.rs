//! Persisted form of a completed run
//!
//! A `RunRecord` is written once by the storage manager and never updated.
//! The only alternative shape is the metadata-only stub produced when the
//! record store rejects the full document as oversized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UsageTotals;

/// Appended to text content cut at the per-item character limit
pub const TRUNCATION_MARKER: &str = "... [Content truncated due to size limits]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Discriminator stored in the `type` field of every result item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum ResultItemType {
    TextMessage,
    MultiModalMessage,
    TaskResult,
    TruncationNote,
    MetadataOnly,
    Error,
}

/// Reference to an image offloaded to blob storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub blob_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_kb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ImageRef {
    pub fn stored(blob_url: impl Into<String>, size_kb: f64) -> Self {
        Self {
            kind: "image".to_string(),
            blob_url: Some(blob_url.into()),
            size_kb: Some(size_kb),
            note: None,
        }
    }

    pub fn unavailable(note: impl Into<String>) -> Self {
        Self {
            kind: "image".to_string(),
            blob_url: None,
            size_kb: None,
            note: Some(note.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultContent {
    Text(String),
    Image(ImageRef),
}

impl ResultContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResultContent::Text(text) => Some(text),
            ResultContent::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            ResultContent::Image(image) => Some(image),
            ResultContent::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    #[serde(rename = "type")]
    pub item_type: ResultItemType,
    pub source: Option<String>,
    pub content: ResultContent,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_result_count: Option<usize>,
}

impl ResultItem {
    fn new(item_type: ResultItemType, source: Option<String>, content: ResultContent) -> Self {
        Self {
            item_type,
            source,
            content,
            timestamp: Utc::now(),
            original_result_count: None,
        }
    }

    pub fn text(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            ResultItemType::TextMessage,
            Some(source.into()),
            ResultContent::Text(content.into()),
        )
    }

    pub fn image(source: impl Into<String>, image: ImageRef) -> Self {
        Self::new(
            ResultItemType::MultiModalMessage,
            Some(source.into()),
            ResultContent::Image(image),
        )
    }

    pub fn task_result(elapsed_seconds: f64) -> Self {
        Self::new(
            ResultItemType::TaskResult,
            None,
            ResultContent::Text(format!("Task completed in {:.2} seconds", elapsed_seconds)),
        )
    }

    pub fn truncation_note(kept_items: usize) -> Self {
        Self::new(
            ResultItemType::TruncationNote,
            Some("system".to_string()),
            ResultContent::Text(format!(
                "Results truncated at {} items due to the 2MB record size limit",
                kept_items
            )),
        )
    }

    pub fn metadata_only(original_result_count: usize, approx_size_bytes: u64) -> Self {
        let mut item = Self::new(
            ResultItemType::MetadataOnly,
            Some("system".to_string()),
            ResultContent::Text(format!(
                "Results too large to store (>{:.1}MB). Only metadata saved.",
                approx_size_bytes as f64 / 1024.0 / 1024.0
            )),
        );
        item.original_result_count = Some(original_result_count);
        item
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            ResultItemType::Error,
            Some("system".to_string()),
            ResultContent::Text(message.into()),
        )
    }
}

/// Everything about a run that is known before its events are serialized
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub prompt: String,
    pub model_name: String,
    pub use_alternate_provider: bool,
    /// Set when the run failed; the record is then stored with `status = failed`
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub prompt: String,
    pub model_name: String,
    pub use_alternate_provider: bool,
    pub elapsed_seconds: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub results: Vec<ResultItem>,
    #[serde(default)]
    pub document_size_bytes: u64,
    #[serde(default)]
    pub total_images: u32,
    #[serde(default)]
    pub is_metadata_only: bool,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    /// Empty record carrying the run's metadata and aggregate counters
    pub fn new(meta: &RunMetadata, elapsed_seconds: f64, usage: UsageTotals) -> Self {
        Self {
            id: meta.run_id,
            prompt: meta.prompt.clone(),
            model_name: meta.model_name.clone(),
            use_alternate_provider: meta.use_alternate_provider,
            elapsed_seconds: elapsed_seconds.max(0.0),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            created_at: Utc::now(),
            results: Vec::new(),
            document_size_bytes: 0,
            total_images: 0,
            is_metadata_only: false,
            status: if meta.error.is_some() {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            },
            error: meta.error.clone(),
        }
    }

    pub fn usage(&self) -> UsageTotals {
        UsageTotals::new(self.prompt_tokens, self.completion_tokens)
    }

    /// Size of the record as the record store will see it
    pub fn serialized_len(&self) -> Result<usize, serde_json::Error> {
        serde_json::to_vec(self).map(|bytes| bytes.len())
    }

    /// Stub kept when the full record is rejected as oversized
    pub fn metadata_only(&self) -> RunRecord {
        let approx_size = self.serialized_len().map(|n| n as u64).unwrap_or(self.document_size_bytes);
        RunRecord {
            results: vec![ResultItem::metadata_only(self.results.len(), approx_size)],
            document_size_bytes: 0,
            is_metadata_only: true,
            ..self.clone()
        }
    }
}
