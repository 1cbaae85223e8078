//! Blob storage for images offloaded from run records
//!
//! Blobs are written to `{run_id}/image_{index}.png` inside a single
//! container and referenced from records by URL. The HTTP implementation
//! speaks the Azure Blob Storage REST API with bearer-token authentication.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

pub const IMAGE_CONTENT_TYPE: &str = "image/png";
const STORAGE_API_VERSION: &str = "2021-08-06";

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Blob request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Blob service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid blob URL: {0}")]
    InvalidUrl(String),
}

/// Key under which the `index`-th image of a run is stored
pub fn image_blob_name(run_id: &Uuid, index: u32) -> String {
    format!("{}/image_{}.png", run_id, index)
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the container if it does not exist yet
    async fn ensure_container(&self) -> Result<(), BlobError>;

    /// Write (or overwrite) a blob and return its URL
    async fn upload(&self, blob_name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, BlobError>;

    /// Fetch a blob previously returned by [`BlobStore::upload`]
    async fn download(&self, blob_url: &str) -> Result<Vec<u8>, BlobError>;
}

pub struct HttpBlobStore {
    client: Client,
    account_url: String,
    container: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(account_url: &str, container: &str, token: Option<String>) -> Result<Self, String> {
        let parsed = Url::parse(account_url)
            .map_err(|e| format!("Invalid storage account URL '{}': {}", account_url, e))?;
        if parsed.cannot_be_a_base() {
            return Err(format!("Invalid storage account URL '{}'", account_url));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            account_url: account_url.trim_end_matches('/').to_string(),
            container: container.to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.account_url, self.container)
    }

    pub fn blob_url(&self, blob_name: &str) -> String {
        format!("{}/{}", self.container_url(), blob_name)
    }

    /// Blob name for `blob_url`. URLs issued by this store are resolved
    /// against the container URL, so account URLs with a path prefix work.
    fn blob_name(&self, blob_url: &str) -> Result<String, BlobError> {
        let prefix = format!("{}/", self.container_url());
        match blob_url.strip_prefix(&prefix) {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => blob_name_from_url(blob_url),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header(
                "x-ms-date",
                chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            );
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BlobError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BlobError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Blob name inside the container for a URL on a standard account host.
///
/// URLs look like `https://account.blob.core.windows.net/container/run/image_0.png`;
/// everything after the container segment is the blob name.
pub fn blob_name_from_url(blob_url: &str) -> Result<String, BlobError> {
    let parsed = Url::parse(blob_url).map_err(|e| BlobError::InvalidUrl(format!("{}: {}", blob_url, e)))?;
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.len() {
        0 => Err(BlobError::InvalidUrl(blob_url.to_string())),
        1 => Ok(segments[0].to_string()),
        _ => Ok(segments[1..].join("/")),
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn ensure_container(&self) -> Result<(), BlobError> {
        let url = format!("{}?restype=container", self.container_url());

        let response = self.request(reqwest::Method::GET, &url).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Self::check(response).await.map(|_| ());
        }

        log::info!("[STORAGE] Creating blob container '{}'", self.container);
        let response = self.request(reqwest::Method::PUT, &url).send().await?;
        if response.status() == StatusCode::CONFLICT {
            // Created concurrently by another session
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn upload(&self, blob_name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, BlobError> {
        let url = self.blob_url(blob_name);
        let response = self
            .request(reqwest::Method::PUT, &url)
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(url)
    }

    async fn download(&self, blob_url: &str) -> Result<Vec<u8>, BlobError> {
        let blob_name = self.blob_name(blob_url)?;
        let response = self
            .request(reqwest::Method::GET, &self.blob_url(&blob_name))
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
