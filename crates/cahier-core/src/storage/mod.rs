//! Remote document download.
//!
//! Jobs reference documents by storage path, not inline payload. The
//! client resolves paths against a Supabase-style object store: the
//! public bucket URL is tried first, and any failure is retried once
//! on the same URL with a bearer token, so private buckets work
//! without the caller knowing which kind it is.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::PipelineError;

/// Source of raw document bytes for lesson jobs.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, document_ref: &str) -> Result<Bytes, PipelineError>;
}

/// HTTP client for a Supabase-style object store.
pub struct StorageClient {
    client: reqwest::Client,
    base_url: String,
    service_key: Option<String>,
    download_timeout: Duration,
}

impl StorageClient {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            download_timeout: config.download_timeout,
        }
    }

    /// Public bucket URL for a storage path. The path carries its
    /// bucket as the first segment, e.g. `uploads/livre.pdf`.
    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}",
            self.base_url,
            path.trim_start_matches('/')
        )
    }

    async fn try_get(&self, url: &str, bearer: Option<&str>) -> Result<Bytes, String> {
        let mut request = self.client.get(url).timeout(self.download_timeout);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(format!("HTTP {status} - {excerpt}"));
        }

        response.bytes().await.map_err(|err| err.to_string())
    }
}

#[async_trait]
impl AssetFetcher for StorageClient {
    async fn fetch(&self, document_ref: &str) -> Result<Bytes, PipelineError> {
        let url = if is_absolute_url(document_ref) {
            document_ref.to_string()
        } else {
            if self.base_url.is_empty() {
                return Err(PipelineError::Download(
                    "storage base URL not configured".to_string(),
                ));
            }
            self.public_url(document_ref)
        };

        match self.try_get(&url, None).await {
            Ok(bytes) => return Ok(bytes),
            Err(reason) => {
                debug!(url = %url, %reason, "public download failed, retrying with auth");
            }
        }

        self.try_get(&url, self.service_key.as_deref())
            .await
            .map_err(PipelineError::Download)
    }
}

/// References that are already full URLs skip the bucket resolution.
fn is_absolute_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}
