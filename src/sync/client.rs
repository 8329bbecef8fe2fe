//! The Sync Manager's HTTP seam to the cloud (§4.4, §6.3). A small trait
//! at the boundary, swappable implementation: the same shape the
//! `CacheBackend` trait gives the cache tiers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{CacheError, Result};
use crate::sync::manifest::ModelManifest;
use crate::sync::queue::SyncRecord;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);
const MODEL_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of a batch upload: `success=false` keeps every record in the
/// queue untouched (§4.4).
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct UploadRequestBody<'a> {
    #[serde(rename = "deviceId")]
    device_id: &'a str,
    items: &'a [SyncRecord],
}

#[derive(Deserialize)]
struct UploadResponseBody {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ManifestResponseBody {
    success: bool,
    #[serde(default)]
    manifest: Option<ManifestBody>,
}

#[derive(Deserialize)]
struct ManifestBody {
    models: std::collections::HashMap<String, crate::sync::manifest::ModelDescriptor>,
}

/// Everything the Sync Manager needs from the cloud: reachability, batch
/// upload, manifest fetch, and model download.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn health_check(&self) -> bool;
    async fn upload_batch(&self, device_id: &str, items: &[SyncRecord]) -> Result<UploadOutcome>;
    async fn fetch_manifest(&self, device_id: &str) -> Result<ModelManifest>;
    async fn download_model(&self, filename: &str, dest: &Path) -> Result<()>;
}

/// Production implementation backed by `reqwest` (§6.3's four endpoints).
pub struct ReqwestCloudClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestCloudClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CloudClient for ReqwestCloudClient {
    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        matches!(
            self.client.get(&url).timeout(PROBE_TIMEOUT).send().await,
            Ok(resp) if resp.status().is_success()
        )
    }

    async fn upload_batch(&self, device_id: &str, items: &[SyncRecord]) -> Result<UploadOutcome> {
        let url = format!("{}/edge/sync", self.base_url);
        let body = UploadRequestBody { device_id, items };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(UploadOutcome {
                success: false,
                error: Some(format!("upload rejected with status {}", response.status())),
            });
        }

        let parsed: UploadResponseBody = response
            .json()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;

        Ok(UploadOutcome {
            success: parsed.success,
            error: parsed.error,
        })
    }

    async fn fetch_manifest(&self, device_id: &str) -> Result<ModelManifest> {
        let url = format!("{}/edge/models/manifest", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("deviceId", device_id)])
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;

        let parsed: ManifestResponseBody = response
            .json()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;

        if !parsed.success {
            return Err(CacheError::UpstreamUnreachable("manifest fetch reported failure".to_string()));
        }

        let models = parsed.manifest.map(|m| m.models).unwrap_or_default();
        Ok(ModelManifest { models })
    }

    /// Streams the response body to `dest` rather than buffering it whole
    /// (§9: the hardening the original's in-memory read should have had).
    async fn download_model(&self, filename: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/edge/models/{filename}", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(MODEL_DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Persistence(e.to_string()))?;
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| CacheError::Persistence(e.to_string()))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CacheError::UpstreamUnreachable(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CacheError::Persistence(e.to_string()))?;
        }
        file.flush().await.map_err(|e| CacheError::Persistence(e.to_string()))?;
        Ok(())
    }
}

/// Test double: always reachable, always succeeds, never touches the
/// network. Used by `SyncManager` unit tests and anywhere a consumer needs
/// to exercise the state machine without a live cloud.
#[derive(Debug, Default)]
pub struct NullCloudClient {
    pub reachable: std::sync::atomic::AtomicBool,
}

impl NullCloudClient {
    #[must_use]
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: std::sync::atomic::AtomicBool::new(reachable),
        }
    }
}

#[async_trait]
impl CloudClient for NullCloudClient {
    async fn health_check(&self) -> bool {
        self.reachable.load(std::sync::atomic::Ordering::Relaxed)
    }

    async fn upload_batch(&self, _device_id: &str, _items: &[SyncRecord]) -> Result<UploadOutcome> {
        Ok(UploadOutcome {
            success: true,
            error: None,
        })
    }

    async fn fetch_manifest(&self, _device_id: &str) -> Result<ModelManifest> {
        Ok(ModelManifest::default())
    }

    async fn download_model(&self, _filename: &str, _dest: &Path) -> Result<()> {
        Ok(())
    }
}
