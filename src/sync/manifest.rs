//! Model manifest reconciliation: compare the cloud's manifest against the
//! local model directory and stream down whatever differs (§4.4).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::sync::client::CloudClient;

/// One model's cloud-side description, keyed by filename in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub filename: String,
    pub version: String,
    pub size: u64,
    #[serde(rename = "downloadUrl", default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// The manifest as received from the cloud (§6.2: persisted verbatim).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub models: HashMap<String, ModelDescriptor>,
}

/// A filename the local directory is missing or holds a stale copy of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    pub filename: String,
}

/// Compare `manifest` against `model_dir`'s current contents. A model needs
/// downloading when the local file is absent or its size differs from the
/// manifest's (§4.4: "local size differs from remote size or the file is
/// absent").
pub fn reconcile(manifest: &ModelManifest, model_dir: &Path) -> Vec<PendingDownload> {
    manifest
        .models
        .values()
        .filter(|descriptor| needs_download(descriptor, model_dir))
        .map(|descriptor| PendingDownload {
            filename: descriptor.filename.clone(),
        })
        .collect()
}

fn needs_download(descriptor: &ModelDescriptor, model_dir: &Path) -> bool {
    let path = model_dir.join(&descriptor.filename);
    match std::fs::metadata(&path) {
        Ok(meta) => meta.len() != descriptor.size,
        Err(_) => true,
    }
}

/// Pull every pending model through `client`, then persist the manifest
/// (§4.4: "Persist the manifest after a successful pull").
pub async fn pull_models(
    client: &dyn CloudClient,
    device_id: &str,
    model_dir: &Path,
    sync_dir: &Path,
) -> Result<ModelManifest> {
    let manifest = client.fetch_manifest(device_id).await?;
    let pending = reconcile(&manifest, model_dir);

    tokio::fs::create_dir_all(model_dir)
        .await
        .map_err(|e| crate::error::CacheError::Persistence(e.to_string()))?;

    for download in &pending {
        let dest = model_dir.join(&download.filename);
        match client.download_model(&download.filename, &dest).await {
            Ok(()) => info!("downloaded model {}", download.filename),
            Err(e) => warn!("model download failed for {}: {}", download.filename, e),
        }
    }

    persist_manifest(sync_dir, &manifest).await?;
    Ok(manifest)
}

async fn persist_manifest(sync_dir: &Path, manifest: &ModelManifest) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(manifest).map_err(|e| crate::error::CacheError::Codec(e.to_string()))?;
    crate::store::write_atomic(sync_dir, "manifest.json", &bytes)
        .await
        .map_err(|e| crate::error::CacheError::Persistence(e.to_string()))
}
