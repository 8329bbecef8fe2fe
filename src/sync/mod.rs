//! Sync Manager (C4): durable outbound queue, cloud reachability, batched
//! upload, and model-manifest reconciliation (§4.4).

pub mod client;
pub mod manifest;
pub mod queue;

pub use client::{CloudClient, NullCloudClient, ReqwestCloudClient, UploadOutcome};
pub use manifest::{ModelDescriptor, ModelManifest};
pub use queue::SyncRecord;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::engine::now_millis;
use crate::error::Result;
use crate::sync::queue::SyncQueue;

const BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Idle,
    Probing,
    Uploading,
    PullingModels,
}

/// `{enabled, lastSyncTime, lastSyncStatus, deviceId}` persisted as the
/// sync-config JSON file (§6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub enabled: bool,
    #[serde(rename = "lastSyncTime")]
    pub last_sync_time: Option<u64>,
    #[serde(rename = "lastSyncStatus")]
    pub last_sync_status: Option<String>,
    #[serde(rename = "deviceId")]
    pub device_id: String,
}

/// Result of one `sync_with_cloud` cycle, consumed by the caller to update
/// `CacheStats`'s sync counters.
#[derive(Debug, Clone)]
pub struct SyncCycleOutcome {
    pub status: &'static str,
    pub uploaded: usize,
    pub errored: bool,
}

pub struct SyncManager {
    config: Arc<NodeConfig>,
    client: Arc<dyn CloudClient>,
    queue: SyncQueue,
    sync_config: Mutex<SyncConfig>,
    in_progress: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl SyncManager {
    #[must_use]
    pub fn new(config: Arc<NodeConfig>, client: Arc<dyn CloudClient>) -> Arc<Self> {
        let queue = SyncQueue::new(config.sync_dir.clone());
        let sync_config = Mutex::new(SyncConfig {
            enabled: true,
            last_sync_time: None,
            last_sync_status: None,
            device_id: config.device_id.clone(),
        });
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            client,
            queue,
            sync_config,
            in_progress: AtomicBool::new(false),
            shutdown,
        })
    }

    fn models_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.sync_dir).join("models")
    }

    fn sync_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.config.sync_dir)
    }

    pub async fn load_from_disk(&self) {
        self.queue.reload().await;
        let path = self.sync_dir_path().join("sync-config.json");
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<SyncConfig>(&bytes) {
                Ok(cfg) => *self.sync_config.lock() = cfg,
                Err(e) => warn!("failed to parse sync-config.json: {}", e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to read sync-config.json: {}", e),
        }
    }

    async fn persist_sync_config(&self) {
        let snapshot = self.sync_config.lock().clone();
        match serde_json::to_vec_pretty(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = crate::store::write_atomic(&self.sync_dir_path(), "sync-config.json", &bytes).await
                {
                    warn!("failed to persist sync-config.json: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize sync-config: {}", e),
        }
    }

    /// Enqueue a logical mutation for upload (§4.5 step 4: "enqueue a
    /// SyncRecord for the same logical entry").
    pub async fn queue_translation(&self, key: &str, payload: serde_json::Value) -> Result<()> {
        let record = SyncRecord {
            id: uuid::Uuid::new_v4().to_string(),
            enqueued_at: now_millis(),
            kind: "translation".to_string(),
            payload: serde_json::json!({ "key": key, "body": payload }),
        };
        self.queue.enqueue(record).await
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub async fn clear_sync_queue(&self) -> Result<()> {
        self.queue.clear().await
    }

    pub async fn test_connection(&self) -> bool {
        self.client.health_check().await
    }

    pub fn set_sync_enabled(&self, enabled: bool) {
        self.sync_config.lock().enabled = enabled;
    }

    pub fn get_sync_status(&self) -> SyncConfig {
        self.sync_config.lock().clone()
    }

    /// Run one sync cycle per the §4.4 state machine. Refuses to start a
    /// second cycle concurrently (`syncInProgress`); a dropped tick is
    /// reported as a no-op outcome rather than an error.
    pub async fn sync_with_cloud(&self) -> SyncCycleOutcome {
        if !self.sync_config.lock().enabled {
            debug!("sync disabled, skipping cycle");
            return SyncCycleOutcome {
                status: "disabled",
                uploaded: 0,
                errored: false,
            };
        }

        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!("sync cycle already in progress, dropping tick");
            return SyncCycleOutcome {
                status: "in_progress",
                uploaded: 0,
                errored: false,
            };
        }

        let outcome = self.run_cycle().await;
        self.in_progress.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_cycle(&self) -> SyncCycleOutcome {
        debug!(state = ?SyncState::Probing, "sync cycle starting");
        if !self.client.health_check().await {
            self.finish(false).await;
            return SyncCycleOutcome {
                status: "failed",
                uploaded: 0,
                errored: true,
            };
        }

        debug!(state = ?SyncState::Uploading, "cloud reachable, draining queue");
        self.queue.reload().await;
        let mut uploaded = 0;

        loop {
            let batch = self.queue.next_batch(BATCH_SIZE);
            if batch.is_empty() {
                break;
            }

            match self.client.upload_batch(&self.config.device_id, &batch).await {
                Ok(outcome) if outcome.success => {
                    for record in &batch {
                        if let Err(e) = self.queue.ack_and_remove(&record.id).await {
                            warn!("failed to remove acked sync record {}: {}", record.id, e);
                        }
                    }
                    uploaded += batch.len();
                    self.queue.reload().await;
                }
                Ok(outcome) => {
                    warn!("batch upload rejected: {:?}", outcome.error);
                    self.finish(false).await;
                    return SyncCycleOutcome {
                        status: "failed",
                        uploaded,
                        errored: true,
                    };
                }
                Err(e) => {
                    warn!("batch upload failed: {}", e);
                    self.finish(false).await;
                    return SyncCycleOutcome {
                        status: "failed",
                        uploaded,
                        errored: true,
                    };
                }
            }
        }

        debug!(state = ?SyncState::PullingModels, "uploads drained, pulling model manifest");
        let model_pull = manifest::pull_models(
            self.client.as_ref(),
            &self.config.device_id,
            &self.models_dir(),
            &self.sync_dir_path(),
        )
        .await;

        match model_pull {
            Ok(_) => {
                self.finish(true).await;
                SyncCycleOutcome {
                    status: "success",
                    uploaded,
                    errored: false,
                }
            }
            Err(e) => {
                warn!("model pull failed: {}", e);
                self.finish(false).await;
                SyncCycleOutcome {
                    status: "failed",
                    uploaded,
                    errored: true,
                }
            }
        }
    }

    async fn finish(&self, success: bool) {
        {
            let mut cfg = self.sync_config.lock();
            cfg.last_sync_time = Some(now_millis());
            cfg.last_sync_status = Some(if success { "success" } else { "failed" }.to_string());
        }
        self.persist_sync_config().await;
        info!(success, "sync cycle finished");
    }

    /// Spawn the dedicated tick-loop task (§5: "one dedicated worker owning
    /// the Sync Manager's cycle loop"). Ticks that land while a cycle is
    /// still running are dropped, matching the concurrency contract.
    pub fn start_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        let interval = self.config.sync_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = manager.sync_with_cloud().await;
                        debug!(status = outcome.status, uploaded = outcome.uploaded, "sync tick complete");
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::client::NullCloudClient;

    fn test_manager(dir: &std::path::Path, reachable: bool) -> Arc<SyncManager> {
        let config = Arc::new(NodeConfig::new(
            dir.join("cache").to_string_lossy().to_string(),
            dir.join("sync").to_string_lossy().to_string(),
            "https://cloud.example.com",
        ));
        SyncManager::new(config, Arc::new(NullCloudClient::new(reachable)))
    }

    #[tokio::test]
    async fn queued_record_survives_a_simulated_restart() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), true);
        manager
            .queue_translation("en:es:general:abc", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();

        let restarted = test_manager(dir.path(), true);
        restarted.load_from_disk().await;
        assert_eq!(restarted.pending_count(), 1);
    }

    #[tokio::test]
    async fn unreachable_cloud_leaves_the_queue_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), false);
        manager
            .queue_translation("en:es:general:abc", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();

        let outcome = manager.sync_with_cloud().await;
        assert_eq!(outcome.status, "failed");
        assert_eq!(manager.pending_count(), 1);
    }

    #[tokio::test]
    async fn successful_cycle_drains_the_queue_and_records_status() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), true);
        manager
            .queue_translation("en:es:general:abc", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();

        let outcome = manager.sync_with_cloud().await;
        assert_eq!(outcome.status, "success");
        assert_eq!(outcome.uploaded, 1);
        assert!(manager.pending_count() == 0);
        assert_eq!(manager.get_sync_status().last_sync_status.as_deref(), Some("success"));
    }

    #[tokio::test]
    async fn a_cycle_already_running_drops_a_concurrent_tick() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path(), true);
        manager.in_progress.store(true, Ordering::SeqCst);

        let outcome = manager.sync_with_cloud().await;
        assert_eq!(outcome.status, "in_progress");
    }
}
