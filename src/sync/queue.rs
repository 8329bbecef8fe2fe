//! Durable outbound queue: one file per `SyncRecord`, reloaded from disk at
//! startup and after every drain cycle (§4.4).

use std::path::PathBuf;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{CacheError, Result};
use crate::store::write_atomic;

/// An outbound mutation awaiting upload to the cloud (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: String,
    #[serde(rename = "enqueuedAt")]
    pub enqueued_at: u64,
    pub kind: String,
    pub payload: serde_json::Value,
}

/// The durable queue: an in-memory mirror of one file per record under
/// `sync_dir`. The in-memory map is a convenience index: disk is the
/// source of truth, matching `EntryStore`'s own "reload reflects disk
/// truth" contract.
pub struct SyncQueue {
    sync_dir: PathBuf,
    records: DashMap<String, SyncRecord>,
}

impl SyncQueue {
    #[must_use]
    pub fn new(sync_dir: impl Into<PathBuf>) -> Self {
        Self {
            sync_dir: sync_dir.into(),
            records: DashMap::new(),
        }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.sync_dir.join(format!("{id}.json"))
    }

    /// Reload from disk, discarding the in-memory mirror first so it always
    /// reflects what is actually queued (§4.4: "reloaded ... after each
    /// drain cycle to reflect disk truth").
    pub async fn reload(&self) {
        self.records.clear();
        let mut entries = match tokio::fs::read_dir(&self.sync_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                error!("failed to list sync queue directory: {}", e);
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<SyncRecord>(&bytes) {
                    Ok(record) => {
                        self.records.insert(record.id.clone(), record);
                    }
                    Err(e) => warn!("skipping malformed sync record {:?}: {}", path, e),
                },
                Err(e) => warn!("failed to read sync record {:?}: {}", path, e),
            }
        }
    }

    /// Enqueue a record durably: write its file, then mirror it in memory.
    /// The write happens before the mirror update so a crash between the
    /// two still yields the record on the next `reload` (P9).
    pub async fn enqueue(&self, record: SyncRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&record).map_err(|e| CacheError::Codec(e.to_string()))?;
        write_atomic(&self.sync_dir, &format!("{}.json", record.id), &bytes)
            .await
            .map_err(|e| CacheError::Persistence(e.to_string()))?;
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Up to `batch_size` records, in no particular contractual order
    /// (§4.4: "drain the queue in groups of up to 10 records").
    #[must_use]
    pub fn next_batch(&self, batch_size: usize) -> Vec<SyncRecord> {
        self.records.iter().take(batch_size).map(|e| e.value().clone()).collect()
    }

    /// Delete a record's file and drop it from the mirror. Only called
    /// after an acknowledged upload (P10: idempotent, deleting twice is a
    /// no-op, never double-counted).
    pub async fn ack_and_remove(&self, id: &str) -> Result<()> {
        self.records.remove(id);
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Persistence(e.to_string())),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.records.clear();
        match tokio::fs::read_dir(&self.sync_dir).await {
            Ok(mut entries) => {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("json") {
                        let _ = tokio::fs::remove_file(path).await;
                    }
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Persistence(e.to_string())),
        }
    }
}
