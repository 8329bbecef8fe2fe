//! Entry Store (C1): in-memory ordered index plus atomic on-disk snapshots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, warn};

use crate::entry::{CacheClass, CacheEntry};

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    cache: HashMap<String, CacheEntry>,
    #[serde(rename = "lastSaved")]
    last_saved: u64,
    size: usize,
}

/// One class's in-memory map plus its own monotonic insertion counter.
struct ClassState {
    map: RwLock<HashMap<String, CacheEntry>>,
    next_seq: AtomicU64,
}

impl ClassState {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }
}

/// Holds every `CacheClass`'s map, persisting snapshots to `cache_dir`.
pub struct EntryStore {
    cache_dir: PathBuf,
    translation: ClassState,
    audio: ClassState,
}

impl EntryStore {
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            translation: ClassState::new(),
            audio: ClassState::new(),
        }
    }

    fn state(&self, class: CacheClass) -> &ClassState {
        match class {
            CacheClass::Translation => &self.translation,
            CacheClass::Audio => &self.audio,
        }
    }

    fn snapshot_path(&self, class: CacheClass) -> PathBuf {
        self.cache_dir.join(class.snapshot_filename())
    }

    /// Next sequence number for tie-break ordering within `class` (§4.1, §4.3).
    pub fn next_seq(&self, class: CacheClass) -> u64 {
        self.state(class).next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, class: CacheClass, key: &str) -> Option<CacheEntry> {
        self.state(class).map.read().get(key).cloned()
    }

    pub fn insert(&self, class: CacheClass, entry: CacheEntry) {
        self.state(class).map.write().insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, class: CacheClass, key: &str) -> Option<CacheEntry> {
        self.state(class).map.write().remove(key)
    }

    pub fn len(&self, class: CacheClass) -> usize {
        self.state(class).map.read().len()
    }

    pub fn is_empty(&self, class: CacheClass) -> bool {
        self.len(class) == 0
    }

    pub fn total_size(&self) -> usize {
        CacheClass::all().iter().map(|&c| self.len(c)).sum()
    }

    /// Snapshot of every entry in `class`, in no particular external order
    /// (iteration order is an internal detail, not a contract: §4.1).
    pub fn iterate(&self, class: CacheClass) -> Vec<CacheEntry> {
        self.state(class).map.read().values().cloned().collect()
    }

    pub fn clear(&self, class: CacheClass) {
        self.state(class).map.write().clear();
    }

    pub fn clear_all(&self) {
        for class in CacheClass::all() {
            self.clear(class);
        }
    }

    /// Load one class's snapshot from disk at startup. On parse failure the
    /// class resets to empty and the failure is logged; it never poisons
    /// other classes (§4.1).
    pub async fn load(&self, class: CacheClass) {
        let path = self.snapshot_path(class);
        match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<SnapshotFile>(&bytes) {
                Ok(snapshot) => {
                    let mut map = self.state(class).map.write();
                    let max_seq = snapshot.cache.values().map(|e| e.seq).max().unwrap_or(0);
                    *map = snapshot.cache;
                    self.state(class).next_seq.store(max_seq + 1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!("failed to parse snapshot for {:?}: {}", class, e);
                    self.state(class).map.write().clear();
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // No snapshot yet; start empty, this is not a failure.
            }
            Err(e) => {
                error!("failed to read snapshot for {:?}: {}", class, e);
                self.state(class).map.write().clear();
            }
        }
    }

    pub async fn load_all(&self) {
        for class in CacheClass::all() {
            self.load(class).await;
        }
    }

    /// Write the entire mapping for `class` via write-to-temp-then-rename so
    /// partial writes never surface (§4.1). I/O failures are reported but
    /// non-fatal: the in-memory state remains authoritative.
    pub async fn save(&self, class: CacheClass, now: u64) -> std::io::Result<()> {
        let snapshot = {
            let map = self.state(class).map.read();
            SnapshotFile {
                cache: map.clone(),
                last_saved: now,
                size: map.len(),
            }
        };

        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        write_atomic(&self.cache_dir, class.snapshot_filename(), &bytes).await
    }

    pub async fn save_all(&self, now: u64) {
        for class in CacheClass::all() {
            if let Err(e) = self.save(class, now).await {
                warn!("snapshot save failed for {:?}: {}", class, e);
            }
        }
    }
}

/// Write `bytes` to `dir/name` atomically: write to a temp file then rename.
pub async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir).await?;
    let final_path = dir.join(name);
    let tmp_path = dir.join(format!("{name}.tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp_path, bytes).await?;
    fs::rename(&tmp_path, &final_path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CacheBody, Criticality};

    fn sample_entry(key: &str, seq: u64) -> CacheEntry {
        let body = CacheBody::Translation {
            translated_text: "Hola".to_string(),
            confidence: "high".to_string(),
            context: "general".to_string(),
            source_lang: "en".to_string(),
            target_lang: "es".to_string(),
            merge_source: None,
            merge_timestamp: None,
        };
        let encoded = crate::codec::encode(&body, false, true, 1024, 6).unwrap();
        CacheEntry {
            key: key.to_string(),
            cache_class: CacheClass::Translation,
            payload: encoded.bytes,
            is_compressed: encoded.is_compressed,
            original_size: encoded.original_size,
            stored_size: encoded.stored_size,
            created_at: 0,
            last_modified_at: 0,
            last_accessed_at: 0,
            ttl_millis: 86_400_000,
            hit_count: 0,
            offline_priority: false,
            criticality: Criticality::Low,
            version: "v-0".to_string(),
            version_history: Vec::new(),
            needs_sync: false,
            needs_refresh: false,
            synced_at: None,
            seq,
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::new(dir.path());
        store.insert(CacheClass::Translation, sample_entry("k1", 0));
        store.insert(CacheClass::Translation, sample_entry("k2", 1));
        store.save(CacheClass::Translation, 1234).await.unwrap();

        let reloaded = EntryStore::new(dir.path());
        reloaded.load(CacheClass::Translation).await;
        assert_eq!(reloaded.len(CacheClass::Translation), 2);
        assert!(reloaded.get(CacheClass::Translation, "k1").is_some());
    }

    #[tokio::test]
    async fn load_failure_on_one_class_does_not_affect_the_other() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CacheClass::Translation.snapshot_filename()), b"not json")
            .await
            .unwrap();
        let store = EntryStore::new(dir.path());
        store.insert(CacheClass::Audio, sample_entry("audio-1", 0));
        store.load_all().await;

        assert_eq!(store.len(CacheClass::Translation), 0);
        assert_eq!(store.len(CacheClass::Audio), 1);
    }

    #[tokio::test]
    async fn entries_on_disk_equals_entries_in_memory_after_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::new(dir.path());
        for i in 0..5 {
            store.insert(CacheClass::Translation, sample_entry(&format!("k{i}"), i));
        }
        store.save(CacheClass::Translation, 99).await.unwrap();

        let bytes = fs::read(dir.path().join(CacheClass::Translation.snapshot_filename()))
            .await
            .unwrap();
        let snapshot: SnapshotFile = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot.cache.len(), store.len(CacheClass::Translation));
    }
}
