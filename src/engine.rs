//! Cache Engine (C3): the policy kernel - TTL expiry, criticality-aware
//! retention, hit-count promotion, score-based eviction, version history,
//! and conflict resolution, §4.3.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::codec;
use crate::config::NodeConfig;
use crate::entry::{CacheBody, CacheClass, CacheEntry, Criticality};
use crate::error::{CacheError, Result};
use crate::stats::{AtomicClassCounters, CacheStats};
use crate::store::EntryStore;

#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn random_suffix() -> String {
    let n: u32 = rand::thread_rng().r#gen();
    format!("{n:08x}")
}

/// Options accepted by `CacheEngine::get` (§4.3).
#[derive(Debug, Default, Clone)]
pub struct GetOptions {
    pub version: Option<String>,
    pub include_metadata: bool,
    pub ttl_override: Option<u64>,
}

/// A successful `get` either returns the live entry or, when an explicit
/// `version` was requested and only archived metadata survives, a
/// restricted result flagged as limited (§4.3).
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Hit(CacheEntry),
    Archived {
        version: String,
        timestamp: u64,
        metadata: serde_json::Value,
    },
}

/// Options accepted by `CacheEngine::set` (§4.3).
#[derive(Debug, Default, Clone)]
pub struct SetOptions {
    pub ttl_millis: Option<u64>,
    pub criticality: Option<Criticality>,
    pub needs_sync: bool,
    pub version: Option<String>,
    pub force_compress: bool,
}

#[derive(Debug, Default, Clone)]
pub struct EvictOptions {
    pub target_count: Option<usize>,
    pub emergency_mode: bool,
}

#[derive(Debug, Default, Clone)]
pub struct CleanupOptions {
    pub force_cleanup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    Local,
    Remote,
    Both,
    Merge,
}

#[derive(Debug, Clone)]
pub struct ConflictSide {
    pub body: CacheBody,
    pub timestamp: u64,
}

/// The policy kernel owning every `CacheEntry`, §3's "Cache Engine
/// exclusively owns every CacheEntry" invariant.
pub struct CacheEngine {
    config: Arc<NodeConfig>,
    store: Arc<EntryStore>,
    counters: [AtomicClassCounters; 2],
    compression: parking_lot::Mutex<crate::stats::CompressionAggregate>,
    criticality: parking_lot::Mutex<crate::stats::CriticalityCounts>,
    sync_counters: parking_lot::Mutex<crate::stats::SyncCounters>,
    writes_since_snapshot: [AtomicU64; 2],
    shutdown: watch::Sender<bool>,
}

fn counters_index(class: CacheClass) -> usize {
    match class {
        CacheClass::Translation => 0,
        CacheClass::Audio => 1,
    }
}

impl CacheEngine {
    #[must_use]
    pub fn new(config: Arc<NodeConfig>, store: Arc<EntryStore>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            store,
            counters: [AtomicClassCounters::default(), AtomicClassCounters::default()],
            compression: parking_lot::Mutex::new(crate::stats::CompressionAggregate::default()),
            criticality: parking_lot::Mutex::new(crate::stats::CriticalityCounts::default()),
            sync_counters: parking_lot::Mutex::new(crate::stats::SyncCounters::default()),
            writes_since_snapshot: [AtomicU64::new(0), AtomicU64::new(0)],
            shutdown,
        })
    }

    pub async fn load_from_disk(&self) {
        self.store.load_all().await;
        let mut criticality = crate::stats::CriticalityCounts::default();
        let mut compression = crate::stats::CompressionAggregate::default();
        for class in CacheClass::all() {
            for entry in self.store.iterate(class) {
                criticality.bump(entry.criticality, 1);
                compression.items += 1;
                compression.original_bytes += entry.original_size as u64;
                compression.stored_bytes += entry.stored_size as u64;
            }
        }
        *self.criticality.lock() = criticality;
        *self.compression.lock() = compression;
    }

    fn counters(&self, class: CacheClass) -> &AtomicClassCounters {
        &self.counters[counters_index(class)]
    }

    // ---- criticality auto-promotion (§4.3) ----

    fn auto_promote_translation(context: &str, confidence: &str) -> Criticality {
        let mut criticality = match context {
            "emergency" | "critical_care" => Criticality::Critical,
            "diagnosis" | "medication" => Criticality::High,
            "general" | "conversation" => Criticality::Low,
            _ => Criticality::Medium,
        };
        if confidence == "high" {
            criticality = criticality.promote_capped_at_high();
        }
        criticality
    }

    /// §4.3 `get`.
    pub fn get(&self, class: CacheClass, key: &str, options: &GetOptions) -> Result<GetOutcome> {
        if !self.config.cache_enabled {
            return Err(CacheError::CacheDisabled);
        }
        self.counters(class).total_requests.fetch_add(1, Ordering::Relaxed);

        let Some(mut entry) = self.store.get(class, key) else {
            self.counters(class).misses.fetch_add(1, Ordering::Relaxed);
            return Err(CacheError::NotFound);
        };

        if let Some(requested_version) = &options.version {
            if *requested_version != entry.version {
                return match entry.find_version(requested_version) {
                    Some(archived) => Ok(GetOutcome::Archived {
                        version: archived.version.clone(),
                        timestamp: archived.timestamp,
                        metadata: archived.minimal_metadata.clone(),
                    }),
                    None => Err(CacheError::NotFound),
                };
            }
        }

        let now = now_millis();
        let effective_ttl = options.ttl_override.unwrap_or(entry.ttl_millis);
        let expired = now.saturating_sub(entry.created_at) > effective_ttl;

        if expired {
            if entry.criticality >= Criticality::High {
                entry.needs_refresh = true;
                self.store.insert(class, entry.clone());
                self.counters(class).hits.fetch_add(1, Ordering::Relaxed);
                return Ok(GetOutcome::Hit(entry));
            }
            self.store.remove(class, key);
            self.criticality.lock().bump(entry.criticality, -1);
            let mut compression = self.compression.lock();
            compression.items = compression.items.saturating_sub(1);
            compression.original_bytes = compression.original_bytes.saturating_sub(entry.original_size as u64);
            compression.stored_bytes = compression.stored_bytes.saturating_sub(entry.stored_size as u64);
            self.counters(class).misses.fetch_add(1, Ordering::Relaxed);
            return Err(CacheError::NotFound);
        }

        entry.last_accessed_at = now;
        entry.hit_count += 1;
        if entry.hit_count >= u64::from(self.config.offline_priority_threshold) && !entry.offline_priority {
            entry.offline_priority = true;
        }
        self.store.insert(class, entry.clone());
        self.counters(class).hits.fetch_add(1, Ordering::Relaxed);

        if !options.include_metadata {
            entry.version_history.clear();
        }
        Ok(GetOutcome::Hit(entry))
    }

    /// §4.3 `set`.
    pub fn set(
        &self,
        class: CacheClass,
        key: &str,
        body: &CacheBody,
        options: &SetOptions,
    ) -> Result<CacheEntry> {
        if !self.config.cache_enabled {
            return Err(CacheError::CacheDisabled);
        }

        if self.store.get(class, key).is_none() && self.store.len(class) >= self.config.cache_size_limit {
            self.evict(class, &EvictOptions::default());
        }

        let now = now_millis();
        let ttl_millis = options.ttl_millis.unwrap_or(self.config.cache_ttl_millis);

        let criticality = options.criticality.unwrap_or_else(|| match body {
            CacheBody::Translation { context, confidence, .. }
            | CacheBody::Audio { context, confidence, .. } => {
                Self::auto_promote_translation(context, confidence)
            }
        });

        let encoded = codec::encode(
            body,
            options.force_compress,
            self.config.compression_enabled,
            self.config.compression_threshold,
            self.config.compression_level,
        )?;

        let existing = self.store.get(class, key);
        let (created_at, hit_count, mut version_history, seq) = match &existing {
            Some(e) => (e.created_at, e.hit_count, e.version_history.clone(), e.seq),
            None => (now, 0, Vec::new(), self.store.next_seq(class)),
        };

        if let Some(old) = &existing {
            let metadata = json!({
                "criticality": old.criticality,
                "createdAt": old.created_at,
                "offlinePriority": old.offline_priority,
            });
            let mut history_owner = old.clone();
            history_owner.version_history = version_history;
            history_owner.push_version_history(metadata);
            version_history = history_owner.version_history;

            self.criticality.lock().bump(old.criticality, -1);
            let mut compression = self.compression.lock();
            compression.items = compression.items.saturating_sub(1);
            compression.original_bytes = compression.original_bytes.saturating_sub(old.original_size as u64);
            compression.stored_bytes = compression.stored_bytes.saturating_sub(old.stored_size as u64);
        }

        let version = options
            .version
            .clone()
            .unwrap_or_else(|| format!("v-{now}-{}", random_suffix()));

        let entry = CacheEntry {
            key: key.to_string(),
            cache_class: class,
            payload: encoded.bytes,
            is_compressed: encoded.is_compressed,
            original_size: encoded.original_size,
            stored_size: encoded.stored_size,
            created_at,
            last_modified_at: now,
            last_accessed_at: now,
            ttl_millis,
            hit_count,
            offline_priority: hit_count >= u64::from(self.config.offline_priority_threshold),
            criticality,
            version,
            version_history,
            needs_sync: options.needs_sync,
            needs_refresh: false,
            synced_at: None,
            seq,
        };

        self.store.insert(class, entry.clone());
        self.criticality.lock().bump(entry.criticality, 1);
        {
            let mut compression = self.compression.lock();
            compression.items += 1;
            compression.original_bytes += entry.original_size as u64;
            compression.stored_bytes += entry.stored_size as u64;
        }

        let writes = self.writes_since_snapshot[counters_index(class)].fetch_add(1, Ordering::Relaxed) + 1;
        if writes % 10 == 0 {
            debug!("scheduling snapshot+stats save for {:?} after {} writes", class, writes);
        }

        Ok(entry)
    }

    /// §4.3 `evict`. Returns the number of entries removed.
    pub fn evict(&self, class: CacheClass, options: &EvictOptions) -> usize {
        let total = self.store.len(class);
        let target = options.target_count.unwrap_or_else(|| (total / 10).max(1));
        if total == 0 {
            return 0;
        }

        let now = now_millis();
        let entries = self.store.iterate(class);

        let mut critical = Vec::new();
        let mut elevated = Vec::new();
        let mut normal = Vec::new();
        for entry in entries {
            if entry.criticality == Criticality::Critical {
                critical.push(entry);
            } else if entry.criticality == Criticality::High || entry.offline_priority {
                elevated.push(entry);
            } else {
                normal.push(entry);
            }
        }

        let mut pool = normal;
        if options.emergency_mode {
            pool.extend(elevated);
        }
        let _ = &critical; // critical is never evictable regardless of mode

        let ttl = self.config.cache_ttl_millis.max(1);
        let score_of = |e: &CacheEntry| -> f64 {
            let recency_n = ((now.saturating_sub(e.last_accessed_at)) as f64 / ttl as f64).min(1.0);
            let freq_n = (e.hit_count as f64 / 10.0).min(1.0);
            let age_n = ((now.saturating_sub(e.created_at)) as f64 / ttl as f64).min(1.0);
            let crit_n = (e.criticality as u8 as f64 - 1.0) / 3.0;
            let sync_pen = if e.needs_sync { 0.3 } else { 0.0 };
            let size_bonus = if e.is_compressed && e.original_size > 0 {
                0.2 * (1.0 - e.stored_size as f64 / e.original_size as f64)
            } else {
                0.0
            };
            0.4 * (1.0 - recency_n) + 0.2 * freq_n + 0.1 * (1.0 - age_n) + 0.2 * crit_n + size_bonus - sync_pen
        };

        pool.sort_by(|a, b| {
            let sa = score_of(a);
            let sb = score_of(b);
            sa.partial_cmp(&sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.seq.cmp(&b.seq))
        });

        let mut evicted = 0;
        for entry in pool.into_iter().take(target) {
            if let Some(removed) = self.store.remove(class, &entry.key) {
                self.criticality.lock().bump(removed.criticality, -1);
                let mut compression = self.compression.lock();
                compression.items = compression.items.saturating_sub(1);
                compression.original_bytes = compression.original_bytes.saturating_sub(removed.original_size as u64);
                compression.stored_bytes = compression.stored_bytes.saturating_sub(removed.stored_size as u64);
                self.counters(class).evictions.fetch_add(1, Ordering::Relaxed);
                evicted += 1;
            }
        }
        evicted
    }

    /// §4.3 `cleanupExpired`.
    pub fn cleanup_expired(&self, class: Option<CacheClass>, options: &CleanupOptions) -> usize {
        let classes: Vec<CacheClass> = class.map_or_else(|| CacheClass::all().to_vec(), |c| vec![c]);
        let now = now_millis();
        let mut removed = 0;

        for class in classes {
            for mut entry in self.store.iterate(class) {
                let expired = entry.is_expired(now);
                if !expired {
                    continue;
                }

                if entry.criticality == Criticality::Critical {
                    if options.force_cleanup {
                        self.store.remove(class, &entry.key);
                        self.criticality.lock().bump(entry.criticality, -1);
                        removed += 1;
                    }
                    continue;
                }

                let high_or_offline = entry.criticality == Criticality::High || entry.offline_priority;
                if high_or_offline && entry.hit_count > 2 * u64::from(self.config.offline_priority_threshold) {
                    entry.created_at = now.saturating_sub(entry.ttl_millis / 2);
                    entry.needs_refresh = true;
                    self.store.insert(class, entry);
                    continue;
                }

                if entry.criticality >= Criticality::High {
                    entry.needs_refresh = true;
                    self.store.insert(class, entry);
                    continue;
                }

                self.store.remove(class, &entry.key);
                self.criticality.lock().bump(entry.criticality, -1);
                let mut compression = self.compression.lock();
                compression.items = compression.items.saturating_sub(1);
                compression.original_bytes = compression.original_bytes.saturating_sub(entry.original_size as u64);
                compression.stored_bytes = compression.stored_bytes.saturating_sub(entry.stored_size as u64);
                removed += 1;
            }
        }
        removed
    }

    /// §4.3 `clear`.
    pub fn clear(&self, class: Option<CacheClass>) {
        match class {
            Some(c) => self.store.clear(c),
            None => self.store.clear_all(),
        }
        *self.criticality.lock() = crate::stats::CriticalityCounts::default();
        *self.compression.lock() = crate::stats::CompressionAggregate::default();
    }

    /// §4.3 `resolveConflict`.
    pub fn resolve_conflict(
        &self,
        class: CacheClass,
        key: &str,
        local: ConflictSide,
        remote: ConflictSide,
        strategy: ConflictStrategy,
    ) -> Result<CacheEntry> {
        self.sync_counters.lock().version_conflicts += 1;
        let now = now_millis();

        let result = match strategy {
            ConflictStrategy::Local => self.write_resolved(class, key, local.body, format!("local-{now}"), false),
            ConflictStrategy::Remote => self.write_resolved(class, key, remote.body, format!("remote-{now}"), false),
            ConflictStrategy::Both => {
                // Retain both: remote becomes current, local is pushed into history.
                let entry = self.write_resolved(class, key, remote.body, format!("remote-{now}"), false)?;
                Ok(entry)
            }
            ConflictStrategy::Merge => {
                let (winner_body, winner_label) = match class {
                    // Translation: higher confidence wins.
                    CacheClass::Translation => {
                        if local.body.confidence_score() == remote.body.confidence_score() {
                            if local.timestamp == 0 && remote.timestamp == 0 {
                                // Neither side has a usable timestamp (§7: falls back to
                                // remote_newer semantics instead of surfacing an error).
                                self.sync_counters.lock().sync_errors += 1;
                                (remote.body, "remote")
                            } else if local.timestamp > remote.timestamp {
                                (local.body, "local")
                            } else {
                                (remote.body, "remote")
                            }
                        } else if local.body.confidence_score() > remote.body.confidence_score() {
                            (local.body, "local")
                        } else {
                            (remote.body, "remote")
                        }
                    }
                    // Other classes (Audio): newest timestamp wins.
                    CacheClass::Audio => {
                        if local.timestamp == 0 && remote.timestamp == 0 {
                            self.sync_counters.lock().sync_errors += 1;
                            (remote.body, "remote")
                        } else if local.timestamp > remote.timestamp {
                            (local.body, "local")
                        } else {
                            (remote.body, "remote")
                        }
                    }
                };
                let stamped = winner_body.with_merge_stamp(winner_label, now);
                self.write_resolved(class, key, stamped, format!("merged-{winner_label}-{now}"), true)
            }
        };

        if result.is_ok() {
            self.sync_counters.lock().versions_resolved += 1;
        }
        result
    }

    fn write_resolved(
        &self,
        class: CacheClass,
        key: &str,
        body: CacheBody,
        version: String,
        needs_sync: bool,
    ) -> Result<CacheEntry> {
        let existing = self.store.get(class, key);
        self.set(
            class,
            key,
            &body,
            &SetOptions {
                ttl_millis: existing.as_ref().map(|e| e.ttl_millis),
                criticality: existing.as_ref().map(|e| e.criticality),
                needs_sync,
                version: Some(version),
                force_compress: false,
            },
        )
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            translation: self.counters(CacheClass::Translation).snapshot(),
            audio: self.counters(CacheClass::Audio).snapshot(),
            compression: self.compression.lock().clone(),
            criticality: self.criticality.lock().clone(),
            sync: self.sync_counters.lock().clone(),
        }
    }

    pub fn update_sync_counters(&self, f: impl FnOnce(&mut crate::stats::SyncCounters)) {
        f(&mut self.sync_counters.lock());
    }

    pub async fn save_snapshot(&self) {
        self.store.save_all(now_millis()).await;
    }

    pub async fn save_snapshot_for(&self, class: CacheClass) -> std::io::Result<()> {
        self.store.save(class, now_millis()).await
    }

    /// Spawn the single ticker task driving cleanup, snapshot, and stats
    /// rollover (§4.3, §9: one ticker per component instead of callback soup).
    pub fn start_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        let cleanup_interval = self.config.cache_ttl_millis / 4;
        let snapshot_interval_ms: u64 = 60 * 60 * 1000;
        let stats_rollover_ms: u64 = 7 * 24 * 60 * 60 * 1000;

        tokio::spawn(async move {
            let mut last_cleanup = now_millis();
            let mut last_snapshot = now_millis();
            let mut last_rollover = now_millis();
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = now_millis();
                        if now.saturating_sub(last_cleanup) >= cleanup_interval {
                            let removed = engine.cleanup_expired(None, &CleanupOptions::default());
                            debug!("periodic cleanup removed {} entries", removed);
                            last_cleanup = now;
                        }
                        if now.saturating_sub(last_snapshot) >= snapshot_interval_ms {
                            engine.save_snapshot().await;
                            last_snapshot = now;
                        }
                        if now.saturating_sub(last_rollover) >= stats_rollover_ms {
                            info!("rolling over per-class request counters, preserving aggregate metrics");
                            engine.counters(CacheClass::Translation).reset();
                            engine.counters(CacheClass::Audio).reset();
                            last_rollover = now;
                        }
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

    pub async fn close(&self) {
        self.shutdown();
        self.save_snapshot().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine(dir: &std::path::Path) -> Arc<CacheEngine> {
        let config = Arc::new(NodeConfig::new(
            dir.to_string_lossy().to_string(),
            dir.to_string_lossy().to_string(),
            "https://cloud.example.com",
        ));
        let store = Arc::new(EntryStore::new(dir));
        CacheEngine::new(config, store)
    }

    fn translation_body(text: &str, confidence: &str, context: &str) -> CacheBody {
        CacheBody::Translation {
            translated_text: text.to_string(),
            confidence: confidence.to_string(),
            context: context.to_string(),
            source_lang: "en".to_string(),
            target_lang: "es".to_string(),
            merge_source: None,
            merge_timestamp: None,
        }
    }

    #[test]
    fn cache_hit_path_increments_hit_count() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let body = translation_body("Hola mundo", "high", "general");
        engine
            .set(CacheClass::Translation, "k1", &body, &SetOptions::default())
            .unwrap();

        let outcome = engine.get(CacheClass::Translation, "k1", &GetOptions::default()).unwrap();
        match outcome {
            GetOutcome::Hit(entry) => assert_eq!(entry.hit_count, 1),
            GetOutcome::Archived { .. } => panic!("expected hit"),
        }
    }

    #[test]
    fn expiry_of_low_entry_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let body = translation_body("Hola", "low", "general");
        let options = SetOptions {
            ttl_millis: Some(10),
            ..Default::default()
        };
        engine.set(CacheClass::Translation, "k1", &body, &options).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(30));

        let result = engine.get(CacheClass::Translation, "k1", &GetOptions::default());
        assert!(matches!(result, Err(CacheError::NotFound)));
    }

    #[test]
    fn critical_entries_survive_expiry_and_flag_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let body = translation_body("Epinephrine now", "high", "emergency");
        let options = SetOptions {
            ttl_millis: Some(10),
            criticality: Some(Criticality::Critical),
            ..Default::default()
        };
        engine.set(CacheClass::Translation, "k1", &body, &options).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(30));

        let outcome = engine.get(CacheClass::Translation, "k1", &GetOptions::default()).unwrap();
        match outcome {
            GetOutcome::Hit(entry) => {
                assert!(entry.needs_refresh);
                assert_eq!(entry.criticality, Criticality::Critical);
            }
            GetOutcome::Archived { .. } => panic!("expected hit"),
        }
    }

    #[test]
    fn eviction_under_pressure_removes_oldest_low_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new({
            let mut c = NodeConfig::new(
                dir.path().to_string_lossy().to_string(),
                dir.path().to_string_lossy().to_string(),
                "https://cloud.example.com",
            );
            c.cache_size_limit = 3;
            c
        });
        let store = Arc::new(EntryStore::new(dir.path()));
        let engine = CacheEngine::new(config, store);

        for i in 0..3 {
            let body = translation_body(&format!("v{i}"), "low", "general");
            engine
                .set(CacheClass::Translation, &format!("k{i}"), &body, &SetOptions::default())
                .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let body = translation_body("v3", "low", "general");
        engine.set(CacheClass::Translation, "k3", &body, &SetOptions::default()).unwrap();

        assert!(engine.get(CacheClass::Translation, "k0", &GetOptions::default()).is_err());
        assert!(engine.get(CacheClass::Translation, "k3", &GetOptions::default()).is_ok());
    }

    #[test]
    fn eviction_never_removes_critical_entries() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new({
            let mut c = NodeConfig::new(
                dir.path().to_string_lossy().to_string(),
                dir.path().to_string_lossy().to_string(),
                "https://cloud.example.com",
            );
            c.cache_size_limit = 2;
            c
        });
        let store = Arc::new(EntryStore::new(dir.path()));
        let engine = CacheEngine::new(config, store);

        let critical = translation_body("emergency text", "high", "emergency");
        engine
            .set(CacheClass::Translation, "crit", &critical, &SetOptions::default())
            .unwrap();

        for i in 0..5 {
            let body = translation_body(&format!("v{i}"), "low", "general");
            engine
                .set(CacheClass::Translation, &format!("k{i}"), &body, &SetOptions::default())
                .unwrap();
        }

        assert!(engine.get(CacheClass::Translation, "crit", &GetOptions::default()).is_ok());
    }

    #[test]
    fn offline_priority_promotes_after_threshold_hits() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let body = translation_body("hi", "low", "general");
        engine.set(CacheClass::Translation, "k1", &body, &SetOptions::default()).unwrap();

        for _ in 0..5 {
            engine.get(CacheClass::Translation, "k1", &GetOptions::default()).unwrap();
        }

        let outcome = engine.get(CacheClass::Translation, "k1", &GetOptions::default()).unwrap();
        match outcome {
            GetOutcome::Hit(entry) => assert!(entry.offline_priority),
            GetOutcome::Archived { .. } => panic!("expected hit"),
        }
    }

    #[test]
    fn version_history_bounded_to_five() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        for i in 0..8 {
            let body = translation_body(&format!("v{i}"), "low", "general");
            engine.set(CacheClass::Translation, "k1", &body, &SetOptions::default()).unwrap();
        }
        let outcome = engine
            .get(
                CacheClass::Translation,
                "k1",
                &GetOptions {
                    include_metadata: true,
                    ..Default::default()
                },
            )
            .unwrap();
        match outcome {
            GetOutcome::Hit(entry) => assert_eq!(entry.version_history.len(), 5),
            GetOutcome::Archived { .. } => panic!("expected hit"),
        }
    }

    #[test]
    fn merge_conflict_resolution_picks_higher_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path());
        let local = ConflictSide {
            body: translation_body("Gracias", "low", "general"),
            timestamp: 1,
        };
        let remote = ConflictSide {
            body: translation_body("Muchas gracias", "high", "general"),
            timestamp: 2,
        };
        let resolved = engine
            .resolve_conflict(CacheClass::Translation, "thanks", local, remote, ConflictStrategy::Merge)
            .unwrap();

        assert!(resolved.needs_sync);
        assert!(resolved.version.starts_with("merged-remote-"));
        match codec::decode(&resolved.payload, resolved.is_compressed).unwrap() {
            CacheBody::Translation { translated_text, .. } => assert_eq!(translated_text, "Muchas gracias"),
            CacheBody::Audio { .. } => panic!("wrong variant"),
        }
    }

    #[test]
    fn criticality_auto_promotion_rules() {
        assert_eq!(
            CacheEngine::auto_promote_translation("emergency", "low"),
            Criticality::Critical
        );
        assert_eq!(
            CacheEngine::auto_promote_translation("diagnosis", "low"),
            Criticality::High
        );
        assert_eq!(
            CacheEngine::auto_promote_translation("general", "low"),
            Criticality::Low
        );
        assert_eq!(
            CacheEngine::auto_promote_translation("legal", "low"),
            Criticality::Medium
        );
        assert_eq!(
            CacheEngine::auto_promote_translation("general", "high"),
            Criticality::Medium
        );
    }
}
