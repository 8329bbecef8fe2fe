//! Edge Translate Cache
//!
//! A persistent, TTL-aware, criticality-ranked cache for an edge
//! translation node, with compressed on-disk storage and a durable
//! outbound queue that syncs mutations and model updates to a cloud
//! translation service when reachable.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use edge_translate_cache::EdgeNodeBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let node = EdgeNodeBuilder::new().build().await?;
//!     node.start();
//!
//!     let result = node.get_cached_translation("Hello", "en", "es", "general").await?;
//!     println!("{} (from_cache={})", result.translated_text, result.from_cache);
//!
//!     node.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! RequestPipeline ── get/set ──► CacheEngine ── load/save ──► EntryStore
//!       │                              │
//!       │                              └─ encode/decode ──► Codec
//!       └── queue ──► SyncManager ── upload/pull ──► CloudClient ──► cloud
//! ```

pub mod builder;
pub mod codec;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod sync;

pub use async_trait::async_trait;
pub use builder::EdgeNodeBuilder;
pub use config::NodeConfig;
pub use engine::CacheEngine;
pub use entry::{CacheBody, CacheClass, CacheEntry, Criticality};
pub use error::{CacheError, Result};
pub use pipeline::{AudioTranslationResponse, RequestPipeline, ResultSource, TranslationEngine, TranslationResponse};
pub use stats::CacheStats;
pub use sync::{CloudClient, SyncManager};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use engine::{CleanupOptions, ConflictSide, ConflictStrategy, EvictOptions, GetOptions, GetOutcome, SetOptions};

/// Top-level entry point wiring the Entry Store, Codec, Cache Engine, Sync
/// Manager, and Request Pipeline together. Construct via
/// [`EdgeNodeBuilder`].
pub struct EdgeNode {
    config: Arc<NodeConfig>,
    engine: Arc<CacheEngine>,
    sync: Arc<SyncManager>,
    pipeline: RequestPipeline,
    engine_ticker: Mutex<Option<JoinHandle<()>>>,
    sync_ticker: Mutex<Option<JoinHandle<()>>>,
}

impl EdgeNode {
    pub(crate) fn from_parts(
        config: Arc<NodeConfig>,
        engine: Arc<CacheEngine>,
        sync: Arc<SyncManager>,
        pipeline: RequestPipeline,
    ) -> Self {
        Self {
            config,
            engine,
            sync,
            pipeline,
            engine_ticker: Mutex::new(None),
            sync_ticker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    #[must_use]
    pub fn sync(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    /// Start the Cache Engine's maintenance ticker and the Sync Manager's
    /// cycle loop (§5: "one dedicated worker owning the Sync Manager's
    /// cycle loop").
    pub fn start(&self) {
        info!(device_id = %self.config.device_id, "starting edge node");
        *self.engine_ticker.lock() = Some(self.engine.start_ticker());
        *self.sync_ticker.lock() = Some(self.sync.start_ticker());
    }

    /// Stop both background tasks and flush a final snapshot.
    pub async fn close(&self) {
        self.engine.shutdown();
        self.sync.shutdown();
        if let Some(handle) = self.engine_ticker.lock().take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.sync_ticker.lock().take() {
            let _ = handle.await;
        }
        self.engine.save_snapshot().await;
        info!("edge node closed");
    }

    #[must_use]
    pub fn health_check(&self) -> bool {
        self.config.cache_enabled
    }

    // ---- Pipeline-facing API (§6.4) ----

    pub async fn get_cached_translation(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        context: &str,
    ) -> Result<TranslationResponse> {
        self.pipeline.translate_request(text, source_lang, target_lang, context).await
    }

    pub async fn cache_audio_translation(
        &self,
        audio_bytes: &[u8],
        source_lang: &str,
        target_lang: &str,
        context: &str,
    ) -> Result<AudioTranslationResponse> {
        self.pipeline.translate_audio(audio_bytes, source_lang, target_lang, context).await
    }

    pub fn get(&self, class: CacheClass, key: &str, options: &GetOptions) -> Result<GetOutcome> {
        self.engine.get(class, key, options)
    }

    pub fn set(&self, class: CacheClass, key: &str, body: &CacheBody, options: &SetOptions) -> Result<CacheEntry> {
        self.engine.set(class, key, body, options)
    }

    pub fn clear(&self, class: Option<CacheClass>) {
        self.engine.clear(class);
    }

    pub fn clear_cache(&self) {
        self.engine.clear(None);
    }

    pub async fn save_cache_to_disk(&self, class: Option<CacheClass>) {
        match class {
            Some(class) => {
                let _ = self.engine.save_snapshot_for(class).await;
            }
            None => self.engine.save_snapshot().await,
        }
    }

    /// `CacheStats` with the sync counters refreshed from the Sync
    /// Manager's own live state (pending queue length, last sync time)
    /// before the snapshot is taken.
    #[must_use]
    pub fn get_cache_stats(&self) -> CacheStats {
        let pending = self.sync.pending_count() as u64;
        let last_sync_time = self.sync.get_sync_status().last_sync_time;
        self.engine.update_sync_counters(|counters| {
            counters.pending_sync = pending;
            counters.last_sync_time = last_sync_time;
        });
        self.engine.stats()
    }

    pub fn cleanup_expired_entries(&self, class: Option<CacheClass>, options: &CleanupOptions) -> usize {
        self.engine.cleanup_expired(class, options)
    }

    pub fn evict(&self, class: CacheClass, options: &EvictOptions) -> usize {
        self.engine.evict(class, options)
    }

    pub fn resolve_version_conflict(
        &self,
        class: CacheClass,
        key: &str,
        local: ConflictSide,
        remote: ConflictSide,
        strategy: ConflictStrategy,
    ) -> Result<CacheEntry> {
        self.engine.resolve_conflict(class, key, local, remote, strategy)
    }

    // ---- Sync-facing API (§6.4) ----

    pub async fn queue_translation(&self, key: &str, payload: serde_json::Value) -> Result<()> {
        self.sync.queue_translation(key, payload).await
    }

    pub async fn sync_with_cloud(&self) -> sync::SyncCycleOutcome {
        self.sync.sync_with_cloud().await
    }

    pub async fn test_connection(&self) -> bool {
        self.sync.test_connection().await
    }

    #[must_use]
    pub fn get_sync_status(&self) -> sync::SyncConfig {
        self.sync.get_sync_status()
    }

    pub fn set_sync_enabled(&self, enabled: bool) {
        self.sync.set_sync_enabled(enabled);
    }

    pub async fn clear_sync_queue(&self) -> Result<()> {
        self.sync.clear_sync_queue().await
    }
}
