//! Cache statistics (§3): per-class counters, compression and criticality
//! aggregates, sync counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::entry::Criticality;

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct ClassCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_requests: u64,
}

impl ClassCounters {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct CompressionAggregate {
    pub items: u64,
    pub original_bytes: u64,
    pub stored_bytes: u64,
}

impl CompressionAggregate {
    /// Aggregate compression ratio: `1 - (compressedSize / originalSize)` (§3 invariant 7).
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            0.0
        } else {
            1.0 - (self.stored_bytes as f64 / self.original_bytes as f64)
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct CriticalityCounts {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
}

impl CriticalityCounts {
    pub fn bump(&mut self, criticality: Criticality, delta: i64) {
        let field = match criticality {
            Criticality::Low => &mut self.low,
            Criticality::Medium => &mut self.medium,
            Criticality::High => &mut self.high,
            Criticality::Critical => &mut self.critical,
        };
        *field = field.saturating_add_signed(delta);
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.low + self.medium + self.high + self.critical
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct SyncCounters {
    pub pending_sync: u64,
    pub last_sync_time: Option<u64>,
    pub sync_errors: u64,
    pub version_conflicts: u64,
    pub versions_resolved: u64,
}

/// Full point-in-time snapshot of cache statistics (§3), serializable for
/// the stats JSON file.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct CacheStats {
    pub translation: ClassCounters,
    pub audio: ClassCounters,
    pub compression: CompressionAggregate,
    pub criticality: CriticalityCounts,
    pub sync: SyncCounters,
}

/// Atomic counters mirrored live, snapshotted into `CacheStats` on demand.
/// Mirrors the `TierStats`/atomic-counter shape the cache manager uses for
/// hit/miss bookkeeping.
#[derive(Default)]
pub struct AtomicClassCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub total_requests: AtomicU64,
}

impl AtomicClassCounters {
    pub fn snapshot(&self) -> ClassCounters {
        ClassCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.total_requests.store(0, Ordering::Relaxed);
    }
}
