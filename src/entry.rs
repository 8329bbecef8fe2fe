//! Cache data model (§3): classes, criticality, entries, version history.

use serde::{Deserialize, Serialize};

/// Which logical cache this key belongs to. A fixed enum rather than a
/// branch-on-string, per the redesign note in spec.md §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheClass {
    Translation,
    Audio,
}

impl CacheClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::Audio => "audio",
        }
    }

    /// Filename for this class's on-disk snapshot.
    #[must_use]
    pub fn snapshot_filename(self) -> &'static str {
        match self {
            Self::Translation => "translation.snapshot.json",
            Self::Audio => "audio.snapshot.json",
        }
    }

    #[must_use]
    pub fn all() -> [CacheClass; 2] {
        [Self::Translation, Self::Audio]
    }
}

/// Ordinal importance, §3. `Ord`-derived so `criticality >= Criticality::High`
/// reads the way the spec states the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Criticality {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Criticality {
    /// Promote by one level, capped at `High` (§4.3's confidence-based bump).
    #[must_use]
    pub fn promote_capped_at_high(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High | Self::Critical => Self::High.max(self),
        }
    }
}

/// A single archived prior version of an entry (§3: at most 5, oldest first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionHistoryEntry {
    pub version: String,
    pub timestamp: u64,
    /// Minimal metadata only: the archived body itself is not retrievable.
    pub minimal_metadata: serde_json::Value,
}

/// The logical body of a cache entry. Tagged by variant rather than an
/// ad-hoc reshaped object, per spec.md §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CacheBody {
    Translation {
        translated_text: String,
        confidence: String,
        context: String,
        source_lang: String,
        target_lang: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        merge_source: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        merge_timestamp: Option<u64>,
    },
    Audio {
        translated_text: String,
        confidence: String,
        context: String,
        source_lang: String,
        target_lang: String,
        audio_bytes: Vec<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        merge_source: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        merge_timestamp: Option<u64>,
    },
}

impl CacheBody {
    #[must_use]
    pub fn confidence(&self) -> &str {
        match self {
            Self::Translation { confidence, .. } | Self::Audio { confidence, .. } => confidence,
        }
    }

    #[must_use]
    pub fn context(&self) -> &str {
        match self {
            Self::Translation { context, .. } | Self::Audio { context, .. } => context,
        }
    }

    /// Map the confidence label to a numeric score for conflict merges (§4.3).
    #[must_use]
    pub fn confidence_score(&self) -> f64 {
        match self.confidence() {
            "high" => 0.9,
            "medium" => 0.6,
            "low" => 0.3,
            other => other.parse().unwrap_or(0.0),
        }
    }

    fn stamp_merge(&mut self, merge_source: &str, timestamp: u64) {
        match self {
            Self::Translation {
                merge_source: ms,
                merge_timestamp: mt,
                ..
            }
            | Self::Audio {
                merge_source: ms,
                merge_timestamp: mt,
                ..
            } => {
                *ms = Some(merge_source.to_string());
                *mt = Some(timestamp);
            }
        }
    }

    pub fn with_merge_stamp(mut self, merge_source: &str, timestamp: u64) -> Self {
        self.stamp_merge(merge_source, timestamp);
        self
    }
}

/// A persistent, size-bounded, TTL-aware cache entry (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub cache_class: CacheClass,

    /// Serialized body, possibly deflate-compressed (see `is_compressed`).
    pub payload: Vec<u8>,
    pub is_compressed: bool,
    pub original_size: usize,
    pub stored_size: usize,

    pub created_at: u64,
    pub last_modified_at: u64,
    pub last_accessed_at: u64,

    pub ttl_millis: u64,
    pub hit_count: u64,
    pub offline_priority: bool,
    pub criticality: Criticality,

    pub version: String,
    pub version_history: Vec<VersionHistoryEntry>,

    pub needs_sync: bool,
    pub needs_refresh: bool,
    pub synced_at: Option<u64>,

    /// Insertion-order tie-break for eviction (§4.3: "older wins the tie").
    pub seq: u64,
}

impl CacheEntry {
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > self.ttl_millis
    }

    /// Append the entry's current version to its history, bounded to the 5
    /// most recent (§3 invariant 3).
    pub fn push_version_history(&mut self, metadata: serde_json::Value) {
        self.version_history.push(VersionHistoryEntry {
            version: self.version.clone(),
            timestamp: self.last_modified_at,
            minimal_metadata: metadata,
        });
        if self.version_history.len() > 5 {
            let overflow = self.version_history.len() - 5;
            self.version_history.drain(0..overflow);
        }
    }

    pub fn find_version<'a>(&'a self, version: &str) -> Option<&'a VersionHistoryEntry> {
        self.version_history.iter().find(|v| v.version == version)
    }
}
