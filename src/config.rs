//! Node configuration, loaded from the environment (§6.1).

use std::time::Duration;

use crate::error::{CacheError, Result};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Node-wide configuration. Constructed once and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub cache_dir: String,
    pub cache_size_limit: usize,
    pub cache_ttl_millis: u64,
    pub cache_enabled: bool,
    pub offline_priority_threshold: u32,
    pub compression_enabled: bool,
    pub compression_threshold: usize,
    pub compression_level: u32,
    pub sync_dir: String,
    pub sync_interval_millis: u64,
    pub api_base_url: String,
    pub device_id: String,
}

impl NodeConfig {
    /// Load configuration from the environment, applying the documented
    /// defaults from §6.1. `API_BASE_URL` is required; everything else has
    /// a default.
    pub fn from_env() -> Result<Self> {
        let api_base_url = std::env::var("API_BASE_URL")
            .map_err(|_| CacheError::Config("API_BASE_URL is required".to_string()))?;

        Ok(Self {
            cache_dir: std::env::var("CACHE_DIR").unwrap_or_else(|_| "../../cache".to_string()),
            cache_size_limit: env_or("CACHE_SIZE_LIMIT", 1000),
            cache_ttl_millis: env_or("CACHE_TTL", 86_400_000),
            cache_enabled: env_bool("CACHE_ENABLED", true),
            offline_priority_threshold: env_or("OFFLINE_PRIORITY_THRESHOLD", 5),
            compression_enabled: env_bool("COMPRESSION_ENABLED", true),
            compression_threshold: env_or("COMPRESSION_THRESHOLD", 1024),
            compression_level: env_or("COMPRESSION_LEVEL", 6),
            sync_dir: std::env::var("SYNC_DIR").unwrap_or_else(|_| "../../sync".to_string()),
            sync_interval_millis: env_or("SYNC_INTERVAL", 300_000),
            api_base_url,
            device_id: std::env::var("DEVICE_ID").unwrap_or_else(|_| "dev-edge-device".to_string()),
        })
    }

    /// Build a config directly, bypassing the environment: used by tests
    /// and by embedders that already have their own config layer.
    #[must_use]
    pub fn new(cache_dir: impl Into<String>, sync_dir: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            cache_size_limit: 1000,
            cache_ttl_millis: 86_400_000,
            cache_enabled: true,
            offline_priority_threshold: 5,
            compression_enabled: true,
            compression_threshold: 1024,
            compression_level: 6,
            sync_dir: sync_dir.into(),
            sync_interval_millis: 300_000,
            api_base_url: api_base_url.into(),
            device_id: "dev-edge-device".to_string(),
        }
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_millis)
    }

    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_base_url_is_a_config_error() {
        // SAFETY: tests run single-threaded enough for this snapshot/restore
        // pattern; no other test in this module touches these vars.
        let saved = std::env::var("API_BASE_URL").ok();
        unsafe {
            std::env::remove_var("API_BASE_URL");
        }
        let result = NodeConfig::from_env();
        assert!(matches!(result, Err(CacheError::Config(_))));
        if let Some(v) = saved {
            unsafe {
                std::env::set_var("API_BASE_URL", v);
            }
        }
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = NodeConfig::new("/tmp/cache", "/tmp/sync", "https://cloud.example.com");
        assert_eq!(cfg.cache_size_limit, 1000);
        assert_eq!(cfg.cache_ttl_millis, 86_400_000);
        assert!(cfg.cache_enabled);
        assert_eq!(cfg.offline_priority_threshold, 5);
        assert!(cfg.compression_enabled);
        assert_eq!(cfg.compression_threshold, 1024);
        assert_eq!(cfg.compression_level, 6);
        assert_eq!(cfg.sync_interval_millis, 300_000);
        assert_eq!(cfg.device_id, "dev-edge-device");
    }
}
