//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - A tempdir-rooted node config
//! - Fake cloud client / translation engine doubles
//! - Test data generators
//! - A polling helper for ticker-driven assertions

use std::sync::Arc;

use edge_translate_cache::sync::NullCloudClient;
use edge_translate_cache::{CacheBody, EdgeNode, EdgeNodeBuilder, NodeConfig};

/// A node config rooted in a fresh temp directory, so tests never touch
/// real cache/sync state or each other.
pub fn test_config(dir: &std::path::Path) -> NodeConfig {
    NodeConfig::new(
        dir.join("cache").to_string_lossy().to_string(),
        dir.join("sync").to_string_lossy().to_string(),
        "https://cloud.example.test",
    )
}

/// Build a fully wired `EdgeNode` against a temp directory. The cloud
/// client is the in-memory `NullCloudClient`, reachable per
/// `cloud_reachable`; local and remote translation are both served by the
/// deterministic echo engine. Tickers are not started: call
/// `node.start()` if a test exercises background behavior.
pub async fn test_node(dir: &std::path::Path, cloud_reachable: bool) -> Arc<EdgeNode> {
    let (node, _client) = test_node_with_client(dir, cloud_reachable).await;
    node
}

/// Like `test_node`, but also hands back the `NullCloudClient` so a test
/// can flip reachability mid-scenario (e.g. the "offline then reconnect"
/// walk).
pub async fn test_node_with_client(dir: &std::path::Path, cloud_reachable: bool) -> (Arc<EdgeNode>, Arc<NullCloudClient>) {
    let config = test_config(dir);
    let client = Arc::new(NullCloudClient::new(cloud_reachable));
    let node = EdgeNodeBuilder::new()
        .with_config(config)
        .with_cloud_client(Arc::clone(&client) as Arc<dyn edge_translate_cache::CloudClient>)
        .build()
        .await
        .expect("building a fresh EdgeNode against an empty temp dir must succeed");
    (Arc::new(node), client)
}

pub fn translation_body(source_lang: &str, target_lang: &str, text: &str, confidence: &str) -> CacheBody {
    CacheBody::Translation {
        translated_text: text.to_string(),
        confidence: confidence.to_string(),
        context: "general".to_string(),
        source_lang: source_lang.to_string(),
        target_lang: target_lang.to_string(),
        merge_source: None,
        merge_timestamp: None,
    }
}

pub fn audio_body(source_lang: &str, target_lang: &str, text: &str, confidence: &str, audio: Vec<u8>) -> CacheBody {
    CacheBody::Audio {
        translated_text: text.to_string(),
        confidence: confidence.to_string(),
        context: "general".to_string(),
        source_lang: source_lang.to_string(),
        target_lang: target_lang.to_string(),
        audio_bytes: audio,
        merge_source: None,
        merge_timestamp: None,
    }
}

/// Wait for a condition with timeout, polling every 10ms. Useful when a
/// test starts an `EdgeNode`'s tickers and waits for a background cycle
/// to take effect rather than calling the engine/sync methods directly.
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::{sleep, Duration};

    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_node_builds_against_empty_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path(), true).await;
        assert!(node.health_check());
    }

    #[test]
    fn translation_body_round_trips_fields() {
        let body = translation_body("en", "es", "Hola", "high");
        assert_eq!(body.confidence(), "high");
        assert_eq!(body.context(), "general");
    }
}
