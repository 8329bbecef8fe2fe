//! End-to-end sync behavior through the public `EdgeNode` API (spec §8
//! scenario 6: offline then reconnect).

mod common;

use std::sync::atomic::Ordering;

#[tokio::test]
async fn offline_writes_queue_then_drain_on_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let (node, client) = common::test_node_with_client(dir.path(), false).await;

    for i in 0..3 {
        node.queue_translation(&format!("k{i}"), serde_json::json!({"text": format!("v{i}")}))
            .await
            .unwrap();
    }
    assert_eq!(node.sync().pending_count(), 3);

    let offline_attempt = node.sync_with_cloud().await;
    assert_eq!(offline_attempt.status, "failed");
    assert_eq!(node.sync().pending_count(), 3, "a failed probe must not touch the queue");

    client.reachable.store(true, Ordering::Relaxed);
    let outcome = node.sync_with_cloud().await;
    assert_eq!(outcome.status, "success");
    assert_eq!(outcome.uploaded, 3);
    assert_eq!(node.sync().pending_count(), 0);

    let sync_dir = dir.path().join("sync");
    let remaining_records = std::fs::read_dir(&sync_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("json"))
        .filter(|entry| entry.file_name() != std::ffi::OsStr::new("sync-config.json"))
        .count();
    assert_eq!(remaining_records, 0, "uploaded records must be removed from disk too");
}

#[tokio::test]
async fn queued_records_survive_a_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (node, _client) = common::test_node_with_client(dir.path(), false).await;
    node.queue_translation("k1", serde_json::json!({"text": "hi"})).await.unwrap();
    drop(node);

    let (restarted, _client2) = common::test_node_with_client(dir.path(), true).await;
    assert_eq!(restarted.sync().pending_count(), 1);
}

#[tokio::test]
async fn disabling_sync_skips_the_cycle_without_clearing_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let (node, _client) = common::test_node_with_client(dir.path(), true).await;
    node.queue_translation("k1", serde_json::json!({"text": "hi"})).await.unwrap();
    node.set_sync_enabled(false);

    let outcome = node.sync_with_cloud().await;
    assert_eq!(outcome.status, "disabled");
    assert_eq!(node.sync().pending_count(), 1);
}
