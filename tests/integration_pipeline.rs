//! End-to-end request-pipeline behavior through the public `EdgeNode` API:
//! cache-miss-then-hit, sync enqueueing, and audio requests, exercised the
//! way an embedder actually calls the node rather than the pipeline type
//! directly.

mod common;

#[tokio::test]
async fn first_request_misses_then_second_request_hits_cache() {
    let dir = tempfile::tempdir().unwrap();
    let node = common::test_node(dir.path(), true).await;

    let first = node.get_cached_translation("hello", "en", "es", "general").await.unwrap();
    assert!(!first.from_cache);

    let second = node.get_cached_translation("hello", "en", "es", "general").await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.translated_text, first.translated_text);
}

#[tokio::test]
async fn a_served_translation_is_queued_for_sync() {
    let dir = tempfile::tempdir().unwrap();
    let node = common::test_node(dir.path(), true).await;
    node.get_cached_translation("hello", "en", "es", "general").await.unwrap();
    assert_eq!(node.sync().pending_count(), 1);
}

#[tokio::test]
async fn empty_text_is_rejected_before_touching_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let node = common::test_node(dir.path(), true).await;
    let result = node.get_cached_translation("", "en", "es", "general").await;
    assert!(matches!(result, Err(edge_translate_cache::CacheError::BadRequest(_))));
}

#[tokio::test]
async fn audio_translation_round_trips_through_cache() {
    let dir = tempfile::tempdir().unwrap();
    let node = common::test_node(dir.path(), true).await;
    let audio = vec![9, 8, 7, 6, 5];

    let first = node.cache_audio_translation(&audio, "en", "es", "general").await.unwrap();
    assert!(!first.from_cache);

    let second = node.cache_audio_translation(&audio, "en", "es", "general").await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.audio_bytes, audio);
}

#[tokio::test]
async fn a_critical_context_request_is_retained_past_its_ttl() {
    use edge_translate_cache::engine::{GetOptions, GetOutcome};
    use edge_translate_cache::entry::CacheClass;

    let dir = tempfile::tempdir().unwrap();
    let node = common::test_node(dir.path(), true).await;
    node.get_cached_translation("epinephrine now", "en", "es", "emergency")
        .await
        .unwrap();

    let key = edge_translate_cache::codec::translation_key("en", "es", "emergency", "epinephrine now");
    let outcome = node.get(CacheClass::Translation, &key, &GetOptions::default()).unwrap();
    match outcome {
        GetOutcome::Hit(entry) => assert_eq!(entry.criticality, edge_translate_cache::Criticality::Critical),
        GetOutcome::Archived { .. } => panic!("expected a live hit"),
    }
}
