//! Topic runs end to end: stored reviews, scripted oracle, fixed embeddings.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

use reviewpulse_common::{Rating, Review, TopicRegistry};
use reviewpulse_pipeline::testing::{FixedEmbedder, ScriptedGenerator};
use reviewpulse_pipeline::{MemoryTopicRegistry, TopicConsolidator, TopicExtractor, TopicPipeline};
use reviewpulse_store::{ReviewStore, SqliteTopicRegistry};

const LATE_RESPONSE: &str = r#"{"topics": [
    {"topic_name": "delivery is late", "category": "issue", "review_ids": [1], "is_new_topic": true},
    {"topic_name": "delivery very late", "category": "issue", "review_ids": [2], "is_new_topic": true}
]}"#;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
}

fn review(id: &str, content: &str, day: u32, hour: u32) -> Review {
    Review::new(
        Some(id.to_string()),
        content,
        Rating::try_from(1).unwrap(),
        Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap(),
        FixedOffset::east_opt(0).unwrap(),
    )
}

/// "delivery very late" sits at cosine similarity 0.85 from "delivery is late".
fn late_embedder() -> Arc<FixedEmbedder> {
    let y = (1.0f32 - 0.85 * 0.85).sqrt();
    Arc::new(
        FixedEmbedder::new(2)
            .on_text("delivery is late", vec![1.0, 0.0])
            .on_text("delivery very late", vec![0.85, y]),
    )
}

async fn store_with_late_reviews(day: u32) -> ReviewStore {
    let store = ReviewStore::in_memory().await.unwrap();
    seed_late_reviews(&store, day).await;
    store
}

async fn seed_late_reviews(store: &ReviewStore, day: u32) {
    // Newest first when read back: "a" is review 1, "b" is review 2.
    let reviews = vec![
        review(&format!("a{day}"), "Order came an hour late", day, 12),
        review(&format!("b{day}"), "Delivery was very late again", day, 9),
    ];
    store.store_batch(&reviews, "app", d(day)).await.unwrap();
}

fn pipeline(
    store: &ReviewStore,
    generator: Arc<ScriptedGenerator>,
    registry: Arc<dyn TopicRegistry>,
) -> TopicPipeline {
    TopicPipeline::new(
        store.clone(),
        TopicExtractor::new(generator, 5),
        TopicConsolidator::new(late_embedder(), registry, 0.8),
        100,
    )
}

#[tokio::test]
async fn near_duplicate_topic_is_canonicalized() {
    let store = store_with_late_reviews(1).await;
    let generator = Arc::new(ScriptedGenerator::new().respond(LATE_RESPONSE));
    let registry = Arc::new(MemoryTopicRegistry::new());

    let summary = pipeline(&store, generator, registry.clone())
        .run(&[d(1)], false)
        .await;
    assert_eq!(summary.processed_batches, 1);
    assert_eq!(summary.topics_stored, 2);
    assert_eq!(summary.canonical_topics, 1);

    let rows = store.topics_by_batch_date(d(1)).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|t| t.topic_name == "delivery is late"));
    assert_eq!(rows[0].review_id, "a1");
    assert_eq!(rows[0].original_topic, None);
    assert_eq!(rows[1].review_id, "b1");
    assert_eq!(rows[1].original_topic.as_deref(), Some("delivery very late"));
    assert_eq!(registry.count().await.unwrap(), 1);
}

#[tokio::test]
async fn existing_topics_are_skipped_unless_forced() {
    let store = store_with_late_reviews(1).await;
    let generator = Arc::new(
        ScriptedGenerator::new()
            .respond(LATE_RESPONSE)
            .respond(LATE_RESPONSE),
    );
    let registry = Arc::new(MemoryTopicRegistry::new());
    let mut pipeline = pipeline(&store, generator.clone(), registry);

    pipeline.run(&[d(1)], false).await;
    let summary = pipeline.run(&[d(1)], false).await;
    assert_eq!(summary.skipped_batches, 1);
    assert_eq!(generator.prompts().len(), 1);

    let summary = pipeline.run(&[d(1)], true).await;
    assert_eq!(summary.processed_batches, 1);
    assert_eq!(store.topics_by_batch_date(d(1)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn persisted_registry_carries_across_runs() {
    let store = store_with_late_reviews(1).await;
    seed_late_reviews(&store, 2).await;

    let only_first = r#"{"topics": [{"topic_name": "delivery is late", "category": "issue", "review_ids": [1]}]}"#;
    let registry = Arc::new(SqliteTopicRegistry::load(store.pool().clone()).await.unwrap());
    pipeline(&store, Arc::new(ScriptedGenerator::new().respond(only_first)), registry)
        .run(&[d(1)], false)
        .await;

    // A fresh process reloads the registry and maps the variant onto it.
    let only_variant = r#"{"topics": [{"topic_name": "delivery very late", "category": "issue", "review_ids": [2]}]}"#;
    let registry = Arc::new(SqliteTopicRegistry::load(store.pool().clone()).await.unwrap());
    let summary = pipeline(&store, Arc::new(ScriptedGenerator::new().respond(only_variant)), registry)
        .run(&[d(2)], false)
        .await;
    assert_eq!(summary.canonical_topics, 1);

    let rows = store.topics_by_batch_date(d(2)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].review_id, "b2");
    assert_eq!(rows[0].topic_name, "delivery is late");
    assert_eq!(rows[0].original_topic.as_deref(), Some("delivery very late"));
}

#[tokio::test]
async fn days_without_reviews_are_reported_empty() {
    let store = store_with_late_reviews(1).await;
    let generator = Arc::new(ScriptedGenerator::new());
    let summary = pipeline(&store, generator.clone(), Arc::new(MemoryTopicRegistry::new()))
        .run(&[d(3)], false)
        .await;

    assert_eq!(summary.empty_batches, 1);
    assert!(summary.failed_dates.is_empty());
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn oracle_failure_stores_no_topics() {
    let store = store_with_late_reviews(1).await;
    let generator = Arc::new(ScriptedGenerator::new().fail("rate limited"));
    let summary = pipeline(&store, generator, Arc::new(MemoryTopicRegistry::new()))
        .run(&[d(1)], false)
        .await;

    assert_eq!(summary.processed_batches, 1);
    assert_eq!(summary.topics_stored, 0);
    assert!(!store.has_topics_for(d(1)).await.unwrap());
}
