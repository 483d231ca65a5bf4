//! Greedy canonicalization of topic names.
//!
//! Each name is compared against its single nearest registry entry. Close
//! enough and different: the record takes the canonical name and keeps its
//! own as `original_topic`. Otherwise the name itself joins the registry.
//! Results depend on the order topics arrive in.
//!
//! Names not seen before are embedded in one batch call per run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{ensure, Result};
use tracing::{debug, info};

use reviewpulse_common::{TextEmbedder, TopicRecord, TopicRegistry};

pub struct TopicConsolidator {
    embedder: Arc<dyn TextEmbedder>,
    registry: Arc<dyn TopicRegistry>,
    threshold: f64,
    embeddings: HashMap<String, Vec<f32>>,
}

impl TopicConsolidator {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        registry: Arc<dyn TopicRegistry>,
        threshold: f64,
    ) -> Self {
        Self {
            embedder,
            registry,
            threshold,
            embeddings: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn TopicRegistry> {
        &self.registry
    }

    pub async fn consolidate(&mut self, topics: Vec<TopicRecord>) -> Result<Vec<TopicRecord>> {
        let mut rewritten = 0usize;
        let mut registered = 0usize;
        let mut out = Vec::with_capacity(topics.len());

        self.embed_unseen(&topics).await?;

        for mut topic in topics {
            let embedding = self.embedding(&topic.topic_name).await?;
            let nearest = self.registry.nearest(&embedding, 1).await?;

            match nearest.into_iter().next() {
                Some(hit) if hit.similarity() >= self.threshold && hit.text != topic.topic_name => {
                    debug!(
                        from = %topic.topic_name,
                        to = %hit.text,
                        similarity = hit.similarity(),
                        "Canonicalized topic"
                    );
                    topic.canonicalize(&hit.text);
                    rewritten += 1;
                }
                _ => {
                    if self.registry.register(&topic.topic_name, &embedding).await? {
                        registered += 1;
                    }
                }
            }
            out.push(topic);
        }

        info!(
            topics = out.len(),
            rewritten,
            registered,
            "Consolidated topics"
        );
        Ok(out)
    }

    async fn embed_unseen(&mut self, topics: &[TopicRecord]) -> Result<()> {
        let mut seen = HashSet::new();
        let unseen: Vec<String> = topics
            .iter()
            .map(|t| t.topic_name.as_str())
            .filter(|name| !self.embeddings.contains_key(*name) && seen.insert(*name))
            .map(str::to_string)
            .collect();
        if unseen.is_empty() {
            return Ok(());
        }

        let vectors = self.embedder.embed_batch(unseen.clone()).await?;
        ensure!(
            vectors.len() == unseen.len(),
            "expected {} embeddings, got {}",
            unseen.len(),
            vectors.len()
        );
        debug!(count = unseen.len(), "Embedded new topic names");
        self.embeddings.extend(unseen.into_iter().zip(vectors));
        Ok(())
    }

    async fn embedding(&mut self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.embeddings.get(text) {
            return Ok(cached.clone());
        }
        let embedding = self.embedder.embed(text).await?;
        self.embeddings.insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{topic_record, FixedEmbedder};
    use crate::topics::MemoryTopicRegistry;

    #[tokio::test]
    async fn unrelated_topics_are_registered() {
        let embedder = Arc::new(
            FixedEmbedder::new(2)
                .on_text("food stale", vec![1.0, 0.0])
                .on_text("maps broken", vec![0.0, 1.0]),
        );
        let registry = Arc::new(MemoryTopicRegistry::new());
        let mut consolidator = TopicConsolidator::new(embedder, registry.clone(), 0.8);

        let out = consolidator
            .consolidate(vec![
                topic_record("r1", "food stale"),
                topic_record("r2", "maps broken"),
            ])
            .await
            .unwrap();

        assert!(out.iter().all(|t| t.original_topic.is_none()));
        assert_eq!(registry.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn repeated_name_is_embedded_once() {
        let embedder = Arc::new(FixedEmbedder::new(8));
        let registry = Arc::new(MemoryTopicRegistry::new());
        let mut consolidator = TopicConsolidator::new(embedder.clone(), registry.clone(), 0.8);

        let out = consolidator
            .consolidate(vec![
                topic_record("r1", "late"),
                topic_record("r2", "late"),
                topic_record("r3", "late"),
            ])
            .await
            .unwrap();

        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|t| t.topic_name == "late" && t.original_topic.is_none()));
        assert_eq!(embedder.calls(), 1);
        assert_eq!(registry.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn new_names_are_embedded_in_one_batch() {
        let embedder = Arc::new(FixedEmbedder::new(8));
        let registry = Arc::new(MemoryTopicRegistry::new());
        let mut consolidator = TopicConsolidator::new(embedder.clone(), registry, 0.8);

        consolidator
            .consolidate(vec![
                topic_record("r1", "late"),
                topic_record("r2", "cold food"),
                topic_record("r3", "late"),
            ])
            .await
            .unwrap();
        assert_eq!(embedder.batches(), 1);
        assert_eq!(embedder.calls(), 2);

        // Only the unseen name goes out on the next run.
        consolidator
            .consolidate(vec![topic_record("r4", "cold food"), topic_record("r5", "refund")])
            .await
            .unwrap();
        assert_eq!(embedder.batches(), 2);
        assert_eq!(embedder.calls(), 3);

        consolidator
            .consolidate(vec![topic_record("r6", "late")])
            .await
            .unwrap();
        assert_eq!(embedder.batches(), 2);
    }

    #[tokio::test]
    async fn below_threshold_is_kept() {
        // cos = 0.6
        let embedder = Arc::new(
            FixedEmbedder::new(2)
                .on_text("slow app", vec![1.0, 0.0])
                .on_text("slow delivery", vec![0.6, 0.8]),
        );
        let registry = Arc::new(MemoryTopicRegistry::new());
        let mut consolidator = TopicConsolidator::new(embedder, registry.clone(), 0.8);

        let out = consolidator
            .consolidate(vec![
                topic_record("r1", "slow app"),
                topic_record("r2", "slow delivery"),
            ])
            .await
            .unwrap();

        assert_eq!(out[1].topic_name, "slow delivery");
        assert_eq!(registry.count().await.unwrap(), 2);
    }
}
