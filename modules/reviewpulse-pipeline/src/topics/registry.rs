use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use reviewpulse_common::{cosine_distance, Neighbor, TopicRegistry};

/// Process-local registry. Contents are lost when the run ends.
#[derive(Default)]
pub struct MemoryTopicRegistry {
    entries: RwLock<Vec<(String, Vec<f32>)>>,
}

impl MemoryTopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TopicRegistry for MemoryTopicRegistry {
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<Neighbor> = entries
            .iter()
            .map(|(text, vector)| Neighbor {
                text: text.clone(),
                distance: cosine_distance(embedding, vector),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn register(&self, text: &str, embedding: &[f32]) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|(existing, _)| existing == text) {
            return Ok(false);
        }
        entries.push((text.to_string(), embedding.to_vec()));
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ties_go_to_earlier_entry() {
        let registry = MemoryTopicRegistry::new();
        registry.register("first", &[1.0, 0.0]).await.unwrap();
        registry.register("second", &[2.0, 0.0]).await.unwrap();

        let hits = registry.nearest(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "first");
    }

    #[tokio::test]
    async fn duplicate_registration_is_ignored() {
        let registry = MemoryTopicRegistry::new();
        assert!(registry.register("a", &[1.0]).await.unwrap());
        assert!(!registry.register("a", &[1.0]).await.unwrap());
        assert_eq!(registry.count().await.unwrap(), 1);
    }
}
