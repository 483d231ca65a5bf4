use anyhow::Result;
use async_trait::async_trait;

/// Turns text into an embedding vector.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in &texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Free-text generation from a single prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// A registry entry returned by a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub text: String,
    /// Cosine distance, `1 - cosine_similarity`.
    pub distance: f64,
}

impl Neighbor {
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

/// Append-only corpus of canonical topic strings and their embeddings.
#[async_trait]
pub trait TopicRegistry: Send + Sync {
    /// Up to `k` entries ordered by ascending cosine distance.
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Add `text` as a canonical entry. Returns `false` if it was already present.
    async fn register(&self, text: &str, embedding: &[f32]) -> Result<bool>;

    async fn count(&self) -> Result<usize>;
}
