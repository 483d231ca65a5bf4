use crate::error::Result;
use async_trait::async_trait;

// =============================================================================
// CompletionAgent Trait
// =============================================================================

/// Single-prompt text generation.
#[async_trait]
pub trait CompletionAgent: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

// =============================================================================
// EmbedAgent Trait
// =============================================================================

#[async_trait]
pub trait EmbedAgent: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}
