// Adapters from the OpenAI-compatible client to the pipeline's text traits.

use anyhow::Result;
use async_trait::async_trait;

use ai_client::{CompletionAgent, EmbedAgent, OpenAi};
use reviewpulse_common::{Config, TextEmbedder, TextGenerator};

/// Low temperature keeps extraction close to deterministic.
const EXTRACTION_TEMPERATURE: f32 = 0.1;
const EXTRACTION_TOP_P: f32 = 0.9;

pub fn openai_from_config(config: &Config) -> OpenAi {
    let client = OpenAi::new(&config.llm_api_key, &config.llm_model)
        .with_embedding_model(&config.embedding_model)
        .with_timeout(config.llm_timeout)
        .with_sampling(EXTRACTION_TEMPERATURE, Some(EXTRACTION_TOP_P))
        .with_max_tokens(config.llm_max_tokens);

    match &config.llm_base_url {
        Some(url) => client.with_base_url(url),
        None => client,
    }
}

pub struct OpenAiGenerator {
    client: OpenAi,
}

impl OpenAiGenerator {
    pub fn new(client: OpenAi) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(self.client.complete(prompt).await?)
    }
}

pub struct OpenAiEmbedder {
    client: OpenAi,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAi) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextEmbedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.client.embed(text).await?)
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(self.client.embed_batch(texts).await?)
    }
}
