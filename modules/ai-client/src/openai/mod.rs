mod client;
pub(crate) mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{CompletionAgent, EmbedAgent};
use client::{OpenAiClient, OPENAI_API_URL};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// OpenAi Agent
// =============================================================================

/// Client for the OpenAI API or any server speaking the same protocol
/// (vLLM, Ollama, llama.cpp) via [`OpenAi::with_base_url`].
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    embedding_model: String,
    base_url: Option<String>,
    timeout: Duration,
    temperature: f32,
    top_p: Option<f32>,
    max_tokens: u32,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            embedding_model: "text-embedding-3-small".to_string(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            temperature: 0.0,
            top_p: None,
            max_tokens: 4096,
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: Option<f32>) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn client(&self) -> Result<OpenAiClient> {
        OpenAiClient::new(
            &self.api_key,
            self.base_url.as_deref().unwrap_or(OPENAI_API_URL),
            self.timeout,
        )
    }

    /// Chat completion with only a user message.
    pub async fn prompt(&self, user: impl Into<String>) -> Result<String> {
        let mut request = types::ChatRequest::new(&self.model)
            .message(types::WireMessage::user(user))
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);
        if let Some(top_p) = self.top_p {
            request = request.top_p(top_p);
        }

        self.client()?.chat(&request).await
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

#[async_trait]
impl CompletionAgent for OpenAi {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompt(prompt).await
    }
}

#[async_trait]
impl EmbedAgent for OpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client()?.embed(&self.embedding_model, text).await
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.client()?
            .embed_batch(&self.embedding_model, &texts)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_new() {
        let ai = OpenAi::new("sk-test", "gpt-4o-mini");
        assert_eq!(ai.model(), "gpt-4o-mini");
        assert_eq!(ai.embedding_model(), "text-embedding-3-small");
        assert_eq!(ai.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_openai_builders() {
        let ai = OpenAi::new("", "zephyr-7b-beta")
            .with_base_url("http://localhost:8000/v1")
            .with_embedding_model("all-MiniLM-L6-v2")
            .with_timeout(Duration::from_secs(5))
            .with_sampling(0.1, Some(0.9))
            .with_max_tokens(500);
        assert_eq!(ai.base_url.as_deref(), Some("http://localhost:8000/v1"));
        assert_eq!(ai.embedding_model(), "all-MiniLM-L6-v2");
        assert_eq!(ai.timeout, Duration::from_secs(5));
        assert_eq!(ai.top_p, Some(0.9));
        assert_eq!(ai.max_tokens, 500);
    }

    #[test]
    fn chat_request_omits_unset_sampling() {
        let request = types::ChatRequest::new("m").message(types::WireMessage::user("hi"));
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("top_p").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let ai = OpenAi::new("", "m")
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2));
        let err = ai.complete("hello").await.unwrap_err();
        assert!(matches!(
            err,
            crate::AiError::Network(_) | crate::AiError::Timeout(_)
        ));
    }
}
