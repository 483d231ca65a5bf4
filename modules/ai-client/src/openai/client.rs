use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::*;
use crate::error::{AiError, Result};

pub(crate) const OPENAI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub(crate) struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Config(e.to_string()))?;
        Ok(Self {
            api_key: api_key.to_string(),
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        // Local OpenAI-compatible servers often run without a key.
        if !self.api_key.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                    .map_err(|e| AiError::Config(e.to_string()))?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<String> {
        debug!(model = %request.model, "OpenAI chat request");

        let response: ChatResponse = self.post("chat/completions", request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::EmptyResponse("no choices in chat response".to_string()))
    }

    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: model.to_string(),
            input: serde_json::Value::String(text.to_string()),
        };

        let response: EmbeddingResponse = self.post("embeddings", &request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AiError::EmptyResponse("no embedding in response".to_string()))
    }

    pub async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: model.to_string(),
            input: serde_json::Value::Array(
                texts
                    .iter()
                    .map(|t| serde_json::Value::String(t.clone()))
                    .collect(),
            ),
        };

        let response: EmbeddingResponse = self.post("embeddings", &request).await?;
        if response.data.len() != texts.len() {
            return Err(AiError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
