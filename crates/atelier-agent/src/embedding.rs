//! Embedding backend for the semantic dedup gate

use crate::types::{EmbeddingRequest, EmbeddingResponse};
use async_trait::async_trait;
use atelier_core::{AtelierError, BackendEndpoint, Result};

/// Longest input forwarded to the embedding API
const MAX_EMBED_INPUT: usize = 8000;

/// Produces fixed-dimensional embedding vectors for text
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI-compatible embeddings endpoint over HTTP
pub struct HttpEmbeddingBackend {
    client: reqwest::Client,
    endpoint: BackendEndpoint,
}

impl HttpEmbeddingBackend {
    pub fn new(endpoint: BackendEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.endpoint.api_key_env).map_err(|_| {
            AtelierError::Embedding(format!(
                "API key environment variable {} is not set",
                self.endpoint.api_key_env
            ))
        })
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    fn id(&self) -> &str {
        &self.endpoint.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self.api_key()?;
        let url = format!("{}/embeddings", self.endpoint.base_url);

        let input: String = text.chars().take(MAX_EMBED_INPUT).collect();
        let request = EmbeddingRequest {
            model: self.endpoint.model.clone(),
            input,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AtelierError::Embedding(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(AtelierError::Embedding(format!(
                "embedding API error {}: {}",
                status, error_text
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AtelierError::Embedding(format!("unparseable body: {}", e)))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AtelierError::Embedding("no embedding in response".to_string()))
    }
}
