//! Embedding client for generating vector representations
//!
//! Talks to an OpenAI-compatible `/embeddings` endpoint. Every call is a
//! single upstream request; caching lives in [`crate::cache`].
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use cine_core::{ensure_dimension, CineError, EmbeddingConfig, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;
}

/// Known output sizes for OpenAI embedding models
pub fn model_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        _ => 1536, // Default
    }
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
    max_retries: u32,
    backoff: Duration,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Outcome of one upstream attempt
enum AttemptError {
    /// Worth retrying: network failure, timeout, 429, 5xx
    Transient(String),
    /// Retrying cannot help: auth, bad request, malformed payload
    Fatal(String),
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = model_dimension(&model);

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model,
            dimension,
            max_retries: 0,
            backoff: Duration::from_millis(500),
        }
    }

    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.require_api_key()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CineError::Config(format!("Failed to build HTTP client: {e}")))?;

        let mut embedding = Self::new(api_key, config.model.clone())
            .with_base_url(config.base_url.clone())
            .with_retries(config.max_retries, Duration::from_millis(config.retry_backoff_ms));
        embedding.client = client;
        if let Some(dimension) = config.dimension {
            embedding.dimension = dimension;
        }
        Ok(embedding)
    }

    /// Point at an OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Retry transient failures up to `max_retries` times
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request_once(&self, text: &str) -> std::result::Result<Vec<f32>, AttemptError> {
        let request = OpenAiEmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("Embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("OpenAI embedding error ({status}): {error_text}");
            return Err(if is_transient_status(status) {
                AttemptError::Transient(message)
            } else {
                AttemptError::Fatal(message)
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Transient(format!("Failed to read embedding response: {e}")))?;

        parse_embedding_response(&body, self.dimension).map_err(|e| AttemptError::Fatal(e.to_string()))
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Decode an `/embeddings` response body and validate its shape
fn parse_embedding_response(body: &[u8], dimension: usize) -> Result<Vec<f32>> {
    let result: OpenAiEmbeddingResponse = serde_json::from_slice(body)
        .map_err(|e| CineError::Provider(format!("Failed to parse embedding response: {e}")))?;

    let embedding = result
        .data
        .into_iter()
        .min_by_key(|d| d.index)
        .map(|d| d.embedding)
        .ok_or_else(|| CineError::Provider("No embedding returned".to_string()))?;

    if embedding.is_empty() {
        return Err(CineError::Provider("Empty embedding returned".to_string()));
    }
    ensure_dimension(&embedding, dimension)
        .map_err(|e| CineError::Provider(format!("Malformed embedding: {e}")))?;

    Ok(embedding)
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        tracing::debug!(model = %self.model, chars = text.len(), "Requesting embedding");

        let mut attempt = 0;
        loop {
            match self.request_once(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(AttemptError::Fatal(message)) => return Err(CineError::Provider(message)),
                Err(AttemptError::Transient(message)) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(CineError::Provider(message));
                    }
                    tracing::warn!(attempt, max_retries = self.max_retries, "{message}; retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_dimension() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-ada-002");
        assert_eq!(client.dimension(), 1536);

        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large");
        assert_eq!(client.dimension(), 3072);
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = EmbeddingConfig::default();
        assert!(matches!(
            OpenAiEmbedding::from_config(&config),
            Err(CineError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_dimension_override() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "http://localhost:8080/v1/".to_string(),
            dimension: Some(256),
            ..Default::default()
        };
        let client = OpenAiEmbedding::from_config(&config).unwrap();
        assert_eq!(client.dimension(), 256);
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_parse_response() {
        let body = br#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,0.2,0.3]}],"model":"text-embedding-ada-002"}"#;
        assert_eq!(parse_embedding_response(body, 3).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_response_rejects_malformed() {
        assert!(matches!(
            parse_embedding_response(br#"{"data":[]}"#, 3),
            Err(CineError::Provider(_))
        ));
        assert!(matches!(
            parse_embedding_response(br#"{"data":[{"index":0,"embedding":[]}]}"#, 3),
            Err(CineError::Provider(_))
        ));
        assert!(matches!(
            parse_embedding_response(br#"{"data":[{"index":0,"embedding":[0.1,0.2]}]}"#, 3),
            Err(CineError::Provider(_))
        ));
        assert!(matches!(
            parse_embedding_response(b"<html>bad gateway</html>", 3),
            Err(CineError::Provider(_))
        ));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_provider_error() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-ada-002")
            .with_base_url("http://127.0.0.1:1")
            .with_retries(1, Duration::from_millis(1));

        assert!(matches!(
            client.embed("a heist movie").await,
            Err(CineError::Provider(_))
        ));
    }
}
