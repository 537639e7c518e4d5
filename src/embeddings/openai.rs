use crate::embeddings::Embedder;
use crate::error::{Result, RagagentError};
use crate::retry::{with_retry, ApiError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI caps inputs per request at 2048
const MAX_BATCH_SIZE: usize = 2048;

/// Request structure for OpenAI embeddings API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response structure from OpenAI embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in API response
#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
///
/// Splits large inputs into batches and retries 429/5xx responses with
/// exponential backoff.
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    batch_size: usize,
    max_retries: usize,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-3-small")
    /// * `base_url` - API root, e.g. "https://api.openai.com/v1"
    /// * `batch_size` - Maximum number of texts per request (capped at 2048)
    /// * `max_retries` - Retries for rate-limit and server errors
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        batch_size: usize,
        max_retries: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagagentError::Embedding(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            max_retries,
        })
    }

    /// Single API request for up to `batch_size` texts
    async fn request_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ApiError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ApiError::from_status(status, &body));
        }

        let mut result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ApiError::fatal(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(ApiError::fatal(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }
        result.data.sort_by_key(|d| d.index);
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embeddings = with_retry(
                "embeddings request",
                self.max_retries,
                Duration::from_secs(1),
                || self.request_batch(batch),
            )
            .await
            .map_err(|e| RagagentError::Embedding(e.message))?;
            all_embeddings.extend(embeddings);

            // Small delay between full batches to stay under rate limits
            if batch.len() == self.batch_size {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        Ok(all_embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(batch_size: usize) -> OpenAIEmbedder {
        OpenAIEmbedder::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            "https://api.openai.com/v1/".to_string(),
            batch_size,
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_embedder_new() {
        let embedder = embedder(100);
        assert_eq!(embedder.model(), "text-embedding-3-small");
        assert_eq!(embedder.batch_size, 100);
        assert_eq!(embedder.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_embedder_batch_size_limits() {
        assert_eq!(embedder(5000).batch_size, 2048);
        assert_eq!(embedder(2048).batch_size, 2048);
        assert_eq!(embedder(0).batch_size, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let result = embedder(10).embed_batch(Vec::new()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_embedding_error() {
        let embedder = OpenAIEmbedder::new(
            "k".to_string(),
            "m".to_string(),
            "http://127.0.0.1:9".to_string(),
            10,
            0,
        )
        .unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagagentError::Embedding(_)));
    }
}
