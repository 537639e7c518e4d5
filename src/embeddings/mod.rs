pub mod openai;
pub mod cache;

use async_trait::async_trait;

use crate::error::{Result, RagagentError};

pub use cache::EmbeddingCache;
pub use openai::OpenAIEmbedder;

/// Embedding service contract: `embed(text) -> fixed-length vector`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded for logging
    fn model(&self) -> &str;

    /// Embed many texts; the output has one vector per input, in input order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagagentError::Embedding("Empty response from embedding service".to_string()))
    }
}
