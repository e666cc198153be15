//! Embedding service: turns text into fixed-length vectors.
//!
//! The same `Embedder` instance must serve both index build and queries;
//! vectors from different models are not comparable.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::core::config::{EmbeddingSettings, ProviderKind};
use crate::core::errors::ApiError;
use crate::llm::{LlmProvider, OllamaProvider, OpenAiCompatProvider};
use crate::vector_math::l2_normalize;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the embedding configuration (provider and model).
    fn model_id(&self) -> String;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Internal("embedder returned no vector".to_string()))
    }
}

/// Embeds through a remote model served by an [`LlmProvider`].
pub struct ProviderEmbedder {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String) -> Self {
        Self { provider, model }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn model_id(&self) -> String {
        format!("{}:{}", self.provider.name(), self.model)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("Embedding {} texts with {}", texts.len(), self.model_id());
        let vectors = self.provider.embed(texts, &self.model).await?;
        if vectors.len() != texts.len() {
            return Err(ApiError::Upstream(format!(
                "embedding model '{}' returned {} vectors for {} inputs",
                self.model,
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

/// Deterministic bag-of-tokens embedder that needs no model server.
///
/// Each lowercase alphanumeric token is hashed into one of `dim` buckets and
/// the result is L2-normalised, so texts sharing words land close together.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase());
        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dim as u64) as usize;
            v[idx] += 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> String {
        format!("hash:{}", self.dim)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub fn build_embedder(settings: &EmbeddingSettings) -> Arc<dyn Embedder> {
    match settings.provider {
        ProviderKind::Hash => Arc::new(HashEmbedder::new(settings.dimensions)),
        ProviderKind::Ollama => Arc::new(ProviderEmbedder::new(
            Arc::new(OllamaProvider::new(settings.base_url.clone())),
            settings.model.clone(),
        )),
        ProviderKind::OpenAi => Arc::new(ProviderEmbedder::new(
            Arc::new(OpenAiCompatProvider::new(
                settings.base_url.clone(),
                settings.api_key.clone(),
            )),
            settings.model.clone(),
        )),
    }
}
