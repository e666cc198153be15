//! Top-1 nearest-neighbour lookup for a query string.

use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::corpus::Passage;
use crate::embedding::Embedder;
use crate::index::VectorIndex;

const TOP_K: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalResult {
    Found {
        passage: Passage,
        document: String,
        /// Cosine similarity of the match; never used to reject it.
        score: f32,
    },
    NotFound,
}

impl RetrievalResult {
    pub fn passage(&self) -> Option<&Passage> {
        match self {
            RetrievalResult::Found { passage, .. } => Some(passage),
            RetrievalResult::NotFound => None,
        }
    }
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    /// `embedder` must be the instance the index was built with.
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult, ApiError> {
        tracing::debug!("Retrieving for query ({} chars)", query.len());
        let vector = self.embedder.embed(query).await?;
        let mut hits = self.index.query(&vector, TOP_K).await?;

        if hits.is_empty() {
            tracing::debug!("Index returned no hits");
            return Ok(RetrievalResult::NotFound);
        }

        let hit = hits.swap_remove(0);
        tracing::debug!("Nearest passage {} (score {:.4})", hit.id, hit.score);
        Ok(RetrievalResult::Found {
            passage: hit.metadata,
            document: hit.document,
            score: hit.score,
        })
    }
}
