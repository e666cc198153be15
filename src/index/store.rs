//! Storage boundary the semantic index builds on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::corpus::Passage;
use crate::core::errors::ApiError;

/// One indexed passage: its searchable string, vector, and full metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: Passage,
}

/// A ranked query hit. `score` is cosine similarity, higher is closer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub document: String,
    pub metadata: Passage,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend label used in logs and status output.
    fn backend(&self) -> &'static str;

    /// Inserts entries whose id is not already present; returns how many were added.
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<usize, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;

    /// Up to `top_k` hits, best first; ties keep insertion order.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, ApiError>;

    /// Removes every entry (metadata keys are kept).
    async fn clear(&self) -> Result<(), ApiError>;

    async fn get_meta(&self, key: &str) -> Result<Option<String>, ApiError>;

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), ApiError>;
}
