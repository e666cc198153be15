use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{IndexEntry, IndexHit, VectorIndex};
use crate::core::errors::ApiError;
use crate::vector_math::rank_descending_by_cosine;

/// Process-lifetime index; contents vanish with the process.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<IndexEntry>>,
    meta: RwLock<HashMap<String, String>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, new_entries: Vec<IndexEntry>) -> Result<usize, ApiError> {
        let mut entries = self.entries.write().await;
        let mut known: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        let mut added = 0;
        for entry in new_entries {
            if known.insert(entry.id.clone()) {
                entries.push(entry);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        Ok(self.entries.read().await.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, ApiError> {
        let entries = self.entries.read().await;
        if entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<&[f32]> = entries.iter().map(|e| e.embedding.as_slice()).collect();
        let ranked = rank_descending_by_cosine(vector, &candidates)?;

        Ok(ranked
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| {
                let entry = &entries[idx];
                IndexHit {
                    id: entry.id.clone(),
                    document: entry.document.clone(),
                    metadata: entry.metadata.clone(),
                    score,
                }
            })
            .collect())
    }

    async fn clear(&self) -> Result<(), ApiError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, ApiError> {
        Ok(self.meta.read().await.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), ApiError> {
        self.meta
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
