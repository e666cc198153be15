//! Semantic index over the corpus.
//!
//! This module provides:
//! - `VectorIndex`: the add/count/query storage boundary
//! - `InMemoryIndex` and `SqliteIndex` backends
//! - `SemanticIndex`: embeds the corpus at most once per process and reuses
//!   an already-populated store

mod memory;
mod sqlite;
mod store;

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::core::config::{AppPaths, IndexBackend, IndexSettings};
use crate::core::errors::ApiError;
use crate::corpus::Corpus;
use crate::embedding::Embedder;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;
pub use store::{IndexEntry, IndexHit, VectorIndex};

const META_FINGERPRINT: &str = "corpus_fingerprint";
const META_EMBEDDING_MODEL: &str = "embedding_model";

/// What the one-time build step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Passages were embedded and inserted.
    Built { embedded: usize },
    /// The store already held entries; nothing was embedded.
    Reused { entries: usize, stale: bool },
}

pub struct SemanticIndex {
    store: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    rebuild_on_corpus_change: bool,
    build: OnceCell<BuildOutcome>,
}

impl SemanticIndex {
    pub fn new(
        store: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        rebuild_on_corpus_change: bool,
    ) -> Self {
        Self {
            store,
            embedder,
            rebuild_on_corpus_change,
            build: OnceCell::new(),
        }
    }

    /// Populates the store from `corpus` unless it already holds entries.
    ///
    /// Concurrent and repeated callers share the first successful outcome; a
    /// failed build leaves the cell empty so a later call may retry.
    pub async fn build_or_reuse(&self, corpus: &Corpus) -> Result<&BuildOutcome, ApiError> {
        self.build.get_or_try_init(|| self.run_build(corpus)).await
    }

    pub fn outcome(&self) -> Option<&BuildOutcome> {
        self.build.get()
    }

    async fn run_build(&self, corpus: &Corpus) -> Result<BuildOutcome, ApiError> {
        let fingerprint = corpus.fingerprint();
        let model_id = self.embedder.model_id();
        let existing = self.store.count().await?;

        if existing > 0 {
            let stored_model = self.store.get_meta(META_EMBEDDING_MODEL).await?;
            if stored_model.as_deref() != Some(model_id.as_str()) {
                // vectors from another model are not comparable with query vectors
                tracing::warn!(
                    "{} index was embedded with {}; re-embedding {} passages with {}",
                    self.store.backend(),
                    stored_model.as_deref().unwrap_or("an unknown model"),
                    corpus.len(),
                    model_id
                );
                self.store.clear().await?;
            } else {
                let stored_fingerprint = self.store.get_meta(META_FINGERPRINT).await?;
                let stale = stored_fingerprint.as_deref() != Some(fingerprint.as_str());

                if !stale || !self.rebuild_on_corpus_change {
                    if stale {
                        tracing::warn!(
                            "{} index holds {} entries built from a different corpus; reusing it anyway",
                            self.store.backend(),
                            existing
                        );
                    } else {
                        tracing::info!("Reusing populated {} index ({} entries)", self.store.backend(), existing);
                    }
                    return Ok(BuildOutcome::Reused { entries: existing, stale });
                }

                tracing::info!("Corpus changed; rebuilding {} index", self.store.backend());
                self.store.clear().await?;
            }
        }

        let documents: Vec<String> = corpus.passages().iter().map(|p| p.searchable_text()).collect();
        let vectors = self.embedder.embed_batch(&documents).await?;
        if vectors.len() != documents.len() {
            return Err(ApiError::Internal(format!(
                "embedder returned {} vectors for {} passages",
                vectors.len(),
                documents.len()
            )));
        }

        let entries: Vec<IndexEntry> = corpus
            .passages()
            .iter()
            .zip(documents)
            .zip(vectors)
            .map(|((passage, document), embedding)| IndexEntry {
                id: passage.id.clone(),
                document,
                embedding,
                metadata: passage.clone(),
            })
            .collect();

        let embedded = self.store.add(entries).await?;
        self.store.set_meta(META_FINGERPRINT, &fingerprint).await?;
        self.store.set_meta(META_EMBEDDING_MODEL, &model_id).await?;

        tracing::info!(
            "Indexed {} passages from {} into {} backend with {}",
            embedded,
            corpus.source().display(),
            self.store.backend(),
            model_id
        );
        Ok(BuildOutcome::Built { embedded })
    }
}

/// Opens the storage backend named by the `index` config section.
pub async fn build_index_store(
    settings: &IndexSettings,
    paths: &AppPaths,
) -> Result<Arc<dyn VectorIndex>, ApiError> {
    match settings.backend {
        IndexBackend::Memory => Ok(Arc::new(InMemoryIndex::new())),
        IndexBackend::Sqlite => {
            let index = SqliteIndex::with_path(paths.index_db_path.clone()).await?;
            tracing::info!("Opened index database at {}", index.db_path().display());
            Ok(Arc::new(index))
        }
    }
}
