//! Shared, read-mostly core that every chat session queries.
//!
//! A failure to load the corpus or build the index does not abort startup:
//! the guide comes up `Unavailable` and sessions refuse queries with the
//! stored reason.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::config::{AppPaths, GuideSettings};
use crate::core::errors::ApiError;
use crate::corpus::{Corpus, CorpusError};
use crate::embedding::{build_embedder, Embedder};
use crate::index::{build_index_store, SemanticIndex};
use crate::llm::{build_provider, GenerationClient};
use crate::prompt::PromptComposer;
use crate::retrieval::{RetrievalResult, Retriever};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuideError {
    #[error("The knowledge base is not loaded, so questions cannot be answered: {0}")]
    IndexUnavailable(String),
    #[error("Please enter a question.")]
    EmptyQuery,
}

impl From<GuideError> for ApiError {
    fn from(err: GuideError) -> Self {
        match err {
            GuideError::IndexUnavailable(_) => ApiError::ServiceUnavailable(err.to_string()),
            GuideError::EmptyQuery => ApiError::BadRequest(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
enum IndexSetupError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("index could not be built: {0}")]
    Index(#[from] ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexStatus {
    Ready { entries: usize, backend: String },
    Unavailable { reason: String },
}

pub struct Guide {
    status: IndexStatus,
    retriever: Option<Retriever>,
    composer: PromptComposer,
    generation: GenerationClient,
    embedding_model: String,
}

impl Guide {
    pub fn ready(
        retriever: Retriever,
        status: IndexStatus,
        composer: PromptComposer,
        generation: GenerationClient,
        embedding_model: String,
    ) -> Self {
        Self {
            status,
            retriever: Some(retriever),
            composer,
            generation,
            embedding_model,
        }
    }

    pub fn unavailable(
        reason: impl Into<String>,
        composer: PromptComposer,
        generation: GenerationClient,
        embedding_model: String,
    ) -> Self {
        Self {
            status: IndexStatus::Unavailable {
                reason: reason.into(),
            },
            retriever: None,
            composer,
            generation,
            embedding_model,
        }
    }

    /// Wires providers from settings, then loads the corpus and builds (or
    /// reuses) the index. Only configuration errors are returned as `Err`.
    pub async fn initialize(settings: &GuideSettings, paths: &AppPaths) -> Result<Self, ApiError> {
        let provider = build_provider(&settings.llm)?;
        let generation = GenerationClient::new(provider, settings.llm.clone());
        let composer = PromptComposer::new(&settings.prompt);
        let embedder = build_embedder(&settings.embedding);
        let embedding_model = embedder.model_id();

        match prepare_index(settings, paths, embedder).await {
            Ok((retriever, status)) => {
                tracing::info!("Guide ready: {:?}", status);
                Ok(Self::ready(retriever, status, composer, generation, embedding_model))
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::error!("Knowledge base unavailable: {}", reason);
                Ok(Self::unavailable(reason, composer, generation, embedding_model))
            }
        }
    }

    pub fn status(&self) -> &IndexStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status, IndexStatus::Ready { .. })
    }

    /// `Some(message)` when queries are being refused.
    pub fn banner(&self) -> Option<String> {
        match &self.status {
            IndexStatus::Ready { .. } => None,
            IndexStatus::Unavailable { reason } => {
                Some(GuideError::IndexUnavailable(reason.clone()).to_string())
            }
        }
    }

    pub fn ensure_ready(&self) -> Result<(), GuideError> {
        match &self.status {
            IndexStatus::Ready { .. } => Ok(()),
            IndexStatus::Unavailable { reason } => Err(GuideError::IndexUnavailable(reason.clone())),
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult, ApiError> {
        match &self.retriever {
            Some(retriever) => retriever.retrieve(query).await,
            None => Err(ApiError::ServiceUnavailable(
                "knowledge base is not loaded".to_string(),
            )),
        }
    }

    pub fn composer(&self) -> &PromptComposer {
        &self.composer
    }

    pub fn generation(&self) -> &GenerationClient {
        &self.generation
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

async fn prepare_index(
    settings: &GuideSettings,
    paths: &AppPaths,
    embedder: Arc<dyn Embedder>,
) -> Result<(Retriever, IndexStatus), IndexSetupError> {
    let corpus = Corpus::load(&paths.resolve(&settings.corpus.path))?;
    let store = build_index_store(&settings.index, paths).await?;

    let index = SemanticIndex::new(
        store.clone(),
        embedder.clone(),
        settings.index.rebuild_on_corpus_change,
    );
    index.build_or_reuse(&corpus).await?;

    let status = IndexStatus::Ready {
        entries: store.count().await?,
        backend: store.backend().to_string(),
    };
    Ok((Retriever::new(embedder, store), status))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::config::{EmbeddingSettings, ProviderKind};

    fn offline_settings(corpus_path: &str) -> GuideSettings {
        let mut settings = GuideSettings::default();
        settings.corpus.path = corpus_path.to_string();
        settings.embedding = EmbeddingSettings {
            provider: ProviderKind::Hash,
            dimensions: 64,
            ..EmbeddingSettings::default()
        };
        settings
    }

    #[tokio::test]
    async fn missing_corpus_leaves_guide_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::with_dirs(dir.path().to_path_buf(), dir.path().join("data"));

        let guide = Guide::initialize(&offline_settings("missing.json"), &paths)
            .await
            .expect("initialize");

        assert!(!guide.is_ready());
        let banner = guide.banner().expect("banner");
        assert!(banner.contains("missing.json"));
        assert!(matches!(guide.ensure_ready(), Err(GuideError::IndexUnavailable(_))));
        assert!(guide.retrieve("q").await.is_err());
    }

    #[tokio::test]
    async fn valid_corpus_builds_ready_guide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::with_dirs(dir.path().to_path_buf(), dir.path().join("data"));
        fs::write(
            dir.path().join("kb.json"),
            r#"[{"id": 1, "chapter": 2, "verse": 47, "themes": ["duty"],
                "modern_commentary": "Act without attachment.",
                "translation_sivananda": "Thy right is to work only.",
                "translation_telugu": "t", "sanskrit": "s"}]"#,
        )
        .expect("write corpus");

        let guide = Guide::initialize(&offline_settings("kb.json"), &paths)
            .await
            .expect("initialize");

        assert_eq!(
            guide.status(),
            &IndexStatus::Ready {
                entries: 1,
                backend: "memory".to_string()
            }
        );
        assert_eq!(guide.banner(), None);
        assert_eq!(guide.embedding_model(), "hash:64");
        let result = guide.retrieve("duty").await.expect("retrieve");
        assert_eq!(result.passage().map(|p| p.id.as_str()), Some("1"));
    }

    #[tokio::test]
    async fn hash_chat_provider_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::with_dirs(dir.path().to_path_buf(), dir.path().join("data"));
        let mut settings = offline_settings("kb.json");
        settings.llm.provider = ProviderKind::Hash;

        assert!(Guide::initialize(&settings, &paths).await.is_err());
    }
}
