pub mod generation;
pub mod lines;
pub mod ollama;
pub mod openai;
pub mod provider;
#[cfg(test)]
pub mod testing;
pub mod types;

use std::sync::Arc;

use crate::core::config::{LlmSettings, ProviderKind};
use crate::core::errors::ApiError;

pub use generation::GenerationClient;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;
pub use provider::{FragmentReceiver, LlmProvider};
pub use types::{ChatMessage, ChatRequest};

/// Builds the chat provider named by the `llm` config section.
pub fn build_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, ApiError> {
    match settings.provider {
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(settings.base_url.clone()))),
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiCompatProvider::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
        ))),
        ProviderKind::Hash => Err(ApiError::BadRequest(
            "Invalid config at 'llm.provider': 'hash' is only valid for embeddings".to_string(),
        )),
    }
}
