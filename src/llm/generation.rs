use std::sync::Arc;

use super::provider::{FragmentReceiver, LlmProvider};
use super::types::{ChatMessage, ChatRequest};
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

/// Sends one composed prompt to the configured model and streams the reply.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn LlmProvider>,
    settings: LlmSettings,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: LlmSettings) -> Self {
        Self { provider, settings }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// The prompt goes out as a single user-role message. Fragments arrive in
    /// order on the returned channel; an `Err` item aborts the stream.
    pub async fn generate(&self, prompt: &str) -> Result<FragmentReceiver, ApiError> {
        let request =
            ChatRequest::new(vec![ChatMessage::user(prompt)]).with_settings(&self.settings);
        tracing::debug!(
            "Requesting streamed completion from {} ({}), prompt {} chars",
            self.provider.name(),
            self.settings.model,
            prompt.len()
        );
        self.provider.stream_chat(request, &self.settings.model).await
    }
}
