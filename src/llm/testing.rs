//! In-process provider with canned replies for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::{FragmentReceiver, LlmProvider};
use super::types::ChatRequest;
use crate::core::errors::ApiError;

pub struct ScriptedProvider {
    fragments: Vec<String>,
    fail_after: Option<String>,
    refuse: Option<String>,
    requests: Mutex<Vec<(ChatRequest, String)>>,
}

impl ScriptedProvider {
    pub fn replying(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
            refuse: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Streams `fragments`, then yields an error carrying `message`.
    pub fn failing_after(fragments: &[&str], message: &str) -> Self {
        Self {
            fail_after: Some(message.to_string()),
            ..Self::replying(fragments)
        }
    }

    /// Rejects the request before any fragment is produced.
    pub fn refusing(message: &str) -> Self {
        Self {
            refuse: Some(message.to_string()),
            ..Self::replying(&[])
        }
    }

    pub fn requests(&self) -> Vec<(ChatRequest, String)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<FragmentReceiver, ApiError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push((request, model_id.to_string()));
        }
        if let Some(message) = &self.refuse {
            return Err(ApiError::Upstream(message.clone()));
        }

        let (tx, rx) = mpsc::channel(self.fragments.len() + 1);
        for fragment in &self.fragments {
            let _ = tx.send(Ok(fragment.clone())).await;
        }
        if let Some(message) = &self.fail_after {
            let _ = tx.send(Err(ApiError::Upstream(message.clone()))).await;
        }
        Ok(rx)
    }

    async fn embed(&self, _inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        Err(ApiError::BadRequest("scripted provider has no embeddings".to_string()))
    }
}
