use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }

    pub fn with_settings(mut self, settings: &LlmSettings) -> Self {
        self.temperature = settings.temperature.or(self.temperature);
        self.top_p = settings.top_p.or(self.top_p);
        self.max_tokens = settings.max_tokens.or(self.max_tokens);
        self
    }
}

/// Reads one embedding array; any non-numeric entry fails the whole response.
pub(crate) fn embedding_values(values: &[Value]) -> Result<Vec<f32>, ApiError> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                ApiError::Upstream(format!("embedding value {} is not a number: {}", i, v))
            })
        })
        .collect()
}
