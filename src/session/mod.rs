//! Per-connection chat transcript.
//!
//! A `Session` has exactly one writer. It records the ordered turns and the
//! passage behind the most recent answer, and drives one query at a time
//! through retrieval, prompt composition and streamed generation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::corpus::Passage;
use crate::guide::{Guide, GuideError};

/// Appended to partial replies while fragments are still arriving.
pub const TYPING_CURSOR: &str = "▌";

const ORIGINAL_TEXT_PLACEHOLDER: &str = "Sanskrit text not available.";
const SECONDARY_TRANSLATION_PLACEHOLDER: &str = "Telugu translation not available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Progress of one answer, in the order a renderer should apply it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A new fragment; `rendered` is everything so far plus the typing cursor.
    Partial { fragment: String, rendered: String },
    /// Discard what was shown and display `content` instead.
    Replace { content: String },
    /// The final assistant turn as stored in the transcript.
    Done { content: String },
}

pub fn greeting(persona_name: &str) -> String {
    format!(
        "Namaste. I am {}, your compassionate guide. How may I help you find clarity or peace today?",
        persona_name
    )
}

pub fn apology(err: &ApiError) -> String {
    format!(
        "I apologize, I am facing a technical difficulty and cannot connect to my core wisdom. Please try again later. (Error: {})",
        err
    )
}

/// Markdown block showing the original text and secondary translation.
pub fn secondary_block(passage: &Passage) -> String {
    let original = non_blank_or(&passage.original_text, ORIGINAL_TEXT_PLACEHOLDER);
    let secondary = non_blank_or(
        &passage.secondary_translation,
        SECONDARY_TRANSLATION_PLACEHOLDER,
    );
    format!(
        "\n\n---\n**Original Sanskrit (संस्कृतम्):**\n> {}\n\n**Telugu Translation (తెలుగు అనువాదం):**\n> {}\n",
        original, secondary
    )
}

fn non_blank_or<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

pub struct Session {
    guide: Arc<Guide>,
    transcript: Vec<ChatTurn>,
    last_retrieval: Option<Passage>,
}

impl Session {
    pub fn new(guide: Arc<Guide>) -> Self {
        let mut session = Self {
            guide,
            transcript: Vec::new(),
            last_retrieval: None,
        };
        session.on_session_start();
        session
    }

    /// Resets to a single greeting turn and forgets the last retrieval.
    pub fn on_session_start(&mut self) {
        let greeting = greeting(self.guide.composer().persona_name());
        self.transcript = vec![ChatTurn::assistant(greeting)];
        self.last_retrieval = None;
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    pub fn last_retrieval(&self) -> Option<&Passage> {
        self.last_retrieval.as_ref()
    }

    /// Answers one query and appends the user and assistant turns.
    ///
    /// Refusals (`GuideError`) leave the transcript untouched. Every other
    /// failure becomes the apology text, so a successful return always ends
    /// the transcript with a well-formed assistant turn.
    pub async fn on_query(
        &mut self,
        query: &str,
        show_secondary: bool,
        events: &mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<&ChatTurn, GuideError> {
        self.guide.ensure_ready()?;
        if query.trim().is_empty() {
            return Err(GuideError::EmptyQuery);
        }

        self.transcript.push(ChatTurn::user(query));

        let mut content = match self.guide.retrieve(query).await {
            Ok(retrieval) => {
                self.last_retrieval = retrieval.passage().cloned();
                let prompt = self.guide.composer().compose(query, &retrieval);
                self.stream_reply(&prompt, events).await
            }
            Err(err) => {
                self.last_retrieval = None;
                tracing::error!(
                    "Retrieval failed ({}): {}",
                    err.class().as_str(),
                    err
                );
                let content = apology(&err);
                let _ = events.send(ChatEvent::Replace {
                    content: content.clone(),
                });
                content
            }
        };

        if show_secondary {
            if let Some(passage) = &self.last_retrieval {
                content.push_str(&secondary_block(passage));
            }
        }

        let _ = events.send(ChatEvent::Done {
            content: content.clone(),
        });
        let position = self.transcript.len();
        self.transcript.push(ChatTurn::assistant(content));
        Ok(&self.transcript[position])
    }

    async fn stream_reply(
        &self,
        prompt: &str,
        events: &mpsc::UnboundedSender<ChatEvent>,
    ) -> String {
        let mut rx = match self.guide.generation().generate(prompt).await {
            Ok(rx) => rx,
            Err(err) => return self.fail_generation(&err, events),
        };

        let mut response = String::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(fragment) => {
                    response.push_str(&fragment);
                    let _ = events.send(ChatEvent::Partial {
                        fragment,
                        rendered: format!("{}{}", response, TYPING_CURSOR),
                    });
                }
                Err(err) => return self.fail_generation(&err, events),
            }
        }
        response
    }

    fn fail_generation(&self, err: &ApiError, events: &mpsc::UnboundedSender<ChatEvent>) -> String {
        tracing::error!(
            "Generation with {} failed ({}): {}",
            self.guide.generation().model(),
            err.class().as_str(),
            err
        );
        let content = apology(err);
        let _ = events.send(ChatEvent::Replace {
            content: content.clone(),
        });
        content
    }
}
