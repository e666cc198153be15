use serde::{Deserialize, Serialize};

use crate::session::{ChatEvent, ChatTurn};

#[derive(Debug, Deserialize, Default)]
pub struct WsIncomingMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "showSecondary")]
    pub show_secondary: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoingMessage {
    History { messages: Vec<ChatTurn> },
    Banner { message: String },
    Chunk { message: String, rendered: String },
    Replace { message: String },
    Done { message: String },
    Error { message: String },
}

impl From<ChatEvent> for WsOutgoingMessage {
    fn from(event: ChatEvent) -> Self {
        match event {
            ChatEvent::Partial { fragment, rendered } => WsOutgoingMessage::Chunk {
                message: fragment,
                rendered,
            },
            ChatEvent::Replace { content } => WsOutgoingMessage::Replace { message: content },
            ChatEvent::Done { content } => WsOutgoingMessage::Done { message: content },
        }
    }
}
