use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// One server-sent event of a streamed reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    /// Identifier shared by every chunk of one reply.
    #[serde(default)]
    pub id: Option<String>,

    /// Incremental choices; the client always asks for one.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// The text fragment carried by the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

/// A choice inside a [`ChatCompletionChunk`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    /// Position of the choice.
    #[serde(default)]
    pub index: u32,

    /// The newly generated part of the message.
    #[serde(default)]
    pub delta: Delta,

    /// Set on the last chunk of the choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    /// Present on the first chunk only.
    #[serde(default)]
    pub role: Option<String>,

    /// The next piece of text.
    #[serde(default)]
    pub content: Option<String>,
}

/// A complete, non-streamed reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// Reply identifier.
    #[serde(default)]
    pub id: Option<String>,

    /// The generated choices.
    pub choices: Vec<CompletionChoice>,
}

impl ChatCompletion {
    /// The text of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.message.content.as_str())
    }
}

/// A choice inside a [`ChatCompletion`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    /// Position of the choice.
    #[serde(default)]
    pub index: u32,

    /// The generated message.
    pub message: ChatMessage,

    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}
