use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Model};

/// Body of a `chat/completions` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The model that should answer.
    pub model: Model,

    /// The conversation so far, system prompt first.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature; the endpoint default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Whether the reply is streamed as server-sent events.
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Create a non-streaming request.
    pub fn new(model: Model, messages: Vec<ChatMessage>) -> Self {
        Self {
            model,
            messages,
            temperature: None,
            stream: false,
        }
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Requests a streamed reply.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;

    #[test]
    fn omits_unset_temperature() {
        let request = ChatRequest::new(
            Model::Known(KnownModel::Gpt4),
            vec![ChatMessage::user("hi")],
        )
        .streaming();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true,
            })
        );
    }

    #[test]
    fn includes_temperature() {
        let request = ChatRequest::new(Model::from("gpt-4o"), Vec::new())
            .with_temperature(Some(0.5));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["temperature"], serde_json::json!(0.5));
        assert_eq!(json["stream"], serde_json::json!(false));
    }
}
