//! OpenAI-compatible chat-completions wire types, shared by NanoGPT and OpenRouter.

use crate::types::Message;
use aipo_utils::error::LlmError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ChatResponse {
    /// Content of `choices[0]`, or a transport error naming the provider.
    pub(crate) fn into_content(self, provider: &str) -> Result<(String, Option<Usage>), LlmError> {
        let choice = self.choices.into_iter().next().ok_or_else(|| {
            LlmError::Transport(format!("Invalid response from {provider}: missing choices[0]"))
        })?;
        let content = choice.message.content.ok_or_else(|| {
            LlmError::Transport(format!(
                "Invalid response from {provider}: missing content in choices[0]"
            ))
        })?;
        Ok((content, self.usage))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelEntry {
    id: String,
}

impl ModelList {
    pub(crate) fn ids(self) -> Vec<String> {
        self.data.into_iter().map(|m| m.id).collect()
    }
}

pub(crate) fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|msg| ChatMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_content_extracts_first_choice() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1}
        }))
        .unwrap();
        let (content, usage) = response.into_content("nanogpt").unwrap();
        assert_eq!(content, "hi");
        assert_eq!(usage.unwrap().completion_tokens, 1);
    }

    #[test]
    fn test_missing_choices_is_invalid_response() {
        let response: ChatResponse = serde_json::from_value(json!({"error": "nope"})).unwrap();
        let err = response.into_content("nanogpt").unwrap_err();
        assert!(err.to_string().contains("missing choices[0]"));
    }
}
