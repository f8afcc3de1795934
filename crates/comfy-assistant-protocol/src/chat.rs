//! Chat messages and the request/response envelopes of the chat routes.

use crate::MessageId;
use serde::{Deserialize, Serialize};

/// Speaker role for a backend message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message sent to a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of the chat and stream-chat routes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Backend id; the saved default is used when absent.
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Number of most recent exchanges to replay as context; 0 disables.
    #[serde(default)]
    pub history: usize,
    #[serde(default, rename = "currentPromptId", alias = "prompt_id")]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Origin of the host server, used to absolutize relative image paths.
    #[serde(default)]
    pub host_url: Option<String>,
}

/// Successful chat reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub success: bool,
    /// Rendered HTML for the chat panel.
    pub response: String,
    /// Id of the stored exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

/// Payload of one stream-chat SSE event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StreamChunk {
    Content { content: String },
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::{ChatRequest, StreamChunk};
    use pretty_assertions::assert_eq;

    #[test]
    fn chat_request_accepts_current_prompt_id() {
        let request: ChatRequest = serde_json::from_str(
            r#"{ "message": "hi", "currentPromptId": "comfyui_workflow", "history": 4 }"#,
        )
        .expect("decode");
        assert_eq!(request.prompt_id.as_deref(), Some("comfyui_workflow"));
        assert_eq!(request.history, 4);
        assert_eq!(request.service, None);
    }

    #[test]
    fn stream_chunks_serialize_flat() {
        let chunk = StreamChunk::Content {
            content: "he".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&chunk).expect("encode"),
            r#"{"content":"he"}"#
        );
    }
}
