//! Wire types shared across the assistant crates: stored chat records,
//! backend descriptors, and the chat request/response envelopes.

mod chat;
mod service;

pub use chat::{ChatMessage, ChatReply, ChatRequest, Role, StreamChunk};
pub use service::{AiParams, Feature, ModelInfo, ServiceId, ServiceInfo, UnknownService};

use serde::{Deserialize, Serialize};

/// Identifier of a stored chat exchange; strictly increasing in creation order.
pub type MessageId = u64;

/// Discriminator for stored records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A user message paired with the assistant reply.
    #[default]
    Message,
}

/// User half of an exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UserTurn {
    /// Message text.
    pub content: String,
    /// Image references in the order they were attached.
    #[serde(default)]
    pub images: Vec<String>,
    /// Display name of the prompt selected when the message was sent.
    #[serde(default)]
    pub prompt_name: Option<String>,
    /// Identifier of the prompt selected when the message was sent.
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Assistant half of an exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AssistantTurn {
    /// Reply text as produced by the backend.
    pub content: String,
    /// Image references attached to the reply.
    #[serde(default)]
    pub images: Vec<String>,
}

/// One stored chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    /// Unique id; the sole sort key.
    pub message_id: MessageId,
    /// Record discriminator.
    #[serde(rename = "type", default)]
    pub kind: RecordKind,
    /// User input.
    pub user: UserTurn,
    /// Assistant output.
    pub assistant: AssistantTurn,
}

impl Record {
    /// Build a message record for an allocated id.
    pub fn new(message_id: MessageId, user: UserTurn, assistant: AssistantTurn) -> Self {
        Self {
            message_id,
            kind: RecordKind::Message,
            user,
            assistant,
        }
    }
}

/// Reverse-chronological slice of records plus the continuation cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Page {
    /// Records, most recent first.
    pub records: Vec<Record>,
    /// Whether the cursor points at ids that may still hold records.
    pub has_more: bool,
    /// Cursor for the next page; absent when `has_more` is false.
    pub next_id: Option<MessageId>,
}

#[cfg(test)]
mod tests {
    use super::{AssistantTurn, Record, RecordKind, UserTurn};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn record_uses_type_discriminator_on_the_wire() {
        let record = Record::new(
            7,
            UserTurn {
                content: "hi".to_string(),
                ..UserTurn::default()
            },
            AssistantTurn {
                content: "hello".to_string(),
                images: Vec::new(),
            },
        );
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["type"], json!("message"));
        assert_eq!(value["message_id"], json!(7));
        assert_eq!(value["user"]["prompt_id"], json!(null));
    }

    #[test]
    fn record_defaults_missing_optional_fields() {
        let record: Record = serde_json::from_value(json!({
            "message_id": 3,
            "user": { "content": "hi" },
            "assistant": { "content": "hello" }
        }))
        .expect("decode");
        assert_eq!(record.kind, RecordKind::Message);
        assert!(record.user.images.is_empty());
        assert_eq!(record.user.prompt_name, None);
    }

    #[test]
    fn record_requires_user_content() {
        let result = serde_json::from_value::<Record>(json!({
            "message_id": 3,
            "user": {},
            "assistant": { "content": "hello" }
        }));
        assert!(result.is_err());
    }
}
