use comfy_assistant_protocol::{AssistantTurn, MessageId, Record, UserTurn};

/// Build a message record whose assistant reply echoes the user content.
pub fn sample_record(message_id: MessageId, content: &str) -> Record {
    Record::new(
        message_id,
        UserTurn {
            content: content.to_string(),
            ..UserTurn::default()
        },
        AssistantTurn {
            content: format!("reply to {content}"),
            images: Vec::new(),
        },
    )
}
