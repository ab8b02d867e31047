use super::{null_as_default, timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageContentType {
    #[default]
    Text,
    #[serde(other)]
    Other,
}

/// A chat message as carried by the history endpoint and the broker topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender: Uuid,
    pub receiver: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_type: MessageContentType,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

/// Conversation between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// `None` until the backend has persisted the conversation
    #[serde(default)]
    pub id: Option<Uuid>,
    pub user1: Uuid,
    pub user2: Uuid,
}

impl Conversation {
    pub fn placeholder(local: Uuid, peer: Uuid) -> Self {
        Self {
            id: None,
            user1: local,
            user2: peer,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Conversation reference embedded in outbound messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub id: Uuid,
    pub user1: Uuid,
    pub user2: Uuid,
}

/// Payload published to `/message/chat.send`
///
/// The backend stores the message under the conversation between sender and
/// receiver, creating it with `conversation.id` when none exists yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub id: Uuid,
    pub sender: Uuid,
    pub receiver: Uuid,
    pub content: String,
    pub content_type: MessageContentType,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub conversation: ConversationRef,
}

impl OutboundMessage {
    /// Local echo appended to the conversation once published
    pub fn to_message(&self) -> Message {
        Message {
            id: self.id,
            sender: self.sender,
            receiver: self.receiver,
            content: self.content.clone(),
            content_type: self.content_type.clone(),
            timestamp: self.timestamp,
            conversation_id: Some(self.conversation.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_broker_payload() {
        let body = r#"{"id":"0b0f5f4e-0000-4000-8000-000000000001","content":"hi","sender":"0b0f5f4e-0000-4000-8000-000000000002","receiver":"0b0f5f4e-0000-4000-8000-000000000003","contentType":"TEXT","timestamp":"2024-05-01T10:00:00","conversationId":"0b0f5f4e-0000-4000-8000-000000000004"}"#;

        let message: Message = serde_json::from_str(body).unwrap();

        assert_eq!(message.content, "hi");
        assert_eq!(message.content_type, MessageContentType::Text);
        assert!(message.conversation_id.is_some());
    }

    #[test]
    fn test_unknown_content_type_is_tolerated() {
        let body = r#"{"id":"0b0f5f4e-0000-4000-8000-000000000001","content":"","sender":"0b0f5f4e-0000-4000-8000-000000000002","receiver":"0b0f5f4e-0000-4000-8000-000000000003","contentType":"IMAGE","timestamp":"2024-05-01T10:00:00Z"}"#;

        let message: Message = serde_json::from_str(body).unwrap();
        assert_eq!(message.content_type, MessageContentType::Other);
    }
}
