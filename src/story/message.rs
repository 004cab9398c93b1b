//! Story message model — one synthesized message per onboarding image.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachments::ProcessedAttachment;
use crate::store::traits::SystemConversation;

/// Whether the user has opened the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    Unread,
    Read,
}

/// Whether the message has been surfaced to the user at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenStatus {
    Unseen,
    Seen,
}

/// Kind of message. Onboarding messages are always stories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Story,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Story => "story",
        }
    }
}

impl ReadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "read" => Self::Read,
            _ => Self::Unread,
        }
    }
}

impl SeenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unseen => "unseen",
            Self::Seen => "seen",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "seen" => Self::Seen,
            _ => Self::Unseen,
        }
    }
}

/// A story message attributed to the system conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub source_service_id: String,
    /// Epoch milliseconds. Strictly increasing within one batch; sole display order.
    pub timestamp: i64,
    pub attachment: ProcessedAttachment,
    pub read_status: ReadStatus,
    pub seen_status: SeenStatus,
    pub can_reply_to_story: bool,
    pub message_type: MessageType,
}

/// Build one unread, unseen story message per attachment, in order.
///
/// Message `i` gets timestamp `base_timestamp + i`.
pub fn build_story_messages(
    conversation: &SystemConversation,
    attachments: Vec<ProcessedAttachment>,
    base_timestamp: i64,
) -> Vec<StoryMessage> {
    attachments
        .into_iter()
        .zip(base_timestamp..)
        .map(|(attachment, timestamp)| StoryMessage {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            source_service_id: conversation.service_id.clone(),
            timestamp,
            attachment,
            read_status: ReadStatus::Unread,
            seen_status: SeenStatus::Unseen,
            can_reply_to_story: false,
            message_type: MessageType::Story,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn attachment(n: u8) -> ProcessedAttachment {
        ProcessedAttachment {
            id: Uuid::new_v4(),
            path: PathBuf::from(format!("/tmp/{n}.jpg")),
            content_type: "image/jpeg".into(),
            size: n as u64,
        }
    }

    fn conversation() -> SystemConversation {
        SystemConversation {
            id: Uuid::new_v4(),
            service_id: "system".into(),
            name: "Signal".into(),
        }
    }

    #[test]
    fn timestamps_are_base_plus_index() {
        let conv = conversation();
        let messages = build_story_messages(&conv, (1..=4).map(attachment).collect(), 1_000);

        let timestamps: Vec<i64> = messages.iter().map(|m| m.timestamp).collect();
        assert_eq!(timestamps, vec![1_000, 1_001, 1_002, 1_003]);
        let sizes: Vec<u64> = messages.iter().map(|m| m.attachment.size).collect();
        assert_eq!(sizes, vec![1, 2, 3, 4], "attachment order must be preserved");
    }

    #[test]
    fn messages_are_unread_non_replyable_stories() {
        let conv = conversation();
        let messages = build_story_messages(&conv, vec![attachment(1), attachment(2)], 5);

        for m in &messages {
            assert_eq!(m.conversation_id, conv.id);
            assert_eq!(m.source_service_id, "system");
            assert_eq!(m.read_status, ReadStatus::Unread);
            assert_eq!(m.seen_status, SeenStatus::Unseen);
            assert!(!m.can_reply_to_story);
            assert_eq!(m.message_type, MessageType::Story);
        }
        assert_ne!(messages[0].id, messages[1].id);
    }

    #[test]
    fn empty_batch() {
        assert!(build_story_messages(&conversation(), vec![], 0).is_empty());
    }

    #[test]
    fn status_strings_roundtrip() {
        assert_eq!(ReadStatus::parse(ReadStatus::Read.as_str()), ReadStatus::Read);
        assert_eq!(SeenStatus::parse(SeenStatus::Unseen.as_str()), SeenStatus::Unseen);
        assert_eq!(MessageType::Story.as_str(), "story");
    }
}
