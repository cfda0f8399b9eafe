use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::MessageId;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person typing into the composer.
    User,
    /// The model's reply.
    Assistant,
}

/// One entry in a conversation transcript.
///
/// Messages arrive either from the backend (confirmed, durable ids) or are
/// created locally when a turn starts (provisional ids).  The assistant half
/// of a provisional turn is the only message whose `content` ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,

    pub role: MessageRole,

    pub content: String,

    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,

    /// Set only on the assistant message currently receiving frames.
    #[serde(skip)]
    pub is_streaming: bool,

    /// Present once the backend has confirmed and billed the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl Message {
    /// The user half of a provisional turn, timestamped locally.
    pub fn provisional_user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: MessageRole::User,
            content: content.into(),
            created_at: OffsetDateTime::now_utc(),
            is_streaming: false,
            tokens_used: None,
        }
    }

    /// The empty, streaming assistant half of a provisional turn.
    pub fn provisional_assistant(id: MessageId) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            content: String::new(),
            created_at: OffsetDateTime::now_utc(),
            is_streaming: true,
            tokens_used: None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }
}
