use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{ConversationId, Message, MessageRole, TokenUsage};

/// Conversation metadata as the backend reports it.
///
/// Only `id` is guaranteed; the streaming `done` frame, the conversation list
/// and the top-up response all populate a slightly different subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: ConversationId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens_used: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_limit: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_tokens: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_percentage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,

    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,

    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl ConversationInfo {
    /// Metadata carrying nothing but an id.
    pub fn new(id: ConversationId) -> Self {
        Self {
            id,
            title: None,
            total_tokens_used: None,
            token_limit: None,
            remaining_tokens: None,
            usage_percentage: None,
            message_count: None,
            last_message: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The aggregate counters, if the backend sent all three integer fields.
    pub fn usage(&self) -> Option<TokenUsage> {
        Some(TokenUsage::new(
            self.total_tokens_used?,
            self.token_limit?,
            self.remaining_tokens?,
            self.usage_percentage.unwrap_or_default(),
        ))
    }
}

/// Truncated preview of the newest message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub role: MessageRole,
}

/// A conversation together with its ordered transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub info: ConversationInfo,

    #[serde(default)]
    pub messages: Vec<Message>,
}
