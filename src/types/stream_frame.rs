use serde::{Deserialize, Serialize};

use crate::types::{ConversationInfo, Message, TokenUsage};

/// One semantically meaningful unit of a streamed turn.
///
/// Frames are discriminated by their `type` field.  Anything that does not
/// match one of these shapes, including an unknown `type`, fails to parse and
/// is skipped by the frame parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// An incremental fragment of assistant text.
    Token { content: String },

    /// Terminal success: the durable records that replace the provisional turn.
    Done(Box<DonePayload>),

    /// Terminal failure reported by the backend mid-stream.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl StreamFrame {
    pub fn token(content: impl Into<String>) -> Self {
        StreamFrame::Token {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamFrame::Error {
            message: Some(message.into()),
        }
    }

    /// True for `done` and `error`; nothing follows a terminal frame.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamFrame::Token { .. })
    }
}

/// Payload of the terminal `done` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonePayload {
    pub user_message: Message,
    pub assistant_message: Message,
    pub conversation: ConversationInfo,
    pub token_usage: TokenUsage,
}
