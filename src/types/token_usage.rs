use serde::{Deserialize, Serialize};

use crate::types::ConversationId;

/// Token allowance granted to a fresh conversation.
pub const DEFAULT_TOKEN_LIMIT: i64 = 20_000;

/// Aggregate token accounting for one conversation.
///
/// The backend is authoritative for every field; the client replaces the
/// whole record from each terminal response and never recomputes
/// `remaining_tokens` from the other counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens billed to the conversation so far.
    pub total_tokens_used: i64,

    /// Tokens the conversation may consume in total.
    pub token_limit: i64,

    /// What is left of the allowance.  May be negative after an overrun.
    pub remaining_tokens: i64,

    /// Share of the allowance already used, 0 to 100.
    #[serde(default)]
    pub usage_percentage: f64,
}

impl TokenUsage {
    pub fn new(
        total_tokens_used: i64,
        token_limit: i64,
        remaining_tokens: i64,
        usage_percentage: f64,
    ) -> Self {
        Self {
            total_tokens_used,
            token_limit,
            remaining_tokens,
            usage_percentage,
        }
    }

    /// True when sending must be blocked until the balance is topped up.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_tokens <= 0
    }
}

impl Default for TokenUsage {
    fn default() -> Self {
        Self::new(0, DEFAULT_TOKEN_LIMIT, DEFAULT_TOKEN_LIMIT, 0.0)
    }
}

/// Token usage as reported by the standalone usage endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsageReport {
    /// Conversation the counters belong to, if the user has any.
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,

    #[serde(flatten)]
    pub usage: TokenUsage,
}
