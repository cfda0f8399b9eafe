use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, ConversationInfo, TokenUsage};

/// Tokens credited per unit of currency.
pub const TOKENS_PER_UNIT: u64 = 1000;

/// Preset top-up packages as (amount, tokens).
pub const TOP_UP_PACKAGES: [(u32, u64); 4] = [(5, 5_000), (10, 10_000), (25, 25_000), (50, 50_000)];

/// Tokens the backend credits for a payment of `amount`.
pub fn tokens_for_amount(amount: f64) -> u64 {
    (amount.max(0.0) * TOKENS_PER_UNIT as f64) as u64
}

/// Request to credit tokens to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpRequest {
    pub conversation_id: ConversationId,
    pub amount: f64,
}

/// Result of a top-up.  A successful one carries fresh aggregate counters,
/// which is what lifts the send gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}
