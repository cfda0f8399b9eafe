//! Client-side checks that run before a turn is allowed to start.

use std::fmt;

use crate::turn::TurnPhase;
use crate::types::{ModelInfo, TokenUsage};

/// Why a send was refused.
///
/// A refusal is decided purely from local state: it never reaches the
/// network and never touches the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRefusal {
    /// Nothing but whitespace was typed.
    EmptyMessage,
    /// Another turn is still sending or streaming.
    TurnInFlight,
    /// `remaining_tokens <= 0`; a top-up must land first.
    BalanceExhausted,
    NoModelSelected,
}

impl fmt::Display for SendRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SendRefusal::EmptyMessage => "Type a message first.",
            SendRefusal::TurnInFlight => "Wait for the current response to finish.",
            SendRefusal::BalanceExhausted => "Token limit reached. Please top up to continue.",
            SendRefusal::NoModelSelected => "Select a model first.",
        };
        f.write_str(s)
    }
}

/// Decide whether `input` may be sent, returning the trimmed message if so.
///
/// Checks run in a fixed order: empty input, an in-flight turn, the balance
/// gate, then model selection.
pub fn check_send(
    input: &str,
    phase: TurnPhase,
    usage: &TokenUsage,
    model: Option<&ModelInfo>,
) -> Result<String, SendRefusal> {
    let message = input.trim();
    if message.is_empty() {
        return Err(SendRefusal::EmptyMessage);
    }
    if !phase.accepts_send() {
        return Err(SendRefusal::TurnInFlight);
    }
    if usage.is_exhausted() {
        return Err(SendRefusal::BalanceExhausted);
    }
    if model.is_none() {
        return Err(SendRefusal::NoModelSelected);
    }
    Ok(message.to_string())
}
