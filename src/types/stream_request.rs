use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, ModelInfo, Persona};

/// Body of the POST that opens one streaming turn.
///
/// Built once when the turn starts; the composer's selection is copied in by
/// value and never re-read while the turn is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Trimmed, non-empty user text.
    pub message: String,

    /// `null` asks the backend to create a conversation for this turn.
    pub conversation_id: Option<ConversationId>,

    pub provider: String,

    /// Routing id of the selected model.
    pub model: String,

    pub persona: Persona,
}

impl StreamRequest {
    pub fn new(
        message: impl Into<String>,
        conversation_id: Option<ConversationId>,
        model: &ModelInfo,
        persona: Persona,
    ) -> Self {
        Self {
            message: message.into(),
            conversation_id,
            provider: model.provider.clone(),
            model: model.id.clone(),
            persona,
        }
    }
}
