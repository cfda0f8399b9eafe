//! The transcript of one conversation view and the rules that mutate it.
//!
//! A turn is a two-phase commit.  [`ConversationState::begin_turn`] appends a
//! provisional user/assistant pair keyed by locally generated ids; token
//! frames grow the assistant half; the turn then either commits (the pair is
//! swapped for the server's records in one step) or rolls back.

use crate::gate::SendRefusal;
use crate::types::{
    ConversationDetail, ConversationId, DonePayload, Message, MessageId, TokenUsage,
    TopUpResponse,
};

/// Bookkeeping for the turn currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalTurn {
    user_id: MessageId,
    assistant_id: MessageId,
    content: String,
}

impl ProvisionalTurn {
    pub fn user_id(&self) -> &MessageId {
        &self.user_id
    }

    pub fn assistant_id(&self) -> &MessageId {
        &self.assistant_id
    }

    /// Concatenation of every token fragment received so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    fn owns(&self, message: &Message) -> bool {
        message.id == self.user_id || message.id == self.assistant_id
    }
}

/// Messages and counters of one conversation, owned by a single view.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    id: Option<ConversationId>,
    title: Option<String>,
    messages: Vec<Message>,
    usage: TokenUsage,
    in_flight: Option<ProvisionalTurn>,
    next_local_id: u64,
}

impl ConversationState {
    /// An empty, not-yet-created conversation with the default allowance.
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until the first turn completes.
    pub fn id(&self) -> Option<&ConversationId> {
        self.id.as_ref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn usage(&self) -> &TokenUsage {
        &self.usage
    }

    pub fn in_flight(&self) -> Option<&ProvisionalTurn> {
        self.in_flight.as_ref()
    }

    pub fn is_turn_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The assistant message currently receiving frames, if any.
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    /// Append the provisional pair for a new turn.
    ///
    /// Refuses while another turn is in flight, so at most one message is
    /// ever flagged as streaming.
    pub fn begin_turn(&mut self, message: &str) -> Result<&ProvisionalTurn, SendRefusal> {
        if self.in_flight.is_some() {
            return Err(SendRefusal::TurnInFlight);
        }
        self.next_local_id += 1;
        let turn = ProvisionalTurn {
            user_id: MessageId::provisional_user(self.next_local_id),
            assistant_id: MessageId::provisional_assistant(self.next_local_id),
            content: String::new(),
        };
        self.messages
            .push(Message::provisional_user(turn.user_id.clone(), message));
        self.messages
            .push(Message::provisional_assistant(turn.assistant_id.clone()));
        Ok(self.in_flight.insert(turn))
    }

    /// Append a token fragment to the in-flight assistant message.
    ///
    /// Returns false, changing nothing, when no turn is in flight.
    pub fn apply_token(&mut self, fragment: &str) -> bool {
        let Some(turn) = self.in_flight.as_mut() else {
            return false;
        };
        turn.content.push_str(fragment);
        if let Some(message) = self
            .messages
            .iter_mut()
            .find(|m| m.is_streaming && m.id == turn.assistant_id)
        {
            message.content.clone_from(&turn.content);
        }
        true
    }

    /// Commit the in-flight turn.
    ///
    /// The provisional pair is removed and the server's user and assistant
    /// messages are appended in that order, within one `&mut` borrow.
    /// Conversation metadata and counters are replaced from the payload.
    /// Returns false, changing nothing, when no turn is in flight.
    pub fn apply_done(&mut self, done: DonePayload) -> bool {
        let Some(turn) = self.in_flight.take() else {
            return false;
        };
        let DonePayload {
            mut user_message,
            mut assistant_message,
            conversation,
            token_usage,
        } = done;
        user_message.is_streaming = false;
        assistant_message.is_streaming = false;

        self.messages.retain(|m| !turn.owns(m));
        self.messages.push(user_message);
        self.messages.push(assistant_message);

        self.id = Some(conversation.id);
        if conversation.title.is_some() {
            self.title = conversation.title;
        }
        self.usage = token_usage;
        true
    }

    /// End the in-flight turn after an `error` frame.
    ///
    /// With no streamed content the provisional pair is removed; otherwise it
    /// stays with the partial assistant content and streaming cleared.
    /// Returns whether partial content was retained.
    pub fn apply_error(&mut self) -> bool {
        let Some(turn) = self.in_flight.take() else {
            return false;
        };
        if turn.content.is_empty() {
            self.messages.retain(|m| !turn.owns(m));
            false
        } else {
            for message in self.messages.iter_mut().filter(|m| turn.owns(m)) {
                message.is_streaming = false;
            }
            true
        }
    }

    /// End the in-flight turn because the caller cancelled it.  Partial
    /// content is kept under the same rule as [`Self::apply_error`].
    pub fn cancel_turn(&mut self) -> bool {
        self.apply_error()
    }

    /// Discard the in-flight turn entirely, streamed content or not.
    pub fn abort_turn(&mut self) {
        if let Some(turn) = self.in_flight.take() {
            self.messages.retain(|m| !turn.owns(m));
        }
    }

    /// Replace the aggregate counters wholesale.
    pub fn replace_usage(&mut self, usage: TokenUsage) {
        self.usage = usage;
    }

    /// Apply the conversation metadata and counters carried by a top-up
    /// response.  Returns whether the counters were replaced.
    pub fn apply_top_up(&mut self, response: &TopUpResponse) -> bool {
        if let Some(conversation) = &response.conversation {
            self.id = Some(conversation.id.clone());
            if let Some(title) = &conversation.title {
                self.title = Some(title.clone());
            }
        }
        let usage = response
            .token_usage
            .or_else(|| response.conversation.as_ref().and_then(|c| c.usage()));
        match usage {
            Some(usage) => {
                self.usage = usage;
                true
            }
            None => false,
        }
    }

    /// Start over with a fresh, not-yet-created conversation.
    pub fn reset(&mut self) {
        let next_local_id = self.next_local_id;
        *self = Self {
            next_local_id,
            ..Self::default()
        };
    }

    /// Replace everything with a conversation fetched from the backend.
    pub fn load(&mut self, detail: ConversationDetail) {
        let ConversationDetail { info, mut messages } = detail;
        for message in &mut messages {
            message.is_streaming = false;
        }
        self.usage = info.usage().unwrap_or_default();
        self.id = Some(info.id);
        self.title = info.title;
        self.messages = messages;
        self.in_flight = None;
    }

    /// Remove every message but keep the conversation id and counters.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.in_flight = None;
    }
}
