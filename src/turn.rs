//! Lifecycle of a single chat turn.

use std::fmt;

use crate::gate::SendRefusal;
use crate::types::{ConversationId, MessageId};

/// Where the current turn stands.
///
/// `Idle → Sending → Streaming → {Completed | Failed | Cancelled}`.  A new
/// turn may start from any phase except `Sending` and `Streaming`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    #[default]
    Idle,
    /// The request is in flight and no response headers have arrived.
    Sending,
    /// Frames are arriving.
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl TurnPhase {
    /// True if the composer may start a new turn.
    pub fn accepts_send(self) -> bool {
        !self.is_in_flight()
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, TurnPhase::Sending | TurnPhase::Streaming)
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Sending => "sending",
            TurnPhase::Streaming => "streaming",
            TurnPhase::Completed => "completed",
            TurnPhase::Failed => "failed",
            TurnPhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How a send attempt ended, as seen by the view.
///
/// Every variant other than `Completed` carries enough to show a transient
/// notice; none of them is fatal to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Rejected before any network call or state change.
    Refused(SendRefusal),

    /// The provisional pair was swapped for the confirmed one.
    Completed {
        conversation_id: ConversationId,
        assistant_message_id: MessageId,
    },

    /// The turn ended without a `done` frame.  `partial_retained` is true when
    /// streamed content was kept in the transcript.
    Failed {
        notice: String,
        partial_retained: bool,
    },

    /// The backend refused for lack of balance; sending is now gated.
    PaymentRequired { notice: String },

    /// The caller aborted the turn.
    Cancelled { partial_retained: bool },
}

impl TurnOutcome {
    /// The phase a turn ending this way leaves the session in.  A refused
    /// send never left the previous phase, so it has none of its own.
    pub fn phase(&self) -> Option<TurnPhase> {
        match self {
            TurnOutcome::Refused(_) => None,
            TurnOutcome::Completed { .. } => Some(TurnPhase::Completed),
            TurnOutcome::Failed { .. } | TurnOutcome::PaymentRequired { .. } => {
                Some(TurnPhase::Failed)
            }
            TurnOutcome::Cancelled { .. } => Some(TurnPhase::Cancelled),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }

    /// True when the composer should keep the input for resubmission: the
    /// message never made it into the transcript and was not empty.
    pub fn keeps_input(&self) -> bool {
        match self {
            TurnOutcome::Refused(refusal) => *refusal != SendRefusal::EmptyMessage,
            TurnOutcome::Completed { .. } => false,
            TurnOutcome::PaymentRequired { .. } => true,
            TurnOutcome::Failed {
                partial_retained, ..
            }
            | TurnOutcome::Cancelled { partial_retained } => !partial_retained,
        }
    }

    /// Text for the transient notice, if this outcome warrants one.
    pub fn notice(&self) -> Option<String> {
        match self {
            TurnOutcome::Refused(refusal) => Some(refusal.to_string()),
            TurnOutcome::Completed { .. } => None,
            TurnOutcome::Failed { notice, .. } | TurnOutcome::PaymentRequired { notice } => {
                Some(notice.clone())
            }
            TurnOutcome::Cancelled { .. } => Some("Response cancelled.".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_in_flight_phases_refuse() {
        for phase in [
            TurnPhase::Idle,
            TurnPhase::Completed,
            TurnPhase::Failed,
            TurnPhase::Cancelled,
        ] {
            assert!(phase.accepts_send(), "{phase}");
        }
        assert!(!TurnPhase::Sending.accepts_send());
        assert!(!TurnPhase::Streaming.accepts_send());
    }

    #[test]
    fn outcome_phases() {
        assert_eq!(TurnOutcome::Refused(SendRefusal::EmptyMessage).phase(), None);
        assert_eq!(
            TurnOutcome::PaymentRequired {
                notice: "n".to_string()
            }
            .phase(),
            Some(TurnPhase::Failed)
        );
        assert_eq!(
            TurnOutcome::Cancelled {
                partial_retained: false
            }
            .phase(),
            Some(TurnPhase::Cancelled)
        );
    }

    #[test]
    fn completed_has_no_notice() {
        let outcome = TurnOutcome::Completed {
            conversation_id: ConversationId::new("42"),
            assistant_message_id: MessageId::new("a1"),
        };
        assert!(outcome.is_completed());
        assert_eq!(outcome.notice(), None);
    }

    #[test]
    fn failed_sends_keep_the_input() {
        let failed = |partial_retained| TurnOutcome::Failed {
            notice: "boom".to_string(),
            partial_retained,
        };
        assert!(failed(false).keeps_input());
        assert!(!failed(true).keeps_input());
        assert!(
            TurnOutcome::PaymentRequired {
                notice: "n".to_string()
            }
            .keeps_input()
        );
        assert!(TurnOutcome::Refused(SendRefusal::BalanceExhausted).keeps_input());
        assert!(TurnOutcome::Refused(SendRefusal::TurnInFlight).keeps_input());
        assert!(!TurnOutcome::Refused(SendRefusal::EmptyMessage).keeps_input());
        assert!(
            TurnOutcome::Cancelled {
                partial_retained: false
            }
            .keeps_input()
        );
        assert!(
            !TurnOutcome::Completed {
                conversation_id: ConversationId::new("42"),
                assistant_message_id: MessageId::new("a1"),
            }
            .keeps_input()
        );
    }
}
