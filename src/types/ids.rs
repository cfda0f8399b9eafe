use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Prefix shared by every locally generated message id.
const PROVISIONAL_PREFIX: &str = "temp-";

/// Identifier of a message within a conversation.
///
/// Confirmed messages carry the id the backend assigned when it persisted
/// them.  Provisional messages carry a locally generated id of the form
/// `temp-<n>` (user) or `temp-ai-<n>` (assistant) until they are swapped out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(#[serde(deserialize_with = "deserialize_id")] String);

impl MessageId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Locally generated id for the user half of a provisional turn.
    pub fn provisional_user(seq: u64) -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{seq}"))
    }

    /// Locally generated id for the assistant half of a provisional turn.
    pub fn provisional_assistant(seq: u64) -> Self {
        Self(format!("{PROVISIONAL_PREFIX}ai-{seq}"))
    }

    /// True if this id was generated locally and never confirmed by the backend.
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Stable identifier of a server-side conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(#[serde(deserialize_with = "deserialize_id")] String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Accept either a JSON string or a JSON integer and normalize it to a string.
///
/// The backend keys its rows with integers, but nothing on the client relies
/// on that, so ids are carried around as opaque strings.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Signed(n) => n.to_string(),
        RawId::Unsigned(n) => n.to_string(),
    })
}
