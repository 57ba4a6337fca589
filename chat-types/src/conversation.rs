//! Conversation records and participant canonicalization.

use crate::error::ChatError;
use crate::ids::{ConversationId, UserId};
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An unordered pair of distinct participants in canonical order.
///
/// `low` is always lexicographically smaller than `high`, so `(a, b)` and
/// `(b, a)` produce the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    /// Canonicalize two participants.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Identity`] when either identity is blank or both
    /// are the same user.
    pub fn new(a: UserId, b: UserId) -> Result<Self, ChatError> {
        if a.is_blank() || b.is_blank() {
            return Err(ChatError::Identity {
                reason: "participant identity is empty".into(),
            });
        }
        if a == b {
            return Err(ChatError::Identity {
                reason: format!("cannot open a conversation between {a} and itself"),
            });
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    /// The lexicographically smaller participant.
    pub fn low(&self) -> &UserId {
        &self.low
    }

    /// The lexicographically larger participant.
    pub fn high(&self) -> &UserId {
        &self.high
    }
}

/// A two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Immutable canonical identifier.
    pub id: ConversationId,
    /// Smaller participant identity.
    pub participant_low: UserId,
    /// Larger participant identity.
    pub participant_high: UserId,
    /// When the conversation was first resolved.
    pub created_at: DateTime<Utc>,
    /// Advances with every appended message.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// True when `user` is one of the two participants.
    pub fn includes(&self, user: &UserId) -> bool {
        &self.participant_low == user || &self.participant_high == user
    }

    /// The participant that is not `user`, or `None` if `user` is not a participant.
    pub fn counterpart(&self, user: &UserId) -> Option<&UserId> {
        if &self.participant_low == user {
            Some(&self.participant_high)
        } else if &self.participant_high == user {
            Some(&self.participant_low)
        } else {
            None
        }
    }
}

/// One entry of a user's conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// The conversation.
    pub conversation: Conversation,
    /// Most recent message, if any were sent.
    pub last_message: Option<Message>,
}
