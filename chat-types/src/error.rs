//! Error types for pairchat.

use crate::ids::{ConversationId, UserId};
use thiserror::Error;

/// Errors surfaced by conversation, message and presence operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Invalid participant pairing.
    #[error("invalid participants: {reason}")]
    Identity {
        /// What was wrong with the pairing.
        reason: String,
    },

    /// Sender is not a participant of the conversation.
    #[error("{user} is not a participant of conversation {conversation}")]
    Permission {
        /// The rejected sender.
        user: UserId,
        /// The conversation written to.
        conversation: ConversationId,
    },

    /// Backend unreachable or query failed.
    #[error("storage error: {cause}")]
    Storage {
        /// Description of the underlying failure.
        cause: String,
    },

    /// Real-time connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Message content rejected before storage.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ChatError {
    /// Shorthand for a storage failure.
    pub fn storage(cause: impl std::fmt::Display) -> Self {
        Self::Storage {
            cause: cause.to_string(),
        }
    }
}

/// A message kind name that is not part of the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message kind: {0}")]
pub struct UnknownKind(pub String);
