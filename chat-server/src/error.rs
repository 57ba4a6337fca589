//! Error types for chat-server.

use chat_types::{ChatError, ConversationId, UserId};

/// Startup errors for the hub.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Conversation does not exist.
    #[error("conversation not found: {conversation}")]
    ConversationNotFound {
        /// The missing conversation.
        conversation: ConversationId,
    },

    /// Sender is not one of the conversation's participants.
    #[error("{user} is not a participant of {conversation}")]
    NotParticipant {
        /// The rejected sender.
        user: UserId,
        /// The conversation written to.
        conversation: ConversationId,
    },

    /// A uniqueness constraint rejected the insert.
    #[error("row already exists")]
    AlreadyExists,

    /// A stored row could not be decoded.
    #[error("corrupt row: {reason}")]
    Corrupt {
        /// What failed to decode.
        reason: String,
    },
}

impl From<StorageError> for ChatError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotParticipant { user, conversation } => {
                ChatError::Permission { user, conversation }
            }
            other => ChatError::storage(other),
        }
    }
}
