//! Storage layer for chat-server.
//!
//! Durable conversations, an append-only message log ordered by
//! `(created_at, id)`, and per-user presence rows.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use chat_types::{
    Conversation, ConversationId, ConversationSummary, Message, MessageCursor, NewMessage,
    ParticipantPair, Presence, UserId,
};
use chrono::{DateTime, Utc};

/// Result of a message insert.
#[derive(Debug, Clone)]
pub struct StoredAppend {
    /// The stored message.
    pub message: Message,
    /// False when the correlation token matched an already stored message.
    pub created: bool,
}

/// Trait for chat storage backends.
#[async_trait]
pub trait ChatStorage: Send + Sync {
    /// Look up the conversation of a canonical pair.
    async fn find_conversation(
        &self,
        pair: &ParticipantPair,
    ) -> Result<Option<Conversation>, StorageError>;

    /// Create the conversation of a canonical pair.
    ///
    /// Returns [`StorageError::AlreadyExists`] if another writer created it first.
    async fn insert_conversation(
        &self,
        pair: &ParticipantPair,
    ) -> Result<Conversation, StorageError>;

    /// Get a conversation by id.
    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StorageError>;

    /// Conversations `user` participates in, most recently updated first,
    /// each with its latest message.
    async fn list_conversations(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, StorageError>;

    /// Append a message, assigning its id and timestamp.
    ///
    /// The timestamp is strictly greater than every earlier message of the
    /// conversation, and the conversation's `updated_at` moves to it in the
    /// same transaction. A repeated correlation token returns the stored
    /// message with `created == false`.
    async fn insert_message(&self, message: &NewMessage) -> Result<StoredAppend, StorageError>;

    /// Messages of a conversation ordered by `(created_at, id)`, strictly
    /// after `since` when given.
    async fn messages_after(
        &self,
        conversation: &ConversationId,
        since: Option<MessageCursor>,
    ) -> Result<Vec<Message>, StorageError>;

    /// Set a user's presence flag; last write wins.
    async fn upsert_presence(
        &self,
        user: &UserId,
        online: bool,
        at: DateTime<Utc>,
    ) -> Result<Presence, StorageError>;

    /// Get a user's presence row.
    async fn get_presence(&self, user: &UserId) -> Result<Option<Presence>, StorageError>;
}
