//! Backend abstraction for chat sessions.
//!
//! A [`ChatSession`](crate::ChatSession) talks to the conversation store,
//! message log, event bus and presence tracker only through [`ChatBackend`].
//!
//! - [`LocalBackend`] drives an in-process [`ChatHub`](chat_server::ChatHub).
//! - [`MockBackend`] keeps everything in memory and lets tests inject
//!   failures, dropped events and link flaps.

mod local;
mod mock;

pub use local::LocalBackend;
pub use mock::MockBackend;

use async_trait::async_trait;
use chat_types::{
    ChatError, ConversationId, Liveness, Message, MessageCursor, NewMessage, Presence,
    TypingEvent, UserId,
};
use tokio::sync::{broadcast, watch};

/// Everything a session listens to for one conversation.
#[derive(Debug)]
pub struct EventStream {
    /// Conversation the stream belongs to.
    pub conversation: ConversationId,
    /// New messages, in publish order.
    pub messages: broadcast::Receiver<Message>,
    /// Transport liveness.
    pub liveness: watch::Receiver<Liveness>,
    /// Typing signals, including the local user's own.
    pub typing: broadcast::Receiver<TypingEvent>,
}

/// Backend operations a chat session needs.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Get-or-create the conversation between two users.
    async fn resolve(&self, a: &UserId, b: &UserId) -> Result<ConversationId, ChatError>;

    /// Ordered history, strictly after `since` when given.
    async fn history(
        &self,
        conversation: ConversationId,
        since: Option<MessageCursor>,
    ) -> Result<Vec<Message>, ChatError>;

    /// Append a message and return the stored record.
    async fn append(&self, message: NewMessage) -> Result<Message, ChatError>;

    /// Open the real-time stream for a conversation.
    fn subscribe(&self, conversation: ConversationId) -> EventStream;

    /// Release a stream.
    fn unsubscribe(&self, stream: EventStream);

    /// Best-effort typing signal.
    fn emit_typing(&self, conversation: ConversationId, user: &UserId);

    /// Read a user's presence.
    async fn presence(&self, user: &UserId) -> Result<Presence, ChatError>;
}
