//! Durable message log.

use crate::bus::EventBus;
use crate::config::MessagesConfig;
use crate::metrics::HubMetrics;
use crate::storage::ChatStorage;
use chat_types::{
    ChatError, ConversationId, Message, MessageCursor, MessageKind, NewMessage, UserId,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Appends and reads messages, publishing every new one to the [`EventBus`].
#[derive(Clone)]
pub struct MessageStore {
    storage: Arc<dyn ChatStorage>,
    bus: EventBus,
    max_content_bytes: usize,
    metrics: Arc<HubMetrics>,
    /// Held across insert and publish so subscribers see commit order.
    append_locks: Arc<DashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("max_content_bytes", &self.max_content_bytes)
            .finish_non_exhaustive()
    }
}

impl MessageStore {
    /// Create a message store.
    pub fn new(
        storage: Arc<dyn ChatStorage>,
        bus: EventBus,
        config: &MessagesConfig,
        metrics: Arc<HubMetrics>,
    ) -> Self {
        Self {
            storage,
            bus,
            max_content_bytes: config.max_content_bytes,
            metrics,
            append_locks: Arc::new(DashMap::new()),
        }
    }

    /// Append a message without a correlation token.
    pub async fn append(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        content: &str,
        kind: MessageKind,
    ) -> Result<Message, ChatError> {
        self.append_message(NewMessage::text(conversation, sender.clone(), content).with_kind(kind))
            .await
    }

    /// Append a message.
    ///
    /// The sender must be a participant. A correlation token already stored
    /// for the conversation returns the earlier message and publishes nothing.
    pub async fn append_message(&self, message: NewMessage) -> Result<Message, ChatError> {
        self.validate(&message)?;

        let lock = self
            .append_locks
            .entry(message.conversation_id)
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let stored = self.storage.insert_message(&message).await.map_err(|e| {
            tracing::warn!(
                "Append by {} to conversation={} failed: {}",
                message.sender_id,
                message.conversation_id,
                e
            );
            ChatError::from(e)
        })?;

        if stored.created {
            HubMetrics::incr(&self.metrics.messages_appended);
            tracing::debug!(
                "Stored message={} in conversation={} at {}",
                stored.message.id,
                stored.message.conversation_id,
                stored.message.created_at
            );
            self.bus.publish(&stored.message);
        } else {
            tracing::debug!(
                "Replayed append for message={} (token already stored)",
                stored.message.id
            );
        }

        Ok(stored.message)
    }

    /// Messages ordered by `(created_at, id)`, strictly after `since` if given.
    pub async fn history(
        &self,
        conversation: ConversationId,
        since: Option<MessageCursor>,
    ) -> Result<Vec<Message>, ChatError> {
        Ok(self.storage.messages_after(&conversation, since).await?)
    }

    fn validate(&self, message: &NewMessage) -> Result<(), ChatError> {
        if message.content.trim().is_empty() {
            return Err(ChatError::InvalidMessage("content is empty".into()));
        }
        if message.content.len() > self.max_content_bytes {
            return Err(ChatError::InvalidMessage(format!(
                "content is {} bytes, limit is {}",
                message.content.len(),
                self.max_content_bytes
            )));
        }
        Ok(())
    }
}
