//! Get-or-create of the single conversation between two users.

use crate::error::StorageError;
use crate::metrics::HubMetrics;
use crate::storage::ChatStorage;
use chat_types::{
    ChatError, Conversation, ConversationId, ConversationSummary, ParticipantPair, UserId,
};
use std::sync::Arc;

/// Maps an unordered pair of users to their conversation.
#[derive(Clone)]
pub struct ConversationResolver {
    storage: Arc<dyn ChatStorage>,
    metrics: Arc<HubMetrics>,
}

impl std::fmt::Debug for ConversationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationResolver").finish_non_exhaustive()
    }
}

impl ConversationResolver {
    /// Create a resolver over `storage`.
    pub fn new(storage: Arc<dyn ChatStorage>, metrics: Arc<HubMetrics>) -> Self {
        Self { storage, metrics }
    }

    /// Conversation id for two users, in either argument order.
    pub async fn resolve(&self, a: &UserId, b: &UserId) -> Result<ConversationId, ChatError> {
        Ok(self.resolve_conversation(a, b).await?.id)
    }

    /// Like [`resolve`](Self::resolve) but returns the whole record.
    ///
    /// Two concurrent first calls race on the pair's uniqueness constraint;
    /// the loser re-reads the winner's row.
    pub async fn resolve_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Conversation, ChatError> {
        let pair = ParticipantPair::new(a.clone(), b.clone())?;

        if let Some(existing) = self.storage.find_conversation(&pair).await? {
            return Ok(existing);
        }

        match self.storage.insert_conversation(&pair).await {
            Ok(created) => {
                HubMetrics::incr(&self.metrics.conversations_created);
                tracing::info!(
                    "Created conversation={} for {} and {}",
                    created.id,
                    pair.low(),
                    pair.high()
                );
                Ok(created)
            }
            Err(StorageError::AlreadyExists) => {
                tracing::debug!("Lost create race for {}/{}, re-fetching", pair.low(), pair.high());
                self.storage
                    .find_conversation(&pair)
                    .await?
                    .ok_or_else(|| ChatError::storage("conversation vanished after create race"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a conversation by id.
    pub async fn get(&self, id: &ConversationId) -> Result<Conversation, ChatError> {
        self.storage
            .get_conversation(id)
            .await?
            .ok_or_else(|| StorageError::ConversationNotFound { conversation: *id }.into())
    }

    /// Every conversation of `user`, most recently active first.
    pub async fn conversations_for(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        Ok(self.storage.list_conversations(user).await?)
    }
}
