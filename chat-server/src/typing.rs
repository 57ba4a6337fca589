//! Ephemeral typing signals. Nothing here is persisted.

use crate::bus::ChannelMap;
use crate::config::TypingConfig;
use crate::metrics::HubMetrics;
use chat_types::{ConversationId, TypingEvent, UserId};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Fire-and-forget fan-out of "user is composing" signals.
#[derive(Clone)]
pub struct TypingBus {
    channels: Arc<ChannelMap<TypingEvent>>,
    metrics: Arc<HubMetrics>,
}

impl std::fmt::Debug for TypingBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingBus")
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

impl TypingBus {
    /// Create a typing bus.
    pub fn new(config: &TypingConfig, metrics: Arc<HubMetrics>) -> Self {
        Self {
            channels: Arc::new(ChannelMap::new(config.channel_capacity)),
            metrics,
        }
    }

    /// Broadcast that `user` is typing in `conversation`.
    ///
    /// Best effort: nobody listening is not an error.
    pub fn emit(&self, conversation: ConversationId, user: &UserId) {
        let event = TypingEvent {
            conversation_id: conversation,
            user_id: user.clone(),
            at: Utc::now(),
        };
        let delivered = self.channels.send(conversation, event);
        HubMetrics::incr(&self.metrics.typing_signals);
        tracing::trace!("Typing signal from {} reached {} session(s)", user, delivered);
    }

    /// Receive typing signals for a conversation, including the caller's own.
    pub fn subscribe(&self, conversation: ConversationId) -> broadcast::Receiver<TypingEvent> {
        self.channels.subscribe(conversation)
    }
}
