//! In-process backend over a [`ChatHub`].

use super::{ChatBackend, EventStream};
use async_trait::async_trait;
use chat_server::{ChatHub, Subscription};
use chat_types::{
    ChatError, ConversationId, Message, MessageCursor, NewMessage, Presence, UserId,
};
use std::sync::Arc;

/// Backend calling a shared [`ChatHub`] directly.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    hub: Arc<ChatHub>,
}

impl LocalBackend {
    /// Wrap a hub.
    pub fn new(hub: Arc<ChatHub>) -> Self {
        Self { hub }
    }

    /// The wrapped hub.
    pub fn hub(&self) -> &ChatHub {
        &self.hub
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
    async fn resolve(&self, a: &UserId, b: &UserId) -> Result<ConversationId, ChatError> {
        self.hub.resolver().resolve(a, b).await
    }

    async fn history(
        &self,
        conversation: ConversationId,
        since: Option<MessageCursor>,
    ) -> Result<Vec<Message>, ChatError> {
        self.hub.messages().history(conversation, since).await
    }

    async fn append(&self, message: NewMessage) -> Result<Message, ChatError> {
        self.hub.messages().append_message(message).await
    }

    fn subscribe(&self, conversation: ConversationId) -> EventStream {
        let Subscription {
            messages, liveness, ..
        } = self.hub.bus().subscribe(conversation);

        EventStream {
            conversation,
            messages,
            liveness,
            typing: self.hub.typing().subscribe(conversation),
        }
    }

    fn unsubscribe(&self, stream: EventStream) {
        let conversation = stream.conversation;
        drop(stream);
        tracing::debug!(
            "Unsubscribed from conversation={} (remaining: {})",
            conversation,
            self.hub.bus().subscriber_count(&conversation)
        );
    }

    fn emit_typing(&self, conversation: ConversationId, user: &UserId) {
        self.hub.typing().emit(conversation, user);
    }

    async fn presence(&self, user: &UserId) -> Result<Presence, ChatError> {
        self.hub.presence().get(user).await
    }
}
