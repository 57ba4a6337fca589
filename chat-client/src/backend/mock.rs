//! Mock backend for testing.
//!
//! Stores conversations and messages in memory, publishes appends to
//! subscribers like the real hub does, and lets tests inject failures,
//! drop events and flap the link.

use super::{ChatBackend, EventStream};
use async_trait::async_trait;
use chat_types::{
    ChatError, ConversationId, Liveness, Message, MessageCursor, MessageId, NewMessage,
    ParticipantPair, Presence, TypingEvent, UserId,
};
use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};

const DEFAULT_CAPACITY: usize = 64;

/// Mock backend for testing.
///
/// Clones share state, so a test can keep a handle while the session owns
/// another.
#[derive(Debug, Clone)]
pub struct MockBackend {
    inner: Arc<Mutex<MockInner>>,
    liveness: Arc<watch::Sender<Liveness>>,
}

#[derive(Debug)]
struct MockInner {
    capacity: usize,
    conversations: HashMap<ParticipantPair, ConversationId>,
    participants: HashMap<ConversationId, ParticipantPair>,
    messages: Vec<Message>,
    message_channels: HashMap<ConversationId, broadcast::Sender<Message>>,
    typing_channels: HashMap<ConversationId, broadcast::Sender<TypingEvent>>,
    presence: HashMap<UserId, Presence>,
    appended: Vec<NewMessage>,
    typing_emitted: Vec<(ConversationId, UserId)>,
    history_calls: usize,
    fail_history: u32,
    fail_next_append: Option<ChatError>,
    fail_presence: bool,
    open_streams: usize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose streams buffer `capacity` events before lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        let (liveness, _) = watch::channel(Liveness::connected(0));
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                capacity: capacity.max(1),
                conversations: HashMap::new(),
                participants: HashMap::new(),
                messages: Vec::new(),
                message_channels: HashMap::new(),
                typing_channels: HashMap::new(),
                presence: HashMap::new(),
                appended: Vec::new(),
                typing_emitted: Vec::new(),
                history_calls: 0,
                fail_history: 0,
                fail_next_append: None,
                fail_presence: false,
                open_streams: 0,
            })),
            liveness: Arc::new(liveness),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a message from `sender` and publish it, as a peer's append would.
    pub fn post(&self, conversation: ConversationId, sender: &UserId, content: &str) -> Message {
        self.store(NewMessage::text(conversation, sender.clone(), content), true)
    }

    /// Store a message without publishing it, as if the event were lost.
    pub fn post_unannounced(
        &self,
        conversation: ConversationId,
        sender: &UserId,
        content: &str,
    ) -> Message {
        self.store(NewMessage::text(conversation, sender.clone(), content), false)
    }

    /// Publish an arbitrary message to a conversation's subscribers.
    pub fn publish(&self, message: &Message) -> usize {
        if !self.liveness.borrow().is_connected() {
            return 0;
        }
        let inner = self.lock();
        inner
            .message_channels
            .get(&message.conversation_id)
            .and_then(|tx| tx.send(message.clone()).ok())
            .unwrap_or(0)
    }

    /// Send a typing signal as `user`.
    pub fn typing_from(&self, conversation: ConversationId, user: &UserId) {
        let inner = self.lock();
        if let Some(tx) = inner.typing_channels.get(&conversation) {
            let _ = tx.send(TypingEvent {
                conversation_id: conversation,
                user_id: user.clone(),
                at: Utc::now(),
            });
        }
    }

    /// Take the link down; published events are dropped until reconnect.
    pub fn disconnect(&self) {
        self.liveness.send_if_modified(|live| {
            let was_up = live.is_connected();
            if was_up {
                *live = Liveness::disconnected(live.epoch);
            }
            was_up
        });
    }

    /// Bring the link back up under a new epoch.
    pub fn reconnect(&self) {
        self.liveness.send_if_modified(|live| {
            let was_down = !live.is_connected();
            if was_down {
                *live = Liveness::connected(live.epoch + 1);
            }
            was_down
        });
    }

    /// Cause the next `times` history queries to fail.
    pub fn fail_history(&self, times: u32) {
        self.lock().fail_history = times;
    }

    /// Cause the next append to fail with `error`.
    pub fn fail_next_append(&self, error: ChatError) {
        self.lock().fail_next_append = Some(error);
    }

    /// Make presence lookups fail.
    pub fn fail_presence(&self, fail: bool) {
        self.lock().fail_presence = fail;
    }

    /// Set a user's presence.
    pub fn set_presence(&self, user: &UserId, online: bool) {
        self.lock().presence.insert(
            user.clone(),
            Presence {
                user_id: user.clone(),
                online,
                last_seen_at: Some(Utc::now()),
            },
        );
    }

    /// Every stored message, in insert order.
    pub fn stored(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Every append request received, including failed ones.
    pub fn appended(&self) -> Vec<NewMessage> {
        self.lock().appended.clone()
    }

    /// Typing signals emitted through the backend.
    pub fn typing_emitted(&self) -> Vec<(ConversationId, UserId)> {
        self.lock().typing_emitted.clone()
    }

    /// Number of history queries served or failed.
    pub fn history_calls(&self) -> usize {
        self.lock().history_calls
    }

    /// Streams handed out and not yet released.
    pub fn open_streams(&self) -> usize {
        self.lock().open_streams
    }

    fn store(&self, message: NewMessage, announce: bool) -> Message {
        let stored = {
            let mut inner = self.lock();
            let last = inner
                .messages
                .iter()
                .filter(|m| m.conversation_id == message.conversation_id)
                .map(|m| m.created_at)
                .max();
            let now = Utc::now();
            let created_at = match last {
                Some(last) if last >= now => last + TimeDelta::microseconds(1),
                _ => now,
            };
            let stored = Message {
                id: MessageId::new(),
                conversation_id: message.conversation_id,
                sender_id: message.sender_id,
                content: message.content,
                kind: message.kind,
                created_at,
                client_token: message.client_token,
            };
            inner.messages.push(stored.clone());
            stored
        };
        if announce {
            self.publish(&stored);
        }
        stored
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn resolve(&self, a: &UserId, b: &UserId) -> Result<ConversationId, ChatError> {
        let pair = ParticipantPair::new(a.clone(), b.clone())?;
        let mut inner = self.lock();
        if let Some(id) = inner.conversations.get(&pair) {
            return Ok(*id);
        }
        let id = ConversationId::new();
        inner.conversations.insert(pair.clone(), id);
        inner.participants.insert(id, pair);
        Ok(id)
    }

    async fn history(
        &self,
        conversation: ConversationId,
        since: Option<MessageCursor>,
    ) -> Result<Vec<Message>, ChatError> {
        let mut inner = self.lock();
        inner.history_calls += 1;
        if inner.fail_history > 0 {
            inner.fail_history -= 1;
            return Err(ChatError::storage("injected history failure"));
        }

        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation)
            .filter(|m| since.map_or(true, |cursor| m.cursor() > cursor))
            .cloned()
            .collect();
        messages.sort_by_key(Message::cursor);
        Ok(messages)
    }

    async fn append(&self, message: NewMessage) -> Result<Message, ChatError> {
        {
            let mut inner = self.lock();
            inner.appended.push(message.clone());
            if let Some(error) = inner.fail_next_append.take() {
                return Err(error);
            }

            let pair = inner
                .participants
                .get(&message.conversation_id)
                .ok_or_else(|| ChatError::storage("conversation not found"))?;
            if &message.sender_id != pair.low() && &message.sender_id != pair.high() {
                return Err(ChatError::Permission {
                    user: message.sender_id.clone(),
                    conversation: message.conversation_id,
                });
            }

            if let Some(token) = message.client_token {
                if let Some(existing) = inner.messages.iter().find(|m| {
                    m.conversation_id == message.conversation_id
                        && m.client_token == Some(token)
                }) {
                    return Ok(existing.clone());
                }
            }
        }
        Ok(self.store(message, true))
    }

    fn subscribe(&self, conversation: ConversationId) -> EventStream {
        let mut inner = self.lock();
        let capacity = inner.capacity;
        inner.open_streams += 1;
        let messages = inner
            .message_channels
            .entry(conversation)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();
        let typing = inner
            .typing_channels
            .entry(conversation)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        EventStream {
            conversation,
            messages,
            liveness: self.liveness.subscribe(),
            typing,
        }
    }

    fn unsubscribe(&self, stream: EventStream) {
        drop(stream);
        let mut inner = self.lock();
        inner.open_streams = inner.open_streams.saturating_sub(1);
    }

    fn emit_typing(&self, conversation: ConversationId, user: &UserId) {
        self.lock().typing_emitted.push((conversation, user.clone()));
        self.typing_from(conversation, user);
    }

    async fn presence(&self, user: &UserId) -> Result<Presence, ChatError> {
        let inner = self.lock();
        if inner.fail_presence {
            return Err(ChatError::storage("injected presence failure"));
        }
        Ok(inner
            .presence
            .get(user)
            .cloned()
            .unwrap_or_else(|| Presence::unknown(user.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_types::CorrelationToken;

    #[tokio::test]
    async fn resolve_is_order_free() {
        let mock = MockBackend::new();
        let a = mock.resolve(&"u1".into(), &"u2".into()).await.unwrap();
        let b = mock.resolve(&"u2".into(), &"u1".into()).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn append_publishes_and_replays_tokens() {
        let mock = MockBackend::new();
        let conversation = mock.resolve(&"u1".into(), &"u2".into()).await.unwrap();
        let mut stream = mock.subscribe(conversation);
        let request =
            NewMessage::text(conversation, "u1".into(), "hi").with_token(CorrelationToken::new());

        let first = mock.append(request.clone()).await.unwrap();
        let second = mock.append(request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(stream.messages.recv().await.unwrap(), first);
        assert!(stream.messages.try_recv().is_err());
        assert_eq!(mock.stored().len(), 1);
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let mock = MockBackend::new();
        let conversation = mock.resolve(&"u1".into(), &"u2".into()).await.unwrap();
        let stamps: Vec<_> = (0..20)
            .map(|i| mock.post(conversation, &"u2".into(), &format!("m{i}")).created_at)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let mock = MockBackend::new();
        let conversation = mock.resolve(&"u1".into(), &"u2".into()).await.unwrap();

        mock.fail_history(1);
        assert!(mock.history(conversation, None).await.is_err());
        assert!(mock.history(conversation, None).await.is_ok());
        assert_eq!(mock.history_calls(), 2);

        mock.fail_next_append(ChatError::storage("down"));
        let request = NewMessage::text(conversation, "u1".into(), "x");
        assert!(mock.append(request.clone()).await.is_err());
        assert!(mock.append(request).await.is_ok());
    }

    #[tokio::test]
    async fn disconnected_link_drops_posts() {
        let mock = MockBackend::new();
        let conversation = mock.resolve(&"u1".into(), &"u2".into()).await.unwrap();
        let mut stream = mock.subscribe(conversation);

        mock.disconnect();
        mock.post(conversation, &"u2".into(), "lost");
        mock.reconnect();

        assert!(stream.messages.try_recv().is_err());
        assert_eq!(*stream.liveness.borrow(), Liveness::connected(1));
        assert_eq!(mock.history(conversation, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_participant_append_rejected() {
        let mock = MockBackend::new();
        let conversation = mock.resolve(&"u1".into(), &"u2".into()).await.unwrap();
        let err = mock
            .append(NewMessage::text(conversation, "u3".into(), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Permission { .. }));
    }
}
