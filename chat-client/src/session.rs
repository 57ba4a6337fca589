//! ChatSession - one user's live view of one conversation.
//!
//! # Architecture
//!
//! ChatSession feeds inputs into the pure [`SessionCore`] from chat-core and
//! interprets the actions it returns by calling the [`ChatBackend`].
//!
//! ```text
//! Application → ChatSession → ChatBackend → ChatHub / mock
//!                   ↓
//!              chat-core (state machine + merged timeline)
//! ```
//!
//! The core sits behind one mutex and the event stream behind another.
//! Backend calls are made holding neither, so `send` can run while a
//! backfill is in flight; merges are idempotent by id and token. The backfill
//! retry deadline lives in its own cell so arming or cancelling it never waits
//! on a pending [`ChatSession::next_event`].
//!
//! # Example
//!
//! ```ignore
//! use pairchat_client::{ChatSession, LocalBackend};
//!
//! let session = ChatSession::new(LocalBackend::new(hub), "u1".into(), SessionConfig::default());
//! session.open_with(&"u2".into()).await?;
//! session.send("hello", MessageKind::Text).await?;
//!
//! loop {
//!     for event in session.next_event().await? {
//!         println!("{event:?}");
//!     }
//! }
//! ```

use crate::backend::{ChatBackend, EventStream};
use chat_core::{
    Action, Event, PendingSend, SendError, SessionConfig, SessionCore, SessionEvent, SessionState,
    TimelineEntry,
};
use chat_types::{
    ChatError, ConversationId, CorrelationToken, Liveness, Message, MessageKind, Presence,
    TypingEvent, UserId,
};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::PoisonError;
use thiserror::Error;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend error.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Local send validation failed; nothing was sent.
    #[error("send rejected: {0}")]
    Send(#[from] SendError),

    /// The append failed; the entry stays in the view as failed.
    #[error("append of {token} failed: {source}")]
    SendFailed {
        /// Token to pass to `retry` or `discard`.
        token: CorrelationToken,
        /// Backend error.
        source: ChatError,
    },

    /// `open` called on a session that is not idle.
    #[error("session already bound to a conversation")]
    AlreadyOpen,

    /// No conversation is open.
    #[error("no conversation open")]
    NotOpen,
}

/// What the event stream produced.
enum Input {
    Core(Vec<Event>),
    Typing(TypingEvent),
    StreamClosed,
    Shutdown,
}

/// Stream state, locked while waiting for input.
struct Inputs {
    stream: Option<EventStream>,
    liveness: Liveness,
}

/// Result of running a batch of actions.
#[derive(Default)]
struct Executed {
    events: Vec<SessionEvent>,
    failure: Option<ChatError>,
}

/// A chat session bound to at most one conversation.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    local_user: UserId,
    core: Mutex<SessionCore>,
    inputs: Mutex<Inputs>,
    backfill_at: std::sync::Mutex<Option<Instant>>,
    timer_changed: Notify,
    closing: Notify,
}

impl<B: ChatBackend> std::fmt::Debug for ChatSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("local_user", &self.local_user)
            .finish_non_exhaustive()
    }
}

impl<B: ChatBackend> ChatSession<B> {
    /// Create an idle session for `local_user`.
    pub fn new(backend: B, local_user: UserId, config: SessionConfig) -> Self {
        Self {
            core: Mutex::new(SessionCore::new(local_user.clone(), &config)),
            inputs: Mutex::new(Inputs {
                stream: None,
                liveness: Liveness::connected(0),
            }),
            backfill_at: std::sync::Mutex::new(None),
            timer_changed: Notify::new(),
            closing: Notify::new(),
            backend,
            local_user,
        }
    }

    /// The user this session sends as.
    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Get the backend (for testing).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Resolve the conversation with `peer` and open it.
    pub async fn open_with(&self, peer: &UserId) -> Result<ConversationId, ClientError> {
        let conversation = self.backend.resolve(&self.local_user, peer).await?;
        self.open(conversation).await?;
        Ok(conversation)
    }

    /// Subscribe to `conversation` and load its history.
    ///
    /// On failure the subscription is released and the session is idle again.
    pub async fn open(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<SessionEvent>, ClientError> {
        let actions = {
            let mut core = self.core.lock().await;
            if !matches!(core.state(), SessionState::Idle) {
                return Err(ClientError::AlreadyOpen);
            }
            core.handle(Event::OpenRequested { conversation })
        };

        let executed = self.execute(actions).await;
        match executed.failure {
            Some(error) => {
                tracing::warn!("Opening conversation={} failed: {}", conversation, error);
                Err(error.into())
            }
            None => {
                tracing::info!("Opened conversation={} as {}", conversation, self.local_user);
                Ok(executed.events)
            }
        }
    }

    /// Send a message optimistically.
    ///
    /// The entry shows as pending immediately. On success it is replaced in
    /// place by the stored message; on failure it stays as failed and
    /// [`ClientError::SendFailed`] carries the token for `retry`/`discard`.
    pub async fn send(
        &self,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Result<Message, ClientError> {
        let pending = self
            .core
            .lock()
            .await
            .begin_send(content.into(), kind, Utc::now())?;
        self.deliver(pending).await
    }

    /// Re-send a failed entry under its original token.
    pub async fn retry(&self, token: CorrelationToken) -> Result<Message, ClientError> {
        let pending = self.core.lock().await.retry_send(token)?;
        tracing::debug!("Retrying send {}", token);
        self.deliver(pending).await
    }

    /// Drop a failed entry from the view.
    pub async fn discard(&self, token: CorrelationToken) -> Result<(), ClientError> {
        self.core.lock().await.discard(token)?;
        Ok(())
    }

    /// Wait for one input and process it.
    ///
    /// Inputs are liveness edges, stream messages, typing signals and the
    /// backfill retry timer; liveness wins when several are ready. Returns
    /// the session events the input produced (often none).
    pub async fn next_event(&self) -> Result<Vec<SessionEvent>, ClientError> {
        let input = loop {
            let mut guard = self.inputs.lock().await;
            let Inputs { stream, liveness } = &mut *guard;
            let Some(stream) = stream.as_mut() else {
                return Err(ClientError::NotOpen);
            };
            let deadline = self.backfill_deadline();
            let sleep = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now));

            // None: the timer was re-armed or cancelled, wait again.
            let input = tokio::select! {
                biased;

                _ = self.closing.notified() => Some(Input::Shutdown),
                changed = stream.liveness.changed() => match changed {
                    Ok(()) => {
                        let next = *stream.liveness.borrow_and_update();
                        let events = liveness_events(std::mem::replace(liveness, next), next);
                        Some(Input::Core(events))
                    }
                    Err(_) => Some(Input::StreamClosed),
                },
                _ = self.timer_changed.notified() => None,
                _ = sleep, if deadline.is_some() => self
                    .take_due_backfill()
                    .then(|| Input::Core(vec![Event::BackfillTimer])),
                received = stream.messages.recv() => Some(match received {
                    Ok(message) => Input::Core(vec![Event::MessageDelivered { message }]),
                    Err(RecvError::Lagged(missed)) => {
                        Input::Core(vec![Event::StreamLagged { missed }])
                    }
                    Err(RecvError::Closed) => Input::StreamClosed,
                }),
                typing = stream.typing.recv() => Some(match typing {
                    Ok(event) => Input::Typing(event),
                    Err(RecvError::Lagged(_)) => Input::Core(Vec::new()),
                    Err(RecvError::Closed) => Input::StreamClosed,
                }),
            };

            if let Some(input) = input {
                break input;
            }
        };

        self.apply(input).await
    }

    /// Process every input that is already available, without waiting.
    pub async fn process_ready(&self) -> Result<Vec<SessionEvent>, ClientError> {
        let mut emitted = Vec::new();
        loop {
            let input = {
                let mut guard = self.inputs.lock().await;
                match self.ready_input(&mut guard) {
                    Some(input) => input,
                    None => break,
                }
            };
            emitted.extend(self.apply(input).await?);
        }
        Ok(emitted)
    }

    /// Ask for a backfill now instead of waiting for the retry timer.
    pub async fn resync(&self) -> Result<Vec<SessionEvent>, ClientError> {
        let actions = self.core.lock().await.handle(Event::ResyncRequested);
        Ok(self.execute(actions).await.events)
    }

    /// Release the subscription and discard the view. Terminal.
    pub async fn close(&self) -> Result<(), ClientError> {
        // Wake a pending next_event so the stream lock is free.
        self.closing.notify_one();
        let actions = self.core.lock().await.handle(Event::CloseRequested);
        self.execute(actions).await;
        tracing::info!("Closed session of {}", self.local_user);
        Ok(())
    }

    /// Current state.
    pub async fn state(&self) -> SessionState {
        self.core.lock().await.state().clone()
    }

    /// Visible entries in display order.
    pub async fn view(&self) -> Vec<TimelineEntry> {
        self.core.lock().await.view().to_vec()
    }

    /// Peers currently typing.
    pub async fn typing_users(&self) -> Vec<UserId> {
        self.core.lock().await.typing_users(std::time::Instant::now())
    }

    /// Tell the peer the local user is typing. Best effort.
    pub async fn notify_typing(&self) -> Result<(), ClientError> {
        let conversation = self
            .core
            .lock()
            .await
            .state()
            .conversation()
            .ok_or(ClientError::NotOpen)?;
        self.backend.emit_typing(conversation, &self.local_user);
        Ok(())
    }

    /// Presence of `user`, or `None` if it could not be read.
    pub async fn peer_presence(&self, user: &UserId) -> Option<Presence> {
        match self.backend.presence(user).await {
            Ok(presence) => Some(presence),
            Err(e) => {
                tracing::warn!("Presence lookup for {} failed: {}", user, e);
                None
            }
        }
    }

    async fn deliver(&self, pending: PendingSend) -> Result<Message, ClientError> {
        let token = pending.token;
        match self.backend.append(pending.message).await {
            Ok(stored) => {
                let outcome = self.core.lock().await.confirm_send(token, stored.clone());
                tracing::debug!(
                    "Send {} confirmed as message={} ({:?})",
                    token,
                    stored.id,
                    outcome
                );
                Ok(stored)
            }
            Err(source) => {
                self.core.lock().await.fail_send(token);
                tracing::warn!("Send {} failed: {}", token, source);
                Err(ClientError::SendFailed { token, source })
            }
        }
    }

    async fn apply(&self, input: Input) -> Result<Vec<SessionEvent>, ClientError> {
        match input {
            Input::Core(events) => {
                let mut emitted = Vec::new();
                for event in events {
                    let actions = self.core.lock().await.handle(event);
                    emitted.extend(self.execute(actions).await.events);
                }
                Ok(emitted)
            }
            Input::Typing(event) => {
                self.core
                    .lock()
                    .await
                    .observe_typing(&event, std::time::Instant::now());
                Ok(Vec::new())
            }
            Input::StreamClosed => Err(ChatError::Transport("event stream closed".into()).into()),
            Input::Shutdown => Ok(Vec::new()),
        }
    }

    /// Run actions in order, feeding I/O results back into the core.
    async fn execute(&self, actions: Vec<Action>) -> Executed {
        let mut queue: VecDeque<Action> = actions.into();
        let mut executed = Executed::default();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::Subscribe { conversation } => {
                    let mut stream = self.backend.subscribe(conversation);
                    let current = *stream.liveness.borrow_and_update();
                    {
                        let mut inputs = self.inputs.lock().await;
                        inputs.liveness = current;
                        inputs.stream = Some(stream);
                    }
                    if !current.is_connected() {
                        queue.extend(self.core.lock().await.handle(Event::TransportDown));
                    }
                }
                Action::LoadHistory { conversation } => {
                    let event = match self.backend.history(conversation, None).await {
                        Ok(messages) => Event::HistoryLoaded { messages },
                        Err(error) => {
                            let event = Event::HistoryFailed {
                                error: error.to_string(),
                            };
                            executed.failure = Some(error);
                            event
                        }
                    };
                    queue.extend(self.core.lock().await.handle(event));
                }
                Action::Backfill {
                    conversation,
                    since,
                } => {
                    tracing::debug!(
                        "Backfilling conversation={} since {:?}",
                        conversation,
                        since
                    );
                    let event = match self.backend.history(conversation, since).await {
                        Ok(messages) => Event::BackfillCompleted { messages },
                        Err(error) => {
                            tracing::warn!(
                                "Backfill of conversation={} failed: {}",
                                conversation,
                                error
                            );
                            Event::BackfillFailed {
                                error: error.to_string(),
                            }
                        }
                    };
                    queue.extend(self.core.lock().await.handle(event));
                }
                Action::StartBackfillTimer { delay } => {
                    tracing::debug!("Next backfill attempt in {:?}", delay);
                    self.set_backfill_timer(Some(Instant::now() + delay));
                }
                Action::CancelBackfillTimer => self.set_backfill_timer(None),
                Action::Unsubscribe => {
                    let stream = self.inputs.lock().await.stream.take();
                    if let Some(stream) = stream {
                        self.backend.unsubscribe(stream);
                    }
                }
                Action::EmitEvent(event) => executed.events.push(event),
                // applied inside SessionCore::handle
                Action::Merge { .. } | Action::DiscardView => {}
            }
        }

        executed
    }

    fn backfill_deadline(&self) -> Option<Instant> {
        *self
            .backfill_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_backfill_timer(&self, at: Option<Instant>) {
        *self
            .backfill_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = at;
        self.timer_changed.notify_one();
    }

    /// Clear the backfill deadline if it has passed.
    fn take_due_backfill(&self) -> bool {
        let mut at = self
            .backfill_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if at.is_some_and(|deadline| deadline <= Instant::now()) {
            *at = None;
            true
        } else {
            false
        }
    }

    fn ready_input(&self, inputs: &mut Inputs) -> Option<Input> {
        let Inputs { stream, liveness } = inputs;
        let stream = stream.as_mut()?;

        match stream.liveness.has_changed() {
            Ok(true) => {
                let next = *stream.liveness.borrow_and_update();
                return Some(Input::Core(liveness_events(
                    std::mem::replace(liveness, next),
                    next,
                )));
            }
            Ok(false) => {}
            Err(_) => return Some(Input::StreamClosed),
        }

        if self.take_due_backfill() {
            return Some(Input::Core(vec![Event::BackfillTimer]));
        }

        match stream.messages.try_recv() {
            Ok(message) => return Some(Input::Core(vec![Event::MessageDelivered { message }])),
            Err(TryRecvError::Lagged(missed)) => {
                return Some(Input::Core(vec![Event::StreamLagged { missed }]))
            }
            Err(TryRecvError::Closed) => return Some(Input::StreamClosed),
            Err(TryRecvError::Empty) => {}
        }

        match stream.typing.try_recv() {
            Ok(event) => Some(Input::Typing(event)),
            Err(TryRecvError::Lagged(_)) => Some(Input::Core(Vec::new())),
            Err(TryRecvError::Closed) | Err(TryRecvError::Empty) => None,
        }
    }
}

/// Core events for a liveness change, including a cycle the observer missed.
fn liveness_events(prev: Liveness, next: Liveness) -> Vec<Event> {
    match (prev.is_connected(), next.is_connected()) {
        (true, false) => vec![Event::TransportDown],
        (false, true) => vec![Event::TransportUp],
        (true, true) if prev.epoch != next.epoch => {
            vec![Event::TransportDown, Event::TransportUp]
        }
        (false, false) if prev.epoch != next.epoch => {
            vec![Event::TransportUp, Event::TransportDown]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use chat_core::DeliveryStatus;
    use std::time::Duration;

    struct Fixture {
        mock: MockBackend,
        session: ChatSession<MockBackend>,
        conversation: ConversationId,
        peer: UserId,
    }

    async fn fixture() -> Fixture {
        fixture_with(MockBackend::new()).await
    }

    async fn fixture_with(mock: MockBackend) -> Fixture {
        let peer = UserId::new("u2");
        let conversation = mock.resolve(&"u1".into(), &peer).await.unwrap();
        let session = ChatSession::new(mock.clone(), "u1".into(), SessionConfig::default());
        Fixture {
            mock,
            session,
            conversation,
            peer,
        }
    }

    fn contents(view: &[TimelineEntry]) -> Vec<&str> {
        view.iter().map(|e| e.content.as_str()).collect()
    }

    #[test]
    fn liveness_edges() {
        let up0 = Liveness::connected(0);
        let down0 = Liveness::disconnected(0);
        let up1 = Liveness::connected(1);
        let down1 = Liveness::disconnected(1);

        assert_eq!(liveness_events(up0, down0), vec![Event::TransportDown]);
        assert_eq!(liveness_events(down0, up1), vec![Event::TransportUp]);
        assert_eq!(
            liveness_events(up0, up1),
            vec![Event::TransportDown, Event::TransportUp]
        );
        assert_eq!(
            liveness_events(down0, down1),
            vec![Event::TransportUp, Event::TransportDown]
        );
        assert!(liveness_events(up1, up1).is_empty());
    }

    #[tokio::test]
    async fn open_loads_history_and_goes_live() {
        let f = fixture().await;
        f.mock.post(f.conversation, &f.peer, "earlier");

        let events = f.session.open(f.conversation).await.unwrap();

        assert_eq!(
            events,
            vec![SessionEvent::Opened {
                conversation: f.conversation,
                messages: 1
            }]
        );
        assert!(f.session.state().await.is_live());
        assert_eq!(contents(&f.session.view().await), vec!["earlier"]);
        assert_eq!(f.mock.open_streams(), 1);
    }

    #[tokio::test]
    async fn open_twice_is_rejected() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();
        assert!(matches!(
            f.session.open(f.conversation).await,
            Err(ClientError::AlreadyOpen)
        ));
    }

    #[tokio::test]
    async fn history_failure_returns_to_idle() {
        let f = fixture().await;
        f.mock.fail_history(1);

        let err = f.session.open(f.conversation).await.unwrap_err();

        assert!(matches!(err, ClientError::Chat(ChatError::Storage { .. })));
        assert_eq!(f.session.state().await, SessionState::Idle);
        assert_eq!(f.mock.open_streams(), 0);

        // can try again
        f.session.open(f.conversation).await.unwrap();
        assert!(f.session.state().await.is_live());
    }

    #[tokio::test]
    async fn send_confirms_in_place_and_echo_dedups() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();

        let stored = f.session.send("hello", MessageKind::Text).await.unwrap();
        // the bus echo of our own append
        f.session.process_ready().await.unwrap();

        let view = f.session.view().await;
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].message_id, Some(stored.id));
        assert_eq!(view[0].status, DeliveryStatus::Confirmed);
    }

    #[tokio::test]
    async fn failed_send_can_be_retried_with_same_token() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();
        f.mock.fail_next_append(ChatError::storage("offline"));

        let token = match f.session.send("retry me", MessageKind::Text).await {
            Err(ClientError::SendFailed { token, .. }) => token,
            other => panic!("expected SendFailed, got {other:?}"),
        };
        assert_eq!(f.session.view().await[0].status, DeliveryStatus::Failed);

        let stored = f.session.retry(token).await.unwrap();
        assert_eq!(stored.client_token, Some(token));

        let appended = f.mock.appended();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0].client_token, appended[1].client_token);

        let view = f.session.view().await;
        assert_eq!(view.len(), 1);
        assert!(view[0].is_confirmed());
    }

    #[tokio::test]
    async fn failed_send_can_be_discarded() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();
        f.mock.fail_next_append(ChatError::storage("offline"));

        let Err(ClientError::SendFailed { token, .. }) =
            f.session.send("drop me", MessageKind::Text).await
        else {
            panic!("send should fail");
        };

        f.session.discard(token).await.unwrap();
        assert!(f.session.view().await.is_empty());
    }

    #[tokio::test]
    async fn send_before_open_and_empty_content_rejected() {
        let f = fixture().await;
        assert!(matches!(
            f.session.send("hi", MessageKind::Text).await,
            Err(ClientError::Send(SendError::NotOpen))
        ));

        f.session.open(f.conversation).await.unwrap();
        assert!(matches!(
            f.session.send("   ", MessageKind::Text).await,
            Err(ClientError::Send(SendError::EmptyContent))
        ));
        assert!(f.mock.appended().is_empty());
    }

    #[tokio::test]
    async fn live_messages_and_duplicates_merge_once() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();

        let msg = f.mock.post(f.conversation, &f.peer, "from peer");
        f.mock.publish(&msg);
        f.session.process_ready().await.unwrap();

        assert_eq!(contents(&f.session.view().await), vec!["from peer"]);
        assert_eq!(f.session.state().await.cursor(), Some(msg.cursor()));
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_backfills_gap() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();
        f.mock.post(f.conversation, &f.peer, "before");
        f.session.process_ready().await.unwrap();

        f.mock.disconnect();
        let events = f.session.next_event().await.unwrap();
        assert!(matches!(events[..], [SessionEvent::Disconnected { .. }]));
        assert!(!f.session.state().await.is_live());

        f.mock.post(f.conversation, &f.peer, "during gap");
        f.mock.reconnect();

        let events = f.session.next_event().await.unwrap();
        assert_eq!(
            events,
            vec![SessionEvent::Resynced {
                conversation: f.conversation,
                recovered: 1
            }]
        );
        assert!(f.session.state().await.is_live());
        assert_eq!(
            contents(&f.session.view().await),
            vec!["before", "during gap"]
        );
    }

    #[tokio::test]
    async fn missed_down_up_cycle_still_backfills() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();

        f.mock.disconnect();
        f.mock.post(f.conversation, &f.peer, "lost event");
        f.mock.reconnect();

        let events = f.session.process_ready().await.unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Resynced { recovered: 1, .. })));
        assert_eq!(contents(&f.session.view().await), vec!["lost event"]);
    }

    #[tokio::test]
    async fn lagged_stream_triggers_backfill() {
        let f = fixture_with(MockBackend::with_capacity(2)).await;
        f.session.open(f.conversation).await.unwrap();

        for i in 0..6 {
            f.mock.post(f.conversation, &f.peer, &format!("m{i}"));
        }

        let events = f.session.process_ready().await.unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Lagged { .. })));
        assert!(f.session.state().await.is_live());

        let view = f.session.view().await;
        assert_eq!(
            contents(&view),
            vec!["m0", "m1", "m2", "m3", "m4", "m5"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_backfill_retries_after_backoff() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();

        f.mock.disconnect();
        f.session.next_event().await.unwrap();
        f.mock.post(f.conversation, &f.peer, "missed");
        f.mock.fail_history(1);
        f.mock.reconnect();

        let events = f.session.next_event().await.unwrap();
        assert!(matches!(
            events[..],
            [SessionEvent::BackfillFailed { attempt: 1, .. }]
        ));
        assert!(!f.session.state().await.is_live());

        // timer fires with the clock paused and auto-advancing
        let events = f.session.next_event().await.unwrap();
        assert!(matches!(events[..], [SessionEvent::Resynced { recovered: 1, .. }]));
        assert_eq!(contents(&f.session.view().await), vec!["missed"]);
    }

    #[tokio::test]
    async fn resync_recovers_without_waiting() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();

        f.mock.disconnect();
        f.session.next_event().await.unwrap();
        f.mock.post(f.conversation, &f.peer, "missed");
        f.mock.fail_history(1);
        f.mock.reconnect();
        f.session.next_event().await.unwrap();

        let events = f.session.resync().await.unwrap();
        assert!(matches!(events[..], [SessionEvent::Resynced { .. }]));
    }

    #[tokio::test]
    async fn typing_signals_from_peer_show_and_clear_on_message() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();

        f.mock.typing_from(f.conversation, &f.peer);
        f.mock.typing_from(f.conversation, &"u1".into());
        f.session.process_ready().await.unwrap();
        assert_eq!(f.session.typing_users().await, vec![f.peer.clone()]);

        f.mock.post(f.conversation, &f.peer, "done typing");
        f.session.process_ready().await.unwrap();
        assert!(f.session.typing_users().await.is_empty());
    }

    #[tokio::test]
    async fn notify_typing_goes_through_backend() {
        let f = fixture().await;
        assert!(matches!(
            f.session.notify_typing().await,
            Err(ClientError::NotOpen)
        ));

        f.session.open(f.conversation).await.unwrap();
        f.session.notify_typing().await.unwrap();
        assert_eq!(
            f.mock.typing_emitted(),
            vec![(f.conversation, UserId::new("u1"))]
        );
    }

    #[tokio::test]
    async fn peer_presence_is_best_effort() {
        let f = fixture().await;
        f.mock.set_presence(&f.peer, true);
        assert!(f.session.peer_presence(&f.peer).await.unwrap().online);

        f.mock.fail_presence(true);
        assert_eq!(f.session.peer_presence(&f.peer).await, None);
    }

    #[tokio::test]
    async fn close_releases_stream_and_is_terminal() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();
        f.mock.post(f.conversation, &f.peer, "bye");
        f.session.process_ready().await.unwrap();

        f.session.close().await.unwrap();

        assert_eq!(f.session.state().await, SessionState::Closed);
        assert!(f.session.view().await.is_empty());
        assert_eq!(f.mock.open_streams(), 0);
        assert!(matches!(
            f.session.next_event().await,
            Err(ClientError::NotOpen)
        ));
        assert!(matches!(
            f.session.open(f.conversation).await,
            Err(ClientError::AlreadyOpen)
        ));
    }

    #[tokio::test]
    async fn close_wakes_waiting_next_event() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();
        let session = std::sync::Arc::new(f.session);

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.next_event().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        session.close().await.unwrap();
        let result = waiter.await.unwrap();
        assert!(result.unwrap().is_empty());
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn events_for_other_conversations_are_ignored() {
        let f = fixture().await;
        let other = f.mock.resolve(&"u1".into(), &"u3".into()).await.unwrap();
        f.session.open(f.conversation).await.unwrap();

        let foreign = f.mock.post_unannounced(other, &"u3".into(), "elsewhere");
        f.session
            .apply(Input::Core(vec![Event::MessageDelivered { message: foreign }]))
            .await
            .unwrap();

        assert!(f.session.view().await.is_empty());
    }

    #[tokio::test]
    async fn resync_does_not_wait_on_pending_next_event() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();

        f.mock.disconnect();
        f.session.next_event().await.unwrap();
        f.mock.post(f.conversation, &f.peer, "missed");
        f.mock.fail_history(1);
        f.mock.reconnect();
        // backfill fails and arms the retry timer
        f.session.next_event().await.unwrap();

        let session = std::sync::Arc::new(f.session);
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.next_event().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = tokio::time::timeout(Duration::from_millis(500), session.resync())
            .await
            .expect("resync blocked behind next_event")
            .unwrap();
        assert!(matches!(events[..], [SessionEvent::Resynced { recovered: 1, .. }]));
        assert!(session.state().await.is_live());

        session.close().await.unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn send_while_reconnecting_reconciles_with_backfill() {
        let f = fixture().await;
        f.session.open(f.conversation).await.unwrap();

        f.mock.disconnect();
        f.session.next_event().await.unwrap();

        // append succeeds while the bus is down; the backfill returns it again
        let stored = f.session.send("while away", MessageKind::Text).await.unwrap();
        f.mock.reconnect();
        let events = f.session.next_event().await.unwrap();
        assert!(matches!(events[..], [SessionEvent::Resynced { .. }]));

        let view = f.session.view().await;
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].message_id, Some(stored.id));
        assert!(view[0].is_confirmed());
        assert_eq!(f.session.state().await.cursor(), Some(stored.cursor()));
    }
}

