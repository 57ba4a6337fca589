//! Session core: state machine, timeline and typing state of one open conversation.
//!
//! [`SessionCore`] applies the view-local actions (`Merge`, `DiscardView`)
//! itself and hands the I/O actions back to the caller.

use crate::state::{Action, Event, SessionState};
use crate::timeline::{MergeOutcome, Timeline, TimelineEntry};
use crate::typing::TypingIndicator;
use chat_types::{
    ConversationId, CorrelationToken, Message, MessageKind, NewMessage, TypingEvent, UserId,
};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default bound on pending plus failed sends.
pub const DEFAULT_MAX_PENDING: usize = 64;

/// Default window for matching token-less echoes by content.
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_secs(10);

/// Default quiet interval before a typing indicator clears.
pub const DEFAULT_TYPING_QUIET: Duration = Duration::from_secs(3);

/// Errors from local send operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// No conversation is open.
    #[error("session is not open")]
    NotOpen,

    /// Content is empty or whitespace only.
    #[error("message content is empty")]
    EmptyContent,

    /// Too many unconfirmed messages.
    #[error("too many unconfirmed messages (capacity: {capacity})")]
    TooManyPending {
        /// Configured bound.
        capacity: usize,
    },

    /// No unconfirmed entry carries the token.
    #[error("no unconfirmed message with that token")]
    UnknownToken,

    /// The entry is still pending, not failed.
    #[error("message has not failed")]
    NotFailed,
}

/// Tuning for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bound on pending plus failed entries.
    pub max_pending: usize,
    /// Window for matching token-less echoes.
    pub echo_window: Duration,
    /// Quiet interval before a peer's typing indicator clears.
    pub typing_quiet: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
            echo_window: DEFAULT_ECHO_WINDOW,
            typing_quiet: DEFAULT_TYPING_QUIET,
        }
    }
}

impl SessionConfig {
    /// Set the unconfirmed entry bound.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Set the echo matching window.
    pub fn with_echo_window(mut self, window: Duration) -> Self {
        self.echo_window = window;
        self
    }

    /// Set the typing quiet interval.
    pub fn with_typing_quiet(mut self, quiet: Duration) -> Self {
        self.typing_quiet = quiet;
        self
    }
}

/// An optimistic send that still has to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Correlation token of the timeline entry.
    pub token: CorrelationToken,
    /// The append request, carrying the same token.
    pub message: NewMessage,
}

/// State of one chat session, without I/O.
#[derive(Debug, Clone)]
pub struct SessionCore {
    local_user: UserId,
    state: SessionState,
    timeline: Timeline,
    typing: TypingIndicator,
}

impl SessionCore {
    /// Create an idle session for `local_user`.
    pub fn new(local_user: UserId, config: &SessionConfig) -> Self {
        Self {
            timeline: Timeline::new(local_user.clone(), config.max_pending, config.echo_window),
            typing: TypingIndicator::new(config.typing_quiet),
            state: SessionState::new(),
            local_user,
        }
    }

    /// The signed-in user this session sends as.
    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The merged view.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Visible entries in display order.
    pub fn view(&self) -> &[TimelineEntry] {
        self.timeline.entries()
    }

    /// Feed an event through the state machine.
    ///
    /// Returns the actions that need I/O (or should be surfaced) in order.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        let state = std::mem::take(&mut self.state);
        let (next, actions) = state.on_event(event);
        self.state = next;

        let mut external = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                Action::Merge { messages } => {
                    for message in messages {
                        self.apply_message(message);
                    }
                }
                Action::DiscardView => {
                    self.timeline.clear();
                    self.typing.reset();
                }
                other => external.push(other),
            }
        }
        external
    }

    /// Insert an optimistic entry and build its append request.
    pub fn begin_send(
        &mut self,
        content: String,
        kind: MessageKind,
        now: DateTime<Utc>,
    ) -> Result<PendingSend, SendError> {
        let conversation = self.sendable_conversation()?;
        if content.trim().is_empty() {
            return Err(SendError::EmptyContent);
        }

        let token = CorrelationToken::new();
        self.timeline.push_pending(token, content.clone(), kind, now)?;
        Ok(PendingSend {
            token,
            message: NewMessage {
                conversation_id: conversation,
                sender_id: self.local_user.clone(),
                content,
                kind,
                client_token: Some(token),
            },
        })
    }

    /// Apply a successful append.
    ///
    /// Returns `None` when the session no longer shows that conversation.
    pub fn confirm_send(
        &mut self,
        token: CorrelationToken,
        message: Message,
    ) -> Option<MergeOutcome> {
        if self.state.conversation() != Some(message.conversation_id) {
            return None;
        }
        Some(self.timeline.confirm(token, message))
    }

    /// Mark a pending send as failed.
    pub fn fail_send(&mut self, token: CorrelationToken) -> bool {
        self.timeline.fail(token)
    }

    /// Return a failed send to pending and rebuild its append request.
    pub fn retry_send(&mut self, token: CorrelationToken) -> Result<PendingSend, SendError> {
        let conversation = self.sendable_conversation()?;
        let entry = self.timeline.retry(token)?;
        Ok(PendingSend {
            token,
            message: NewMessage {
                conversation_id: conversation,
                sender_id: entry.sender_id,
                content: entry.content,
                kind: entry.kind,
                client_token: Some(token),
            },
        })
    }

    /// Drop a failed send from the view.
    pub fn discard(&mut self, token: CorrelationToken) -> Result<TimelineEntry, SendError> {
        self.timeline.discard(token)
    }

    /// Record a typing signal. Own signals and other conversations are ignored.
    pub fn observe_typing(&mut self, event: &TypingEvent, now: Instant) -> bool {
        if event.user_id == self.local_user
            || self.state.conversation() != Some(event.conversation_id)
        {
            return false;
        }
        self.typing.observe(event.user_id.clone(), now);
        true
    }

    /// Peers typing as of `now`.
    pub fn typing_users(&mut self, now: Instant) -> Vec<UserId> {
        self.typing.active(now)
    }

    fn sendable_conversation(&self) -> Result<ConversationId, SendError> {
        match self.state.conversation() {
            Some(conversation) if self.state.accepts_sends() => Ok(conversation),
            _ => Err(SendError::NotOpen),
        }
    }

    fn apply_message(&mut self, message: Message) {
        if message.sender_id != self.local_user {
            self.typing.clear(&message.sender_id);
        }
        self.timeline.merge(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::DeliveryStatus;
    use chat_types::MessageId;

    fn conv() -> ConversationId {
        ConversationId::from(uuid::Uuid::from_u128(7))
    }

    fn stored(sender: &str, content: &str, token: Option<CorrelationToken>) -> Message {
        Message {
            id: MessageId::new(),
            conversation_id: conv(),
            sender_id: UserId::new(sender),
            content: content.into(),
            kind: MessageKind::Text,
            created_at: Utc::now(),
            client_token: token,
        }
    }

    fn open_session(history: Vec<Message>) -> SessionCore {
        let mut core = SessionCore::new(UserId::new("u1"), &SessionConfig::default());
        let actions = core.handle(Event::OpenRequested {
            conversation: conv(),
        });
        assert_eq!(actions.len(), 2);
        core.handle(Event::HistoryLoaded { messages: history });
        core
    }

    #[test]
    fn send_requires_open_session() {
        let mut core = SessionCore::new(UserId::new("u1"), &SessionConfig::default());
        let err = core
            .begin_send("hi".into(), MessageKind::Text, Utc::now())
            .unwrap_err();
        assert_eq!(err, SendError::NotOpen);
    }

    #[test]
    fn send_rejects_blank_content() {
        let mut core = open_session(vec![]);
        let err = core
            .begin_send("   ".into(), MessageKind::Text, Utc::now())
            .unwrap_err();
        assert_eq!(err, SendError::EmptyContent);
        assert!(core.view().is_empty());
    }

    #[test]
    fn optimistic_send_then_confirm_leaves_single_entry() {
        let m1 = stored("u1", "hello", None);
        let mut core = open_session(vec![m1.clone()]);

        let pending = core
            .begin_send("hi there".into(), MessageKind::Text, Utc::now())
            .unwrap();
        assert_eq!(pending.message.client_token, Some(pending.token));
        assert_eq!(core.view().len(), 2);
        assert_eq!(core.view()[1].status, DeliveryStatus::Pending);

        let m2 = stored("u1", "hi there", Some(pending.token));
        assert_eq!(
            core.confirm_send(pending.token, m2.clone()),
            Some(MergeOutcome::Reconciled)
        );

        // the echo arrives afterwards
        core.handle(Event::MessageDelivered { message: m2.clone() });

        let ids: Vec<_> = core.view().iter().map(|e| e.message_id).collect();
        assert_eq!(ids, vec![Some(m1.id), Some(m2.id)]);
    }

    #[test]
    fn failed_send_can_be_retried_with_same_token() {
        let mut core = open_session(vec![]);
        let pending = core
            .begin_send("retry me".into(), MessageKind::Text, Utc::now())
            .unwrap();

        assert!(core.fail_send(pending.token));
        assert_eq!(core.view()[0].status, DeliveryStatus::Failed);

        let again = core.retry_send(pending.token).unwrap();
        assert_eq!(again.token, pending.token);
        assert_eq!(again.message, pending.message);
        assert_eq!(core.view()[0].status, DeliveryStatus::Pending);
    }

    #[test]
    fn peer_message_clears_typing() {
        let mut core = open_session(vec![]);
        let now = Instant::now();
        let typing = TypingEvent {
            conversation_id: conv(),
            user_id: UserId::new("u2"),
            at: Utc::now(),
        };

        assert!(core.observe_typing(&typing, now));
        assert_eq!(core.typing_users(now), vec![UserId::new("u2")]);

        core.handle(Event::MessageDelivered {
            message: stored("u2", "done typing", None),
        });
        assert!(core.typing_users(now).is_empty());
    }

    #[test]
    fn own_typing_signal_is_ignored() {
        let mut core = open_session(vec![]);
        let typing = TypingEvent {
            conversation_id: conv(),
            user_id: UserId::new("u1"),
            at: Utc::now(),
        };
        assert!(!core.observe_typing(&typing, Instant::now()));
    }

    #[test]
    fn close_discards_view_and_ignores_late_confirmations() {
        let mut core = open_session(vec![stored("u2", "hey", None)]);
        let pending = core
            .begin_send("bye".into(), MessageKind::Text, Utc::now())
            .unwrap();

        let actions = core.handle(Event::CloseRequested);
        assert!(actions.iter().any(|a| matches!(a, Action::Unsubscribe)));
        assert!(core.view().is_empty());

        let late = stored("u1", "bye", Some(pending.token));
        assert_eq!(core.confirm_send(pending.token, late), None);
        assert!(core.view().is_empty());
    }

    fn reconnecting_with_backfill_in_flight(core: &mut SessionCore) {
        core.handle(Event::TransportDown);
        let actions = core.handle(Event::TransportUp);
        assert!(actions.iter().any(|a| matches!(a, Action::Backfill { .. })));
        assert!(matches!(
            core.state(),
            SessionState::Reconnecting {
                backfilling: true,
                ..
            }
        ));
    }

    #[test]
    fn send_during_backfill_then_backfill_then_confirm() {
        let mut core = open_session(vec![]);
        reconnecting_with_backfill_in_flight(&mut core);

        let pending = core
            .begin_send("mid gap".into(), MessageKind::Text, Utc::now())
            .unwrap();
        let m = stored("u1", "mid gap", Some(pending.token));

        core.handle(Event::BackfillCompleted {
            messages: vec![m.clone()],
        });
        assert!(core.state().is_live());
        core.confirm_send(pending.token, m.clone());

        assert_eq!(core.view().len(), 1);
        assert_eq!(core.view()[0].message_id, Some(m.id));
        assert_eq!(core.view()[0].status, DeliveryStatus::Confirmed);
        assert_eq!(core.timeline().unconfirmed_count(), 0);
    }

    #[test]
    fn send_during_backfill_then_confirm_then_backfill() {
        let mut core = open_session(vec![]);
        reconnecting_with_backfill_in_flight(&mut core);

        let pending = core
            .begin_send("mid gap".into(), MessageKind::Text, Utc::now())
            .unwrap();
        let m = stored("u1", "mid gap", Some(pending.token));

        assert_eq!(
            core.confirm_send(pending.token, m.clone()),
            Some(MergeOutcome::Reconciled)
        );
        core.handle(Event::BackfillCompleted {
            messages: vec![m.clone()],
        });

        assert!(core.state().is_live());
        assert_eq!(core.state().cursor(), Some(m.cursor()));
        assert_eq!(core.view().len(), 1);
        assert_eq!(core.view()[0].status, DeliveryStatus::Confirmed);
        assert_eq!(core.timeline().unconfirmed_count(), 0);
    }
}

