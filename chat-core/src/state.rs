//! Session state machine for pairchat.
//!
//! This module provides a pure, side-effect-free state machine for one open
//! conversation. It takes events as input and produces a new state plus a list
//! of actions to execute.
//!
//! The actual I/O (subscribing, querying history) is performed by chat-client,
//! not by this module.

use chat_types::{ConversationId, Message, MessageCursor};
use std::time::Duration;

/// Session state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No conversation bound.
    #[default]
    Idle,
    /// Initial history load in progress.
    Loading {
        /// Conversation being opened.
        conversation: ConversationId,
        /// Transport dropped during the load, so live events may be missing.
        gap: bool,
        /// Current transport link state.
        transport_up: bool,
    },
    /// Subscribed and in sync.
    Live {
        /// Bound conversation.
        conversation: ConversationId,
        /// Highest cursor known to be contiguous with history.
        cursor: Option<MessageCursor>,
    },
    /// Transport dropped or stream lagged; waiting to backfill.
    Reconnecting {
        /// Bound conversation.
        conversation: ConversationId,
        /// Cursor to backfill from.
        cursor: Option<MessageCursor>,
        /// Failed backfill attempts so far.
        attempt: u32,
        /// Whether the transport is currently connected.
        transport_up: bool,
        /// Whether a backfill query is in flight.
        backfilling: bool,
    },
    /// Closed; terminal.
    Closed,
}

impl SessionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (chat-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // Closed swallows everything
            (Self::Closed, _) => (Self::Closed, vec![]),

            (Self::Idle, Event::CloseRequested) => {
                (Self::Closed, vec![Action::EmitEvent(SessionEvent::Closed)])
            }
            (_, Event::CloseRequested) => (
                Self::Closed,
                vec![
                    Action::CancelBackfillTimer,
                    Action::Unsubscribe,
                    Action::DiscardView,
                    Action::EmitEvent(SessionEvent::Closed),
                ],
            ),

            // From Idle
            (Self::Idle, Event::OpenRequested { conversation }) => (
                Self::Loading {
                    conversation,
                    gap: false,
                    transport_up: true,
                },
                vec![
                    Action::Subscribe { conversation },
                    Action::LoadHistory { conversation },
                ],
            ),

            // From Loading
            (
                Self::Loading {
                    conversation,
                    gap,
                    transport_up,
                },
                Event::HistoryLoaded { messages },
            ) => {
                let cursor = max_cursor(None, &messages);
                let count = messages.len();
                let mut actions = vec![
                    Action::Merge { messages },
                    Action::EmitEvent(SessionEvent::Opened {
                        conversation,
                        messages: count,
                    }),
                ];
                let state = if !gap {
                    Self::Live {
                        conversation,
                        cursor,
                    }
                } else {
                    actions.push(Action::EmitEvent(SessionEvent::Disconnected {
                        last_cursor: cursor,
                    }));
                    if transport_up {
                        actions.push(Action::Backfill {
                            conversation,
                            since: cursor,
                        });
                    }
                    Self::Reconnecting {
                        conversation,
                        cursor,
                        attempt: 0,
                        transport_up,
                        backfilling: transport_up,
                    }
                };
                (state, actions)
            }
            (Self::Loading { .. }, Event::HistoryFailed { error }) => (
                Self::Idle,
                vec![
                    Action::Unsubscribe,
                    Action::DiscardView,
                    Action::EmitEvent(SessionEvent::OpenFailed { error }),
                ],
            ),
            (
                Self::Loading {
                    conversation,
                    gap,
                    transport_up,
                },
                Event::MessageDelivered { message },
            ) => {
                let actions = if message.conversation_id == conversation {
                    vec![Action::Merge {
                        messages: vec![message],
                    }]
                } else {
                    vec![]
                };
                (
                    Self::Loading {
                        conversation,
                        gap,
                        transport_up,
                    },
                    actions,
                )
            }
            (Self::Loading { conversation, .. }, Event::TransportDown) => (
                Self::Loading {
                    conversation,
                    gap: true,
                    transport_up: false,
                },
                vec![],
            ),
            (Self::Loading { conversation, gap, .. }, Event::TransportUp) => (
                Self::Loading {
                    conversation,
                    gap,
                    transport_up: true,
                },
                vec![],
            ),
            (
                Self::Loading {
                    conversation,
                    transport_up,
                    ..
                },
                Event::StreamLagged { .. },
            ) => (
                Self::Loading {
                    conversation,
                    gap: true,
                    transport_up,
                },
                vec![],
            ),

            // From Live
            (
                Self::Live {
                    conversation,
                    cursor,
                },
                Event::MessageDelivered { message },
            ) => {
                if message.conversation_id != conversation {
                    return (
                        Self::Live {
                            conversation,
                            cursor,
                        },
                        vec![],
                    );
                }
                let cursor = max_cursor(cursor, std::slice::from_ref(&message));
                (
                    Self::Live {
                        conversation,
                        cursor,
                    },
                    vec![Action::Merge {
                        messages: vec![message],
                    }],
                )
            }
            (
                Self::Live {
                    conversation,
                    cursor,
                },
                Event::TransportDown,
            ) => (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt: 0,
                    transport_up: false,
                    backfilling: false,
                },
                vec![Action::EmitEvent(SessionEvent::Disconnected {
                    last_cursor: cursor,
                })],
            ),
            (
                Self::Live {
                    conversation,
                    cursor,
                },
                Event::StreamLagged { missed },
            ) => (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt: 0,
                    transport_up: true,
                    backfilling: true,
                },
                vec![
                    Action::EmitEvent(SessionEvent::Lagged { missed }),
                    Action::Backfill {
                        conversation,
                        since: cursor,
                    },
                ],
            ),
            (
                Self::Live {
                    conversation,
                    cursor,
                },
                Event::ResyncRequested,
            ) => (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt: 0,
                    transport_up: true,
                    backfilling: true,
                },
                vec![Action::Backfill {
                    conversation,
                    since: cursor,
                }],
            ),
            (
                Self::Live {
                    conversation,
                    cursor,
                },
                Event::BackfillCompleted { messages },
            ) => {
                let cursor = max_cursor(cursor, &messages);
                (
                    Self::Live {
                        conversation,
                        cursor,
                    },
                    vec![Action::Merge { messages }],
                )
            }

            // From Reconnecting
            (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    transport_up,
                    backfilling,
                },
                Event::MessageDelivered { message },
            ) => {
                // Merged for display only; the cursor waits for the backfill.
                let actions = if message.conversation_id == conversation {
                    vec![Action::Merge {
                        messages: vec![message],
                    }]
                } else {
                    vec![]
                };
                (
                    Self::Reconnecting {
                        conversation,
                        cursor,
                        attempt,
                        transport_up,
                        backfilling,
                    },
                    actions,
                )
            }
            (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    ..
                },
                Event::TransportUp,
            ) => (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    transport_up: true,
                    backfilling: true,
                },
                vec![
                    Action::CancelBackfillTimer,
                    Action::Backfill {
                        conversation,
                        since: cursor,
                    },
                ],
            ),
            (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    backfilling,
                    ..
                },
                Event::TransportDown,
            ) => (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    transport_up: false,
                    backfilling,
                },
                vec![Action::CancelBackfillTimer],
            ),
            (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    transport_up,
                    ..
                },
                Event::BackfillCompleted { messages },
            ) => {
                let cursor = max_cursor(cursor, &messages);
                let recovered = messages.len();
                if transport_up {
                    (
                        Self::Live {
                            conversation,
                            cursor,
                        },
                        vec![
                            Action::Merge { messages },
                            Action::EmitEvent(SessionEvent::Resynced {
                                conversation,
                                recovered,
                            }),
                        ],
                    )
                } else {
                    (
                        Self::Reconnecting {
                            conversation,
                            cursor,
                            attempt,
                            transport_up,
                            backfilling: false,
                        },
                        vec![Action::Merge { messages }],
                    )
                }
            }
            (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    transport_up,
                    ..
                },
                Event::BackfillFailed { error },
            ) => {
                let next_attempt = attempt.saturating_add(1);
                let mut actions = vec![Action::EmitEvent(SessionEvent::BackfillFailed {
                    attempt: next_attempt,
                    error,
                })];
                if transport_up {
                    actions.push(Action::StartBackfillTimer {
                        delay: calculate_backoff(next_attempt),
                    });
                }
                (
                    Self::Reconnecting {
                        conversation,
                        cursor,
                        attempt: next_attempt,
                        transport_up,
                        backfilling: false,
                    },
                    actions,
                )
            }
            (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    transport_up: true,
                    backfilling: false,
                },
                Event::BackfillTimer | Event::ResyncRequested | Event::StreamLagged { .. },
            ) => (
                Self::Reconnecting {
                    conversation,
                    cursor,
                    attempt,
                    transport_up: true,
                    backfilling: true,
                },
                vec![
                    Action::CancelBackfillTimer,
                    Action::Backfill {
                        conversation,
                        since: cursor,
                    },
                ],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// The bound conversation, if any.
    pub fn conversation(&self) -> Option<ConversationId> {
        match self {
            Self::Loading { conversation, .. }
            | Self::Live { conversation, .. }
            | Self::Reconnecting { conversation, .. } => Some(*conversation),
            Self::Idle | Self::Closed => None,
        }
    }

    /// Check if the session is subscribed and in sync.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    /// Check if the session accepts sends (live or recovering).
    pub fn accepts_sends(&self) -> bool {
        matches!(self, Self::Live { .. } | Self::Reconnecting { .. })
    }

    /// Cursor the next backfill would start from.
    pub fn cursor(&self) -> Option<MessageCursor> {
        match self {
            Self::Live { cursor, .. } | Self::Reconnecting { cursor, .. } => *cursor,
            _ => None,
        }
    }
}

/// Events that can occur in a session's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to open a conversation.
    OpenRequested {
        /// Conversation to bind.
        conversation: ConversationId,
    },
    /// Initial history query returned.
    HistoryLoaded {
        /// Stored messages in order.
        messages: Vec<Message>,
    },
    /// Initial history query failed.
    HistoryFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The subscription delivered a message.
    MessageDelivered {
        /// The delivered message.
        message: Message,
    },
    /// Liveness went to disconnected.
    TransportDown,
    /// Liveness went to connected.
    TransportUp,
    /// The subscription fell behind and skipped events.
    StreamLagged {
        /// Number of events skipped.
        missed: u64,
    },
    /// Backfill query returned.
    BackfillCompleted {
        /// Messages strictly after the backfill cursor.
        messages: Vec<Message>,
    },
    /// Backfill query failed.
    BackfillFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Backfill retry timer fired.
    BackfillTimer,
    /// Caller asked for an explicit backfill.
    ResyncRequested,
    /// Caller closed the session.
    CloseRequested,
}

/// Actions to be executed by the chat-client.
///
/// These are instructions, not side effects. `Merge` and `DiscardView` act on
/// the session's own timeline; the rest perform I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the per-conversation event subscription.
    Subscribe {
        /// Conversation to subscribe to.
        conversation: ConversationId,
    },
    /// Query the full history.
    LoadHistory {
        /// Conversation to load.
        conversation: ConversationId,
    },
    /// Merge stored messages into the timeline.
    Merge {
        /// Messages to merge.
        messages: Vec<Message>,
    },
    /// Query history strictly after a cursor.
    Backfill {
        /// Conversation to backfill.
        conversation: ConversationId,
        /// Exclusive lower bound; `None` means from the beginning.
        since: Option<MessageCursor>,
    },
    /// Start a timer for the next backfill attempt.
    StartBackfillTimer {
        /// Delay before retrying.
        delay: Duration,
    },
    /// Cancel any pending backfill timer.
    CancelBackfillTimer,
    /// Release the event subscription.
    Unsubscribe,
    /// Drop the timeline.
    DiscardView,
    /// Emit an event to the application.
    EmitEvent(SessionEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// History loaded and subscription open.
    Opened {
        /// Bound conversation.
        conversation: ConversationId,
        /// Number of stored messages loaded.
        messages: usize,
    },
    /// Opening failed; the session is back to idle.
    OpenFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Transport dropped; the view is kept.
    Disconnected {
        /// Cursor the backfill will start from.
        last_cursor: Option<MessageCursor>,
    },
    /// Subscription fell behind.
    Lagged {
        /// Number of events skipped.
        missed: u64,
    },
    /// Gap recovered; the session is live again.
    Resynced {
        /// Bound conversation.
        conversation: ConversationId,
        /// Messages returned by the backfill.
        recovered: usize,
    },
    /// Backfill attempt failed.
    BackfillFailed {
        /// Which attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// Session closed.
    Closed,
}

fn max_cursor(current: Option<MessageCursor>, messages: &[Message]) -> Option<MessageCursor> {
    messages.iter().map(Message::cursor).fold(current, |acc, c| match acc {
        Some(existing) if existing >= c => Some(existing),
        _ => Some(c),
    })
}

/// Calculate backfill retry backoff with jitter.
///
/// Formula: min(30s, 2^attempt seconds) + random(0..1000ms)
pub fn calculate_backoff(attempt: u32) -> Duration {
    // Base: 2^attempt seconds, capped at 30 seconds
    let base_secs = 2u64.pow(attempt.min(5)).min(30);
    let base = Duration::from_secs(base_secs);

    base + Duration::from_millis(random_jitter_ms())
}

/// Random jitter between 0 and 1000 milliseconds; 0 if the OS RNG is unavailable.
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes) % 1001,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_types::{MessageId, MessageKind, UserId};
    use chrono::{TimeZone, Utc};

    fn conv() -> ConversationId {
        ConversationId::from(uuid::Uuid::from_u128(1))
    }

    fn message(n: u128, secs: i64) -> Message {
        Message {
            id: MessageId::from(uuid::Uuid::from_u128(n)),
            conversation_id: conv(),
            sender_id: UserId::new("u2"),
            content: format!("m{n}"),
            kind: MessageKind::Text,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            client_token: None,
        }
    }

    fn live(cursor: Option<MessageCursor>) -> SessionState {
        SessionState::Live {
            conversation: conv(),
            cursor,
        }
    }

    fn reconnecting(transport_up: bool, backfilling: bool) -> SessionState {
        SessionState::Reconnecting {
            conversation: conv(),
            cursor: Some(message(1, 1).cursor()),
            attempt: 0,
            transport_up,
            backfilling,
        }
    }

    #[test]
    fn starts_idle() {
        assert!(matches!(SessionState::new(), SessionState::Idle));
    }

    #[test]
    fn open_subscribes_before_loading_history() {
        let (state, actions) = SessionState::Idle.on_event(Event::OpenRequested {
            conversation: conv(),
        });

        assert!(matches!(state, SessionState::Loading { gap: false, .. }));
        assert_eq!(
            actions,
            vec![
                Action::Subscribe {
                    conversation: conv()
                },
                Action::LoadHistory {
                    conversation: conv()
                },
            ]
        );
    }

    #[test]
    fn history_loaded_goes_live_with_latest_cursor() {
        let (state, _) = SessionState::Idle.on_event(Event::OpenRequested {
            conversation: conv(),
        });
        let (state, actions) = state.on_event(Event::HistoryLoaded {
            messages: vec![message(1, 1), message(2, 2)],
        });

        assert_eq!(state, live(Some(message(2, 2).cursor())));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Merge { messages } if messages.len() == 2)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitEvent(SessionEvent::Opened { messages: 2, .. })
        )));
    }

    #[test]
    fn history_failure_returns_to_idle_and_unsubscribes() {
        let (state, _) = SessionState::Idle.on_event(Event::OpenRequested {
            conversation: conv(),
        });
        let (state, actions) = state.on_event(Event::HistoryFailed {
            error: "db down".into(),
        });

        assert!(matches!(state, SessionState::Idle));
        assert!(actions.iter().any(|a| matches!(a, Action::Unsubscribe)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EmitEvent(SessionEvent::OpenFailed { .. }))));
    }

    #[test]
    fn disconnect_during_load_backfills_after_history() {
        let (state, _) = SessionState::Idle.on_event(Event::OpenRequested {
            conversation: conv(),
        });
        let (state, _) = state.on_event(Event::TransportDown);
        let (state, _) = state.on_event(Event::TransportUp);
        let (state, actions) = state.on_event(Event::HistoryLoaded {
            messages: vec![message(1, 1)],
        });

        assert!(matches!(
            state,
            SessionState::Reconnecting {
                backfilling: true,
                transport_up: true,
                ..
            }
        ));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Backfill { since: Some(c), .. } if *c == message(1, 1).cursor()
        )));
    }

    #[test]
    fn live_message_advances_cursor() {
        let (state, actions) = live(Some(message(1, 1).cursor())).on_event(Event::MessageDelivered {
            message: message(2, 2),
        });

        assert_eq!(state, live(Some(message(2, 2).cursor())));
        assert!(actions.iter().any(|a| matches!(a, Action::Merge { .. })));
    }

    #[test]
    fn message_for_other_conversation_is_ignored() {
        let mut stray = message(2, 2);
        stray.conversation_id = ConversationId::new();

        let before = live(Some(message(1, 1).cursor()));
        let (state, actions) = before.clone().on_event(Event::MessageDelivered { message: stray });

        assert_eq!(state, before);
        assert!(actions.is_empty());
    }

    #[test]
    fn disconnect_keeps_cursor_and_view() {
        let cursor = Some(message(3, 3).cursor());
        let (state, actions) = live(cursor).on_event(Event::TransportDown);

        assert!(matches!(
            state,
            SessionState::Reconnecting {
                transport_up: false,
                backfilling: false,
                ..
            }
        ));
        assert_eq!(state.cursor(), cursor);
        assert!(!actions.iter().any(|a| matches!(a, Action::DiscardView)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitEvent(SessionEvent::Disconnected { last_cursor }) if *last_cursor == cursor
        )));
    }

    #[test]
    fn reconnect_backfills_from_last_cursor() {
        let (state, actions) = reconnecting(false, false).on_event(Event::TransportUp);

        assert!(matches!(
            state,
            SessionState::Reconnecting {
                transport_up: true,
                backfilling: true,
                ..
            }
        ));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Backfill { since: Some(c), .. } if *c == message(1, 1).cursor()
        )));
    }

    #[test]
    fn messages_while_reconnecting_do_not_move_cursor() {
        let (state, actions) = reconnecting(false, false).on_event(Event::MessageDelivered {
            message: message(9, 9),
        });

        assert_eq!(state.cursor(), Some(message(1, 1).cursor()));
        assert!(actions.iter().any(|a| matches!(a, Action::Merge { .. })));
    }

    #[test]
    fn backfill_completion_returns_to_live() {
        let (state, actions) = reconnecting(true, true).on_event(Event::BackfillCompleted {
            messages: vec![message(2, 2), message(3, 3)],
        });

        assert_eq!(state, live(Some(message(3, 3).cursor())));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitEvent(SessionEvent::Resynced { recovered: 2, .. })
        )));
    }

    #[test]
    fn backfill_completion_while_down_waits_for_link() {
        let (state, actions) = reconnecting(false, true).on_event(Event::BackfillCompleted {
            messages: vec![message(2, 2)],
        });

        assert!(matches!(
            state,
            SessionState::Reconnecting {
                transport_up: false,
                backfilling: false,
                ..
            }
        ));
        assert_eq!(state.cursor(), Some(message(2, 2).cursor()));
        assert!(actions.iter().any(|a| matches!(a, Action::Merge { .. })));
    }

    #[test]
    fn backfill_failure_schedules_retry() {
        let (state, actions) = reconnecting(true, true).on_event(Event::BackfillFailed {
            error: "timeout".into(),
        });

        assert!(matches!(
            state,
            SessionState::Reconnecting {
                attempt: 1,
                backfilling: false,
                ..
            }
        ));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartBackfillTimer { .. })));

        let (state, actions) = state.on_event(Event::BackfillTimer);
        assert!(matches!(
            state,
            SessionState::Reconnecting {
                backfilling: true,
                ..
            }
        ));
        assert!(actions.iter().any(|a| matches!(a, Action::Backfill { .. })));
    }

    #[test]
    fn backfill_timer_ignored_while_in_flight() {
        let before = reconnecting(true, true);
        let (state, actions) = before.clone().on_event(Event::BackfillTimer);

        assert_eq!(state, before);
        assert!(actions.is_empty());
    }

    #[test]
    fn lag_while_live_triggers_backfill() {
        let (state, actions) = live(None).on_event(Event::StreamLagged { missed: 4 });

        assert!(matches!(
            state,
            SessionState::Reconnecting {
                transport_up: true,
                backfilling: true,
                ..
            }
        ));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Backfill { since: None, .. })));
    }

    #[test]
    fn close_unsubscribes_before_discarding() {
        let (state, actions) = live(None).on_event(Event::CloseRequested);

        assert!(matches!(state, SessionState::Closed));
        let unsub = actions
            .iter()
            .position(|a| matches!(a, Action::Unsubscribe))
            .unwrap();
        let discard = actions
            .iter()
            .position(|a| matches!(a, Action::DiscardView))
            .unwrap();
        assert!(unsub < discard);
    }

    #[test]
    fn closed_is_terminal() {
        let (state, actions) = SessionState::Closed.on_event(Event::OpenRequested {
            conversation: conv(),
        });

        assert!(matches!(state, SessionState::Closed));
        assert!(actions.is_empty());
    }

    #[test]
    fn accepts_sends_helper() {
        assert!(!SessionState::Idle.accepts_sends());
        assert!(live(None).accepts_sends());
        assert!(reconnecting(false, false).accepts_sends());
        assert!(!SessionState::Closed.accepts_sends());
    }

    #[test]
    fn backoff_increases_with_attempt() {
        assert!(calculate_backoff(1) >= Duration::from_secs(2));
        assert!(calculate_backoff(3) >= Duration::from_secs(8));
    }

    #[test]
    fn backoff_capped_at_30_seconds_plus_jitter() {
        let delay = calculate_backoff(10);
        assert!(
            delay <= Duration::from_secs(31),
            "backfill delay must be capped at ~31s, got {:?}",
            delay
        );
    }
}
