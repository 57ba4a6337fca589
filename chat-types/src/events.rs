//! Real-time side channel signals.

use crate::ids::{ConversationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of the real-time transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// Events are flowing.
    Connected,
    /// Events published now are lost.
    Disconnected,
}

/// Transport liveness signal.
///
/// `epoch` increments on every (re)connection, so an observer that only
/// samples the latest value still notices a down/up cycle it slept through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liveness {
    /// Current link state.
    pub state: LinkState,
    /// Connection generation.
    pub epoch: u64,
}

impl Liveness {
    /// Connected in the given epoch.
    pub fn connected(epoch: u64) -> Self {
        Self {
            state: LinkState::Connected,
            epoch,
        }
    }

    /// Disconnected; `epoch` is the generation that was lost.
    pub fn disconnected(epoch: u64) -> Self {
        Self {
            state: LinkState::Disconnected,
            epoch,
        }
    }

    /// Check if the link is up.
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

/// Ephemeral "user is composing" signal. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    /// Conversation being typed in.
    pub conversation_id: ConversationId,
    /// Who is typing.
    pub user_id: UserId,
    /// When the keystroke was observed.
    pub at: DateTime<Utc>,
}
