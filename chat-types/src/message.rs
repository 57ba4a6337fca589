//! Message records.

use crate::error::UnknownKind;
use crate::ids::{ConversationId, CorrelationToken, MessageCursor, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of message kinds.
///
/// Media and link payloads are carried in `content` (a URL or text); the kind
/// only tells renderers how to present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// Image reference.
    Image,
    /// Animated GIF reference.
    Gif,
    /// Voice recording reference.
    Voice,
    /// Link with preview.
    Link,
}

impl MessageKind {
    /// All kinds, in declaration order.
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Text,
        MessageKind::Image,
        MessageKind::Gif,
        MessageKind::Voice,
        MessageKind::Link,
    ];

    /// The stored name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Gif => "gif",
            MessageKind::Voice => "voice",
            MessageKind::Link => "link",
        }
    }
}

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored, immutable chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned identifier.
    pub id: MessageId,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Author; always a participant of the conversation.
    pub sender_id: UserId,
    /// Text body or media/link reference.
    pub content: String,
    /// How the content is to be presented.
    pub kind: MessageKind,
    /// Server-assigned creation time (microsecond precision).
    pub created_at: DateTime<Utc>,
    /// Token of the optimistic send that produced this message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<CorrelationToken>,
}

impl Message {
    /// Position of this message in its conversation's order.
    pub fn cursor(&self) -> MessageCursor {
        MessageCursor::new(self.created_at, self.id)
    }
}

/// A message to be appended; id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Text body or media/link reference.
    pub content: String,
    /// Presentation kind.
    pub kind: MessageKind,
    /// Correlation token of the originating optimistic send.
    pub client_token: Option<CorrelationToken>,
}

impl NewMessage {
    /// Create a text message with no correlation token.
    pub fn text(
        conversation_id: ConversationId,
        sender_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            sender_id,
            content: content.into(),
            kind: MessageKind::Text,
            client_token: None,
        }
    }

    /// Set the message kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach a correlation token.
    pub fn with_token(mut self, token: CorrelationToken) -> Self {
        self.client_token = Some(token);
        self
    }
}
