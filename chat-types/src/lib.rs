//! # chat-types
//!
//! Shared record types for the pairchat conversation engine.
//!
//! This crate provides the foundational types used across all pairchat crates:
//! - [`UserId`], [`ConversationId`], [`MessageId`], [`CorrelationToken`] - identities
//! - [`MessageCursor`] - the `(created_at, id)` position used for ordering and backfill
//! - [`Conversation`], [`Message`], [`Presence`] - stored records
//! - [`Liveness`], [`TypingEvent`] - real-time side channel signals
//! - [`ChatError`] - the error taxonomy every layer converts into

#![warn(missing_docs)]
#![warn(clippy::all)]

mod conversation;
mod error;
mod events;
mod ids;
mod message;
mod presence;

pub use conversation::{Conversation, ConversationSummary, ParticipantPair};
pub use error::{ChatError, UnknownKind};
pub use events::{LinkState, Liveness, TypingEvent};
pub use ids::{ConversationId, CorrelationToken, MessageCursor, MessageId, UserId};
pub use message::{Message, MessageKind, NewMessage};
pub use presence::Presence;
