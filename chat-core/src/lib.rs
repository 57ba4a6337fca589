//! # chat-core
//!
//! Pure logic for pairchat sessions (no I/O, instant tests).
//!
//! This crate implements the session state machine, the merged message
//! timeline and the typing debounce without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is passed in by the caller. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (history queries, appends, subscriptions) is performed by
//! `chat-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod session;
pub mod state;
pub mod timeline;
pub mod typing;

pub use session::{PendingSend, SendError, SessionConfig, SessionCore};
pub use state::{Action, Event, SessionEvent, SessionState};
pub use timeline::{DeliveryStatus, MergeOutcome, Timeline, TimelineEntry};
pub use typing::TypingIndicator;
