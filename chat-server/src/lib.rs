//! # chat-server
//!
//! Backend side of pairchat: the durable conversation/message store, the
//! per-conversation event bus and presence tracking.
//!
//! ## Architecture
//!
//! ```text
//!  ChatSession ──resolve──► ConversationResolver ──┐
//!       │                                          │
//!       ├──append/history──► MessageStore ─────────┼──► SQLite (sqlx)
//!       │                        │ publish         │
//!       │◄──subscribe──── EventBus (per conversation channels + liveness)
//!       │                                          │
//!       └──sign in/out───► PresenceTracker ────────┘
//! ```
//!
//! [`ChatHub`] wires the components together from a [`Config`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod config;
pub mod error;
pub mod hub;
pub mod messages;
pub mod metrics;
pub mod presence;
pub mod resolver;
pub mod storage;
pub mod typing;

pub use bus::{EventBus, Subscription};
pub use config::{Config, ConfigError};
pub use error::{ServerError, StorageError};
pub use hub::ChatHub;
pub use messages::MessageStore;
pub use metrics::{HubMetrics, MetricsSnapshot};
pub use presence::PresenceTracker;
pub use resolver::ConversationResolver;
pub use storage::{ChatStorage, SqliteStorage, StoredAppend};
pub use typing::TypingBus;
