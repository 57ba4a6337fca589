//! # chat-client
//!
//! Session driver for pairchat conversations.
//!
//! ## Features
//!
//! - **Optimistic sends**: entries appear as pending at once and are
//!   reconciled in place by correlation token
//! - **Gap recovery**: liveness flaps and lagged streams trigger a backfill
//!   from the last seen `(created_at, id)` cursor, retried with backoff
//! - **Backend abstraction**: in-process hub or mock
//! - **Pure state machine**: uses chat-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use pairchat_client::{ChatSession, LocalBackend};
//! use chat_core::SessionConfig;
//!
//! let hub = Arc::new(ChatHub::open(config).await?);
//! let backend = LocalBackend::new(hub);
//! let session = ChatSession::new(backend, "alice".into(), SessionConfig::default());
//!
//! session.open_with(&"bob".into()).await?;
//! session.send("hi bob", MessageKind::Text).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod session;

pub use backend::{ChatBackend, EventStream, LocalBackend, MockBackend};
pub use session::{ChatSession, ClientError};
