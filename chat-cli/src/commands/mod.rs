//! CLI command implementations.

pub mod conversations;
pub mod history;
pub mod presence;
pub mod resolve;
pub mod send;
