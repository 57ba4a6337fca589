//! Send a message through a chat session.

use anyhow::{Context, Result};
use chat_client::{ChatSession, LocalBackend};
use chat_core::SessionConfig;
use chat_server::ChatHub;
use chat_types::{ConversationId, MessageKind, UserId};
use std::sync::Arc;

/// Run the send command.
///
/// Opens a session on the conversation, sends, and closes it again, so the
/// message takes the same path as one typed into a client.
pub async fn run(
    hub: ChatHub,
    conversation: ConversationId,
    from: UserId,
    kind: MessageKind,
    content: String,
) -> Result<()> {
    let hub = Arc::new(hub);
    let session = ChatSession::new(LocalBackend::new(hub), from, SessionConfig::default());

    session
        .open(conversation)
        .await
        .context("Failed to open conversation")?;
    let sent = session.send(content, kind).await;
    session.close().await?;

    let message = sent.context("Failed to send message")?;
    println!("Sent {} at {}", message.id, message.created_at.to_rfc3339());
    Ok(())
}
