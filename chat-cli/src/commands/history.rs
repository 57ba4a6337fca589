//! Print a conversation's messages.

use anyhow::Result;
use chat_server::ChatHub;
use chat_types::{ConversationId, Message};

/// Run the history command.
pub async fn run(hub: &ChatHub, conversation: ConversationId, json: bool) -> Result<()> {
    let messages = hub.messages().history(conversation, None).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("No messages in {}", conversation);
    }
    for message in &messages {
        println!("{}", format_line(message));
    }
    Ok(())
}

fn format_line(message: &Message) -> String {
    format!(
        "[{}] {} ({}): {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S%.6f"),
        message.sender_id,
        message.kind,
        message.content
    )
}
