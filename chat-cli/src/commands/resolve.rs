//! Get or create a conversation.

use anyhow::Result;
use chat_server::ChatHub;
use chat_types::UserId;

/// Run the resolve command.
pub async fn run(hub: &ChatHub, a: &UserId, b: &UserId) -> Result<()> {
    let conversation = hub.resolver().resolve(a, b).await?;
    println!("{}", conversation);
    Ok(())
}
