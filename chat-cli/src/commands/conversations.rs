//! List a user's conversations.

use anyhow::Result;
use chat_server::ChatHub;
use chat_types::{ConversationId, ConversationSummary, UserId};
use serde::Serialize;

/// One row of the listing, as printed with `--json`.
#[derive(Debug, Serialize)]
struct Row {
    conversation: ConversationId,
    with: Option<UserId>,
    updated_at: String,
    last_message: Option<String>,
}

impl Row {
    fn new(user: &UserId, summary: &ConversationSummary) -> Self {
        Self {
            conversation: summary.conversation.id,
            with: summary.conversation.counterpart(user).cloned(),
            updated_at: summary.conversation.updated_at.to_rfc3339(),
            last_message: summary
                .last_message
                .as_ref()
                .map(|m| preview(&m.content)),
        }
    }
}

/// Run the conversations command.
pub async fn run(hub: &ChatHub, user: &UserId, json: bool) -> Result<()> {
    let summaries = hub.resolver().conversations_for(user).await?;
    let rows: Vec<Row> = summaries.iter().map(|s| Row::new(user, s)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("{} has no conversations", user);
    }
    for row in &rows {
        let with = row.with.as_ref().map(UserId::as_str).unwrap_or("?");
        match &row.last_message {
            Some(text) => println!("{}  {:<16} {}", row.conversation, with, text),
            None => println!("{}  {:<16} (no messages)", row.conversation, with),
        }
    }
    Ok(())
}

/// First line of a message, cut to 40 characters.
fn preview(content: &str) -> String {
    const MAX: usize = 40;
    let line = content.lines().next().unwrap_or("");
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}
