//! Sign users in and out, and show presence.

use anyhow::Result;
use chat_server::ChatHub;
use chat_types::{Presence, UserId};

/// Run the online/offline commands.
pub async fn set(hub: &ChatHub, user: &UserId, online: bool) -> Result<()> {
    let presence = if online {
        hub.sign_in(user).await?
    } else {
        hub.sign_out(user).await?
    };
    println!("{}", describe(&presence));
    Ok(())
}

/// Run the presence command.
pub async fn show(hub: &ChatHub, user: &UserId) -> Result<()> {
    let presence = hub.presence().get(user).await?;
    println!("{}", describe(&presence));
    Ok(())
}

fn describe(presence: &Presence) -> String {
    let state = if presence.online { "online" } else { "offline" };
    match presence.last_seen_at {
        Some(at) => format!("{}: {} (since {})", presence.user_id, state, at.to_rfc3339()),
        None => format!("{}: {} (never seen)", presence.user_id, state),
    }
}
