//! # chat-cli
//!
//! CLI tool for driving a local pairchat hub.
//!
//! ## Commands
//!
//! - `resolve`: Get or create the conversation between two users
//! - `send`: Send a message through a chat session
//! - `history`: Print a conversation's messages
//! - `conversations`: List a user's conversations
//! - `online` / `offline`: Sign a user in or out
//! - `presence`: Show a user's presence
//!
//! ## Example
//!
//! ```bash
//! # Find the conversation between alice and bob
//! chat-cli resolve alice bob
//!
//! # Send a message
//! chat-cli send --conversation <ID> --from alice "hi bob"
//!
//! # Read it back
//! chat-cli history <ID>
//! ```

use anyhow::{Context, Result};
use chat_server::ChatHub;
use chat_types::{ConversationId, MessageKind, UserId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use commands::{conversations, history, presence, resolve, send};

/// CLI tool for driving a local pairchat hub.
#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Hub configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get or create the conversation between two users
    Resolve {
        /// First participant
        a: String,
        /// Second participant
        b: String,
    },

    /// Send a message
    Send {
        /// Conversation id
        #[arg(long, short)]
        conversation: ConversationId,

        /// Sending user
        #[arg(long, short)]
        from: String,

        /// Message kind (text, image, gif, voice, link)
        #[arg(long, short, default_value = "text")]
        kind: MessageKind,

        /// Message content
        content: String,
    },

    /// Print a conversation's messages
    History {
        /// Conversation id
        conversation: ConversationId,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List a user's conversations, most recent first
    Conversations {
        /// User to list for
        user: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Mark a user online
    Online {
        /// User id
        user: String,
    },

    /// Mark a user offline
    Offline {
        /// User id
        user: String,
    },

    /// Show a user's presence
    Presence {
        /// User id
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_logging();
    let cli = Cli::parse();

    let hub_config = config::load(cli.config.as_deref(), cli.database).await?;
    let hub = ChatHub::open(hub_config)
        .await
        .context("Failed to open chat database")?;

    match cli.command {
        Commands::Resolve { a, b } => {
            resolve::run(&hub, &UserId::new(a), &UserId::new(b)).await?;
        }
        Commands::Send {
            conversation,
            from,
            kind,
            content,
        } => {
            send::run(hub, conversation, UserId::new(from), kind, content).await?;
        }
        Commands::History { conversation, json } => {
            history::run(&hub, conversation, json).await?;
        }
        Commands::Conversations { user, json } => {
            conversations::run(&hub, &UserId::new(user), json).await?;
        }
        Commands::Online { user } => {
            presence::set(&hub, &UserId::new(user), true).await?;
        }
        Commands::Offline { user } => {
            presence::set(&hub, &UserId::new(user), false).await?;
        }
        Commands::Presence { user } => {
            presence::show(&hub, &UserId::new(user)).await?;
        }
    }

    Ok(())
}
