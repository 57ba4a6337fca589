//! Composition root for the backend components.

use crate::bus::EventBus;
use crate::config::Config;
use crate::error::ServerError;
use crate::messages::MessageStore;
use crate::metrics::HubMetrics;
use crate::presence::PresenceTracker;
use crate::resolver::ConversationResolver;
use crate::storage::{ChatStorage, SqliteStorage};
use crate::typing::TypingBus;
use chat_types::{ChatError, Presence, UserId};
use std::sync::Arc;

/// All backend services sharing one storage, bus and metrics set.
pub struct ChatHub {
    config: Config,
    resolver: ConversationResolver,
    messages: MessageStore,
    presence: PresenceTracker,
    bus: EventBus,
    typing: TypingBus,
    metrics: Arc<HubMetrics>,
}

impl std::fmt::Debug for ChatHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHub")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl ChatHub {
    /// Open the SQLite database named in `config` and build the hub.
    pub async fn open(config: Config) -> Result<Self, ServerError> {
        tracing::info!("Opening database at {}", config.storage.database.display());
        let storage = SqliteStorage::new(&config.storage).await?;
        Ok(Self::with_storage(config, Arc::new(storage)))
    }

    /// Load a TOML config file and open the hub it describes.
    pub async fn from_file(path: &std::path::Path) -> Result<Self, ServerError> {
        let config = Config::from_file(path)?;
        Self::open(config).await
    }

    /// Build a hub over a throwaway in-memory database.
    pub async fn in_memory(config: Config) -> Result<Self, ServerError> {
        let storage = SqliteStorage::in_memory().await?;
        Ok(Self::with_storage(config, Arc::new(storage)))
    }

    /// Build a hub over any storage backend.
    pub fn with_storage(config: Config, storage: Arc<dyn ChatStorage>) -> Self {
        let metrics = Arc::new(HubMetrics::default());
        let bus = EventBus::new(&config.bus, metrics.clone());
        let typing = TypingBus::new(&config.typing, metrics.clone());

        Self {
            resolver: ConversationResolver::new(storage.clone(), metrics.clone()),
            messages: MessageStore::new(
                storage.clone(),
                bus.clone(),
                &config.messages,
                metrics.clone(),
            ),
            presence: PresenceTracker::new(storage),
            bus,
            typing,
            metrics,
            config,
        }
    }

    /// Hub configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Conversation resolution and listing.
    pub fn resolver(&self) -> &ConversationResolver {
        &self.resolver
    }

    /// Message log.
    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Presence flags.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Real-time message bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Typing signal bus.
    pub fn typing(&self) -> &TypingBus {
        &self.typing
    }

    /// Operational counters.
    pub fn metrics(&self) -> &HubMetrics {
        &self.metrics
    }

    /// Session start: mark the user online.
    pub async fn sign_in(&self, user: &UserId) -> Result<Presence, ChatError> {
        tracing::info!("{} signed in", user);
        self.presence.mark_online(user).await
    }

    /// Session end: mark the user offline.
    pub async fn sign_out(&self, user: &UserId) -> Result<Presence, ChatError> {
        tracing::info!("{} signed out", user);
        self.presence.mark_offline(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_types::MessageKind;

    #[tokio::test]
    async fn hub_wires_shared_bus_and_metrics() {
        let hub = ChatHub::in_memory(Config::default()).await.unwrap();
        let u1 = UserId::new("u1");
        let u2 = UserId::new("u2");

        let conversation = hub.resolver().resolve(&u1, &u2).await.unwrap();
        let mut sub = hub.bus().subscribe(conversation);

        let sent = hub
            .messages()
            .append(conversation, &u2, "hey", MessageKind::Text)
            .await
            .unwrap();
        assert_eq!(sub.messages.recv().await.unwrap(), sent);

        let snap = hub.metrics().snapshot();
        assert_eq!(snap.conversations_created, 1);
        assert_eq!(snap.messages_appended, 1);
        assert_eq!(snap.events_published, 1);
    }

    #[tokio::test]
    async fn sign_in_and_out_drive_presence() {
        let hub = ChatHub::in_memory(Config::default()).await.unwrap();
        let user = UserId::new("u1");

        assert!(hub.sign_in(&user).await.unwrap().online);
        assert!(hub.presence().get(&user).await.unwrap().online);
        assert!(!hub.sign_out(&user).await.unwrap().online);
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database = dir.path().join("hub.db");

        let hub = ChatHub::open(config).await.unwrap();
        hub.resolver()
            .resolve(&"a".into(), &"b".into())
            .await
            .unwrap();
        assert!(dir.path().join("hub.db").exists());
    }

    #[tokio::test]
    async fn from_file_reads_config() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("configured.db");
        let config_path = dir.path().join("pairchat.toml");
        std::fs::write(
            &config_path,
            format!(
                "[storage]\ndatabase = {:?}\n\n[messages]\nmax_content_bytes = 4\n",
                database.display().to_string()
            ),
        )
        .unwrap();

        let hub = ChatHub::from_file(&config_path).await.unwrap();
        assert_eq!(hub.config().messages.max_content_bytes, 4);
        assert!(database.exists());

        let missing = ChatHub::from_file(&dir.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(ServerError::Config(_))));
    }
}
