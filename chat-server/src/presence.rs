//! Online/offline flags per user.

use crate::storage::ChatStorage;
use chat_types::{ChatError, Presence, UserId};
use chrono::Utc;
use std::sync::Arc;

/// Last-write-wins presence. No heartbeat and no expiry.
#[derive(Clone)]
pub struct PresenceTracker {
    storage: Arc<dyn ChatStorage>,
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker").finish_non_exhaustive()
    }
}

impl PresenceTracker {
    /// Create a tracker over `storage`.
    pub fn new(storage: Arc<dyn ChatStorage>) -> Self {
        Self { storage }
    }

    /// Mark `user` online.
    pub async fn mark_online(&self, user: &UserId) -> Result<Presence, ChatError> {
        self.set(user, true).await
    }

    /// Mark `user` offline.
    pub async fn mark_offline(&self, user: &UserId) -> Result<Presence, ChatError> {
        self.set(user, false).await
    }

    /// Current presence; a user never seen reads as offline.
    pub async fn get(&self, user: &UserId) -> Result<Presence, ChatError> {
        Ok(self
            .storage
            .get_presence(user)
            .await?
            .unwrap_or_else(|| Presence::unknown(user.clone())))
    }

    async fn set(&self, user: &UserId, online: bool) -> Result<Presence, ChatError> {
        let presence = self.storage.upsert_presence(user, online, Utc::now()).await?;
        tracing::debug!("Presence of {} is now online={}", user, online);
        Ok(presence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    #[tokio::test]
    async fn online_offline_cycle() {
        let tracker = PresenceTracker::new(Arc::new(SqliteStorage::in_memory().await.unwrap()));
        let user = UserId::new("u1");

        let unknown = tracker.get(&user).await.unwrap();
        assert!(!unknown.online);
        assert_eq!(unknown.last_seen_at, None);

        tracker.mark_online(&user).await.unwrap();
        assert!(tracker.get(&user).await.unwrap().online);

        let offline = tracker.mark_offline(&user).await.unwrap();
        assert!(!offline.online);
        assert_eq!(tracker.get(&user).await.unwrap(), offline);
    }
}
