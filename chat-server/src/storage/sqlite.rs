//! SQLite storage backend for chat-server.

use super::{ChatStorage, StoredAppend};
use crate::config::StorageConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use chat_types::{
    Conversation, ConversationId, ConversationSummary, CorrelationToken, Message, MessageCursor,
    MessageId, MessageKind, NewMessage, ParticipantPair, Presence, UserId,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, kind, created_at, client_token";

/// SQLite-based chat storage.
///
/// Uses WAL mode for concurrent reads/writes. Timestamps are stored as
/// integer microseconds since the Unix epoch.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("connections", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Open (or create) the database described by `config`.
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // A single connection that never recycles, or the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id BLOB PRIMARY KEY,
                participant_low TEXT NOT NULL,
                participant_high TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(participant_low, participant_high)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id BLOB PRIMARY KEY,
                conversation_id BLOB NOT NULL REFERENCES conversations(id),
                sender_id TEXT NOT NULL,
                content TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                client_token BLOB,
                UNIQUE(conversation_id, client_token)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS presence (
                user_id TEXT PRIMARY KEY,
                online INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        // Create indexes
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation_order ON messages(conversation_id, created_at, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_high ON conversations(participant_high)",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| StorageError::Corrupt {
        reason: format!("timestamp out of range: {micros}"),
    })
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

#[async_trait]
impl ChatStorage for SqliteStorage {
    async fn find_conversation(
        &self,
        pair: &ParticipantPair,
    ) -> Result<Option<Conversation>, StorageError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, participant_low, participant_high, created_at, updated_at
            FROM conversations
            WHERE participant_low = ?1 AND participant_high = ?2
            "#,
        )
        .bind(pair.low().as_str())
        .bind(pair.high().as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Conversation::try_from).transpose()
    }

    async fn insert_conversation(
        &self,
        pair: &ParticipantPair,
    ) -> Result<Conversation, StorageError> {
        let id = ConversationId::new();
        let now = now_micros();

        let result = sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(id.as_bytes())
        .bind(pair.low().as_str())
        .bind(pair.high().as_str())
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StorageError::AlreadyExists)
            }
            Err(e) => return Err(StorageError::Database(e)),
        }

        let created_at = from_micros(now)?;
        Ok(Conversation {
            id,
            participant_low: pair.low().clone(),
            participant_high: pair.high().clone(),
            created_at,
            updated_at: created_at,
        })
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StorageError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, participant_low, participant_high, created_at, updated_at
            FROM conversations
            WHERE id = ?1
            "#,
        )
        .bind(id.as_bytes())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Conversation::try_from).transpose()
    }

    async fn list_conversations(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, StorageError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT c.id, c.participant_low, c.participant_high, c.created_at, c.updated_at,
                   m.id AS m_id, m.sender_id AS m_sender_id, m.content AS m_content,
                   m.kind AS m_kind, m.created_at AS m_created_at,
                   m.client_token AS m_client_token
            FROM conversations c
            LEFT JOIN messages m ON m.id = (
                SELECT id FROM messages
                WHERE conversation_id = c.id
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            )
            WHERE c.participant_low = ?1 OR c.participant_high = ?1
            ORDER BY c.updated_at DESC, c.id ASC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<StoredAppend, StorageError> {
        let conversation = message.conversation_id;
        let mut tx = self.pool.begin().await.map_err(StorageError::Database)?;

        // Taking the write lock first serializes appends per database and
        // yields a timestamp strictly after the previous message.
        let bumped: Option<(String, String, i64)> = sqlx::query_as(
            r#"
            UPDATE conversations
            SET updated_at = MAX(updated_at + 1, ?2)
            WHERE id = ?1
            RETURNING participant_low, participant_high, updated_at
            "#,
        )
        .bind(conversation.as_bytes())
        .bind(now_micros())
        .fetch_optional(&mut *tx)
        .await
        .map_err(StorageError::Database)?;

        let Some((low, high, created_at)) = bumped else {
            return Err(StorageError::ConversationNotFound { conversation });
        };

        let sender = message.sender_id.as_str();
        if sender != low && sender != high {
            tx.rollback().await.map_err(StorageError::Database)?;
            return Err(StorageError::NotParticipant {
                user: message.sender_id.clone(),
                conversation,
            });
        }

        if let Some(token) = message.client_token {
            let existing = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 AND client_token = ?2"
            ))
            .bind(conversation.as_bytes())
            .bind(token.as_bytes())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StorageError::Database)?;

            if let Some(row) = existing {
                tx.rollback().await.map_err(StorageError::Database)?;
                return Ok(StoredAppend {
                    message: row.try_into()?,
                    created: false,
                });
            }
        }

        let id = MessageId::new();
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, kind, created_at, client_token)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(id.as_bytes())
        .bind(conversation.as_bytes())
        .bind(sender)
        .bind(message.content.as_str())
        .bind(message.kind.as_str())
        .bind(created_at)
        .bind(message.client_token.as_ref().map(|t| t.as_bytes()))
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Database)?;

        tx.commit().await.map_err(StorageError::Database)?;

        Ok(StoredAppend {
            message: Message {
                id,
                conversation_id: conversation,
                sender_id: message.sender_id.clone(),
                content: message.content.clone(),
                kind: message.kind,
                created_at: from_micros(created_at)?,
                client_token: message.client_token,
            },
            created: true,
        })
    }

    async fn messages_after(
        &self,
        conversation: &ConversationId,
        since: Option<MessageCursor>,
    ) -> Result<Vec<Message>, StorageError> {
        let rows = match since {
            None => {
                sqlx::query_as::<_, MessageRow>(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, id ASC"
                ))
                .bind(conversation.as_bytes())
                .fetch_all(&self.pool)
                .await
            }
            Some(cursor) => {
                sqlx::query_as::<_, MessageRow>(&format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS} FROM messages
                    WHERE conversation_id = ?1
                      AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))
                    ORDER BY created_at ASC, id ASC
                    "#
                ))
                .bind(conversation.as_bytes())
                .bind(cursor.created_at.timestamp_micros())
                .bind(cursor.id.as_bytes())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StorageError::Database)?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }

    async fn upsert_presence(
        &self,
        user: &UserId,
        online: bool,
        at: DateTime<Utc>,
    ) -> Result<Presence, StorageError> {
        let row = sqlx::query_as::<_, PresenceRow>(
            r#"
            INSERT INTO presence (user_id, online, last_seen_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET online = excluded.online, last_seen_at = excluded.last_seen_at
            RETURNING user_id, online, last_seen_at
            "#,
        )
        .bind(user.as_str())
        .bind(online)
        .bind(at.timestamp_micros())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.try_into()
    }

    async fn get_presence(&self, user: &UserId) -> Result<Option<Presence>, StorageError> {
        let row = sqlx::query_as::<_, PresenceRow>(
            "SELECT user_id, online, last_seen_at FROM presence WHERE user_id = ?1",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Presence::try_from).transpose()
    }
}

/// Internal row types for SQLite queries.
#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: Vec<u8>,
    participant_low: String,
    participant_high: String,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Vec<u8>,
    conversation_id: Vec<u8>,
    sender_id: String,
    content: String,
    kind: String,
    created_at: i64,
    client_token: Option<Vec<u8>>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Vec<u8>,
    participant_low: String,
    participant_high: String,
    created_at: i64,
    updated_at: i64,
    m_id: Option<Vec<u8>>,
    m_sender_id: Option<String>,
    m_content: Option<String>,
    m_kind: Option<String>,
    m_created_at: Option<i64>,
    m_client_token: Option<Vec<u8>>,
}

#[derive(sqlx::FromRow)]
struct PresenceRow {
    user_id: String,
    online: bool,
    last_seen_at: i64,
}

fn corrupt(reason: &str) -> StorageError {
    StorageError::Corrupt {
        reason: reason.to_string(),
    }
}

fn decode_token(bytes: Option<Vec<u8>>) -> Result<Option<CorrelationToken>, StorageError> {
    bytes
        .map(|b| CorrelationToken::from_bytes(&b).ok_or_else(|| corrupt("invalid client_token")))
        .transpose()
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = StorageError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: ConversationId::from_bytes(&row.id)
                .ok_or_else(|| corrupt("invalid conversation id"))?,
            participant_low: UserId::new(row.participant_low),
            participant_high: UserId::new(row.participant_high),
            created_at: from_micros(row.created_at)?,
            updated_at: from_micros(row.updated_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::from_bytes(&row.id).ok_or_else(|| corrupt("invalid message id"))?,
            conversation_id: ConversationId::from_bytes(&row.conversation_id)
                .ok_or_else(|| corrupt("invalid conversation id"))?,
            sender_id: UserId::new(row.sender_id),
            content: row.content,
            kind: MessageKind::from_str(&row.kind).map_err(|e| corrupt(&e.to_string()))?,
            created_at: from_micros(row.created_at)?,
            client_token: decode_token(row.client_token)?,
        })
    }
}

impl TryFrom<SummaryRow> for ConversationSummary {
    type Error = StorageError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        let conversation = Conversation::try_from(ConversationRow {
            id: row.id,
            participant_low: row.participant_low,
            participant_high: row.participant_high,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })?;

        let last_message = match (
            row.m_id,
            row.m_sender_id,
            row.m_content,
            row.m_kind,
            row.m_created_at,
        ) {
            (Some(id), Some(sender_id), Some(content), Some(kind), Some(created_at)) => {
                Some(Message::try_from(MessageRow {
                    id,
                    conversation_id: conversation.id.as_bytes().to_vec(),
                    sender_id,
                    content,
                    kind,
                    created_at,
                    client_token: row.m_client_token,
                })?)
            }
            (None, ..) => None,
            _ => return Err(corrupt("partial last message row")),
        };

        Ok(ConversationSummary {
            conversation,
            last_message,
        })
    }
}

impl TryFrom<PresenceRow> for Presence {
    type Error = StorageError;

    fn try_from(row: PresenceRow) -> Result<Self, Self::Error> {
        Ok(Presence {
            user_id: UserId::new(row.user_id),
            online: row.online,
            last_seen_at: Some(from_micros(row.last_seen_at)?),
        })
    }
}
