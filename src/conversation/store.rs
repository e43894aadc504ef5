use super::types::{ConversationStats, Message, Purpose, truncate_after_last_assistant};
use crate::db::{self, MonotonicClock, micros_to_datetime};
use crate::error::StoreError;
use crate::llm::types::MessageRole;
use anyhow::{Context, Result};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Request to recompute a song's `needs_summarization` flag, queued after
/// every assistant save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRefresh {
    pub song_id: i64,
    pub owner: String,
}

/// Per-song, per-purpose conversation persistence.
///
/// Reads degrade to empty results on storage failure; only ownership
/// violations on writes surface as [`StoreError::NotFound`].
pub trait ConversationStore: Send + Sync {
    /// Valid history, or the storage error that prevented loading it.
    fn try_valid_history<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + 'a>>;

    /// Active summaries plus the active `purpose` thread cut at its last
    /// assistant turn, oldest first. Never fails.
    fn get_valid_history<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<Message>> + Send + 'a>> {
        Box::pin(async move {
            match self.try_valid_history(song_id, purpose, owner).await {
                Ok(messages) => messages,
                Err(error) => {
                    tracing::error!(song_id, purpose = %purpose, error = %error, "failed to load conversation history");
                    Vec::new()
                }
            }
        })
    }

    fn save_user_message<'a>(
        &'a self,
        content: &'a str,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Message>, StoreError>> + Send + 'a>>;

    fn save_assistant_message<'a>(
        &'a self,
        content: &'a str,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Message>, StoreError>> + Send + 'a>>;

    /// Delete active turns after the last assistant message. Returns the
    /// number of rows removed.
    fn cleanup_incomplete<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = u64> + Send + 'a>>;

    fn get_stats<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = ConversationStats> + Send + 'a>>;

    /// Every active message of one thread, untruncated.
    fn active_messages<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + 'a>>;

    /// Atomically deactivate `superseded` and insert an active summary row.
    fn replace_with_summary<'a>(
        &'a self,
        song_id: i64,
        superseded: &'a [String],
        summary: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + 'a>>;
}

/// SQLite-backed conversation store.
pub struct SqliteConversationStore {
    pool: SqlitePool,
    clock: MonotonicClock,
    flag_refresh: OnceLock<mpsc::UnboundedSender<FlagRefresh>>,
}

impl SqliteConversationStore {
    /// Create a store over an existing pool. The clock starts after the
    /// newest stored timestamp.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        db::ensure_schema(&pool).await?;

        let newest: (Option<i64>,) = sqlx::query_as("SELECT MAX(created_at_us) FROM messages")
            .fetch_one(&pool)
            .await
            .context("load newest message timestamp")?;

        Ok(Self {
            pool,
            clock: MonotonicClock::starting_after(newest.0.unwrap_or_default()),
            flag_refresh: OnceLock::new(),
        })
    }

    /// Route flag refresh requests to a worker. Only the first call wins.
    pub fn attach_flag_refresh(&self, sender: mpsc::UnboundedSender<FlagRefresh>) -> bool {
        self.flag_refresh.set(sender).is_ok()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn owns(&self, song_id: i64, owner: &str) -> std::result::Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM songs WHERE id = $1 AND owner_id = $2")
            .bind(song_id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn load_active(&self, song_id: i64, purpose: Purpose) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, song_id, purpose, role, content, active, created_at_us
             FROM messages
             WHERE song_id = $1 AND purpose = $2 AND active = 1
             ORDER BY created_at_us",
        )
        .bind(song_id)
        .bind(purpose.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("load active {purpose} messages"))?;

        rows.iter().map(map_message_row).collect()
    }

    async fn insert(
        &self,
        content: &str,
        song_id: i64,
        purpose: Purpose,
        role: MessageRole,
        owner: &str,
    ) -> Result<Option<Message>, StoreError> {
        match self.owns(song_id, owner).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(StoreError::NotFound {
                    song_id,
                    owner: owner.to_string(),
                });
            }
            Err(error) => {
                tracing::error!(song_id, error = %error, "ownership check failed");
                return Ok(None);
            }
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            song_id,
            purpose,
            role,
            content: content.to_string(),
            active: true,
            created_at: micros_to_datetime(self.clock.next_micros()),
        };

        let result = sqlx::query(
            "INSERT INTO messages (id, song_id, purpose, role, content, active, created_at_us)
             VALUES ($1, $2, $3, $4, $5, 1, $6)",
        )
        .bind(&message.id)
        .bind(song_id)
        .bind(purpose.as_str())
        .bind(role.as_str())
        .bind(content)
        .bind(message.created_at.timestamp_micros())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Some(message)),
            Err(error) => {
                tracing::error!(song_id, purpose = %purpose, role = role.as_str(), error = %error, "failed to save message");
                Ok(None)
            }
        }
    }

    async fn try_cleanup(&self, song_id: i64, purpose: Purpose, owner: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("begin cleanup transaction")?;

        let owned: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM songs WHERE id = $1 AND owner_id = $2")
            .bind(song_id)
            .bind(owner)
            .fetch_optional(&mut *tx)
            .await?;
        if owned.is_none() {
            return Ok(0);
        }

        let last_assistant: (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(created_at_us) FROM messages
             WHERE song_id = $1 AND purpose = $2 AND active = 1 AND role = 'assistant'",
        )
        .bind(song_id)
        .bind(purpose.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM messages
             WHERE song_id = $1 AND purpose = $2 AND active = 1 AND created_at_us > $3",
        )
        .bind(song_id)
        .bind(purpose.as_str())
        .bind(last_assistant.0.unwrap_or(i64::MIN))
        .execute(&mut *tx)
        .await?;

        tx.commit().await.context("commit cleanup transaction")?;
        Ok(result.rows_affected())
    }

    async fn try_stats(&self, song_id: i64, purpose: Purpose, owner: &str) -> Result<ConversationStats> {
        if !self.owns(song_id, owner).await? {
            return Ok(ConversationStats::default());
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT role, COUNT(*) FROM messages
             WHERE song_id = $1 AND purpose = $2 AND active = 1
             GROUP BY role",
        )
        .bind(song_id)
        .bind(purpose.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut stats = ConversationStats::default();
        for (role, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            stats.total += count;
            match MessageRole::from_str(&role) {
                Ok(MessageRole::System) => stats.system = count,
                Ok(MessageRole::User) => stats.user = count,
                Ok(MessageRole::Assistant) => stats.assistant = count,
                Err(_) => tracing::warn!(song_id, role = %role, "unknown role in message table"),
            }
        }
        stats.has_incomplete = stats.user > stats.assistant;

        let summaries: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE song_id = $1 AND purpose = 'summary' AND active = 1",
        )
        .bind(song_id)
        .fetch_one(&self.pool)
        .await?;
        stats.has_summaries = summaries.0 > 0;

        Ok(stats)
    }
}

fn map_message_row(row: &SqliteRow) -> Result<Message> {
    let purpose_raw: String = row.try_get("purpose")?;
    let role_raw: String = row.try_get("role")?;
    let active: i64 = row.try_get("active")?;
    let created_at_us: i64 = row.try_get("created_at_us")?;

    Ok(Message {
        id: row.try_get("id")?,
        song_id: row.try_get("song_id")?,
        purpose: Purpose::from_str(&purpose_raw)
            .map_err(|_| StoreError::Corrupt(format!("unknown purpose: {purpose_raw}")))?,
        role: MessageRole::from_str(&role_raw)
            .map_err(|_| StoreError::Corrupt(format!("unknown role: {role_raw}")))?,
        content: row.try_get("content")?,
        active: active != 0,
        created_at: micros_to_datetime(created_at_us),
    })
}

impl ConversationStore for SqliteConversationStore {
    fn try_valid_history<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + 'a>> {
        Box::pin(async move {
            if !self.owns(song_id, owner).await.context("check song ownership")? {
                return Ok(Vec::new());
            }

            let mut messages = self.load_active(song_id, Purpose::Summary).await?;
            if purpose != Purpose::Summary {
                let thread = self.load_active(song_id, purpose).await?;
                messages.extend(truncate_after_last_assistant(thread));
            }
            messages.sort_by_key(|message| message.created_at);
            Ok(messages)
        })
    }

    fn save_user_message<'a>(
        &'a self,
        content: &'a str,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Message>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            self.insert(content, song_id, purpose, MessageRole::User, owner)
                .await
        })
    }

    fn save_assistant_message<'a>(
        &'a self,
        content: &'a str,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Message>, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let saved = self
                .insert(content, song_id, purpose, MessageRole::Assistant, owner)
                .await?;

            if saved.is_some()
                && let Some(sender) = self.flag_refresh.get()
            {
                let request = FlagRefresh {
                    song_id,
                    owner: owner.to_string(),
                };
                if sender.send(request).is_err() {
                    tracing::debug!(song_id, "flag refresh worker is gone; skipping");
                }
            }
            Ok(saved)
        })
    }

    fn cleanup_incomplete<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = u64> + Send + 'a>> {
        Box::pin(async move {
            match self.try_cleanup(song_id, purpose, owner).await {
                Ok(deleted) => {
                    if deleted > 0 {
                        tracing::info!(song_id, purpose = %purpose, deleted, "removed incomplete conversation turns");
                    }
                    deleted
                }
                Err(error) => {
                    tracing::error!(song_id, purpose = %purpose, error = %error, "cleanup of incomplete turns failed");
                    0
                }
            }
        })
    }

    fn get_stats<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = ConversationStats> + Send + 'a>> {
        Box::pin(async move {
            self.try_stats(song_id, purpose, owner)
                .await
                .unwrap_or_else(|error| {
                    tracing::error!(song_id, purpose = %purpose, error = %error, "failed to compute conversation stats");
                    ConversationStats::default()
                })
        })
    }

    fn active_messages<'a>(
        &'a self,
        song_id: i64,
        purpose: Purpose,
        owner: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + 'a>> {
        Box::pin(async move {
            if !self.owns(song_id, owner).await.context("check song ownership")? {
                return Ok(Vec::new());
            }
            self.load_active(song_id, purpose).await
        })
    }

    fn replace_with_summary<'a>(
        &'a self,
        song_id: i64,
        superseded: &'a [String],
        summary: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Message>> + Send + 'a>> {
        Box::pin(async move {
            let message = Message {
                id: Uuid::new_v4().to_string(),
                song_id,
                purpose: Purpose::Summary,
                role: MessageRole::Assistant,
                content: summary.to_string(),
                active: true,
                created_at: micros_to_datetime(self.clock.next_micros()),
            };

            let mut tx = self.pool.begin().await.context("begin summary transaction")?;

            for id in superseded {
                sqlx::query("UPDATE messages SET active = 0 WHERE id = $1 AND song_id = $2")
                    .bind(id)
                    .bind(song_id)
                    .execute(&mut *tx)
                    .await
                    .context("deactivate summarized message")?;
            }

            sqlx::query(
                "INSERT INTO messages (id, song_id, purpose, role, content, active, created_at_us)
                 VALUES ($1, $2, $3, $4, $5, 1, $6)",
            )
            .bind(&message.id)
            .bind(song_id)
            .bind(Purpose::Summary.as_str())
            .bind(MessageRole::Assistant.as_str())
            .bind(summary)
            .bind(message.created_at.timestamp_micros())
            .execute(&mut *tx)
            .await
            .context("insert summary message")?;

            tx.commit().await.context("commit summary transaction")?;
            Ok(message)
        })
    }
}
