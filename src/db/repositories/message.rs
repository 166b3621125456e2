//! Message log repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Channel, Message};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: &Message) -> Result<Message>;

    /// Full message log of an activity, oldest first
    async fn list_by_activity(&self, activity_id: &str) -> Result<Vec<Message>>;

    /// Web conversation of an activity with the organizer (`None`) or with
    /// one participant, oldest first
    async fn conversation(
        &self,
        activity_id: &str,
        participant_id: Option<&str>,
    ) -> Result<Vec<Message>>;
}

pub struct SqlxMessageRepository {
    pool: DynDatabasePool,
}

impl SqlxMessageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MessageRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "SELECT id, activity_id, participant_id, direction, channel, content, metadata, created_at FROM messages";

const INSERT_SQL: &str = r#"
    INSERT INTO messages (id, activity_id, participant_id, direction, channel, content, metadata, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const CONVERSATION_FILTER: &str = r#"
    WHERE activity_id = ? AND channel = ?
      AND (participant_id = ? OR (participant_id IS NULL AND ? IS NULL))
    ORDER BY created_at ASC
"#;

#[async_trait]
impl MessageRepository for SqlxMessageRepository {
    async fn create(&self, message: &Message) -> Result<Message> {
        let metadata = message.metadata.to_string();
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(INSERT_SQL)
                    .bind(&message.id)
                    .bind(&message.activity_id)
                    .bind(&message.participant_id)
                    .bind(message.direction.as_str())
                    .bind(message.channel.as_str())
                    .bind(&message.content)
                    .bind(&metadata)
                    .bind(message.created_at)
                    .execute(pool)
                    .await
                    .context("Failed to record message")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(INSERT_SQL)
                    .bind(&message.id)
                    .bind(&message.activity_id)
                    .bind(&message.participant_id)
                    .bind(message.direction.as_str())
                    .bind(message.channel.as_str())
                    .bind(&message.content)
                    .bind(&metadata)
                    .bind(message.created_at)
                    .execute(pool)
                    .await
                    .context("Failed to record message")?;
            }
        }
        Ok(message.clone())
    }

    async fn list_by_activity(&self, activity_id: &str) -> Result<Vec<Message>> {
        let sql = format!("{} WHERE activity_id = ? ORDER BY created_at ASC", SELECT_COLUMNS);
        let messages = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql).bind(activity_id).fetch_all(pool).await?;
                rows.iter().map(row_to_message_sqlite).collect::<Result<Vec<_>>>()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql).bind(activity_id).fetch_all(pool).await?;
                rows.iter().map(row_to_message_mysql).collect::<Result<Vec<_>>>()
            }
        };
        messages.context("Failed to list messages")
    }

    async fn conversation(
        &self,
        activity_id: &str,
        participant_id: Option<&str>,
    ) -> Result<Vec<Message>> {
        let sql = format!("{} {}", SELECT_COLUMNS, CONVERSATION_FILTER);
        let channel = Channel::Web.as_str();
        let messages = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(activity_id)
                    .bind(channel)
                    .bind(participant_id)
                    .bind(participant_id)
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(row_to_message_sqlite).collect::<Result<Vec<_>>>()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(activity_id)
                    .bind(channel)
                    .bind(participant_id)
                    .bind(participant_id)
                    .fetch_all(pool)
                    .await?;
                rows.iter().map(row_to_message_mysql).collect::<Result<Vec<_>>>()
            }
        };
        messages.context("Failed to load conversation")
    }
}

fn row_to_message_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let direction: String = row.get("direction");
    let channel: String = row.get("channel");
    let metadata: String = row.get("metadata");
    Ok(Message {
        id: row.get("id"),
        activity_id: row.get("activity_id"),
        participant_id: row.get("participant_id"),
        direction: direction.parse()?,
        channel: channel.parse()?,
        content: row.get("content"),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        created_at: row.get("created_at"),
    })
}

fn row_to_message_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Message> {
    let direction: String = row.get("direction");
    let channel: String = row.get("channel");
    let metadata: String = row.get("metadata");
    Ok(Message {
        id: row.get("id"),
        activity_id: row.get("activity_id"),
        participant_id: row.get("participant_id"),
        direction: direction.parse()?,
        channel: channel.parse()?,
        content: row.get("content"),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        created_at: row.get("created_at"),
    })
}
