use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::{FromRow, PgPool};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::{InsertFeed, MessageStore};
use crate::{
    error::{AppError, Result},
    message::message_models::{Message, NewMessage},
};

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    category: String,
    attachment: Option<String>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            category: row.category.parse()?,
            attachment: row.attachment,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

/// Messages in Postgres; inserts are published to live subscribers through a
/// broadcast channel.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
    inserts: broadcast::Sender<Message>,
}

impl PgMessageStore {
    pub fn new(pool: PgPool, capacity: usize) -> Self {
        let (inserts, _) = broadcast::channel(capacity);
        Self { pool, inserts }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn messages_involving(&self, participant: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages
             WHERE sender_id = $1 OR receiver_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(participant)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn insert(&self, message: NewMessage) -> Result<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO messages (sender_id, receiver_id, content, category, attachment)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.content)
        .bind(message.category.as_str())
        .bind(message.attachment.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let created = Message::try_from(row)?;

        // No receivers is not an error: nobody is watching.
        let _ = self.inserts.send(created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Message::try_from).transpose()
    }

    async fn mark_read(&self, id: Uuid, receiver: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "UPDATE messages
             SET read = true
             WHERE id = $1 AND receiver_id = $2
             RETURNING *",
        )
        .bind(id)
        .bind(receiver)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn mark_all_read(&self, receiver: Uuid, sender: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages
             SET read = true
             WHERE receiver_id = $1 AND sender_id = $2 AND read = false",
        )
        .bind(receiver)
        .bind(sender)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn subscribe_inserts(&self) -> Result<InsertFeed> {
        let feed = BroadcastStream::new(self.inserts.subscribe())
            .map(|item| item.map_err(|e| AppError::ConnectionLost(e.to_string())));

        Ok(feed.boxed())
    }
}
