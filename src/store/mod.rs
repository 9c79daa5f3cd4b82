//! Persistence and notification collaborators consumed by the conversation
//! adapter. The adapter only sees these traits; Postgres and the local
//! filesystem are the production backends.

pub mod object_store;
pub mod pg_store;

#[cfg(test)]
pub mod memory_store;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::{
    error::Result,
    message::message_models::{Message, NewMessage},
};

pub use object_store::LocalObjectStore;
pub use pg_store::PgMessageStore;

/// Stream of newly inserted messages across the whole collection. It is not
/// filtered by participant. An `Err` item means the channel dropped.
pub type InsertFeed = BoxStream<'static, Result<Message>>;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Every message where `participant` is sender or receiver, oldest first.
    async fn messages_involving(&self, participant: Uuid) -> Result<Vec<Message>>;

    /// Persists a message and returns it with store-assigned fields.
    async fn insert(&self, message: NewMessage) -> Result<Message>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>>;

    /// Sets `read` on a message addressed to `receiver`. `None` when no such
    /// message exists for that receiver.
    async fn mark_read(&self, id: Uuid, receiver: Uuid) -> Result<Option<Message>>;

    /// Marks every unread message from `sender` to `receiver`; returns the count.
    async fn mark_all_read(&self, receiver: Uuid, sender: Uuid) -> Result<u64>;

    async fn subscribe_inserts(&self) -> Result<InsertFeed>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<StoredObject>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;
}
