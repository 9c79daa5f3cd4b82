//! In-memory `MessageStore` used by the tests. Counts calls, can be switched
//! offline, and lets a test push raw events onto the insert feed.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::StreamExt;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex, PoisonError,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::{InsertFeed, MessageStore};
use crate::{
    error::{AppError, Result},
    message::message_models::{Message, NewMessage},
};

pub struct MemoryMessageStore {
    messages: Mutex<Vec<Message>>,
    inserts: Mutex<broadcast::Sender<Message>>,
    calls: AtomicUsize,
    insert_calls: AtomicUsize,
    mark_read_calls: AtomicUsize,
    offline: AtomicBool,
    refuse_subscriptions: AtomicBool,
    after_snapshot: Mutex<Option<Message>>,
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        let (inserts, _) = broadcast::channel(64);
        Self {
            messages: Mutex::new(Vec::new()),
            inserts: Mutex::new(inserts),
            calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
            mark_read_calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            refuse_subscriptions: AtomicBool::new(false),
            after_snapshot: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn mark_read_calls(&self) -> usize {
        self.mark_read_calls.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refuse_subscriptions.store(refuse, Ordering::SeqCst);
    }

    /// Stores a fully formed message without publishing it.
    pub fn seed(&self, message: Message) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Pushes an event onto the feed without storing it.
    pub fn publish(&self, message: Message) {
        let _ = self
            .inserts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(message);
    }

    /// Stores and publishes `message` right after the next history query
    /// has taken its snapshot, so the message is missing from that result.
    pub fn commit_after_next_snapshot(&self, message: Message) {
        *self
            .after_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message);
    }

    /// Drops the current feed so every open subscription sees it end.
    pub fn close_feed(&self) {
        let (fresh, _) = broadcast::channel(64);
        *self.inserts.lock().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    pub fn stored(&self, id: Uuid) -> Option<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn messages_involving(&self, participant: Uuid) -> Result<Vec<Message>> {
        self.enter()?;
        let mut found: Vec<Message> = self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.involves(participant))
            .cloned()
            .collect();
        found.sort_by_key(Message::order_key);

        let late = self
            .after_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(message) = late {
            self.seed(message.clone());
            self.publish(message);
        }
        Ok(found)
    }

    async fn insert(&self, message: NewMessage) -> Result<Message> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.enter()?;

        let created = {
            let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
            // Strictly increasing timestamps keep the store's own order obvious.
            let created_at = Utc::now() + Duration::microseconds(messages.len() as i64);
            let created = Message {
                id: Uuid::new_v4(),
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
                content: message.content,
                category: message.category,
                attachment: message.attachment,
                read: false,
                created_at,
            };
            messages.push(created.clone());
            created
        };

        self.publish(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        self.enter()?;
        Ok(self.stored(id))
    }

    async fn mark_read(&self, id: Uuid, receiver: Uuid) -> Result<Option<Message>> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        self.enter()?;
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(messages
            .iter_mut()
            .find(|m| m.id == id && m.receiver_id == receiver)
            .map(|m| {
                m.read = true;
                m.clone()
            }))
    }

    async fn mark_all_read(&self, receiver: Uuid, sender: Uuid) -> Result<u64> {
        self.enter()?;
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = 0;
        for m in messages
            .iter_mut()
            .filter(|m| m.receiver_id == receiver && m.sender_id == sender && !m.read)
        {
            m.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn subscribe_inserts(&self) -> Result<InsertFeed> {
        self.enter()?;
        if self.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(AppError::ConnectionLost("subscription refused".into()));
        }
        let rx = self
            .inserts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe();
        let feed = BroadcastStream::new(rx)
            .map(|item| item.map_err(|e| AppError::ConnectionLost(e.to_string())));
        Ok(feed.boxed())
    }
}
