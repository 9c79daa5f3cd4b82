use futures::StreamExt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use super::projection::{MessageProjection, Reconciled};
use crate::{
    error::{AppError, Result},
    message::{
        message_dto::ConversationSummary,
        message_models::{
            AttachmentRef, AttachmentUpload, ConversationKey, Message, MessageCategory, NewMessage,
        },
    },
    store::{InsertFeed, MessageStore, ObjectStore},
};

pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "doc", "docx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Opening,
    Open,
}

/// What a subscription surfaces to its view.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    Inserted { message: Message, position: usize },
    ConnectionLost { reason: String },
}

pub type EventSender = mpsc::UnboundedSender<ConversationEvent>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Channel {
    id: u64,
    state: Mutex<ChannelState>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    fn opening(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(ChannelState::Opening),
            pump: Mutex::new(None),
        }
    }

    fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    fn set_closed(&self) {
        *lock(&self.state) = ChannelState::Closed;
    }

    /// Opening -> Open. Fails if the channel was closed while opening.
    fn try_open(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == ChannelState::Opening {
            *state = ChannelState::Open;
            true
        } else {
            false
        }
    }

    fn close(&self) {
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
        let mut state = lock(&self.state);
        if *state != ChannelState::Closed {
            tracing::debug!("Closing insert channel {}", self.id);
            *state = ChannelState::Closed;
        }
    }
}

/// Handle to an insert subscription. Dropping it closes the channel.
pub struct Subscription {
    channel: Arc<Channel>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.channel.id
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.channel.id)
            .field("state", &self.channel.state())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.channel.close();
    }
}

struct Shared {
    projection: Mutex<MessageProjection>,
    disposed: AtomicBool,
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn projection(&self) -> MutexGuard<'_, MessageProjection> {
        lock(&self.projection)
    }
}

/// Bridges one conversation view to the message and object stores. Owns the
/// viewer's projection for the lifetime of the view.
pub struct ConversationAdapter {
    viewer: Uuid,
    store: Arc<dyn MessageStore>,
    objects: Arc<dyn ObjectStore>,
    shared: Arc<Shared>,
    active: Mutex<Option<Arc<Channel>>>,
    next_channel: AtomicU64,
    max_attachment_bytes: usize,
}

impl ConversationAdapter {
    pub fn new(viewer: Uuid, store: Arc<dyn MessageStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            viewer,
            store,
            objects,
            shared: Arc::new(Shared {
                projection: Mutex::new(MessageProjection::new(viewer)),
                disposed: AtomicBool::new(false),
            }),
            active: Mutex::new(None),
            next_channel: AtomicU64::new(1),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }

    pub fn with_attachment_limit(mut self, max_bytes: usize) -> Self {
        self.max_attachment_bytes = max_bytes;
        self
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.projection().messages().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.shared.projection().unread_count()
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.shared.projection().conversations()
    }

    pub fn channel_state(&self) -> ChannelState {
        lock(&self.active)
            .as_ref()
            .map(|channel| channel.state())
            .unwrap_or(ChannelState::Closed)
    }

    /// Fetches the viewer's messages and merges them into the projection.
    pub async fn load_history(&self) -> Result<Vec<Message>> {
        let fetched = self
            .store
            .messages_involving(self.viewer)
            .await
            .map_err(|e| AppError::Fetch(e.to_string()))?;

        if self.shared.is_disposed() {
            tracing::debug!("History for {} arrived after teardown; ignoring", self.viewer);
            return Ok(fetched);
        }

        let mut projection = self.shared.projection();
        let inserted = projection.merge(fetched);
        tracing::debug!(
            "Loaded history for {}: {} new, {} total",
            self.viewer,
            inserted,
            projection.len()
        );

        Ok(projection.messages().to_vec())
    }

    /// Opens the insert feed and starts reconciling deliveries into the
    /// projection. Replaces any subscription this adapter already holds.
    pub async fn subscribe(&self, events: EventSender) -> Subscription {
        let channel = Arc::new(Channel::opening(
            self.next_channel.fetch_add(1, Ordering::SeqCst),
        ));

        if let Some(previous) = lock(&self.active).replace(channel.clone()) {
            previous.close();
        }

        let subscription = Subscription {
            channel: channel.clone(),
        };

        if self.shared.is_disposed() {
            channel.set_closed();
            return subscription;
        }

        let feed = match self.store.subscribe_inserts().await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!("Insert channel {} failed to open: {}", channel.id, e);
                channel.set_closed();
                let _ = events.send(ConversationEvent::ConnectionLost {
                    reason: e.to_string(),
                });
                return subscription;
            }
        };

        if !channel.try_open() {
            return subscription;
        }

        tracing::debug!("Insert channel {} open for {}", channel.id, self.viewer);
        let pump = tokio::spawn(pump_inserts(
            feed,
            self.shared.clone(),
            channel.clone(),
            events,
        ));
        {
            let mut slot = lock(&channel.pump);
            if channel.state() == ChannelState::Closed {
                pump.abort();
            } else {
                *slot = Some(pump);
            }
        }

        subscription
    }

    /// Releases the channel. Safe to call any number of times.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.channel.close();
        let mut active = lock(&self.active);
        if active
            .as_ref()
            .is_some_and(|channel| Arc::ptr_eq(channel, &subscription.channel))
        {
            *active = None;
        }
    }

    /// Single teardown path for the view.
    pub fn dispose(&self) {
        self.shared.disposed.store(true, Ordering::SeqCst);
        if let Some(channel) = lock(&self.active).take() {
            channel.close();
        }
    }

    pub async fn send(
        &self,
        receiver_id: Uuid,
        content: &str,
        category: MessageCategory,
        attachment: Option<&AttachmentRef>,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("Message content cannot be empty".into()));
        }
        if receiver_id == self.viewer {
            return Err(AppError::Validation("Choose a recipient other than yourself".into()));
        }

        let created = self
            .store
            .insert(NewMessage {
                sender_id: self.viewer,
                receiver_id,
                content: content.to_string(),
                category,
                attachment: attachment.map(|a| a.path.clone()),
            })
            .await
            .map_err(|e| AppError::Send(e.to_string()))?;

        tracing::info!(
            "Message {} sent from {} to {} ({})",
            created.id,
            created.sender_id,
            created.receiver_id,
            created.category
        );

        // Server-confirmed; the feed delivery of the same id will be a duplicate.
        if !self.shared.is_disposed() {
            self.shared.projection().reconcile(created.clone());
        }

        Ok(created)
    }

    /// Marks a received message as read. Returns the updated message, or
    /// `None` when it was already read and nothing changed.
    pub async fn mark_read(&self, message_id: Uuid) -> Result<Option<Message>> {
        let known = self.shared.projection().get(message_id).cloned();
        let message = match known {
            Some(message) => message,
            None => self
                .store
                .find_by_id(message_id)
                .await
                .map_err(|e| AppError::Fetch(e.to_string()))?
                .ok_or_else(|| AppError::NotFound("Message not found".into()))?,
        };

        if message.receiver_id != self.viewer {
            return Err(AppError::Authorization(
                "Only the receiver can mark a message as read".into(),
            ));
        }
        if message.read {
            return Ok(None);
        }

        let updated = self
            .store
            .mark_read(message_id, self.viewer)
            .await
            .map_err(|e| AppError::Send(e.to_string()))?
            .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

        if !self.shared.is_disposed() {
            self.shared.projection().mark_read(message_id);
        }

        Ok(Some(updated))
    }

    pub async fn mark_conversation_read(&self, counterpart: Uuid) -> Result<u64> {
        let updated = self
            .store
            .mark_all_read(self.viewer, counterpart)
            .await
            .map_err(|e| AppError::Send(e.to_string()))?;

        if !self.shared.is_disposed() {
            self.shared.projection().mark_read_from(counterpart);
        }

        Ok(updated)
    }

    /// Applies a read receipt produced by the receiver's session.
    pub fn apply_remote_read(&self, message_id: Uuid) -> bool {
        if self.shared.is_disposed() {
            return false;
        }
        self.shared.projection().mark_read(message_id)
    }

    /// Stores bytes under the conversation's prefix. Does not send anything.
    pub async fn attach_file(
        &self,
        key: ConversationKey,
        upload: AttachmentUpload,
    ) -> Result<AttachmentRef> {
        if key.viewer != self.viewer {
            return Err(AppError::Authorization(
                "Attachments can only be stored under your own conversations".into(),
            ));
        }
        let file_name = sanitize_file_name(&upload.file_name)?;
        if upload.bytes.is_empty() {
            return Err(AppError::Validation("Attachment is empty".into()));
        }
        if upload.bytes.len() > self.max_attachment_bytes {
            return Err(AppError::Validation(format!(
                "Attachment exceeds {} bytes",
                self.max_attachment_bytes
            )));
        }

        let path = format!("{}/{}-{}", key.storage_prefix(), Uuid::new_v4(), file_name);
        let stored = self
            .objects
            .put(&path, &upload.bytes)
            .await
            .map_err(|e| match e {
                AppError::Storage(_) => e,
                other => AppError::Storage(other.to_string()),
            })?;

        let content_type = upload
            .content_type
            .filter(|t| !t.trim().is_empty())
            .or_else(|| guess_content_type(&file_name).map(str::to_string));

        Ok(AttachmentRef {
            path: stored.path,
            file_name,
            content_type,
            size: stored.size,
        })
    }

    pub async fn fetch_attachment(&self, path: &str) -> Result<Vec<u8>> {
        if !attachment_visible_to(path, self.viewer) {
            return Err(AppError::Authorization("Attachment belongs to another conversation".into()));
        }

        self.objects
            .get(path)
            .await?
            .ok_or_else(|| AppError::NotFound("Attachment not found".into()))
    }
}

impl Drop for ConversationAdapter {
    fn drop(&mut self) {
        if let Some(channel) = lock(&self.active).take() {
            channel.close();
        }
    }
}

async fn pump_inserts(
    mut feed: InsertFeed,
    shared: Arc<Shared>,
    channel: Arc<Channel>,
    events: EventSender,
) {
    while let Some(item) = feed.next().await {
        let message = match item {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Insert channel {} dropped: {}", channel.id, e);
                channel.set_closed();
                let _ = events.send(ConversationEvent::ConnectionLost {
                    reason: e.to_string(),
                });
                return;
            }
        };

        if shared.is_disposed() {
            channel.set_closed();
            return;
        }

        let outcome = shared.projection().reconcile(message.clone());
        match outcome {
            Reconciled::Inserted(position) => {
                if events
                    .send(ConversationEvent::Inserted { message, position })
                    .is_err()
                {
                    // View is gone.
                    channel.set_closed();
                    return;
                }
            }
            Reconciled::Duplicate => {
                tracing::debug!("Dropping duplicate delivery of {}", message.id);
            }
            Reconciled::Foreign => {}
        }
    }

    tracing::warn!("Insert feed for channel {} ended", channel.id);
    channel.set_closed();
    let _ = events.send(ConversationEvent::ConnectionLost {
        reason: "notification feed closed".into(),
    });
}

/// Keeps the last path segment, replaces whitespace and checks the extension.
pub fn sanitize_file_name(raw: &str) -> Result<String> {
    let base = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base.starts_with('.') {
        return Err(AppError::Validation(format!("Invalid file name: {:?}", raw)));
    }

    let extension = base
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::Validation(format!(
            "Unsupported file type; allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    Ok(base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect())
}

pub fn guess_content_type(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        _ => None,
    }
}

/// Attachment paths start with the two participant ids.
pub fn attachment_visible_to(path: &str, viewer: Uuid) -> bool {
    let mut segments = path.split('/');
    let first = segments.next().and_then(|s| Uuid::parse_str(s).ok());
    let second = segments.next().and_then(|s| Uuid::parse_str(s).ok());
    let has_file = segments.next().is_some_and(|s| !s.is_empty());

    match (first, second) {
        (Some(a), Some(b)) if has_file => a == viewer || b == viewer,
        _ => false,
    }
}
