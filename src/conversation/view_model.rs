use uuid::Uuid;

use super::adapter::{ConversationAdapter, ConversationEvent, EventSender, Subscription};
use crate::{
    error::{AppError, Result},
    message::message_models::{AttachmentRef, AttachmentUpload, ConversationKey, Message, MessageCategory},
};

/// Composer and filter state of one chat view, layered over its adapter.
pub struct ChatViewModel {
    adapter: ConversationAdapter,
    pub draft: String,
    pub category: MessageCategory,
    pub recipient: Option<Uuid>,
    pub search: String,
    pub pending_attachment: Option<AttachmentRef>,
    pub last_error: Option<String>,
}

impl ChatViewModel {
    pub fn new(adapter: ConversationAdapter) -> Self {
        Self {
            adapter,
            draft: String::new(),
            category: MessageCategory::default(),
            recipient: None,
            search: String::new(),
            pending_attachment: None,
            last_error: None,
        }
    }

    pub fn adapter(&self) -> &ConversationAdapter {
        &self.adapter
    }

    /// Opens the live feed, then loads history. Inserts committed while the
    /// history query runs arrive on the feed and are merged with it. A failed
    /// load leaves the view in its error state with the feed still open.
    pub async fn open(&mut self, events: EventSender) -> Subscription {
        let subscription = self.adapter.subscribe(events).await;
        if let Err(e) = self.adapter.load_history().await {
            tracing::warn!("History unavailable for {}: {}", self.adapter.viewer(), e);
            self.last_error = Some(e.to_string());
        }
        subscription
    }

    /// Replaces the live feed after a loss and refetches history, in the same
    /// order as `open`.
    pub async fn resubscribe(&mut self, events: EventSender) -> (Subscription, Result<()>) {
        let subscription = self.adapter.subscribe(events).await;
        let reloaded = self.reload().await;
        if let Err(e) = &reloaded {
            self.last_error = Some(e.to_string());
        }
        (subscription, reloaded)
    }

    /// Refetches history and clears the error state on success.
    pub async fn reload(&mut self) -> Result<()> {
        self.adapter.load_history().await?;
        self.last_error = None;
        Ok(())
    }

    pub fn apply(&mut self, event: &ConversationEvent) {
        if let ConversationEvent::ConnectionLost { reason } = event {
            self.last_error = Some(format!("Live updates paused: {}", reason));
        }
    }

    /// Sends the draft. Draft and attachment are cleared only once the store
    /// confirms the message.
    pub async fn submit(&mut self) -> Result<Message> {
        let recipient = self
            .recipient
            .ok_or_else(|| AppError::Validation("Select a recipient first".into()))?;

        let sent = self
            .adapter
            .send(
                recipient,
                &self.draft,
                self.category,
                self.pending_attachment.as_ref(),
            )
            .await;

        match sent {
            Ok(message) => {
                self.draft.clear();
                self.pending_attachment = None;
                self.last_error = None;
                Ok(message)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Uploads a file for the current recipient and holds it for the next
    /// submit.
    pub async fn attach(&mut self, upload: AttachmentUpload) -> Result<AttachmentRef> {
        let recipient = self
            .recipient
            .ok_or_else(|| AppError::Validation("Select a recipient first".into()))?;
        let key = ConversationKey::new(self.adapter.viewer(), recipient);

        match self.adapter.attach_file(key, upload).await {
            Ok(reference) => {
                self.pending_attachment = Some(reference.clone());
                Ok(reference)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Projection filtered by the search term, case-insensitively.
    pub fn visible_messages(&self) -> Vec<Message> {
        let term = self.search.trim().to_lowercase();
        let messages = self.adapter.messages();
        if term.is_empty() {
            return messages;
        }
        messages
            .into_iter()
            .filter(|m| m.content.to_lowercase().contains(&term))
            .collect()
    }

    pub fn close(&self, subscription: &Subscription) {
        self.adapter.unsubscribe(subscription);
        self.adapter.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::adapter::ChannelState;
    use crate::store::{memory_store::MemoryMessageStore, LocalObjectStore};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn view() -> (ChatViewModel, Arc<MemoryMessageStore>, Uuid, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryMessageStore::new());
        let adapter = ConversationAdapter::new(
            Uuid::new_v4(),
            store.clone(),
            Arc::new(LocalObjectStore::new(dir.path())),
        );
        (ChatViewModel::new(adapter), store, Uuid::new_v4(), dir)
    }

    #[tokio::test]
    async fn test_failed_submit_preserves_draft() {
        let (mut vm, store, peer, _dir) = view();
        vm.recipient = Some(peer);
        vm.draft = "BP 180/110, please advise".into();
        vm.category = MessageCategory::Urgent;
        store.set_offline(true);

        assert!(vm.submit().await.is_err());
        assert_eq!(vm.draft, "BP 180/110, please advise");
        assert!(vm.last_error.is_some());

        store.set_offline(false);
        let sent = vm.submit().await.unwrap();
        assert_eq!(sent.category, MessageCategory::Urgent);
        assert!(vm.draft.is_empty());
        assert!(vm.last_error.is_none());
    }

    #[tokio::test]
    async fn test_submit_without_recipient_is_a_validation_error() {
        let (mut vm, store, _peer, _dir) = view();
        vm.draft = "hello".into();

        let err = vm.submit().await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.calls(), 0);
        assert_eq!(vm.draft, "hello");
    }

    #[tokio::test]
    async fn test_attachment_is_sent_with_next_submit_only() {
        let (mut vm, store, peer, _dir) = view();
        vm.recipient = Some(peer);

        let reference = vm
            .attach(AttachmentUpload {
                file_name: "ecg.pdf".into(),
                content_type: Some("application/pdf".into()),
                bytes: b"%PDF".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(store.insert_calls(), 0);
        assert_eq!(vm.pending_attachment.as_ref(), Some(&reference));

        vm.draft = "ECG attached".into();
        let sent = vm.submit().await.unwrap();

        assert_eq!(sent.attachment.as_deref(), Some(reference.path.as_str()));
        assert!(vm.pending_attachment.is_none());
    }

    #[tokio::test]
    async fn test_search_filters_visible_messages() {
        let (mut vm, _store, peer, _dir) = view();
        vm.recipient = Some(peer);
        for text in ["Potassium is low", "Discharge at noon", "Recheck potassium"] {
            vm.draft = text.into();
            vm.submit().await.unwrap();
        }

        vm.search = "POTASSIUM".into();
        let visible: Vec<_> = vm.visible_messages().into_iter().map(|m| m.content).collect();

        assert_eq!(visible, vec!["Potassium is low", "Recheck potassium"]);
    }

    #[tokio::test]
    async fn test_open_records_history_failure_without_blocking() {
        let (mut vm, store, _peer, _dir) = view();
        store.set_offline(true);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = vm.open(tx).await;

        assert!(vm.last_error.is_some());
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ConversationEvent::ConnectionLost { .. }));
        assert_eq!(subscription.state(), ChannelState::Closed);

        store.set_offline(false);
        vm.reload().await.unwrap();
        assert!(vm.last_error.is_none());
    }

    #[tokio::test]
    async fn test_insert_committed_during_history_fetch_reaches_the_view() {
        let (mut vm, store, peer, _dir) = view();
        let viewer = vm.adapter().viewer();
        let late = Message {
            id: Uuid::new_v4(),
            sender_id: peer,
            receiver_id: viewer,
            content: "Lab results just posted".into(),
            category: MessageCategory::Urgent,
            attachment: None,
            read: false,
            created_at: chrono::Utc::now(),
        };
        store.commit_after_next_snapshot(late.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _subscription = vm.open(tx).await;

        let event = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            ConversationEvent::Inserted { message, position } => {
                assert_eq!(message.id, late.id);
                assert_eq!(position, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(store.stored(late.id).is_some());
        let ids: Vec<_> = vm.adapter().messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![late.id]);
    }

    #[tokio::test]
    async fn test_resubscribe_after_feed_loss_resumes_inserts() {
        let (mut vm, store, peer, _dir) = view();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = vm.open(tx.clone()).await;

        store.close_feed();
        let lost = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        vm.apply(&lost);
        assert!(vm.last_error.is_some());
        assert_eq!(first.state(), ChannelState::Closed);

        let (second, reloaded) = vm.resubscribe(tx).await;
        assert!(reloaded.is_ok());
        assert!(vm.last_error.is_none());
        assert_eq!(second.state(), ChannelState::Open);

        let viewer = vm.adapter().viewer();
        let reply = Message {
            id: Uuid::new_v4(),
            sender_id: peer,
            receiver_id: viewer,
            content: "Back online".into(),
            category: MessageCategory::Routine,
            attachment: None,
            read: false,
            created_at: chrono::Utc::now(),
        };
        store.publish(reply.clone());

        match tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            ConversationEvent::Inserted { message, .. } => assert_eq!(message.id, reply.id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_unsubscribes_and_disposes() {
        let (mut vm, _store, _peer, _dir) = view();
        let (tx, _rx) = mpsc::unbounded_channel();

        let subscription = vm.open(tx).await;
        assert_eq!(subscription.state(), ChannelState::Open);

        vm.close(&subscription);

        assert_eq!(subscription.state(), ChannelState::Closed);
        assert!(vm.adapter().is_disposed());
    }
}
