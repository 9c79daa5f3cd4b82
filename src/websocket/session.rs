use uuid::Uuid;

use super::{
    connection::{PresenceRegistry, WsSender},
    types::{
        ChatMessagePayload, ClientMessage, ErrorPayload, HistoryPayload, MessageReadPayload,
        SendFailedPayload, TypingIndicatorPayload, WsMessage,
    },
};
use crate::{
    conversation::{adapter::attachment_visible_to, ChatViewModel, ConversationEvent, EventSender, Subscription},
    error::{AppError, Result},
};

/// One socket's chat view: a view model over its own adapter, plus the
/// presence registry for frames addressed to other participants.
pub struct ChatSession {
    user_id: Uuid,
    view: ChatViewModel,
    presence: PresenceRegistry,
    outbound: WsSender,
    events: Option<EventSender>,
    subscription: Option<Subscription>,
}

impl ChatSession {
    pub fn new(view: ChatViewModel, presence: PresenceRegistry, outbound: WsSender) -> Self {
        Self {
            user_id: view.adapter().viewer(),
            view,
            presence,
            outbound,
            events: None,
            subscription: None,
        }
    }

    /// Subscribes, loads history and sends the opening `history` frame. A
    /// failed load is reported with an `error` frame; the session stays usable.
    pub async fn open(&mut self, events: EventSender) {
        let subscription = self.view.open(events.clone()).await;
        self.events = Some(events);
        tracing::debug!("Chat session for {} on channel {}", self.user_id, subscription.id());
        self.subscription = Some(subscription);

        if let Some(error) = self.view.last_error.clone() {
            self.push(WsMessage::Error(ErrorPayload { message: error }));
        }
        self.push_history();
    }

    fn push(&self, frame: WsMessage) {
        let _ = self.outbound.send(frame);
    }

    fn push_history(&self) {
        self.push(WsMessage::History(HistoryPayload {
            messages: self.view.visible_messages(),
            unread_count: self.view.adapter().unread_count(),
        }));
    }

    /// Relays an adapter event to the socket.
    pub fn on_event(&mut self, event: ConversationEvent) {
        self.view.apply(&event);
        match event {
            ConversationEvent::Inserted { message, position } => {
                self.push(WsMessage::ChatMessage(ChatMessagePayload { message, position }));
            }
            ConversationEvent::ConnectionLost { reason } => {
                self.push(WsMessage::ConnectionLost(ErrorPayload { message: reason }));
            }
        }
    }

    /// Frames other sessions addressed to this user. Read receipts update
    /// the projection before they are relayed.
    pub fn on_presence(&mut self, frame: WsMessage) {
        if let WsMessage::MessageRead(receipt) = &frame {
            self.view.adapter().apply_remote_read(receipt.message_id);
        }
        self.push(frame);
    }

    pub async fn handle(&mut self, frame: ClientMessage) -> Result<()> {
        match frame {
            ClientMessage::SendMessage {
                receiver_id,
                content,
                category,
                attachment,
            } => {
                if let Some(attachment) = &attachment {
                    if !attachment_visible_to(&attachment.path, self.user_id) {
                        return Err(AppError::Authorization(
                            "Attachment belongs to another conversation".into(),
                        ));
                    }
                }

                self.view.recipient = Some(receiver_id);
                self.view.draft = content;
                self.view.category = category;
                self.view.pending_attachment = attachment;

                match self.view.submit().await {
                    Ok(message) => {
                        // The feed copy of this id is a duplicate for our own
                        // projection, so the sender hears about it here.
                        let position = self
                            .view
                            .adapter()
                            .messages()
                            .iter()
                            .position(|m| m.id == message.id)
                            .unwrap_or_default();
                        self.push(WsMessage::ChatMessage(ChatMessagePayload { message, position }));
                    }
                    Err(e) => {
                        tracing::warn!("Send from {} failed: {}", self.user_id, e);
                        self.push(WsMessage::SendFailed(SendFailedPayload {
                            error: e.to_string(),
                            retryable: e.is_retryable(),
                            receiver_id,
                            draft: self.view.draft.clone(),
                            category: self.view.category,
                            attachment: self.view.pending_attachment.clone(),
                        }));
                    }
                }
            }
            ClientMessage::Search { term } => {
                self.view.search = term;
                self.push_history();
            }
            ClientMessage::Resubscribe => self.resubscribe().await,
            ClientMessage::MarkRead { message_id } => {
                if let Some(message) = self.view.adapter().mark_read(message_id).await? {
                    self.send_receipt(message_id, Some(message.sender_id));
                }
            }
            ClientMessage::MarkConversationRead { conversation_with } => {
                let unread: Vec<Uuid> = self
                    .view
                    .adapter()
                    .messages()
                    .into_iter()
                    .filter(|m| {
                        !m.read && m.sender_id == conversation_with && m.receiver_id == self.user_id
                    })
                    .map(|m| m.id)
                    .collect();

                let updated = self
                    .view
                    .adapter()
                    .mark_conversation_read(conversation_with)
                    .await?;
                tracing::debug!(
                    "{} marked {} messages from {} as read",
                    self.user_id,
                    updated,
                    conversation_with
                );
                for message_id in unread {
                    self.send_receipt(message_id, Some(conversation_with));
                }
            }
            ClientMessage::TypingIndicator {
                conversation_with,
                is_typing,
            } => {
                self.presence.send_to_user(
                    &conversation_with,
                    WsMessage::TypingIndicator(TypingIndicatorPayload {
                        user_id: self.user_id,
                        is_typing,
                        conversation_with,
                    }),
                );
            }
        }

        Ok(())
    }

    /// Reopens the live feed after `connection_lost` and refetches history.
    /// A closed session stays closed.
    async fn resubscribe(&mut self) {
        let Some(events) = self.events.clone() else {
            return;
        };
        if self.subscription.is_none() {
            return;
        }

        let (subscription, reloaded) = self.view.resubscribe(events).await;
        tracing::debug!(
            "Chat session for {} resubscribed on channel {}",
            self.user_id,
            subscription.id()
        );
        self.subscription = Some(subscription);

        if let Err(e) = reloaded {
            self.push(WsMessage::Error(ErrorPayload {
                message: e.to_string(),
            }));
        }
        self.push_history();
    }

    fn send_receipt(&self, message_id: Uuid, sender: Option<Uuid>) {
        let receipt = WsMessage::MessageRead(MessageReadPayload {
            message_id,
            read_by: self.user_id,
        });
        if let Some(sender) = sender {
            self.presence.send_to_user(&sender, receipt.clone());
        }
        self.push(receipt);
    }

    /// Unsubscribes and disposes the view. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.view.close(&subscription);
            tracing::debug!("Chat session for {} closed", self.user_id);
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ChannelState, ConversationAdapter};
    use crate::message::message_models::{Message, MessageCategory};
    use crate::store::{memory_store::MemoryMessageStore, LocalObjectStore};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Harness {
        session: ChatSession,
        frames: UnboundedReceiver<WsMessage>,
        events: UnboundedReceiver<ConversationEvent>,
        store: Arc<MemoryMessageStore>,
        presence: PresenceRegistry,
        user: Uuid,
        peer: Uuid,
        _dir: tempfile::TempDir,
    }

    fn incoming(sender: Uuid, receiver: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            content: "Results are in".into(),
            category: MessageCategory::Routine,
            attachment: None,
            read: false,
            created_at: Utc::now() - Duration::minutes(5),
        }
    }

    async fn harness(seed: impl FnOnce(&MemoryMessageStore, Uuid, Uuid)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryMessageStore::new());
        let user = Uuid::new_v4();
        let peer = Uuid::new_v4();
        seed(&store, user, peer);

        let adapter = ConversationAdapter::new(
            user,
            store.clone(),
            Arc::new(LocalObjectStore::new(dir.path())),
        );
        let presence = PresenceRegistry::new();
        let (out_tx, frames) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        let mut session = ChatSession::new(ChatViewModel::new(adapter), presence.clone(), out_tx);
        session.open(event_tx).await;

        Harness {
            session,
            frames,
            events,
            store,
            presence,
            user,
            peer,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_open_sends_history_frame() {
        let mut h = harness(|store, user, peer| store.seed(incoming(peer, user))).await;

        match h.frames.try_recv().unwrap() {
            WsMessage::History(history) => {
                assert_eq!(history.messages.len(), 1);
                assert_eq!(history.unread_count, 1);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_send_returns_the_draft() {
        let mut h = harness(|_, _, _| {}).await;
        let _ = h.frames.try_recv();
        h.store.set_offline(true);

        h.session
            .handle(ClientMessage::SendMessage {
                receiver_id: h.peer,
                content: "Chest pain since this morning".into(),
                category: MessageCategory::Urgent,
                attachment: None,
            })
            .await
            .unwrap();

        match h.frames.try_recv().unwrap() {
            WsMessage::SendFailed(failed) => {
                assert_eq!(failed.draft, "Chest pain since this morning");
                assert_eq!(failed.category, MessageCategory::Urgent);
                assert_eq!(failed.receiver_id, h.peer);
                assert!(failed.retryable);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_successful_send_is_echoed_once() {
        let mut h = harness(|_, _, _| {}).await;
        let _ = h.frames.try_recv();

        h.session
            .handle(ClientMessage::SendMessage {
                receiver_id: h.peer,
                content: "See you Tuesday".into(),
                category: MessageCategory::Administrative,
                attachment: None,
            })
            .await
            .unwrap();

        match h.frames.try_recv().unwrap() {
            WsMessage::ChatMessage(chat) => {
                assert_eq!(chat.message.content, "See you Tuesday");
                assert_eq!(chat.position, 0);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(h.session.view.adapter().messages().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_notifies_the_sender() {
        let message = Arc::new(std::sync::Mutex::new(None));
        let seeded = message.clone();
        let mut h = harness(move |store, user, peer| {
            let m = incoming(peer, user);
            *seeded.lock().unwrap() = Some(m.id);
            store.seed(m);
        })
        .await;
        let message_id = message.lock().unwrap().unwrap();

        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        h.presence.connect(h.peer, peer_tx);

        h.session
            .handle(ClientMessage::MarkRead { message_id })
            .await
            .unwrap();

        match peer_rx.try_recv().unwrap() {
            WsMessage::MessageRead(receipt) => {
                assert_eq!(receipt.message_id, message_id);
                assert_eq!(receipt.read_by, h.user);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(h.session.view.adapter().unread_count(), 0);

        // Already read: nothing new to announce.
        while h.frames.try_recv().is_ok() {}
        h.session
            .handle(ClientMessage::MarkRead { message_id })
            .await
            .unwrap();
        assert!(peer_rx.try_recv().is_err());
        assert!(h.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remote_receipt_updates_projection() {
        let mut h = harness(|_, _, _| {}).await;
        let sent = h
            .session
            .view
            .adapter()
            .send(h.peer, "Take with food", MessageCategory::Routine, None)
            .await
            .unwrap();

        h.session.on_presence(WsMessage::MessageRead(MessageReadPayload {
            message_id: sent.id,
            read_by: h.peer,
        }));

        let messages = h.session.view.adapter().messages();
        assert!(messages[0].read);
    }

    #[tokio::test]
    async fn test_search_only_filters() {
        let mut h = harness(|store, user, peer| store.seed(incoming(peer, user))).await;
        let _ = h.frames.try_recv();
        let calls = h.store.calls();

        h.session
            .handle(ClientMessage::Search {
                term: "nothing like this".into(),
            })
            .await
            .unwrap();

        match h.frames.try_recv().unwrap() {
            WsMessage::History(history) => {
                assert!(history.messages.is_empty());
                assert_eq!(history.unread_count, 1);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(h.store.calls(), calls);
    }

    #[tokio::test]
    async fn test_resubscribe_after_feed_loss_resumes_live_inserts() {
        let mut h = harness(|_, _, _| {}).await;
        let _ = h.frames.try_recv();

        h.store.close_feed();
        let lost = tokio::time::timeout(std::time::Duration::from_secs(2), h.events.recv())
            .await
            .unwrap()
            .unwrap();
        h.session.on_event(lost);
        assert!(matches!(h.frames.try_recv().unwrap(), WsMessage::ConnectionLost(_)));

        let missed = incoming(h.peer, h.user);
        h.store.seed(missed.clone());
        h.session.handle(ClientMessage::Resubscribe).await.unwrap();

        match h.frames.try_recv().unwrap() {
            WsMessage::History(history) => {
                assert_eq!(history.messages.len(), 1);
                assert_eq!(history.messages[0].id, missed.id);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert!(h.session.view.last_error.is_none());
        assert_eq!(h.session.view.adapter().channel_state(), ChannelState::Open);

        let live = Message {
            created_at: Utc::now(),
            ..incoming(h.peer, h.user)
        };
        h.store.publish(live.clone());
        let event = tokio::time::timeout(std::time::Duration::from_secs(2), h.events.recv())
            .await
            .unwrap()
            .unwrap();
        h.session.on_event(event);

        match h.frames.try_recv().unwrap() {
            WsMessage::ChatMessage(chat) => {
                assert_eq!(chat.message.id, live.id);
                assert_eq!(chat.position, 1);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_typing_is_routed_to_counterpart() {
        let mut h = harness(|_, _, _| {}).await;
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        h.presence.connect(h.peer, peer_tx);

        h.session
            .handle(ClientMessage::TypingIndicator {
                conversation_with: h.peer,
                is_typing: true,
            })
            .await
            .unwrap();

        match peer_rx.try_recv().unwrap() {
            WsMessage::TypingIndicator(typing) => {
                assert_eq!(typing.user_id, h.user);
                assert!(typing.is_typing);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_feed_loss_is_surfaced_and_close_is_idempotent() {
        let mut h = harness(|_, _, _| {}).await;
        let _ = h.frames.try_recv();

        h.store.close_feed();
        let event = tokio::time::timeout(std::time::Duration::from_secs(2), h.events.recv())
            .await
            .unwrap()
            .unwrap();
        h.session.on_event(event);

        assert!(matches!(h.frames.try_recv().unwrap(), WsMessage::ConnectionLost(_)));
        assert!(h.session.view.last_error.is_some());

        h.session.close();
        h.session.close();
        assert_eq!(h.session.view.adapter().channel_state(), ChannelState::Closed);
        assert!(h.session.view.adapter().is_disposed());
    }
}
