use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::message::{message_dto::ConversationSummary, message_models::Message};

/// Outcome of merging one delivered message into a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Accepted at this index of the ordered list.
    Inserted(usize),
    /// Already present; at-least-once delivery.
    Duplicate,
    /// Neither sender nor receiver is the viewer.
    Foreign,
}

/// The viewer's ordered, de-duplicated view of the message store.
///
/// Sorted by `(created_at, id)` at all times.
#[derive(Debug, Clone)]
pub struct MessageProjection {
    viewer: Uuid,
    messages: Vec<Message>,
    ids: HashSet<Uuid>,
}

impl MessageProjection {
    pub fn new(viewer: Uuid) -> Self {
        Self {
            viewer,
            messages: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    pub fn reconcile(&mut self, message: Message) -> Reconciled {
        if !message.involves(self.viewer) {
            return Reconciled::Foreign;
        }
        if self.ids.contains(&message.id) {
            return Reconciled::Duplicate;
        }

        let key = message.order_key();
        let position = self.messages.partition_point(|m| m.order_key() < key);
        self.ids.insert(message.id);
        self.messages.insert(position, message);

        Reconciled::Inserted(position)
    }

    /// Reconciles a batch; returns how many were inserted.
    pub fn merge<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let mut inserted = 0;
        for message in batch {
            if let Reconciled::Inserted(_) = self.reconcile(message) {
                inserted += 1;
            }
        }
        inserted
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Returns true when the flag changed.
    pub fn mark_read(&mut self, id: Uuid) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) if !message.read => {
                message.read = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_read_from(&mut self, sender: Uuid) -> usize {
        let viewer = self.viewer;
        let mut changed = 0;
        for message in self
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == sender && m.receiver_id == viewer && !m.read)
        {
            message.read = true;
            changed += 1;
        }
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.receiver_id == self.viewer && !m.read)
            .count()
    }

    /// One entry per counterpart, most recent conversation first.
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        let mut by_counterpart: HashMap<Uuid, ConversationSummary> = HashMap::new();

        for message in &self.messages {
            let counterpart = message.counterpart(self.viewer);
            let unread = (message.receiver_id == self.viewer && !message.read) as i64;
            by_counterpart
                .entry(counterpart)
                .and_modify(|summary| {
                    summary.last_message = message.content.clone();
                    summary.last_message_at = message.created_at;
                    summary.unread_count += unread;
                })
                .or_insert_with(|| ConversationSummary {
                    counterpart_id: counterpart,
                    last_message: message.content.clone(),
                    last_message_at: message.created_at,
                    unread_count: unread,
                });
        }

        let mut summaries: Vec<_> = by_counterpart.into_values().collect();
        summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        summaries
    }
}
