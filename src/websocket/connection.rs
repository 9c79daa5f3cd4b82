use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::WsMessage;

pub type WsSender = mpsc::UnboundedSender<WsMessage>;

/// Live socket connections keyed by user. A user stays online while at least
/// one of their connections is open.
#[derive(Clone)]
pub struct PresenceRegistry {
    connections: Arc<DashMap<Uuid, Vec<(u64, WsSender)>>>,
    next_id: Arc<AtomicU64>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers a connection; returns its id and whether the user just came online.
    pub fn connect(&self, user_id: Uuid, sender: WsSender) -> (u64, bool) {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.connections.entry(user_id).or_default();
        let came_online = entry.is_empty();
        entry.push((connection_id, sender));
        tracing::info!("User {} connected via WebSocket ({})", user_id, connection_id);
        (connection_id, came_online)
    }

    /// Removes a connection; returns true when it was the user's last one.
    pub fn disconnect(&self, user_id: &Uuid, connection_id: u64) -> bool {
        let went_offline = match self.connections.get_mut(user_id) {
            Some(mut entry) => {
                entry.retain(|(id, _)| *id != connection_id);
                entry.is_empty()
            }
            None => false,
        };
        if went_offline {
            self.connections.remove_if(user_id, |_, senders| senders.is_empty());
        }
        tracing::info!("User {} disconnected from WebSocket ({})", user_id, connection_id);
        went_offline
    }

    /// Sends to every connection of a user; false if none accepted it.
    pub fn send_to_user(&self, user_id: &Uuid, message: WsMessage) -> bool {
        match self.connections.get(user_id) {
            Some(entry) => entry
                .iter()
                .fold(false, |sent, (_, sender)| sender.send(message.clone()).is_ok() || sent),
            None => false,
        }
    }

    pub fn broadcast(&self, message: WsMessage) {
        for entry in self.connections.iter() {
            for (_, sender) in entry.value() {
                let _ = sender.send(message.clone());
            }
        }
    }

    pub fn is_online(&self, user_id: &Uuid) -> bool {
        self.connections
            .get(user_id)
            .is_some_and(|entry| !entry.is_empty())
    }

    pub fn online_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
