use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::message::message_models::{AttachmentRef, Message, MessageCategory};

// Server-to-client frames
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    History(HistoryPayload),
    ChatMessage(ChatMessagePayload),
    MessageRead(MessageReadPayload),
    SendFailed(SendFailedPayload),
    TypingIndicator(TypingIndicatorPayload),
    UserStatus(UserStatusPayload),
    ConnectionLost(ErrorPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryPayload {
    pub messages: Vec<Message>,
    pub unread_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessagePayload {
    pub message: Message,
    /// Index in the viewer's ordered list.
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageReadPayload {
    pub message_id: Uuid,
    pub read_by: Uuid,
}

/// Carries the unsent draft back so the client can retry without retyping.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendFailedPayload {
    pub error: String,
    pub retryable: bool,
    pub receiver_id: Uuid,
    pub draft: String,
    pub category: MessageCategory,
    pub attachment: Option<AttachmentRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TypingIndicatorPayload {
    pub user_id: Uuid,
    pub is_typing: bool,
    pub conversation_with: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserStatusPayload {
    pub user_id: Uuid,
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    pub message: String,
}

// Client-to-server frames
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SendMessage {
        receiver_id: Uuid,
        content: String,
        #[serde(default)]
        category: MessageCategory,
        attachment: Option<AttachmentRef>,
    },
    Search {
        term: String,
    },
    /// Reopens the live feed after `connection_lost`.
    Resubscribe,
    MarkRead {
        message_id: Uuid,
    },
    MarkConversationRead {
        conversation_with: Uuid,
    },
    TypingIndicator {
        conversation_with: Uuid,
        is_typing: bool,
    },
}
