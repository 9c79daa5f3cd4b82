use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Triage category chosen by the sender; fixed once the message exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Urgent,
    #[default]
    Routine,
    Administrative,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::Urgent => "urgent",
            MessageCategory::Routine => "routine",
            MessageCategory::Administrative => "administrative",
        }
    }
}

impl std::fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(MessageCategory::Urgent),
            "routine" => Ok(MessageCategory::Routine),
            "administrative" => Ok(MessageCategory::Administrative),
            other => Err(AppError::Validation(format!("Unknown message category: {}", other))),
        }
    }
}

/// A persisted direct message. Immutable apart from `read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub category: MessageCategory,
    pub attachment: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn involves(&self, participant: Uuid) -> bool {
        self.sender_id == participant || self.receiver_id == participant
    }

    /// The other side of the conversation as seen by `viewer`.
    pub fn counterpart(&self, viewer: Uuid) -> Uuid {
        if self.sender_id == viewer {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    /// Position key of the projection: creation time, then id.
    pub fn order_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

/// Insert payload. The store assigns `id`, `created_at` and `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub category: MessageCategory,
    pub attachment: Option<String>,
}

/// Identifies a two-party conversation from one participant's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub viewer: Uuid,
    pub counterpart: Uuid,
}

impl ConversationKey {
    pub fn new(viewer: Uuid, counterpart: Uuid) -> Self {
        Self { viewer, counterpart }
    }

    pub fn storage_prefix(&self) -> String {
        format!("{}/{}", self.viewer, self.counterpart)
    }
}

/// Binary content waiting to be stored.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Locator for previously uploaded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttachmentRef {
    pub path: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display_round_trips_through_from_str() {
        for category in [
            MessageCategory::Urgent,
            MessageCategory::Routine,
            MessageCategory::Administrative,
        ] {
            assert_eq!(category.to_string().parse::<MessageCategory>().unwrap(), category);
        }
        assert!("critical".parse::<MessageCategory>().is_err());
    }

    #[test]
    fn test_category_serializes_lowercase() {
        let json = serde_json::to_string(&MessageCategory::Administrative).unwrap();
        assert_eq!(json, "\"administrative\"");
        assert_eq!(MessageCategory::default(), MessageCategory::Routine);
    }

    #[test]
    fn test_counterpart_is_the_other_participant() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: a,
            receiver_id: b,
            content: "Lab results are in".into(),
            category: MessageCategory::Routine,
            attachment: None,
            read: false,
            created_at: Utc::now(),
        };

        assert_eq!(message.counterpart(a), b);
        assert_eq!(message.counterpart(b), a);
        assert!(message.involves(a) && message.involves(b));
        assert!(!message.involves(Uuid::new_v4()));
    }
}
