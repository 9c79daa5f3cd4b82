pub mod message_dto;
pub mod message_handlers;
pub mod message_models;

pub use message_handlers::{
    download_attachment, get_conversations, get_history, mark_conversation_read,
    mark_message_read, message_stream, send_message, upload_attachment,
};
