pub mod assistant_dto;
pub mod assistant_handlers;
pub mod assistant_models;
pub mod assistant_service;
pub mod mock_assistant;
pub mod openai_assistant;

pub use assistant_handlers::{analyze, chat};
pub use assistant_models::AssistantConfig;
pub use assistant_service::{providers_from_config, RecordAnalysisProvider, TextCompletionProvider};
