use std::sync::Arc;

use async_trait::async_trait;

use super::{
    assistant_models::{AssistantConfig, RecordAnalysis, RecordSample},
    mock_assistant::MockAssistant,
    openai_assistant::OpenAiAssistant,
};
use crate::error::Result;

#[async_trait]
pub trait TextCompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait RecordAnalysisProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, record: &RecordSample) -> Result<RecordAnalysis>;
}

/// Picks the OpenAI-compatible backend when a usable key is configured and
/// the canned mock otherwise.
pub fn providers_from_config(
    config: &AssistantConfig,
) -> (Arc<dyn TextCompletionProvider>, Arc<dyn RecordAnalysisProvider>) {
    let mock = MockAssistant::new(config.mock_delay_ms);

    match config.api_key() {
        Some(key) => {
            tracing::info!("Assistant using model {} at {}", config.model, config.base_url);
            let openai = Arc::new(OpenAiAssistant::new(
                key.to_string(),
                config.model.clone(),
                config.base_url.clone(),
                mock,
            ));
            (openai.clone(), openai)
        }
        None => {
            tracing::info!("No assistant API key configured, using mock responses");
            let mock = Arc::new(mock);
            (mock.clone(), mock)
        }
    }
}
