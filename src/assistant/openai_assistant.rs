use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    assistant_models::{RecordAnalysis, RecordSample},
    assistant_service::{RecordAnalysisProvider, TextCompletionProvider},
    mock_assistant::MockAssistant,
};
use crate::error::{AppError, Result};

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful medical AI assistant. Provide accurate, professional medical information while always advising users to consult healthcare professionals for specific medical advice.";

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a medical AI assistant analyzing medical records. Provide professional analysis with recommendations and risk factors.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible endpoint. Every failure
/// is logged and answered by the mock instead.
pub struct OpenAiAssistant {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    fallback: MockAssistant,
}

impl OpenAiAssistant {
    pub fn new(api_key: String, model: String, base_url: String, fallback: MockAssistant) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            fallback,
        }
    }

    async fn chat(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.7,
            max_tokens,
        };

        let response: ChatCompletionResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AppError::Completion(format!("Completion request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::Completion(format!("Failed to parse completion: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Completion("Completion had no content".into()))
    }
}

/// First line of a completion, used as the analysis headline.
fn summary_line(completion: &str) -> String {
    completion
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Analysis completed")
        .to_string()
}

fn describe(record: &RecordSample) -> String {
    let mut out = format!("file: {}", record.file_name);
    if let Some(content_type) = &record.content_type {
        out.push_str(&format!(", type: {}", content_type));
    }
    if let Some(notes) = &record.notes {
        out.push_str(&format!(", notes: {}", notes));
    }
    out
}

#[async_trait]
impl TextCompletionProvider for OpenAiAssistant {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.chat(CHAT_SYSTEM_PROMPT, prompt, 500).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::warn!("Falling back to mock reply: {}", e);
                self.fallback.complete(prompt).await
            }
        }
    }
}

#[async_trait]
impl RecordAnalysisProvider for OpenAiAssistant {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn analyze(&self, record: &RecordSample) -> Result<RecordAnalysis> {
        let prompt = format!("Analyze this medical record: {}", describe(record));
        match self.chat(ANALYSIS_SYSTEM_PROMPT, &prompt, 1000).await {
            Ok(completion) => Ok(RecordAnalysis {
                summary: summary_line(&completion),
                recommendations: vec![
                    "Consult with healthcare provider".to_string(),
                    "Follow up as recommended".to_string(),
                ],
                risk_factors: vec![
                    "Please consult healthcare provider for risk assessment".to_string(),
                ],
            }),
            Err(e) => {
                tracing::warn!("Falling back to mock analysis: {}", e);
                self.fallback.analyze(record).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_assistant() -> OpenAiAssistant {
        OpenAiAssistant::new(
            "sk-test".into(),
            "gpt-3.5-turbo".into(),
            "http://127.0.0.1:9/v1/".into(),
            MockAssistant::new(0),
        )
    }

    #[test]
    fn summary_is_first_non_blank_line() {
        assert_eq!(summary_line("\n  Normal ECG.  \nMore detail"), "Normal ECG.");
        assert_eq!(summary_line(""), "Analysis completed");
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        assert_eq!(unreachable_assistant().base_url, "http://127.0.0.1:9/v1");
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back_to_mock() {
        let assistant = unreachable_assistant();

        let reply = assistant.complete("exercise tips").await.unwrap();
        assert_eq!(reply, MockAssistant::reply_for("exercise tips"));

        let record = RecordSample {
            file_name: "xray.png".into(),
            content_type: None,
            notes: None,
        };
        let analysis = assistant.analyze(&record).await.unwrap();
        assert!(!analysis.summary.is_empty());
    }

    #[test]
    fn record_description_includes_known_fields() {
        let record = RecordSample {
            file_name: "labs.pdf".into(),
            content_type: Some("application/pdf".into()),
            notes: Some("fasting".into()),
        };
        assert_eq!(
            describe(&record),
            "file: labs.pdf, type: application/pdf, notes: fasting"
        );
    }
}
