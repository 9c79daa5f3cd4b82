use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A medical record submitted for analysis. Only descriptive fields travel to
/// the provider; file bytes stay in the object store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordSample {
    pub file_name: String,
    pub content_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecordAnalysis {
    pub summary: String,
    pub recommendations: Vec<String>,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub openai_api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub mock_delay_ms: u64,
}

impl AssistantConfig {
    /// The key shipped in sample env files; treated the same as no key.
    pub const PLACEHOLDER_KEY: &'static str = "your_openai_api_key_here";

    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != Self::PLACEHOLDER_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(key: Option<&str>) -> AssistantConfig {
        AssistantConfig {
            openai_api_key: key.map(String::from),
            model: "gpt-3.5-turbo".into(),
            base_url: "https://api.openai.com/v1".into(),
            mock_delay_ms: 0,
        }
    }

    #[test]
    fn placeholder_and_blank_keys_are_ignored() {
        assert_eq!(config(None).api_key(), None);
        assert_eq!(config(Some("  ")).api_key(), None);
        assert_eq!(config(Some(AssistantConfig::PLACEHOLDER_KEY)).api_key(), None);
        assert_eq!(config(Some("sk-live")).api_key(), Some("sk-live"));
    }
}
