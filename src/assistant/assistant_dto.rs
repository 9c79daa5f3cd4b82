use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::assistant_models::RecordSample;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub reply: String,
    pub provider: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    pub content_type: Option<String>,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

impl From<AnalyzeRequest> for RecordSample {
    fn from(req: AnalyzeRequest) -> Self {
        Self {
            file_name: req.file_name,
            content_type: req.content_type,
            notes: req.notes,
        }
    }
}
