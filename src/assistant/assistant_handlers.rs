use axum::{extract::State, response::IntoResponse, Json};
use validator::Validate;

use super::{
    assistant_dto::{AnalyzeRequest, ChatRequest, ChatResponse},
    assistant_models::{RecordAnalysis, RecordSample},
};
use crate::{error::Result, middleware::AuthUser, state::AppState};

/// Ask the health assistant a free-text question
#[utoipa::path(
    post,
    path = "/api/assistant/chat",
    tag = "assistant",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    tracing::debug!("Assistant prompt from {}", user_id);
    let reply = state.completion.complete(&payload.prompt).await?;

    Ok(Json(ChatResponse {
        reply,
        provider: state.completion.name().to_string(),
    }))
}

/// Analyze a medical record
#[utoipa::path(
    post,
    path = "/api/assistant/analyze",
    tag = "assistant",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Record analysis", body = RecordAnalysis),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn analyze(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let record = RecordSample::from(payload);
    let analysis = state.analysis.analyze(&record).await?;

    Ok(Json(analysis))
}
