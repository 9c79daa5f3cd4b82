use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    directory::directory_models::Participant,
    error::Result,
    middleware::AuthUser,
    state::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct DirectoryQuery {
    /// `doctor` or `patient`
    pub role: Option<String>,
    pub search: Option<String>,
}

/// List participants with their online status
#[utoipa::path(
    get,
    path = "/api/directory",
    tag = "directory",
    params(DirectoryQuery),
    responses(
        (status = 200, description = "Participants", body = Vec<Participant>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_participants(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Query(query): Query<DirectoryQuery>,
) -> Result<impl IntoResponse> {
    let participants = state
        .directory_service
        .participants(query.role.as_deref(), query.search.as_deref())
        .await?;

    Ok((StatusCode::OK, Json(participants)))
}

/// Get a single participant
#[utoipa::path(
    get,
    path = "/api/directory/{id}",
    tag = "directory",
    params(
        ("id" = Uuid, Path, description = "Participant ID")
    ),
    responses(
        (status = 200, description = "Participant", body = Participant),
        (status = 404, description = "Not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_participant(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let participant = state.directory_service.participant(id).await?;

    Ok((StatusCode::OK, Json(participant)))
}
