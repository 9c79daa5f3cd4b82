use crate::{
    directory::directory_models::Profile,
    error::{AppError, Result},
    state::AppState,
};
use super::auth_dto::{AuthResponse, LoginRequest, RegisterRequest, RefreshTokenRequest, RefreshTokenResponse};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// A second registration with the same email hits the profiles unique index.
fn email_taken(error: AppError) -> AppError {
    let duplicate = match &error {
        AppError::Database(db_err) => db_err
            .as_database_error()
            .and_then(|e| e.code())
            .is_some_and(|code| code == UNIQUE_VIOLATION),
        _ => false,
    };

    if duplicate {
        AppError::BadRequest("A profile with this email already exists".to_string())
    } else {
        error
    }
}

fn signed_in((profile, access_token, refresh_token): (Profile, String, String)) -> AuthResponse {
    AuthResponse {
        access_token,
        refresh_token,
        profile: profile.into(),
    }
}

/// Create a doctor or patient profile and sign it in
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Profile created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid profile details or email already registered"),
        (status = 500, description = "Internal server error")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let session = state
        .auth_service
        .register(&payload.full_name, &payload.email, &payload.password, payload.role)
        .await
        .map_err(email_taken)?;

    Ok((StatusCode::CREATED, Json(signed_in(session))))
}

/// Sign a profile in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Unknown email or wrong password"),
        (status = 500, description = "Internal server error")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let session = state
        .auth_service
        .login(&payload.email, &payload.password)
        .await?;

    Ok(Json(signed_in(session)))
}

/// Trade a refresh token for a new pair; the old refresh token is revoked
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = RefreshTokenResponse),
        (status = 401, description = "Invalid, revoked or expired refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse> {
    let (access_token, refresh_token) = state
        .auth_service
        .refresh_access_token(&payload.refresh_token)
        .await?;

    Ok(Json(RefreshTokenResponse {
        access_token,
        refresh_token,
    }))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Refresh token revoked"),
        (status = 400, description = "Invalid input")
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse> {
    state.auth_service.logout(&payload.refresh_token).await?;
    Ok(StatusCode::OK)
}
