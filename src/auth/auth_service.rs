use crate::auth::auth_repository::RefreshTokenRepository;
use crate::auth::{create_access_token, create_refresh_token, hash_password, verify_jwt, verify_password};
use crate::db::DbPool;
use crate::directory::{directory_models::Profile, directory_repository::ProfileRepository, Role};
use crate::error::{AppError, Result};
use chrono::{Duration, Utc};

#[derive(Clone)]
pub struct AuthService {
    db: DbPool,
    profile_repo: ProfileRepository,
    refresh_token_repo: RefreshTokenRepository,
    jwt_secret: String,
    access_token_minutes: i64,
}

impl AuthService {
    pub fn new(
        db: DbPool,
        profile_repo: ProfileRepository,
        refresh_token_repo: RefreshTokenRepository,
        jwt_secret: String,
        access_token_minutes: i64,
    ) -> Self {
        Self {
            db,
            profile_repo,
            refresh_token_repo,
            jwt_secret,
            access_token_minutes,
        }
    }

    fn issue(&self, profile: &Profile) -> Result<(String, String)> {
        let access_token = create_access_token(
            profile.id,
            &profile.email,
            &profile.role,
            &self.jwt_secret,
            self.access_token_minutes,
        )?;
        let refresh_token =
            create_refresh_token(profile.id, &profile.email, &profile.role, &self.jwt_secret)?;
        Ok((access_token, refresh_token))
    }

    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<(Profile, String, String)> {
        let password_hash = hash_password(password)?;

        let mut tx = self.db.begin().await?;

        let profile = self
            .profile_repo
            .create_with_tx(&mut tx, full_name, email, &password_hash, role.as_str())
            .await?;

        let (access_token, refresh_token) = self.issue(&profile)?;

        let expires_at = Utc::now() + Duration::days(7);
        self.refresh_token_repo
            .create_with_tx(&mut tx, profile.id, &refresh_token, expires_at)
            .await?;

        tx.commit().await?;

        tracing::info!("Registered {} profile {}", profile.role, profile.id);
        Ok((profile, access_token, refresh_token))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(Profile, String, String)> {
        let profile = self
            .profile_repo
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".into()))?;

        if !verify_password(password, &profile.password_hash)? {
            return Err(AppError::Authentication("Invalid credentials".into()));
        }

        let (access_token, refresh_token) = self.issue(&profile)?;

        let mut tx = self.db.begin().await?;
        let expires_at = Utc::now() + Duration::days(7);
        self.refresh_token_repo
            .create_with_tx(&mut tx, profile.id, &refresh_token, expires_at)
            .await?;
        tx.commit().await?;

        Ok((profile, access_token, refresh_token))
    }

    /// Rotates the refresh token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<(String, String)> {
        let claims = verify_jwt(refresh_token, &self.jwt_secret)?;

        self.refresh_token_repo
            .find_by_token(refresh_token)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid refresh token".into()))?;

        let profile_id = uuid::Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Authentication("Invalid token claims".into()))?;

        let profile = self
            .profile_repo
            .find_by_id(profile_id)
            .await?
            .ok_or_else(|| AppError::Authentication("Profile not found".into()))?;

        let (access_token, new_refresh_token) = self.issue(&profile)?;

        let mut tx = self.db.begin().await?;
        self.refresh_token_repo
            .delete_by_token_with_tx(&mut tx, refresh_token)
            .await?;
        let expires_at = Utc::now() + Duration::days(7);
        self.refresh_token_repo
            .create_with_tx(&mut tx, profile.id, &new_refresh_token, expires_at)
            .await?;
        tx.commit().await?;

        Ok((access_token, new_refresh_token))
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        self.refresh_token_repo.delete_by_token(refresh_token).await
    }
}
