use crate::error::Result;
use sqlx::PgPool;
use uuid::Uuid;
use super::directory_models::Profile;

#[derive(Clone)]
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_with_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        full_name: &str,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (full_name, email, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING *"
        )
        .bind(full_name)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&mut **tx)
        .await?;

        Ok(profile)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    /// Profiles filtered by role and a case-insensitive name fragment.
    pub async fn list(&self, role: Option<&str>, search: Option<&str>) -> Result<Vec<Profile>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles
             WHERE ($1::text IS NULL OR role = $1)
               AND ($2::text IS NULL OR full_name ILIKE $2)
             ORDER BY full_name ASC"
        )
        .bind(role)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }
}
