use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, ProfileUpdate, User};
use crate::store::CredentialStore;

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, \
     password_hash, session_value, created_at, updated_at";

/// Postgres-backed credential store (`users` table, see `migrations/`)
#[derive(Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        avatar: row.try_get("avatar")?,
        cover_image: row.try_get("cover_image")?,
        password_hash: row.try_get("password_hash")?,
        session_value: row.try_get("session_value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, username, email, full_name, avatar, cover_image,
                               password_hash, session_value, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.full_name)
        .bind(&new_user.avatar)
        .bind(&new_user.cover_image)
        .bind(&new_user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(user_from_row(&row)?)
    }

    async fn find_user_by_handle_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE username = lower($1) OR email = lower($1) LIMIT 1",
            USER_COLUMNS
        ))
        .bind(identifier.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn update_session_value(
        &self,
        user_id: Uuid,
        value: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET session_value = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(value)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn swap_session_value(
        &self,
        user_id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AppError> {
        // Row-level write lock makes the loser see the winner's value.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET session_value = $1, updated_at = $2
            WHERE id = $3 AND session_value = $4
            "#,
        )
        .bind(replacement)
        .bind(Utc::now())
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_secret(
        &self,
        user_id: Uuid,
        digest: &str,
        clear_session: bool,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1,
                session_value = CASE WHEN $2 THEN NULL ELSE session_value END,
                updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(digest)
        .bind(clear_session)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET full_name = COALESCE($1, full_name),
                email = COALESCE($2, email),
                avatar = COALESCE($3, avatar),
                cover_image = COALESCE($4, cover_image),
                updated_at = $5
            WHERE id = $6
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(update.full_name)
        .bind(update.email)
        .bind(update.avatar)
        .bind(update.cover_image)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }
}
