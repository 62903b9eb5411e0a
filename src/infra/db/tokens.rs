use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, TokensRepo};
use crate::domain::users::TokenRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct TokenRow {
    token: String,
    user_id: Uuid,
    expires_at: OffsetDateTime,
}

#[async_trait]
impl TokensRepo for PostgresRepositories {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO user_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&token.token)
            .bind(token.user_id)
            .bind(token.expires_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_token(&self, token: &str) -> Result<Option<TokenRecord>, RepoError> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT token, user_id, expires_at FROM user_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| TokenRecord {
            token: row.token,
            user_id: row.user_id,
            expires_at: row.expires_at,
        }))
    }

    async fn delete_token(&self, token: &str) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM user_tokens WHERE token = $1")
            .bind(token)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
