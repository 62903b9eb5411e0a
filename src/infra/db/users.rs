use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, UsersRepo};
use crate::domain::users::UserRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    login: String,
    password_hash: String,
    created_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            login: row.login,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserRecord, RepoError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, login, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, login, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(login)
        .bind(password_hash)
        .fetch_one(self.pool())
        .await
        .map(UserRecord::from)
        .map_err(map_sqlx_error)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, login, password_hash, created_at FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(self.pool())
        .await
        .map(|row| row.map(UserRecord::from))
        .map_err(map_sqlx_error)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, login, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map(|row| row.map(UserRecord::from))
        .map_err(map_sqlx_error)
    }
}
