use std::sync::Arc;

use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::{RepoError, TokensRepo, UsersRepo};
use crate::domain::error::DomainError;
use crate::domain::users::{Caller, TokenRecord, UserRecord, validate_login, validate_password};

const TARGET: &str = "docvault::auth";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("admin token rejected")]
    AdminTokenRejected,
    #[error("login `{0}` is already taken")]
    LoginTaken(String),
    #[error("invalid login or password")]
    InvalidCredentials,
    #[error("unknown session token")]
    UnknownToken,
    #[error("missing or expired session token")]
    Unauthorized,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Registration and session settings.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    /// Registration is closed when unset.
    pub admin_token: Option<String>,
    pub token_ttl: Duration,
    /// bcrypt work factor for newly stored hashes.
    pub password_cost: u32,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            admin_token: None,
            token_ttl: Duration::hours(24),
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UsersRepo>,
    tokens: Arc<dyn TokensRepo>,
    policy: AuthPolicy,
}

impl UserService {
    pub fn new(users: Arc<dyn UsersRepo>, tokens: Arc<dyn TokensRepo>, policy: AuthPolicy) -> Self {
        Self {
            users,
            tokens,
            policy,
        }
    }

    pub async fn register(
        &self,
        login: &str,
        password: &str,
        admin_token: &str,
    ) -> Result<UserRecord, AuthError> {
        let expected = self
            .policy
            .admin_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::AdminTokenRejected)?;
        if expected.as_bytes().ct_eq(admin_token.as_bytes()).unwrap_u8() == 0 {
            warn!(target = TARGET, login, "registration with wrong admin token");
            return Err(AuthError::AdminTokenRejected);
        }

        validate_login(login)?;
        validate_password(password)?;

        if self.users.find_by_login(login).await?.is_some() {
            return Err(AuthError::LoginTaken(login.to_string()));
        }

        let password_hash = hash_password(password, self.policy.password_cost).await?;
        let user = match self.users.create_user(login, &password_hash).await {
            Ok(user) => user,
            Err(RepoError::Duplicate { .. }) => return Err(AuthError::LoginTaken(login.to_string())),
            Err(err) => return Err(err.into()),
        };

        info!(target = TARGET, user_id = %user.id, login, "user registered");
        Ok(user)
    }

    pub async fn authenticate(&self, login: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let user = self
            .users
            .find_by_login(login)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).await? {
            warn!(target = TARGET, login, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let record = TokenRecord {
            token: Uuid::new_v4().simple().to_string(),
            user_id: user.id,
            expires_at: OffsetDateTime::now_utc() + self.policy.token_ttl,
        };
        self.tokens.insert_token(&record).await?;

        info!(target = TARGET, user_id = %user.id, "session token issued");
        Ok(IssuedToken {
            token: record.token,
            expires_at: record.expires_at,
        })
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if self.tokens.delete_token(token).await? {
            Ok(())
        } else {
            Err(AuthError::UnknownToken)
        }
    }

    /// Resolve a bearer token to its caller.
    pub async fn resolve(&self, token: &str) -> Result<Caller, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        let record = self
            .tokens
            .find_token(token)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        if record.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::Unauthorized);
        }

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        Ok(Caller::from(&user))
    }
}

/// bcrypt is CPU-bound; keep it off the async workers.
async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|err| AuthError::Hashing(err.to_string()))?
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

async fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthError> {
    let password = password.to_owned();
    let stored_hash = stored_hash.to_owned();
    let verdict = tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored_hash))
        .await
        .map_err(|err| AuthError::Hashing(err.to_string()))?;

    match verdict {
        Ok(matches) => Ok(matches),
        Err(err) => {
            warn!(target = TARGET, error = %err, "stored password hash is unreadable");
            Ok(false)
        }
    }
}
