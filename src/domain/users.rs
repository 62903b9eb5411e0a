//! Users, session tokens and credential rules.

use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

const MIN_LOGIN_LEN: usize = 8;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Authenticated principal every document operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub login: String,
}

impl From<&UserRecord> for Caller {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            login: user.login.clone(),
        }
    }
}

/// Logins are at least eight ASCII letters or digits.
pub fn validate_login(login: &str) -> Result<(), DomainError> {
    if login.len() < MIN_LOGIN_LEN || !login.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(DomainError::validation(
            "login must be at least 8 characters, only Latin letters and digits",
        ));
    }
    Ok(())
}

/// Passwords need eight characters with mixed case, a digit and a symbol.
pub fn validate_password(password: &str) -> Result<(), DomainError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_lower = password.chars().any(char::is_lowercase);
    let has_upper = password.chars().any(char::is_uppercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric());

    if long_enough && has_lower && has_upper && has_digit && has_symbol {
        Ok(())
    } else {
        Err(DomainError::validation(
            "password must be at least 8 characters, with upper and lower case letters, a number, and a symbol",
        ))
    }
}
