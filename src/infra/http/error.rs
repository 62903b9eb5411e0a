use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::application::auth::AuthError;
use crate::application::documents::DocumentError;
use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorMessage<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorMessage<'a> {
    code: u16,
    text: &'a str,
}

/// Error rendered as `{"error":{"code":<status>,"text":"..."}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    text: String,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(source: &'static str, status: StatusCode, text: impl Into<String>) -> Self {
        let text = text.into();
        let report = ErrorReport::from_message(source, status, text.clone());
        Self {
            status,
            text,
            report,
        }
    }

    /// Public text stays generic; the full chain goes to the response logger.
    fn internal(source: &'static str, status: StatusCode, text: &str, err: &dyn std::error::Error) -> Self {
        Self {
            status,
            text: text.to_string(),
            report: ErrorReport::from_error(source, status, err),
        }
    }

    pub fn bad_request(text: impl Into<String>) -> Self {
        Self::new("infra::http::request", StatusCode::BAD_REQUEST, text)
    }

    pub fn unauthorized(text: impl Into<String>) -> Self {
        Self::new("infra::http::auth", StatusCode::UNAUTHORIZED, text)
    }

    pub fn timeout() -> Self {
        Self::new(
            "infra::http::timeout",
            StatusCode::SERVICE_UNAVAILABLE,
            "request timed out",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorMessage {
                code: self.status.as_u16(),
                text: &self.text,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        const SOURCE: &str = "infra::http::documents";
        match &err {
            DocumentError::NotFound => Self::new(SOURCE, StatusCode::NOT_FOUND, err.to_string()),
            DocumentError::Forbidden { .. } => {
                Self::new(SOURCE, StatusCode::FORBIDDEN, "access to document denied")
            }
            DocumentError::InvalidId(_) | DocumentError::UnsupportedFilter(_) => {
                Self::new(SOURCE, StatusCode::BAD_REQUEST, err.to_string())
            }
            DocumentError::Domain(DomainError::Mode { .. } | DomainError::Validation { .. }) => {
                Self::new(SOURCE, StatusCode::BAD_REQUEST, err.to_string())
            }
            DocumentError::Domain(DomainError::Invariant { .. }) => {
                Self::internal(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, "internal error", &err)
            }
            DocumentError::Blob(_) => {
                Self::internal(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, "storage failure", &err)
            }
            DocumentError::Repo(repo) => repo_error(SOURCE, repo, &err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        const SOURCE: &str = "infra::http::auth";
        match &err {
            AuthError::Domain(DomainError::Invariant { .. }) => {
                Self::internal(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, "internal error", &err)
            }
            AuthError::Domain(_) | AuthError::LoginTaken(_) | AuthError::UnknownToken => {
                Self::new(SOURCE, StatusCode::BAD_REQUEST, err.to_string())
            }
            AuthError::AdminTokenRejected => {
                Self::new(SOURCE, StatusCode::FORBIDDEN, err.to_string())
            }
            AuthError::InvalidCredentials | AuthError::Unauthorized => {
                Self::new(SOURCE, StatusCode::UNAUTHORIZED, err.to_string())
            }
            AuthError::Hashing(_) => {
                Self::internal(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, "internal error", &err)
            }
            AuthError::Repo(repo) => repo_error(SOURCE, repo, &err),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new("infra::http::multipart", err.status(), err.body_text())
    }
}

fn repo_error(source: &'static str, repo: &RepoError, err: &dyn std::error::Error) -> ApiError {
    match repo {
        RepoError::Timeout => {
            ApiError::internal(source, StatusCode::SERVICE_UNAVAILABLE, "database timeout", err)
        }
        RepoError::NotFound => ApiError::new(source, StatusCode::NOT_FOUND, "resource not found"),
        _ => {
            error!(target = "docvault::http", error = %err, "persistence failure");
            ApiError::internal(source, StatusCode::INTERNAL_SERVER_ERROR, "persistence error", err)
        }
    }
}
