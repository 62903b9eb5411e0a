//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::documents::DocumentRecord;
use crate::domain::users::{TokenRecord, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Equality filter accepted by document listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFilter {
    Name(String),
    MimeType(String),
}

impl DocumentFilter {
    /// Parse a `key`/`value` pair. Blank keys or values mean "no filter".
    pub fn parse(key: &str, value: &str) -> Result<Option<Self>, UnsupportedFilter> {
        if key.is_empty() || value.is_empty() {
            return Ok(None);
        }
        match key {
            "name" => Ok(Some(Self::Name(value.to_string()))),
            "mime" | "mime_type" => Ok(Some(Self::MimeType(value.to_string()))),
            other => Err(UnsupportedFilter(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported filter key `{0}`")]
pub struct UnsupportedFilter(pub String);

/// Scope, filter and cap for an identifier listing.
///
/// Results are ordered by `name ASC, created_at DESC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentListQuery {
    pub granted_login: String,
    pub filter: Option<DocumentFilter>,
    pub limit: u32,
}

#[async_trait]
pub trait DocumentsRepo: Send + Sync {
    async fn insert_document(&self, record: &DocumentRecord) -> Result<(), RepoError>;

    async fn find_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RepoError>;

    /// Fetch many records in one round trip. Order of the result is unspecified.
    async fn find_documents(&self, ids: &[Uuid]) -> Result<Vec<DocumentRecord>, RepoError>;

    async fn list_document_ids(&self, query: &DocumentListQuery) -> Result<Vec<Uuid>, RepoError>;

    async fn delete_document(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserRecord, RepoError>;

    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;
}

#[async_trait]
pub trait TokensRepo: Send + Sync {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), RepoError>;

    async fn find_token(&self, token: &str) -> Result<Option<TokenRecord>, RepoError>;

    /// Returns whether a token was removed.
    async fn delete_token(&self, token: &str) -> Result<bool, RepoError>;
}

/// Errors raised by blob storage backends.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Location of a freshly written blob, relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: String,
    pub size_bytes: u64,
}

/// Byte storage for file documents. Knows nothing about document metadata.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under a path derived from `id` and the original filename.
    async fn write(
        &self,
        id: Uuid,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredBlob, BlobError>;

    async fn read(&self, path: &str) -> Result<Bytes, BlobError>;

    /// Remove a blob. Missing blobs are reported as [`BlobError::NotFound`].
    async fn delete(&self, path: &str) -> Result<(), BlobError>;
}
