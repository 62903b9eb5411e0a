//! Document access service.
//!
//! Coordinates the record store, the blob store and the metadata cache:
//!
//! * upload writes the blob, then the record, then the cache entry;
//! * reads go cache first and fall back to the record store, repopulating the cache;
//! * delete removes the blob, then the cache entry, then the record.
//!
//! No step is transactional across stores. A record-store failure after a blob write
//! leaves an orphaned blob, and blob deletion failures never block record deletion.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::repos::{
    BlobError, BlobStore, DocumentFilter, DocumentListQuery, DocumentsRepo, RepoError,
    UnsupportedFilter,
};
use crate::cache::{DocumentCache, document_key};
use crate::domain::documents::{
    DocumentContent, DocumentListItem, DocumentRecord, GrantList, truncate_to_micros,
    validate_json_payload,
};
use crate::domain::error::DomainError;
use crate::domain::users::Caller;

pub const DEFAULT_LIST_LIMIT: u32 = 20;
pub const METRIC_BLOB_ORPHANED: &str = "docvault_blob_orphaned_total";

const TARGET: &str = "docvault::documents";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found")]
    NotFound,
    #[error("document is not granted to `{login}`")]
    Forbidden { login: String },
    #[error("invalid document id `{0}`")]
    InvalidId(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    UnsupportedFilter(#[from] UnsupportedFilter),
    #[error("blob storage failure")]
    Blob(#[source] BlobError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl DocumentError {
    /// Whether the failure was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::Forbidden { .. }
                | Self::InvalidId(_)
                | Self::Domain(DomainError::Mode { .. } | DomainError::Validation { .. })
                | Self::UnsupportedFilter(_)
        )
    }
}

/// Caller-supplied document metadata.
#[derive(Debug, Clone, Default)]
pub struct UploadMeta {
    pub name: String,
    pub file: bool,
    pub public: bool,
    pub mime: String,
    pub grant: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FilePart {
    pub filename: String,
    pub bytes: Bytes,
}

/// Payload parts accompanying an upload. Exactly one is expected, matching `UploadMeta::file`.
#[derive(Debug, Clone, Default)]
pub struct UploadPayload {
    pub file: Option<FilePart>,
    pub json: Option<Bytes>,
}

/// Raw listing parameters as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct ListDocumentsRequest {
    pub login: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub record: DocumentRecord,
    /// Blob bytes for file documents, `None` for JSON documents.
    pub content: Option<Bytes>,
}

impl FetchedDocument {
    pub fn mime_type(&self) -> Option<&str> {
        self.record.content_mime_type()
    }
}

#[derive(Clone)]
pub struct DocumentService {
    repo: Arc<dyn DocumentsRepo>,
    blobs: Arc<dyn BlobStore>,
    cache: Arc<dyn DocumentCache>,
}

impl DocumentService {
    pub fn new(
        repo: Arc<dyn DocumentsRepo>,
        blobs: Arc<dyn BlobStore>,
        cache: Arc<dyn DocumentCache>,
    ) -> Self {
        Self { repo, blobs, cache }
    }

    pub async fn upload(
        &self,
        caller: &Caller,
        meta: UploadMeta,
        payload: UploadPayload,
    ) -> Result<DocumentRecord, DocumentError> {
        let UploadPayload { file, json } = payload;

        let file = match (meta.file, file, json.as_ref()) {
            (true, Some(file), None) => Some(file),
            (true, None, _) => return Err(DomainError::mode("file document requires a file part").into()),
            (true, Some(_), Some(_)) => {
                return Err(DomainError::mode("file document must not carry a JSON part").into());
            }
            (false, Some(_), _) => {
                return Err(DomainError::mode("JSON document must not carry a file part").into());
            }
            (false, None, _) => None,
        };

        let mime_type = match (&file, meta.mime.trim()) {
            (Some(file), "") => mime_guess::from_path(&file.filename)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string(),
            (_, mime) => mime.to_string(),
        };

        let mut granted_to = GrantList::new(meta.grant);
        granted_to.insert(caller.login.as_str());

        let id = Uuid::new_v4();
        let created_at = truncate_to_micros(OffsetDateTime::now_utc());

        let content = match file {
            Some(file) => {
                let stored = self
                    .blobs
                    .write(id, &file.filename, file.bytes)
                    .await
                    .map_err(|err| {
                        error!(
                            target = TARGET,
                            document_id = %id,
                            filename = %file.filename,
                            error = %err,
                            "failed to write document blob"
                        );
                        DocumentError::Blob(err)
                    })?;
                debug!(
                    target = TARGET,
                    document_id = %id,
                    path = %stored.path,
                    size_bytes = stored.size_bytes,
                    "document blob written"
                );
                DocumentContent::File {
                    blob_path: stored.path,
                }
            }
            None => {
                let data = match json.filter(|raw| !raw.is_empty()) {
                    Some(raw) => Some(validate_json_payload(&raw)?),
                    None => None,
                };
                DocumentContent::Json { data }
            }
        };

        let record = DocumentRecord {
            id,
            name: meta.name,
            mime_type,
            is_public: meta.public,
            content,
            created_at,
            granted_to,
        };

        if let Err(err) = self.repo.insert_document(&record).await {
            if let Some(path) = record.blob_path() {
                counter!(METRIC_BLOB_ORPHANED).increment(1);
                warn!(
                    target = TARGET,
                    document_id = %id,
                    path,
                    "record insert failed after blob write; blob left orphaned"
                );
            }
            error!(target = TARGET, document_id = %id, error = %err, "failed to create document");
            return Err(err.into());
        }

        self.cache.set(document_key(id), record.clone());

        info!(
            target = TARGET,
            document_id = %id,
            user = %caller.login,
            file = record.is_file(),
            "document uploaded"
        );

        Ok(record)
    }

    pub async fn list(
        &self,
        caller: &Caller,
        request: &ListDocumentsRequest,
    ) -> Result<Vec<DocumentListItem>, DocumentError> {
        // Any authenticated caller may list another login's documents by naming it.
        let granted_login = request
            .login
            .as_deref()
            .filter(|login| !login.is_empty())
            .unwrap_or(caller.login.as_str())
            .to_string();

        let filter = DocumentFilter::parse(
            request.key.as_deref().unwrap_or_default(),
            request.value.as_deref().unwrap_or_default(),
        )?;

        let query = DocumentListQuery {
            granted_login,
            filter,
            limit: parse_limit(request.limit.as_deref()),
        };

        let ids = self.repo.list_document_ids(&query).await.map_err(|err| {
            error!(target = TARGET, error = %err, "failed to list document ids");
            DocumentError::from(err)
        })?;

        let mut resolved: HashMap<Uuid, DocumentListItem> = HashMap::with_capacity(ids.len());
        let mut misses = Vec::new();
        for id in &ids {
            match self.cache.get(&document_key(*id)) {
                Some(record) => {
                    resolved.insert(*id, DocumentListItem::from(&record));
                }
                None => misses.push(*id),
            }
        }

        if !misses.is_empty() {
            let fetched = self.repo.find_documents(&misses).await.map_err(|err| {
                error!(target = TARGET, error = %err, "failed to fetch documents by ids");
                DocumentError::from(err)
            })?;
            for record in fetched {
                resolved.insert(record.id, DocumentListItem::from(&record));
                self.cache.set(document_key(record.id), record);
            }
        }

        // Rows deleted between the id listing and the batch fetch are skipped.
        let items: Vec<DocumentListItem> = ids
            .iter()
            .filter_map(|id| resolved.remove(id))
            .collect();

        info!(
            target = TARGET,
            user = %caller.login,
            scope = %query.granted_login,
            count = items.len(),
            cache_misses = misses.len(),
            "documents listed"
        );

        Ok(items)
    }

    pub async fn get(&self, caller: &Caller, id: &str) -> Result<FetchedDocument, DocumentError> {
        let id = parse_id(id)?;
        let key = document_key(id);

        if let Some(record) = self.cache.get(&key) {
            ensure_granted(&record, caller)?;
            let content = match record.blob_path() {
                Some(path) => match self.blobs.read(path).await {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        self.cache.delete(&key);
                        error!(
                            target = TARGET,
                            document_id = %id,
                            path,
                            error = %err,
                            "cached document blob unreadable; entry evicted"
                        );
                        return Err(DocumentError::Blob(err));
                    }
                },
                None => None,
            };
            return Ok(FetchedDocument { record, content });
        }

        let record = self
            .repo
            .find_document(id)
            .await?
            .ok_or_else(|| {
                debug!(target = TARGET, document_id = %id, "document not found");
                DocumentError::NotFound
            })?;
        ensure_granted(&record, caller)?;

        let content = match record.blob_path() {
            Some(path) => Some(self.blobs.read(path).await.map_err(|err| {
                error!(
                    target = TARGET,
                    document_id = %id,
                    path,
                    error = %err,
                    "failed to read document blob"
                );
                DocumentError::Blob(err)
            })?),
            None => None,
        };

        self.cache.set(key, record.clone());

        Ok(FetchedDocument { record, content })
    }

    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<(), DocumentError> {
        let id = parse_id(id)?;

        let record = self
            .repo
            .find_document(id)
            .await?
            .ok_or(DocumentError::NotFound)?;
        ensure_granted(&record, caller)?;

        if let Some(path) = record.blob_path() {
            match self.blobs.delete(path).await {
                Ok(()) => {}
                Err(err) => warn!(
                    target = TARGET,
                    document_id = %id,
                    path,
                    error = %err,
                    "failed to delete document blob; continuing"
                ),
            }
        }

        // A concurrent reader can still repopulate this key before the row is gone; such an
        // entry lives until its TTL lapses.
        self.cache.delete(&document_key(id));

        self.repo.delete_document(id).await.map_err(|err| {
            error!(
                target = TARGET,
                document_id = %id,
                error = %err,
                "failed to delete document record"
            );
            DocumentError::from(err)
        })?;

        info!(target = TARGET, document_id = %id, user = %caller.login, "document deleted");
        Ok(())
    }
}

fn parse_id(raw: &str) -> Result<Uuid, DocumentError> {
    Uuid::parse_str(raw.trim()).map_err(|_| DocumentError::InvalidId(raw.to_string()))
}

fn ensure_granted(record: &DocumentRecord, caller: &Caller) -> Result<(), DocumentError> {
    if record.is_granted_to(&caller.login) {
        Ok(())
    } else {
        Err(DocumentError::Forbidden {
            login: caller.login.clone(),
        })
    }
}

/// Absent, unparsable and non-positive limits fall back to the default.
pub fn parse_limit(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|value| *value > 0)
        .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
        .unwrap_or(DEFAULT_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults() {
        assert_eq!(parse_limit(None), 20);
        assert_eq!(parse_limit(Some("")), 20);
        assert_eq!(parse_limit(Some("abc")), 20);
        assert_eq!(parse_limit(Some("0")), 20);
        assert_eq!(parse_limit(Some("-5")), 20);
        assert_eq!(parse_limit(Some("7")), 7);
    }

    #[test]
    fn id_parsing() {
        assert!(parse_id("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).expect("valid id"), id);
    }

    #[test]
    fn client_error_classification() {
        assert!(DocumentError::NotFound.is_client_error());
        assert!(DocumentError::InvalidId("x".into()).is_client_error());
        assert!(DocumentError::Domain(DomainError::validation("bad json")).is_client_error());
        assert!(!DocumentError::Domain(DomainError::invariant("broken row")).is_client_error());
        assert!(!DocumentError::Repo(RepoError::Timeout).is_client_error());
    }
}
