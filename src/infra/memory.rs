//! In-memory adapters.
//!
//! Behave like the Postgres and filesystem stores (ordering, uniqueness, missing-blob
//! reporting) so services can run without external infrastructure.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::repos::{
    BlobError, BlobStore, DocumentFilter, DocumentListQuery, DocumentsRepo, RepoError,
    StoredBlob, TokensRepo, UsersRepo,
};
use crate::domain::documents::DocumentRecord;
use crate::domain::users::{TokenRecord, UserRecord};

use super::blobs::blob_path;

#[derive(Debug, Default)]
pub struct InMemoryRepositories {
    documents: RwLock<HashMap<Uuid, DocumentRecord>>,
    users: RwLock<HashMap<Uuid, UserRecord>>,
    tokens: RwLock<HashMap<String, TokenRecord>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl DocumentsRepo for InMemoryRepositories {
    async fn insert_document(&self, record: &DocumentRecord) -> Result<(), RepoError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&record.id) {
            return Err(RepoError::Duplicate {
                constraint: "documents_pkey".into(),
            });
        }
        documents.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RepoError> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn find_documents(&self, ids: &[Uuid]) -> Result<Vec<DocumentRecord>, RepoError> {
        let documents = self.documents.read().await;
        Ok(ids.iter().filter_map(|id| documents.get(id).cloned()).collect())
    }

    async fn list_document_ids(&self, query: &DocumentListQuery) -> Result<Vec<Uuid>, RepoError> {
        let documents = self.documents.read().await;
        let mut matching: Vec<&DocumentRecord> = documents
            .values()
            .filter(|doc| doc.is_granted_to(&query.granted_login))
            .filter(|doc| match &query.filter {
                Some(DocumentFilter::Name(name)) => &doc.name == name,
                Some(DocumentFilter::MimeType(mime)) => &doc.mime_type == mime,
                None => true,
            })
            .collect();

        // Byte order, matching `COLLATE "C"` on the Postgres side.
        matching.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(matching
            .into_iter()
            .take(query.limit as usize)
            .map(|doc| doc.id)
            .collect())
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), RepoError> {
        match self.documents.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepoError::NotFound),
        }
    }
}

#[async_trait]
impl UsersRepo for InMemoryRepositories {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserRecord, RepoError> {
        let mut users = self.users.write().await;
        if users.values().any(|user| user.login == login) {
            return Err(RepoError::Duplicate {
                constraint: "users_login_key".into(),
            });
        }
        let user = UserRecord {
            id: Uuid::new_v4(),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.login == login)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl TokensRepo for InMemoryRepositories {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), RepoError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token) {
            return Err(RepoError::Duplicate {
                constraint: "user_tokens_pkey".into(),
            });
        }
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_token(&self, token: &str) -> Result<Option<TokenRecord>, RepoError> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn delete_token(&self, token: &str) -> Result<bool, RepoError> {
        Ok(self.tokens.write().await.remove(token).is_some())
    }
}

/// Blob store backed by a map, keyed by the same relative paths the filesystem store uses.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a blob behind the service's back, leaving its record dangling.
    pub async fn remove(&self, path: &str) -> bool {
        self.blobs.write().await.remove(path).is_some()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.blobs.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn write(
        &self,
        id: Uuid,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredBlob, BlobError> {
        let path = blob_path(id, original_name);
        let size_bytes = data.len() as u64;
        self.blobs.write().await.insert(path.clone(), data);
        Ok(StoredBlob { path, size_bytes })
    }

    async fn read(&self, path: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        match self.blobs.write().await.remove(path) {
            Some(_) => Ok(()),
            None => Err(BlobError::NotFound(path.to_string())),
        }
    }
}
