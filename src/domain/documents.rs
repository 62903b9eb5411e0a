//! Document entities and the invariants they carry.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

/// Ordered, duplicate-free list of logins allowed to see a document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct GrantList(Vec<String>);

impl GrantList {
    /// Build a grant list from caller input, dropping blanks and repeated logins.
    pub fn new<I, S>(logins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        for login in logins {
            list.insert(login);
        }
        list
    }

    /// Append `login` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, login: impl Into<String>) -> bool {
        let login = login.into();
        let trimmed = login.trim();
        if trimmed.is_empty() || self.contains(trimmed) {
            return false;
        }
        self.0.push(trimmed.to_string());
        true
    }

    #[must_use]
    pub fn contains(&self, login: &str) -> bool {
        self.0.iter().any(|granted| granted == login)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Payload carried by a document. The variant is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentContent {
    /// Binary file stored in the blob store under `blob_path`.
    File { blob_path: String },
    /// Inline JSON text, already validated. `None` is an empty document.
    Json { data: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub is_public: bool,
    pub content: DocumentContent,
    pub created_at: OffsetDateTime,
    pub granted_to: GrantList,
}

impl DocumentRecord {
    pub fn is_file(&self) -> bool {
        matches!(self.content, DocumentContent::File { .. })
    }

    pub fn blob_path(&self) -> Option<&str> {
        match &self.content {
            DocumentContent::File { blob_path } => Some(blob_path.as_str()),
            DocumentContent::Json { .. } => None,
        }
    }

    pub fn json_data(&self) -> Option<&str> {
        match &self.content {
            DocumentContent::Json { data } => data.as_deref(),
            DocumentContent::File { .. } => None,
        }
    }

    /// Content type to serve with the blob bytes; JSON documents have none.
    pub fn content_mime_type(&self) -> Option<&str> {
        self.is_file().then_some(self.mime_type.as_str())
    }

    pub fn is_granted_to(&self, login: &str) -> bool {
        self.granted_to.contains(login)
    }

    /// Rebuild a record from its persisted columns, rejecting rows that break mode exclusivity.
    #[allow(clippy::too_many_arguments)]
    pub fn from_columns(
        id: Uuid,
        name: String,
        mime_type: String,
        is_public: bool,
        is_file: bool,
        content_path: Option<String>,
        json_content: Option<String>,
        created_at: OffsetDateTime,
        granted_to: Vec<String>,
    ) -> Result<Self, DomainError> {
        let content = match (is_file, content_path, json_content) {
            (true, Some(blob_path), None) => DocumentContent::File { blob_path },
            (false, None, data) => DocumentContent::Json { data },
            (true, None, _) => {
                return Err(DomainError::invariant(format!(
                    "file document {id} has no blob path"
                )));
            }
            (_, Some(_), Some(_)) | (false, Some(_), None) => {
                return Err(DomainError::invariant(format!(
                    "document {id} carries content that does not match its mode"
                )));
            }
        };

        Ok(Self {
            id,
            name,
            mime_type,
            is_public,
            content,
            created_at,
            granted_to: GrantList::new(granted_to),
        })
    }
}

/// Metadata projection returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentListItem {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "mime")]
    pub mime_type: String,
    #[serde(rename = "file")]
    pub is_file: bool,
    #[serde(rename = "public")]
    pub is_public: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "grant", skip_serializing_if = "GrantList::is_empty")]
    pub granted_to: GrantList,
}

impl From<&DocumentRecord> for DocumentListItem {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            mime_type: record.mime_type.clone(),
            is_file: record.is_file(),
            is_public: record.is_public,
            created_at: record.created_at,
            granted_to: record.granted_to.clone(),
        }
    }
}

/// Drop sub-microsecond precision so the value survives a `timestamptz` round trip.
pub fn truncate_to_micros(at: OffsetDateTime) -> OffsetDateTime {
    at - time::Duration::nanoseconds(i64::from(at.nanosecond() % 1_000))
}

/// Validate that `raw` is syntactically valid JSON and return it as owned text.
pub fn validate_json_payload(raw: &[u8]) -> Result<String, DomainError> {
    serde_json::from_slice::<serde::de::IgnoredAny>(raw)
        .map_err(|err| DomainError::validation(format!("invalid JSON data: {err}")))?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| DomainError::validation("invalid JSON data: payload is not UTF-8"))
}
