use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::application::documents::{ListDocumentsRequest, UploadMeta};
use crate::domain::documents::DocumentListItem;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub token: String,
    pub login: String,
    #[serde(rename = "pswd")]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    #[serde(rename = "pswd")]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
}

/// `meta` part of an upload. A `token` field from older clients is accepted and ignored.
#[derive(Debug, Deserialize)]
pub struct UploadMetaDto {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub grant: Vec<String>,
}

impl From<UploadMetaDto> for UploadMeta {
    fn from(dto: UploadMetaDto) -> Self {
        Self {
            name: dto.name,
            file: dto.file,
            public: dto.public,
            mime: dto.mime,
            grant: dto.grant,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonValue>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub login: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub limit: Option<String>,
}

impl From<ListQuery> for ListDocumentsRequest {
    fn from(query: ListQuery) -> Self {
        Self {
            login: query.login,
            key: query.key,
            value: query.value,
            limit: query.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentList {
    pub docs: Vec<DocumentListItem>,
}

/// `{"data": ...}` envelope.
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// `{"response": ...}` envelope.
#[derive(Debug, Serialize)]
pub struct ResponseEnvelope<T> {
    pub response: T,
}
