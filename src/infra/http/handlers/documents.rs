use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Extension, Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value as JsonValue;

use crate::application::documents::{FilePart, UploadPayload};
use crate::domain::users::Caller;
use crate::infra::http::error::ApiError;
use crate::infra::http::models::{
    DataEnvelope, DocumentList, ListQuery, ResponseEnvelope, UploadMetaDto, UploadResponse,
};
use crate::infra::http::state::AppState;

const DEFAULT_BLOB_MIME: &str = "application/octet-stream";

pub async fn list_documents(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let docs = state.documents.list(&caller, &query.into()).await?;
    Ok(Json(DataEnvelope {
        data: DocumentList { docs },
    }))
}

pub async fn upload_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut meta: Option<UploadMetaDto> = None;
    let mut payload = UploadPayload::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("meta") => {
                let raw = field.bytes().await?;
                let parsed = serde_json::from_slice(&raw)
                    .map_err(|err| ApiError::bad_request(format!("invalid meta JSON: {err}")))?;
                meta = Some(parsed);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                payload.file = Some(FilePart { filename, bytes });
            }
            Some("json") => {
                payload.json = Some(field.bytes().await?);
            }
            _ => {}
        }
    }

    let meta = meta.ok_or_else(|| ApiError::bad_request("missing meta part"))?;
    let record = state
        .documents
        .upload(&caller, meta.into(), payload)
        .await?;

    let json = record.json_data().map(parse_stored_json).transpose()?;
    Ok((
        StatusCode::CREATED,
        Json(DataEnvelope {
            data: UploadResponse {
                json,
                file: record.name,
            },
        }),
    ))
}

pub async fn get_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let fetched = state.documents.get(&caller, &id).await?;

    if let Some(content) = fetched.content.clone() {
        let mime = fetched
            .mime_type()
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_BLOB_MIME)
            .to_string();
        return Ok(([(header::CONTENT_TYPE, mime)], content).into_response());
    }

    let data = fetched
        .record
        .json_data()
        .map(parse_stored_json)
        .transpose()?
        .unwrap_or(JsonValue::Null);
    Ok(Json(DataEnvelope { data }).into_response())
}

pub async fn delete_document(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.documents.delete(&caller, &id).await?;
    Ok(Json(ResponseEnvelope {
        response: BTreeMap::from([(id, true)]),
    }))
}

fn parse_stored_json(raw: &str) -> Result<JsonValue, ApiError> {
    serde_json::from_str(raw).map_err(|err| {
        ApiError::new(
            "infra::http::documents",
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("stored JSON is unreadable: {err}"),
        )
    })
}
