use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{DocumentFilter, DocumentListQuery, DocumentsRepo, RepoError};
use crate::domain::documents::{DocumentContent, DocumentRecord};

use super::{PostgresRepositories, map_sqlx_error};

const DOCUMENT_COLUMNS: &str =
    "id, name, mime_type, public, file, content_path, json_content, created_at, granted_to";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    name: String,
    mime_type: String,
    public: bool,
    file: bool,
    content_path: Option<String>,
    json_content: Option<String>,
    created_at: OffsetDateTime,
    granted_to: Vec<String>,
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = RepoError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        DocumentRecord::from_columns(
            row.id,
            row.name,
            row.mime_type,
            row.public,
            row.file,
            row.content_path,
            row.json_content,
            row.created_at,
            row.granted_to,
        )
        .map_err(|err| RepoError::Integrity {
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl DocumentsRepo for PostgresRepositories {
    async fn insert_document(&self, record: &DocumentRecord) -> Result<(), RepoError> {
        let (content_path, json_content) = match &record.content {
            DocumentContent::File { blob_path } => (Some(blob_path.as_str()), None),
            DocumentContent::Json { data } => (None, data.as_deref()),
        };

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, name, mime_type, public, file, content_path, json_content, created_at, granted_to)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.mime_type)
        .bind(record.is_public)
        .bind(record.is_file())
        .bind(content_path)
        .bind(json_content)
        .bind(record.created_at)
        .bind(record.granted_to.as_slice())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RepoError> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(DocumentRecord::try_from).transpose()
    }

    async fn find_documents(&self, ids: &[Uuid]) -> Result<Vec<DocumentRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(DocumentRecord::try_from).collect()
    }

    async fn list_document_ids(&self, query: &DocumentListQuery) -> Result<Vec<Uuid>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM documents WHERE ");
        qb.push_bind(&query.granted_login);
        qb.push(" = ANY(granted_to)");

        match &query.filter {
            Some(DocumentFilter::Name(name)) => {
                qb.push(" AND name = ");
                qb.push_bind(name);
            }
            Some(DocumentFilter::MimeType(mime)) => {
                qb.push(" AND mime_type = ");
                qb.push_bind(mime);
            }
            None => {}
        }

        // Byte-order names, independent of the database's default collation.
        qb.push(r#" ORDER BY name COLLATE "C" ASC, created_at DESC LIMIT "#);
        qb.push_bind(i64::from(query.limit));

        qb.build_query_scalar::<Uuid>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
