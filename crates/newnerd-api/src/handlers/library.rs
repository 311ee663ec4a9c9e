//! Library routes: list, upload, and delete an owner's documents.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use newnerd_core::{Document, DocumentStatus, OwnerKind, OwnerScope, TypeFilter};
use newnerd_db::object_key;

use crate::error::ApiError;
use crate::services::UploadRequest;
use crate::state::AppState;

/// Resolve the `{kind}/{owner_id}` path segments.
pub(crate) fn owner_scope(kind: &str, owner_id: Uuid) -> Result<OwnerScope, ApiError> {
    let kind: OwnerKind = kind.parse().map_err(ApiError::BadRequest)?;
    Ok(OwnerScope::new(kind, owner_id))
}

/// A library entry as shown in the document grid.
#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub original_name: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title.clone(),
            original_name: doc.original_name.clone(),
            storage_path: doc.storage_path.clone(),
            mime_type: doc.mime_type.clone(),
            size_bytes: doc.size_bytes,
            status: doc.status,
            snippet: doc.snippet(),
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    #[serde(default, rename = "type")]
    pub type_filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    pub documents: Vec<DocumentSummary>,
    pub count: usize,
}

/// List an owner's documents, newest first, optionally filtered by type
/// (`pdf`, `docx`, `txt`, `csv`, `json`, `zip`, `audio`, `video`).
pub async fn list_documents(
    State(state): State<AppState>,
    Path((kind, owner_id)): Path<(String, Uuid)>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<ListDocumentsResponse>, ApiError> {
    let scope = owner_scope(&kind, owner_id)?;
    let filter = TypeFilter::parse(query.type_filter.as_deref().unwrap_or(""));

    let documents: Vec<DocumentSummary> = state
        .documents
        .list(&scope)
        .await?
        .iter()
        .filter(|doc| filter.matches(&doc.original_name, &doc.mime_type))
        .map(DocumentSummary::from)
        .collect();

    Ok(Json(ListDocumentsResponse {
        count: documents.len(),
        documents,
    }))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document: DocumentSummary,
    pub chunk_count: usize,
    pub warnings: Vec<String>,
}

/// Upload a file into an owner's library.
///
/// # Multipart Fields
/// - `file`: the file (required)
/// - `text`: text the client already extracted, e.g. from a PDF (optional)
///
/// # Returns
/// - 201 Created with the stored document
/// - 400 Bad Request if the file is missing or empty
pub async fn upload_document(
    State(state): State<AppState>,
    Path((kind, owner_id)): Path<(String, Uuid)>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let scope = owner_scope(&kind, owner_id)?;

    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(|c| c.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?
                    .to_vec();
                file = Some((filename, content_type, bytes));
            }
            Some("text") => {
                text = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) = file
        .ok_or_else(|| ApiError::BadRequest("Missing file in multipart form".to_string()))?;

    let outcome = state
        .ingest
        .upload(
            &scope,
            UploadRequest {
                filename,
                content_type,
                bytes,
                text,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document: DocumentSummary::from(&outcome.document),
            chunk_count: outcome.chunk_count,
            warnings: outcome.warnings,
        }),
    ))
}

/// Delete a document: its stored object first, then the row. Chunks go
/// with the row.
pub async fn delete_document(
    State(state): State<AppState>,
    Path((kind, owner_id, id)): Path<(String, Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = owner_scope(&kind, owner_id)?;
    let doc = state.documents.fetch(&scope, id).await?;

    match object_key(doc.owner_kind, &doc.storage_path) {
        Ok(key) => state.storage.delete(&key).await?,
        Err(e) => warn!(document_id = %id, error = %e, "Skipping storage delete for invalid path"),
    }
    state.documents.delete(&scope, id).await?;

    info!(document_id = %id, owner_id = %scope.owner_id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}
