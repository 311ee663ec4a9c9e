//! Document repository: library rows for students and teachers.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use newnerd_core::{
    Document, DocumentRepository, DocumentStatus, Error, KeywordFields, KeywordLookup,
    NewDocument, OwnerKind, OwnerScope, Result,
};

use crate::escape_like;

const DOCUMENT_COLUMNS: &str = "id, owner_kind, owner_id, storage_path, title, original_name, \
     mime_type, size_bytes, status, extracted_text, embedding, metadata, created_at";

/// PostgreSQL implementation of DocumentRepository and KeywordLookup.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = row.get(column);
    raw.parse::<T>()
        .map_err(|e| Error::Internal(format!("document.{}: {}", column, e)))
}

pub(crate) fn document_from_row(row: &PgRow) -> Result<Document> {
    let owner_kind: OwnerKind = parse_column(row, "owner_kind")?;
    let status: DocumentStatus = parse_column(row, "status")?;
    Ok(Document {
        id: row.get("id"),
        owner_kind,
        owner_id: row.get("owner_id"),
        storage_path: row.get("storage_path"),
        title: row.get("title"),
        original_name: row.get("original_name"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        status,
        extracted_text: row.get("extracted_text"),
        embedding: row.get::<Option<Vector>, _>("embedding"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    })
}

/// `WHERE` fragment matching `$3` against the fields searched for an owner kind.
fn keyword_clause(fields: KeywordFields) -> &'static str {
    match fields {
        KeywordFields::Title => "title ILIKE $3",
        KeywordFields::TitleOrFilename => "(title ILIKE $3 OR original_name ILIKE $3)",
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, doc: NewDocument) -> Result<Document> {
        let query = format!(
            "INSERT INTO document (id, owner_kind, owner_id, storage_path, title, original_name,
                                   mime_type, size_bytes, status, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
             RETURNING {}",
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(Uuid::now_v7())
            .bind(doc.scope.kind.as_str())
            .bind(doc.scope.owner_id)
            .bind(&doc.storage_path)
            .bind(&doc.title)
            .bind(&doc.original_name)
            .bind(&doc.mime_type)
            .bind(doc.size_bytes)
            .bind(doc.status.to_string())
            .bind(&doc.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        document_from_row(&row)
    }

    async fn fetch(&self, scope: &OwnerScope, id: Uuid) -> Result<Document> {
        let query = format!(
            "SELECT {} FROM document WHERE id = $1 AND owner_kind = $2 AND owner_id = $3",
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(scope.kind.as_str())
            .bind(scope.owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::DocumentNotFound(id))?;

        document_from_row(&row)
    }

    async fn fetch_unscoped(&self, id: Uuid) -> Result<Document> {
        let query = format!("SELECT {} FROM document WHERE id = $1", DOCUMENT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::DocumentNotFound(id))?;

        document_from_row(&row)
    }

    async fn list(&self, scope: &OwnerScope) -> Result<Vec<Document>> {
        let query = format!(
            "SELECT {} FROM document
             WHERE owner_kind = $1 AND owner_id = $2
             ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(scope.kind.as_str())
            .bind(scope.owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(document_from_row).collect()
    }

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE document SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        debug!(
            subsystem = "db",
            component = "documents",
            op = "update_status",
            document_id = %id,
            status = %status,
            "Document status updated"
        );
        Ok(())
    }

    async fn store_extraction(
        &self,
        id: Uuid,
        text: &str,
        embedding: Option<Vector>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE document
             SET extracted_text = $2, embedding = COALESCE($3, embedding)
             WHERE id = $1",
        )
        .bind(id)
        .bind(text)
        .bind(embedding)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, scope: &OwnerScope, id: Uuid) -> Result<Document> {
        let query = format!(
            "DELETE FROM document
             WHERE id = $1 AND owner_kind = $2 AND owner_id = $3
             RETURNING {}",
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(scope.kind.as_str())
            .bind(scope.owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::DocumentNotFound(id))?;

        document_from_row(&row)
    }
}

#[async_trait]
impl KeywordLookup for PgDocumentRepository {
    #[instrument(
        skip(self, query),
        fields(subsystem = "db", component = "documents", op = "find_by_title", owner_kind = %scope.kind)
    )]
    async fn find_by_title(
        &self,
        scope: &OwnerScope,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let sql = format!(
            "SELECT {} FROM document
             WHERE owner_kind = $1 AND owner_id = $2 AND {}
             ORDER BY created_at DESC
             LIMIT $4",
            DOCUMENT_COLUMNS,
            keyword_clause(scope.kind.keyword_fields())
        );
        let rows = sqlx::query(&sql)
            .bind(scope.kind.as_str())
            .bind(scope.owner_id)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(result_count = rows.len(), "Title lookup complete");
        rows.iter().map(document_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_clause_per_owner_kind() {
        assert_eq!(
            keyword_clause(OwnerKind::Student.keyword_fields()),
            "title ILIKE $3"
        );
        assert!(keyword_clause(OwnerKind::Teacher.keyword_fields()).contains("original_name"));
    }

    #[test]
    fn test_document_columns_cover_model_fields() {
        for column in [
            "owner_kind",
            "storage_path",
            "original_name",
            "extracted_text",
            "embedding",
            "created_at",
        ] {
            assert!(DOCUMENT_COLUMNS.contains(column), "missing {}", column);
        }
    }
}
