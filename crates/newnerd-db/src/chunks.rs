//! Chunk repository: embedded text chunks backing semantic search.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use newnerd_core::{ChunkRepository, Error, NewChunk, OwnerScope, Result, SemanticMatch};

/// PostgreSQL implementation of ChunkRepository.
#[derive(Clone)]
pub struct PgChunkRepository {
    pool: Pool<Postgres>,
}

impl PgChunkRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert chunks within an existing transaction.
    ///
    /// `offset` is added to each chunk's index so appended chunks continue
    /// the document's existing numbering.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        document_id: Uuid,
        model: &str,
        chunks: Vec<NewChunk>,
        offset: i32,
    ) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let id = Uuid::now_v7();
            sqlx::query(
                "INSERT INTO document_chunk (id, document_id, chunk_index, content, embedding, model, metadata, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, now())",
            )
            .bind(id)
            .bind(document_id)
            .bind(offset + chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.embedding)
            .bind(model)
            .bind(&chunk.metadata)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn ensure_document(
        tx: &mut Transaction<'_, Postgres>,
        document_id: Uuid,
    ) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM document WHERE id = $1)")
            .bind(document_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;
        if exists {
            Ok(())
        } else {
            Err(Error::DocumentNotFound(document_id))
        }
    }
}

#[async_trait]
impl ChunkRepository for PgChunkRepository {
    async fn append(
        &self,
        document_id: Uuid,
        model: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::ensure_document(&mut tx, document_id).await?;

        let next_index: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(chunk_index) + 1, 0) FROM document_chunk WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let ids = self
            .insert_tx(&mut tx, document_id, model, chunks, next_index)
            .await?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "chunks",
            op = "append",
            document_id = %document_id,
            chunk_count = ids.len(),
            "Chunks appended"
        );
        Ok(ids)
    }

    async fn replace_for_document(
        &self,
        document_id: Uuid,
        model: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::ensure_document(&mut tx, document_id).await?;

        sqlx::query("DELETE FROM document_chunk WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let ids = self.insert_tx(&mut tx, document_id, model, chunks, 0).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(ids)
    }

    async fn delete_for_document(&self, document_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document_chunk WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    #[instrument(
        skip(self, embedding),
        fields(subsystem = "db", component = "chunks", op = "match_chunks")
    )]
    async fn match_chunks(
        &self,
        embedding: &Vector,
        scope: &OwnerScope,
        threshold: f32,
        count: i64,
    ) -> Result<Vec<SemanticMatch>> {
        let rows = sqlx::query(
            "SELECT document_id, storage_path, title, content, similarity
             FROM match_document_chunks($1, $2, $3, $4, $5)",
        )
        .bind(embedding)
        .bind(threshold as f64)
        .bind(count as i32)
        .bind(scope.kind.as_str())
        .bind(scope.owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let matches: Vec<SemanticMatch> = rows
            .into_iter()
            .map(|row| SemanticMatch {
                document_id: row.get("document_id"),
                storage_path: row.get("storage_path"),
                title: row.get("title"),
                excerpt: row.get("content"),
                similarity: row.get::<f64, _>("similarity") as f32,
            })
            .collect();

        debug!(result_count = matches.len(), "Chunk similarity lookup complete");
        Ok(matches)
    }
}
