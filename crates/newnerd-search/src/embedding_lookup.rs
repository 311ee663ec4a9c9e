//! Semantic lookup that embeds the query locally and matches stored chunks.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument};

use newnerd_core::{
    ChunkRepository, EmbeddingBackend, Error, Result, SemanticLookup, SemanticMatch,
    SemanticQuery,
};

/// Embeds the query with an [`EmbeddingBackend`] and runs the owner-scoped
/// chunk match.
pub struct EmbeddingSemanticLookup {
    chunks: Arc<dyn ChunkRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl EmbeddingSemanticLookup {
    pub fn new(chunks: Arc<dyn ChunkRepository>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { chunks, embedder }
    }
}

#[async_trait]
impl SemanticLookup for EmbeddingSemanticLookup {
    #[instrument(skip(self, request), fields(
        subsystem = "search",
        component = "embedding_lookup",
        op = "find_similar",
        model = %self.embedder.model_name(),
        owner_id = %request.scope.owner_id,
    ))]
    async fn find_similar(&self, request: &SemanticQuery) -> Result<Vec<SemanticMatch>> {
        if request.query.trim().is_empty() {
            return Err(Error::InvalidInput("query is required".to_string()));
        }
        let start = Instant::now();

        let mut vectors = self.embedder.embed_texts(&[request.query.clone()]).await?;
        let embedding = vectors
            .pop()
            .ok_or_else(|| Error::Embedding("Embedding backend returned no vector".to_string()))?;
        let embed_ms = start.elapsed().as_millis() as u64;

        let matches = self
            .chunks
            .match_chunks(
                &embedding,
                &request.scope,
                request.match_threshold,
                request.match_count,
            )
            .await?;

        debug!(
            result_count = matches.len(),
            embed_ms,
            duration_ms = start.elapsed().as_millis() as u64,
            "Chunk similarity lookup complete"
        );
        Ok(matches)
    }
}
