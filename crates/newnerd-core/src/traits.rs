//! Core traits for the library's pluggable backends.
//!
//! Every backend the search and processing code talks to sits behind one of
//! these traits, so handlers receive explicitly constructed clients and tests
//! substitute in-memory doubles.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::files::ExtractionPlan;
use crate::models::*;

// =============================================================================
// SEARCH LOOKUPS
// =============================================================================

/// Case-insensitive title lookup over one owner's documents.
#[async_trait]
pub trait KeywordLookup: Send + Sync {
    /// Documents owned by `scope` whose title (and, for teacher libraries,
    /// original filename) contains `query`, at most `limit` rows.
    async fn find_by_title(&self, scope: &OwnerScope, query: &str, limit: i64)
        -> Result<Vec<Document>>;
}

/// Embedding-similarity lookup over one owner's indexed chunks.
#[async_trait]
pub trait SemanticLookup: Send + Sync {
    /// Chunks similar to the query, best first, already filtered by the
    /// lookup's own `match_threshold`.
    async fn find_similar(&self, request: &SemanticQuery) -> Result<Vec<SemanticMatch>>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns one vector per input text, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for chat completions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run one completion and return the first choice.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// REPOSITORIES
// =============================================================================

/// Persistence for library documents. All reads and writes are owner-scoped.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, doc: NewDocument) -> Result<Document>;

    /// Fetch a document owned by `scope`. Documents of other owners are
    /// reported as `DocumentNotFound`.
    async fn fetch(&self, scope: &OwnerScope, id: Uuid) -> Result<Document>;

    /// Fetch without an owner check. Used by the processing functions,
    /// which receive a bare document id.
    async fn fetch_unscoped(&self, id: Uuid) -> Result<Document>;

    /// All documents of an owner, newest first.
    async fn list(&self, scope: &OwnerScope) -> Result<Vec<Document>>;

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()>;

    /// Persist extracted text and an optional document-level embedding.
    async fn store_extraction(
        &self,
        id: Uuid,
        text: &str,
        embedding: Option<Vector>,
    ) -> Result<()>;

    /// Delete a document row; its chunks are removed with it.
    /// Returns the deleted document.
    async fn delete(&self, scope: &OwnerScope, id: Uuid) -> Result<Document>;
}

/// Persistence for embedded chunks, the semantic index.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Append chunks for a document. Returns the new chunk ids.
    async fn append(&self, document_id: Uuid, model: &str, chunks: Vec<NewChunk>)
        -> Result<Vec<Uuid>>;

    /// Replace all chunks of a document atomically.
    async fn replace_for_document(
        &self,
        document_id: Uuid,
        model: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Uuid>>;

    async fn delete_for_document(&self, document_id: Uuid) -> Result<u64>;

    /// Chunks owned by `scope` with cosine similarity of at least
    /// `threshold`, best first, at most `count` rows.
    async fn match_chunks(
        &self,
        embedding: &Vector,
        scope: &OwnerScope,
        threshold: f32,
        count: i64,
    ) -> Result<Vec<SemanticMatch>>;
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Best-effort text extraction from an uploaded object.
pub trait TextExtractor: Send + Sync {
    /// Extracted text, or `None` when this extractor cannot read the format.
    fn extract(&self, filename: &str, bytes: &[u8]) -> Option<String>;
}

/// Reads plain-text formats directly, lossily decoding UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, filename: &str, bytes: &[u8]) -> Option<String> {
        match ExtractionPlan::for_filename(filename) {
            ExtractionPlan::InlineText => Some(String::from_utf8_lossy(bytes).into_owned()),
            ExtractionPlan::External | ExtractionPlan::Skip => None,
        }
    }
}
