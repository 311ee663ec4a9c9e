//! Ingestion: uploads, stored-file processing, and chunk embedding.
//!
//! Every document moves through the lifecycle in [`DocumentStatus`]:
//! the row is inserted as `uploading`, moved to `processing` while text is
//! extracted and embedded, and settles on `ready`. A fatal step marks the
//! row `error` before the failure is returned.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use newnerd_core::files::{
    self, chunk_text, collapse_whitespace, truncate_chars, ExtractionPlan,
};
use newnerd_core::{
    defaults, ChunkInput, ChunkRepository, Document, DocumentRepository, DocumentStatus,
    EmbeddingBackend, Error, NewChunk, NewDocument, OwnerScope, Result, TextExtractor, Vector,
};
use newnerd_db::{object_key, StorageBackend};

/// What an upload does when the embedding provider fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingFailure {
    /// Mark the document `error` and fail the upload.
    Fail,
    /// Keep the file and its text, skip the semantic index, and settle on
    /// `ready` with a warning.
    #[default]
    Degrade,
}

impl FromStr for EmbeddingFailure {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "degrade" => Ok(Self::Degrade),
            other => Err(format!("expected 'fail' or 'degrade', got '{}'", other)),
        }
    }
}

impl fmt::Display for EmbeddingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => f.write_str("fail"),
            Self::Degrade => f.write_str("degrade"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub embedding_failure: EmbeddingFailure,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            embedding_failure: EmbeddingFailure::default(),
            chunk_size: defaults::CHUNK_SIZE,
            chunk_overlap: defaults::CHUNK_OVERLAP,
        }
    }
}

/// A file received by the upload route.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Text the client already extracted (PDF, DOCX).
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub document: Document,
    pub chunk_count: usize,
    pub warnings: Vec<String>,
}

/// Result of processing a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Indexed { chars: usize },
    /// Too little text to index. The document is still marked ready.
    Ignored,
}

/// Normalize the chunk list of an embed call.
///
/// `chunks` wins over `content`. Each text is cut to the per-chunk limit and
/// blank entries are dropped.
pub fn normalize_embed_chunks(
    chunks: Vec<ChunkInput>,
    content: Option<String>,
    metadata: JsonValue,
) -> Vec<ChunkInput> {
    let limit = defaults::EMBED_CHUNK_TEXT_LIMIT;
    if !chunks.is_empty() {
        return chunks
            .into_iter()
            .map(|c| ChunkInput {
                text: truncate_chars(&c.text, limit).to_string(),
                metadata: c.metadata,
            })
            .filter(|c| !c.text.trim().is_empty())
            .collect();
    }
    match content {
        Some(text) if !text.trim().is_empty() => vec![ChunkInput {
            text: truncate_chars(&text, limit).to_string(),
            metadata,
        }],
        _ => Vec::new(),
    }
}

/// Chunk metadata with the embedding provenance added.
fn chunk_metadata(base: &JsonValue, model: &str, dims: usize, generated_at: &str) -> JsonValue {
    let mut map = match base {
        JsonValue::Object(m) => m.clone(),
        _ => Map::new(),
    };
    map.insert("embedding_model".to_string(), json!(model));
    map.insert("embedding_dims".to_string(), json!(dims));
    map.insert("generated_at".to_string(), json!(generated_at));
    JsonValue::Object(map)
}

pub struct IngestService {
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    storage: Arc<dyn StorageBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    extractor: Arc<dyn TextExtractor>,
    config: IngestConfig,
}

impl IngestService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        chunks: Arc<dyn ChunkRepository>,
        storage: Arc<dyn StorageBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            documents,
            chunks,
            storage,
            embedder,
            extractor,
            config: IngestConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Store an uploaded file, register it, and index its text.
    #[instrument(skip(self, request), fields(
        subsystem = "api",
        component = "ingest",
        op = "upload",
        owner_kind = %scope.kind,
        owner_id = %scope.owner_id,
        size_bytes = request.bytes.len(),
    ))]
    pub async fn upload(&self, scope: &OwnerScope, request: UploadRequest) -> Result<UploadOutcome> {
        let original_name = files::basename(request.filename.trim()).to_string();
        if original_name.is_empty() {
            return Err(Error::InvalidInput("A file name is required".to_string()));
        }
        if request.bytes.is_empty() {
            return Err(Error::InvalidInput("Uploaded file is empty".to_string()));
        }
        let start = Instant::now();

        let storage_path = files::storage_path(scope.owner_id, Utc::now(), &original_name);
        let key = object_key(scope.kind, &storage_path)?;
        self.storage.write(&key, &request.bytes).await?;

        let new_doc = NewDocument {
            scope: *scope,
            storage_path,
            title: files::stem(&original_name).to_string(),
            mime_type: files::resolve_mime(&original_name, request.content_type.as_deref()),
            size_bytes: request.bytes.len() as i64,
            status: DocumentStatus::Uploading,
            metadata: json!({ "origin": "upload" }),
            original_name,
        };
        let doc = match self.documents.insert(new_doc).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(&key).await {
                    warn!(key = %key, error = %cleanup, "Failed to remove orphaned upload");
                }
                return Err(e);
            }
        };

        let (chunk_count, warnings) = match self.index_upload(&doc, &request).await {
            Ok(indexed) => indexed,
            Err(e) => {
                self.mark_failed(doc.id, &e).await;
                return Err(e);
            }
        };

        let document = self.documents.fetch(scope, doc.id).await?;
        info!(
            document_id = %document.id,
            chunk_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload complete"
        );
        Ok(UploadOutcome {
            document,
            chunk_count,
            warnings,
        })
    }

    async fn index_upload(
        &self,
        doc: &Document,
        request: &UploadRequest,
    ) -> Result<(usize, Vec<String>)> {
        let status = self
            .advance(doc.id, doc.status, DocumentStatus::Processing)
            .await?;
        let mut warnings = Vec::new();

        let chunk_count = match self.upload_text(&doc.original_name, request) {
            Some(text) => {
                let pieces = chunk_text(&text, self.config.chunk_size, self.config.chunk_overlap);
                match self.embed(&pieces).await {
                    Ok(vectors) => {
                        let chunks = self.new_chunks(
                            pieces
                                .into_iter()
                                .map(ChunkInput::new)
                                .zip(vectors)
                                .collect(),
                        );
                        let ids = self
                            .chunks
                            .replace_for_document(doc.id, self.embedder.model_name(), chunks)
                            .await?;
                        self.documents.store_extraction(doc.id, &text, None).await?;
                        ids.len()
                    }
                    Err(e) if self.config.embedding_failure == EmbeddingFailure::Degrade => {
                        warn!(
                            document_id = %doc.id,
                            error = %e,
                            "Embedding failed; document kept without semantic index"
                        );
                        self.documents.store_extraction(doc.id, &text, None).await?;
                        warnings.push(
                            "Semantic indexing unavailable; the document is searchable by title only"
                                .to_string(),
                        );
                        0
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                debug!(document_id = %doc.id, "No text to index");
                0
            }
        };

        self.advance(doc.id, status, DocumentStatus::Ready).await?;
        Ok((chunk_count, warnings))
    }

    /// Text to index for an upload: the client's text, else what the
    /// extractor reads from the bytes. Archives and media are never indexed.
    fn upload_text(&self, filename: &str, request: &UploadRequest) -> Option<String> {
        if !ExtractionPlan::for_filename(filename).should_index() {
            return None;
        }
        let text = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| self.extractor.extract(filename, &request.bytes))?;
        let text = truncate_chars(text.trim(), defaults::UPLOAD_TEXT_LIMIT).to_string();
        (!text.is_empty()).then_some(text)
    }

    /// Index a stored document by id: read its object, embed the first
    /// part of its text, and mark it ready.
    #[instrument(skip(self), fields(subsystem = "api", component = "ingest", op = "process_file"))]
    pub async fn process_file(&self, document_id: Uuid) -> Result<ProcessOutcome> {
        let doc = self.documents.fetch_unscoped(document_id).await?;
        let status = if doc.status == DocumentStatus::Processing {
            doc.status
        } else {
            self.advance(doc.id, doc.status, DocumentStatus::Processing)
                .await?
        };

        let outcome = match self.index_stored(&doc).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.mark_failed(doc.id, &e).await;
                return Err(e);
            }
        };
        self.advance(doc.id, status, DocumentStatus::Ready).await?;

        info!(document_id = %doc.id, outcome = ?outcome, "Processed stored file");
        Ok(outcome)
    }

    async fn index_stored(&self, doc: &Document) -> Result<ProcessOutcome> {
        let key = object_key(doc.owner_kind, &doc.storage_path)?;
        let bytes = self.storage.read(&key).await?;

        let raw = self
            .extractor
            .extract(&doc.original_name, &bytes)
            .or_else(|| doc.extracted_text.clone())
            .unwrap_or_default();
        let clean = collapse_whitespace(truncate_chars(&raw, defaults::PROCESS_FILE_TEXT_LIMIT));
        let chars = clean.chars().count();
        if chars < defaults::MIN_PROCESSABLE_TEXT_LEN {
            debug!(document_id = %doc.id, chars, "Text too short to index");
            return Ok(ProcessOutcome::Ignored);
        }

        let vector = self
            .embed(std::slice::from_ref(&clean))
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("Embedding backend returned no vector".to_string()))?;
        let chunks = self.new_chunks(vec![(ChunkInput::new(clean.clone()), vector.clone())]);
        self.chunks
            .replace_for_document(doc.id, self.embedder.model_name(), chunks)
            .await?;
        self.documents
            .store_extraction(doc.id, &clean, Some(vector))
            .await?;

        Ok(ProcessOutcome::Indexed { chars })
    }

    /// Embed caller-supplied chunks and append them to a document's index.
    /// Returns the new chunk ids.
    #[instrument(skip(self, chunks), fields(
        subsystem = "api",
        component = "ingest",
        op = "embed_chunks",
        input_count = chunks.len(),
    ))]
    pub async fn embed_chunks(
        &self,
        owner_id: Uuid,
        document_id: Uuid,
        chunks: Vec<ChunkInput>,
    ) -> Result<Vec<Uuid>> {
        if chunks.is_empty() {
            return Err(Error::InvalidInput(
                "No text to embed: provide chunks[] or content".to_string(),
            ));
        }
        let doc = self.documents.fetch_unscoped(document_id).await?;
        if doc.owner_id != owner_id {
            return Err(Error::DocumentNotFound(document_id));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed(&texts).await?;
        let new_chunks = self.new_chunks(chunks.into_iter().zip(vectors).collect());
        self.chunks
            .append(document_id, self.embedder.model_name(), new_chunks)
            .await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.embedder.embed_texts(texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn new_chunks(&self, embedded: Vec<(ChunkInput, Vector)>) -> Vec<NewChunk> {
        let model = self.embedder.model_name();
        let dims = self.embedder.dimension();
        let generated_at = Utc::now().to_rfc3339();
        embedded
            .into_iter()
            .enumerate()
            .map(|(i, (input, embedding))| NewChunk {
                chunk_index: i as i32,
                metadata: chunk_metadata(&input.metadata, model, dims, &generated_at),
                content: input.text,
                embedding,
            })
            .collect()
    }

    async fn advance(
        &self,
        id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<DocumentStatus> {
        let next = from.transition(to)?;
        self.documents.update_status(id, next).await?;
        Ok(next)
    }

    async fn mark_failed(&self, id: Uuid, cause: &Error) {
        warn!(document_id = %id, error = %cause, "Ingestion failed");
        if let Err(e) = self
            .documents
            .update_status(id, DocumentStatus::Error)
            .await
        {
            warn!(document_id = %id, error = %e, "Failed to mark document as errored");
        }
    }
}
