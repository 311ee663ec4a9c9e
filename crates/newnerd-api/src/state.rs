//! Shared application state.

use std::sync::Arc;

use newnerd_core::{
    ChatBackend, ChunkRepository, DocumentRepository, EmbeddingBackend, KeywordLookup,
    SemanticLookup, TextExtractor,
};
use newnerd_db::StorageBackend;
use newnerd_search::{
    EmbeddingSemanticLookup, HybridSearchConfig, HybridSearchEngine, SearchSupersession,
};

use crate::services::{AssistantService, IngestConfig, IngestService};

/// Backend handles the server is built from. Constructed explicitly in
/// `main` (or by tests with in-memory doubles) and injected here.
#[derive(Clone)]
pub struct Backends {
    pub documents: Arc<dyn DocumentRepository>,
    pub keyword: Arc<dyn KeywordLookup>,
    pub chunks: Arc<dyn ChunkRepository>,
    pub storage: Arc<dyn StorageBackend>,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub extractor: Arc<dyn TextExtractor>,
    /// Chat model for the assistant functions. `None` disables them.
    pub chat: Option<Arc<dyn ChatBackend>>,
}

impl Backends {
    /// Semantic lookup that embeds in-process and matches stored chunks.
    pub fn local_lookup(&self) -> Arc<dyn SemanticLookup> {
        Arc::new(EmbeddingSemanticLookup::new(
            self.chunks.clone(),
            self.embedder.clone(),
        ))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<dyn DocumentRepository>,
    pub storage: Arc<dyn StorageBackend>,
    /// Hybrid engine behind the library search route.
    pub search: Arc<HybridSearchEngine>,
    /// Per-owner registry so a newer search cancels an older one.
    pub supersession: Arc<SearchSupersession>,
    /// Lookup served by the `semantic-search` function endpoint.
    pub semantic: Arc<dyn SemanticLookup>,
    pub ingest: Arc<IngestService>,
    pub assistant: Option<Arc<AssistantService>>,
}

impl AppState {
    /// `search_lookup` is the semantic half of the search route: the local
    /// lookup, or a client for a remote function.
    pub fn new(
        backends: Backends,
        search_lookup: Arc<dyn SemanticLookup>,
        search_config: HybridSearchConfig,
        ingest_config: IngestConfig,
    ) -> Self {
        let search = HybridSearchEngine::new(backends.keyword.clone(), search_lookup)
            .with_config(search_config);
        let ingest = IngestService::new(
            backends.documents.clone(),
            backends.chunks.clone(),
            backends.storage.clone(),
            backends.embedder.clone(),
            backends.extractor.clone(),
        )
        .with_config(ingest_config);

        Self {
            semantic: backends.local_lookup(),
            assistant: backends
                .chat
                .map(|chat| Arc::new(AssistantService::new(chat))),
            documents: backends.documents,
            storage: backends.storage,
            search: Arc::new(search),
            supersession: Arc::new(SearchSupersession::new()),
            ingest: Arc::new(ingest),
        }
    }
}
