//! Shared harness: the real router over in-memory repositories, a temp-dir
//! storage backend, and the mock embedder, served on an ephemeral port.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use newnerd_api::services::IngestConfig;
use newnerd_api::{app, AppState, Backends};
use newnerd_core::{
    ChatBackend, ChunkRepository, Document, DocumentRepository, DocumentStatus, Error, KeywordLookup,
    NewChunk, NewDocument, OwnerScope, PlainTextExtractor, Result, SemanticLookup,
    SemanticMatch, SemanticQuery, Vector,
};
use newnerd_db::FilesystemBackend;
use newnerd_inference::{MockEmbeddingBackend, OpenAIChatClient, OpenAIChatConfig};
use newnerd_search::HybridSearchConfig;

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vector,
    pub model: String,
    pub metadata: serde_json::Value,
}

/// Documents and chunks held in memory, owner-scoped like the database.
#[derive(Default)]
pub struct MemoryLibrary {
    pub docs: Mutex<Vec<Document>>,
    pub chunks: Mutex<Vec<StoredChunk>>,
    pub status_log: Mutex<Vec<(Uuid, DocumentStatus)>>,
    pub fail_keyword: AtomicBool,
    pub keyword_calls: AtomicUsize,
}

impl MemoryLibrary {
    pub fn document(&self, id: Uuid) -> Option<Document> {
        self.docs.lock().unwrap().iter().find(|d| d.id == id).cloned()
    }

    pub fn chunks_for(&self, id: Uuid) -> Vec<StoredChunk> {
        let mut chunks: Vec<StoredChunk> = self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }

    pub fn statuses(&self, id: Uuid) -> Vec<DocumentStatus> {
        self.status_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(doc, _)| *doc == id)
            .map(|(_, s)| *s)
            .collect()
    }

    /// Insert a document row directly, as if uploaded earlier.
    pub fn seed(&self, scope: OwnerScope, title: &str, status: DocumentStatus) -> Document {
        let doc = Document {
            id: Uuid::now_v7(),
            owner_kind: scope.kind,
            owner_id: scope.owner_id,
            storage_path: format!("{}/{}_{}", scope.owner_id, Utc::now().timestamp_millis(), title),
            title: newnerd_core::files::stem(title).to_string(),
            original_name: title.to_string(),
            mime_type: newnerd_core::files::guess_mime_by_extension(title).to_string(),
            size_bytes: 0,
            status,
            extracted_text: None,
            embedding: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        };
        self.docs.lock().unwrap().push(doc.clone());
        doc
    }

    fn set<F: FnOnce(&mut Document)>(&self, id: Uuid, f: F) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(Error::DocumentNotFound(id))?;
        f(doc);
        Ok(())
    }

    fn insert_chunks(&self, document_id: Uuid, model: &str, chunks: Vec<NewChunk>, offset: i32) -> Vec<Uuid> {
        let mut stored = self.chunks.lock().unwrap();
        chunks
            .into_iter()
            .map(|c| {
                let id = Uuid::now_v7();
                stored.push(StoredChunk {
                    id,
                    document_id,
                    chunk_index: offset + c.chunk_index,
                    content: c.content,
                    embedding: c.embedding,
                    model: model.to_string(),
                    metadata: c.metadata,
                });
                id
            })
            .collect()
    }
}

#[async_trait]
impl DocumentRepository for MemoryLibrary {
    async fn insert(&self, doc: NewDocument) -> Result<Document> {
        let document = Document {
            id: Uuid::now_v7(),
            owner_kind: doc.scope.kind,
            owner_id: doc.scope.owner_id,
            storage_path: doc.storage_path,
            title: doc.title,
            original_name: doc.original_name,
            mime_type: doc.mime_type,
            size_bytes: doc.size_bytes,
            status: doc.status,
            extracted_text: None,
            embedding: None,
            metadata: doc.metadata,
            created_at: Utc::now(),
        };
        self.status_log
            .lock()
            .unwrap()
            .push((document.id, document.status));
        self.docs.lock().unwrap().push(document.clone());
        Ok(document)
    }

    async fn fetch(&self, scope: &OwnerScope, id: Uuid) -> Result<Document> {
        self.document(id)
            .filter(|d| d.is_owned_by(scope))
            .ok_or(Error::DocumentNotFound(id))
    }

    async fn fetch_unscoped(&self, id: Uuid) -> Result<Document> {
        self.document(id).ok_or(Error::DocumentNotFound(id))
    }

    async fn list(&self, scope: &OwnerScope) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.is_owned_by(scope))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        self.set(id, |d| d.status = status)?;
        self.status_log.lock().unwrap().push((id, status));
        Ok(())
    }

    async fn store_extraction(&self, id: Uuid, text: &str, embedding: Option<Vector>) -> Result<()> {
        self.set(id, |d| {
            d.extracted_text = Some(text.to_string());
            if embedding.is_some() {
                d.embedding = embedding;
            }
        })
    }

    async fn delete(&self, scope: &OwnerScope, id: Uuid) -> Result<Document> {
        let doc = self.fetch(scope, id).await?;
        self.docs.lock().unwrap().retain(|d| d.id != id);
        self.chunks.lock().unwrap().retain(|c| c.document_id != id);
        Ok(doc)
    }
}

#[async_trait]
impl KeywordLookup for MemoryLibrary {
    async fn find_by_title(&self, scope: &OwnerScope, query: &str, limit: i64) -> Result<Vec<Document>> {
        self.keyword_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_keyword.load(Ordering::SeqCst) {
            return Err(Error::Request("connection refused".to_string()));
        }
        let needle = query.to_lowercase();
        Ok(self
            .list(scope)
            .await?
            .into_iter()
            .filter(|d| d.title.to_lowercase().contains(&needle))
            .take(limit as usize)
            .collect())
    }
}

#[async_trait]
impl ChunkRepository for MemoryLibrary {
    async fn append(&self, document_id: Uuid, model: &str, chunks: Vec<NewChunk>) -> Result<Vec<Uuid>> {
        self.fetch_unscoped(document_id).await?;
        let offset = self
            .chunks_for(document_id)
            .last()
            .map(|c| c.chunk_index + 1)
            .unwrap_or(0);
        Ok(self.insert_chunks(document_id, model, chunks, offset))
    }

    async fn replace_for_document(
        &self,
        document_id: Uuid,
        model: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<Uuid>> {
        self.fetch_unscoped(document_id).await?;
        self.chunks
            .lock()
            .unwrap()
            .retain(|c| c.document_id != document_id);
        Ok(self.insert_chunks(document_id, model, chunks, 0))
    }

    async fn delete_for_document(&self, document_id: Uuid) -> Result<u64> {
        let mut chunks = self.chunks.lock().unwrap();
        let before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        Ok((before - chunks.len()) as u64)
    }

    async fn match_chunks(
        &self,
        embedding: &Vector,
        scope: &OwnerScope,
        threshold: f32,
        count: i64,
    ) -> Result<Vec<SemanticMatch>> {
        let owned: Vec<Document> = self.list(scope).await?;
        let query = embedding.as_slice();
        let mut matches: Vec<SemanticMatch> = self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| {
                let doc = owned.iter().find(|d| d.id == c.document_id)?;
                let similarity: f32 = query
                    .iter()
                    .zip(c.embedding.as_slice())
                    .map(|(a, b)| a * b)
                    .sum();
                (similarity >= threshold).then(|| SemanticMatch {
                    document_id: Some(doc.id),
                    storage_path: Some(doc.storage_path.clone()),
                    title: Some(doc.title.clone()),
                    excerpt: c.content.clone(),
                    similarity,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(count as usize);
        Ok(matches)
    }
}

/// Semantic lookup with fixed rows, for controlling similarity exactly.
#[derive(Default)]
pub struct FixedSemantic {
    pub rows: Mutex<Vec<SemanticMatch>>,
    pub fail: AtomicBool,
    pub delay_ms: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FixedSemantic {
    pub fn set_rows(&self, rows: Vec<SemanticMatch>) {
        *self.rows.lock().unwrap() = rows;
    }
}

#[async_trait]
impl SemanticLookup for FixedSemantic {
    async fn find_similar(&self, _request: &SemanticQuery) -> Result<Vec<SemanticMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay as u64)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Embedding("quota exceeded".to_string()));
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

pub struct TestOptions {
    pub embedder: MockEmbeddingBackend,
    pub ingest: IngestConfig,
    pub search: HybridSearchConfig,
    /// Use [`FixedSemantic`] for the search route instead of the local lookup.
    pub fixed_semantic: bool,
    /// Base URL of a chat completions server. `None` leaves the assistant
    /// functions unconfigured.
    pub chat_url: Option<String>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            embedder: MockEmbeddingBackend::new(),
            ingest: IngestConfig::default(),
            search: HybridSearchConfig::default(),
            fixed_semantic: true,
            chat_url: None,
        }
    }
}

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub library: Arc<MemoryLibrary>,
    pub semantic: Arc<FixedSemantic>,
    pub embedder: MockEmbeddingBackend,
    pub storage_dir: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn library_url(&self, scope: &OwnerScope, rest: &str) -> String {
        self.url(&format!(
            "/api/v1/library/{}/{}{}",
            scope.kind, scope.owner_id, rest
        ))
    }

    /// Path of a stored object inside the temp storage directory.
    pub fn object_path(&self, doc: &Document) -> std::path::PathBuf {
        self.storage_dir
            .path()
            .join(doc.owner_kind.bucket())
            .join(&doc.storage_path)
    }
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with(TestOptions::default()).await
}

pub async fn spawn_server_with(options: TestOptions) -> TestServer {
    let storage_dir = TempDir::new().unwrap();
    let library = Arc::new(MemoryLibrary::default());
    let semantic = Arc::new(FixedSemantic::default());

    let backends = Backends {
        documents: library.clone(),
        keyword: library.clone(),
        chunks: library.clone(),
        storage: Arc::new(FilesystemBackend::new(storage_dir.path())),
        embedder: Arc::new(options.embedder.clone()),
        extractor: Arc::new(PlainTextExtractor),
        chat: options.chat_url.map(|base_url| {
            Arc::new(
                OpenAIChatClient::new(OpenAIChatConfig {
                    base_url,
                    api_key: Some("sk-test".to_string()),
                    model: "gpt-4o-mini".to_string(),
                    timeout_seconds: 5,
                })
                .unwrap(),
            ) as Arc<dyn ChatBackend>
        }),
    };
    let search_lookup: Arc<dyn SemanticLookup> = if options.fixed_semantic {
        semantic.clone() as Arc<dyn SemanticLookup>
    } else {
        backends.local_lookup()
    };

    let state = AppState::new(backends, search_lookup, options.search, options.ingest);
    let router = app(state, vec!["http://localhost:5173".parse().unwrap()], 10 * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        library,
        semantic,
        embedder: options.embedder,
        storage_dir,
    }
}
