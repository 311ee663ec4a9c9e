//! End-to-end behavior of the hybrid search engine over in-memory lookups.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use newnerd_core::{
    ChunkRepository, Document, DocumentStatus, Error, KeywordLookup, MatchSource, NewChunk,
    OwnerScope, Result, SemanticLookup, SemanticMatch, SemanticQuery, Vector,
};
use newnerd_inference::MockEmbeddingBackend;
use newnerd_search::{
    EmbeddingSemanticLookup, FailurePolicy, HybridSearchConfig, HybridSearchEngine,
    SearchSupersession,
};

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Default)]
struct StubKeyword {
    docs: Vec<Document>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(OwnerScope, String, i64)>>,
}

#[async_trait]
impl KeywordLookup for StubKeyword {
    async fn find_by_title(&self, scope: &OwnerScope, query: &str, limit: i64) -> Result<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((*scope, query.to_string(), limit));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::Internal("relation \"document\" is unavailable".to_string()));
        }
        Ok(self.docs.clone())
    }
}

#[derive(Default)]
struct StubSemantic {
    rows: Vec<SemanticMatch>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<SemanticQuery>>,
}

#[async_trait]
impl SemanticLookup for StubSemantic {
    async fn find_similar(&self, request: &SemanticQuery) -> Result<Vec<SemanticMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::Embedding("embedding provider unavailable".to_string()));
        }
        Ok(self.rows.clone())
    }
}

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn document(id: Uuid, owner: Uuid, title: &str) -> Document {
    Document {
        id,
        owner_kind: newnerd_core::OwnerKind::Student,
        owner_id: owner,
        storage_path: format!("{}/1700000000000_{}", owner, title),
        title: title.to_string(),
        original_name: title.to_string(),
        mime_type: "application/pdf".to_string(),
        size_bytes: 2048,
        status: DocumentStatus::Ready,
        extracted_text: None,
        embedding: None,
        metadata: json!({}),
        created_at: Utc::now(),
    }
}

fn semantic(id: Uuid, similarity: f32) -> SemanticMatch {
    SemanticMatch {
        document_id: Some(id),
        storage_path: None,
        title: Some(format!("doc {}", id.as_u128())),
        excerpt: "trecho relevante".to_string(),
        similarity,
    }
}

fn engine(keyword: Arc<StubKeyword>, semantic: Arc<StubSemantic>) -> HybridSearchEngine {
    HybridSearchEngine::new(keyword, semantic)
}

// =============================================================================
// Merging scenarios
// =============================================================================

#[tokio::test]
async fn test_title_match_wins_over_semantic_similarity() {
    let owner = Uuid::new_v4();
    let keyword = Arc::new(StubKeyword {
        docs: vec![document(id(1), owner, "Genetica")],
        ..Default::default()
    });
    let semantic = Arc::new(StubSemantic {
        rows: vec![semantic(id(1), 0.52), semantic(id(2), 0.6)],
        ..Default::default()
    });

    let outcome = engine(keyword, semantic)
        .search("genetica", &OwnerScope::student(owner))
        .await
        .unwrap();

    let got: Vec<(Uuid, f32)> = outcome
        .results
        .iter()
        .map(|r| (r.document_id.unwrap(), r.score))
        .collect();
    assert_eq!(got, vec![(id(1), 1.0), (id(2), 0.6)]);
    assert_eq!(outcome.keyword_hits, 1);
    assert_eq!(outcome.semantic_hits, 2);
    assert!(outcome.results[0].has_source(MatchSource::Title));
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_everything_below_floor_is_an_empty_state() {
    let semantic = Arc::new(StubSemantic {
        rows: vec![semantic(id(1), 0.41), semantic(id(2), 0.449)],
        ..Default::default()
    });

    let outcome = engine(Arc::new(StubKeyword::default()), semantic)
        .search("assunto sem documentos", &OwnerScope::student(Uuid::new_v4()))
        .await
        .unwrap();

    assert!(outcome.is_empty());
    assert_eq!(outcome.below_floor, 2);
}

#[tokio::test]
async fn test_keyword_failure_fails_search_by_default() {
    let keyword = Arc::new(StubKeyword {
        fail: true,
        ..Default::default()
    });
    let semantic = Arc::new(StubSemantic {
        rows: vec![semantic(id(2), 0.9)],
        ..Default::default()
    });

    let err = engine(keyword, semantic.clone())
        .search("genetica", &OwnerScope::student(Uuid::new_v4()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Search(ref m) if m.starts_with("keyword lookup failed")));
}

#[tokio::test]
async fn test_semantic_failure_fails_search_by_default() {
    let keyword = Arc::new(StubKeyword {
        docs: vec![document(id(1), Uuid::nil(), "Genetica")],
        ..Default::default()
    });
    let semantic = Arc::new(StubSemantic {
        fail: true,
        ..Default::default()
    });

    let err = engine(keyword, semantic)
        .search("genetica", &OwnerScope::student(Uuid::nil()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Search(ref m) if m.starts_with("semantic lookup failed")));
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_blank_query_makes_no_calls() {
    let keyword = Arc::new(StubKeyword::default());
    let semantic = Arc::new(StubSemantic::default());
    let engine = engine(keyword.clone(), semantic.clone());
    let scope = OwnerScope::teacher(Uuid::new_v4());

    for query in ["", "   ", "\t\n"] {
        let err = engine.search(query, &scope).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error for {:?}", query);
    }

    assert_eq!(keyword.calls.load(Ordering::SeqCst), 0);
    assert_eq!(semantic.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lookups_receive_scope_and_parameters() {
    let keyword = Arc::new(StubKeyword::default());
    let semantic = Arc::new(StubSemantic::default());
    let scope = OwnerScope::teacher(Uuid::new_v4());

    engine(keyword.clone(), semantic.clone())
        .search("  fotossíntese  ", &scope)
        .await
        .unwrap();

    let (kw_scope, kw_query, kw_limit) = keyword.seen.lock().unwrap()[0].clone();
    assert_eq!(kw_scope, scope);
    assert_eq!(kw_query, "fotossíntese");
    assert_eq!(kw_limit, 5);

    let sem = semantic.seen.lock().unwrap()[0].clone();
    assert_eq!(sem.scope, scope);
    assert_eq!(sem.query, "fotossíntese");
    assert_eq!(sem.match_count, 10);
    assert_eq!(sem.match_threshold, 0.4);
}

// =============================================================================
// Timeouts and degradation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_semantic_lookup_times_out() {
    let semantic = Arc::new(StubSemantic {
        delay: Some(Duration::from_secs(120)),
        ..Default::default()
    });

    let err = engine(Arc::new(StubKeyword::default()), semantic)
        .search("genetica", &OwnerScope::student(Uuid::new_v4()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test(start_paused = true)]
async fn test_degraded_semantic_timeout_keeps_title_matches() {
    let owner = Uuid::new_v4();
    let keyword = Arc::new(StubKeyword {
        docs: vec![document(id(1), owner, "Genetica")],
        ..Default::default()
    });
    let semantic = Arc::new(StubSemantic {
        delay: Some(Duration::from_secs(120)),
        ..Default::default()
    });

    let outcome = engine(keyword, semantic)
        .with_config(
            HybridSearchConfig::default()
                .with_failure_policy(FailurePolicy::degrade_semantic())
                .with_lookup_timeout(Duration::from_secs(2)),
        )
        .search("genetica", &OwnerScope::student(owner))
        .await
        .unwrap();

    assert_eq!(outcome.len(), 1);
    assert_eq!(outcome.results[0].score, 1.0);
    assert_eq!(outcome.warnings, vec!["semantic lookup unavailable".to_string()]);
}

#[tokio::test]
async fn test_degraded_keyword_failure_keeps_semantic_matches() {
    let keyword = Arc::new(StubKeyword {
        fail: true,
        ..Default::default()
    });
    let semantic = Arc::new(StubSemantic {
        rows: vec![semantic(id(2), 0.8)],
        ..Default::default()
    });
    let policy = FailurePolicy {
        keyword: newnerd_search::LookupFailure::Degrade,
        semantic: newnerd_search::LookupFailure::Fail,
    };

    let outcome = engine(keyword, semantic)
        .with_config(HybridSearchConfig::default().with_failure_policy(policy))
        .search("genetica", &OwnerScope::student(Uuid::new_v4()))
        .await
        .unwrap();

    assert_eq!(outcome.len(), 1);
    assert_eq!(outcome.results[0].document_id, Some(id(2)));
    assert_eq!(outcome.warnings.len(), 1);
}

// =============================================================================
// Supersession
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_newer_search_cancels_older_one() {
    let owner = Uuid::new_v4();
    let scope = OwnerScope::student(owner);
    let semantic = Arc::new(StubSemantic {
        rows: vec![semantic(id(2), 0.9)],
        delay: Some(Duration::from_secs(5)),
        ..Default::default()
    });
    let engine = Arc::new(engine(Arc::new(StubKeyword::default()), semantic));
    let registry = Arc::new(SearchSupersession::new());

    let first_ticket = registry.begin(scope);
    let older = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .search_with_ticket("genética", &scope, &first_ticket)
                .await
        })
    };
    tokio::task::yield_now().await;

    let second_ticket = registry.begin(scope);
    let newer = engine
        .search_with_ticket("genética molecular", &scope, &second_ticket)
        .await
        .unwrap();
    registry.finish(&second_ticket);

    let older = older.await.unwrap();
    assert!(matches!(older, Err(Error::Cancelled(_))));
    assert_eq!(newer.len(), 1);
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn test_already_superseded_ticket_never_runs() {
    let keyword = Arc::new(StubKeyword::default());
    let semantic = Arc::new(StubSemantic::default());
    let engine = engine(keyword.clone(), semantic.clone());
    let registry = SearchSupersession::new();
    let scope = OwnerScope::teacher(Uuid::new_v4());

    let stale = registry.begin(scope);
    let _current = registry.begin(scope);

    let err = engine
        .search_with_ticket("genetica", &scope, &stale)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
    assert_eq!(keyword.calls.load(Ordering::SeqCst), 0);
    assert_eq!(semantic.calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Embedding-backed semantic lookup
// =============================================================================

/// Chunk store that scores by cosine similarity against stored vectors.
struct InMemoryChunks {
    rows: Vec<(OwnerScope, Uuid, String, Vector)>,
}

#[async_trait]
impl ChunkRepository for InMemoryChunks {
    async fn append(&self, _: Uuid, _: &str, _: Vec<NewChunk>) -> Result<Vec<Uuid>> {
        Ok(vec![])
    }

    async fn replace_for_document(&self, _: Uuid, _: &str, _: Vec<NewChunk>) -> Result<Vec<Uuid>> {
        Ok(vec![])
    }

    async fn delete_for_document(&self, _: Uuid) -> Result<u64> {
        Ok(0)
    }

    async fn match_chunks(
        &self,
        embedding: &Vector,
        scope: &OwnerScope,
        threshold: f32,
        count: i64,
    ) -> Result<Vec<SemanticMatch>> {
        let query = embedding.as_slice();
        let mut out: Vec<SemanticMatch> = self
            .rows
            .iter()
            .filter(|(owner, ..)| owner == scope)
            .map(|(_, doc, content, v)| {
                let dot: f32 = query.iter().zip(v.as_slice()).map(|(a, b)| a * b).sum();
                SemanticMatch {
                    document_id: Some(*doc),
                    storage_path: None,
                    title: None,
                    excerpt: content.clone(),
                    similarity: dot,
                }
            })
            .filter(|m| m.similarity >= threshold)
            .collect();
        out.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        out.truncate(count as usize);
        Ok(out)
    }
}

#[tokio::test]
async fn test_embedding_lookup_matches_identical_text_and_respects_scope() {
    let embedder = MockEmbeddingBackend::new().with_dimension(32);
    let owner = OwnerScope::student(Uuid::new_v4());
    let stranger = OwnerScope::student(Uuid::new_v4());
    let chunks = InMemoryChunks {
        rows: vec![
            (owner, id(1), "ciclo de krebs".to_string(), embedder.vector_for("ciclo de krebs")),
            (stranger, id(2), "ciclo de krebs".to_string(), embedder.vector_for("ciclo de krebs")),
        ],
    };
    let lookup = EmbeddingSemanticLookup::new(Arc::new(chunks), Arc::new(embedder.clone()));

    let matches = lookup
        .find_similar(&SemanticQuery {
            query: "ciclo de krebs".to_string(),
            scope: owner,
            match_count: 10,
            match_threshold: 0.4,
        })
        .await
        .unwrap();

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].document_id, Some(id(1)));
    assert!((matches[0].similarity - 1.0).abs() < 1e-4);
    assert_eq!(embedder.call_count(), 1);
}

#[tokio::test]
async fn test_embedding_failure_surfaces_from_lookup() {
    let embedder = MockEmbeddingBackend::new().failing("quota exceeded");
    let lookup = EmbeddingSemanticLookup::new(
        Arc::new(InMemoryChunks { rows: vec![] }),
        Arc::new(embedder),
    );

    let err = lookup
        .find_similar(&SemanticQuery {
            query: "x".to_string(),
            scope: OwnerScope::teacher(Uuid::new_v4()),
            match_count: 10,
            match_threshold: 0.4,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
}
