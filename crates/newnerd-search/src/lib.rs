//! # newnerd-search
//!
//! Hybrid search over a user's document library.
//!
//! This crate provides:
//! - Concurrent title + semantic lookups with per-call deadlines
//! - Rank merging with a relevance floor and identity deduplication
//! - Per-owner supersession of in-flight searches
//! - Semantic lookups backed by the remote function or a local embedder
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use newnerd_search::{HybridSearchEngine, HybridSearchConfig, SearchSupersession};
//!
//! let engine = HybridSearchEngine::new(Arc::new(db.documents.clone()), semantic)
//!     .with_config(HybridSearchConfig::from_env()?);
//! let supersession = SearchSupersession::new();
//!
//! let ticket = supersession.begin(scope);
//! let outcome = engine.search_with_ticket("fotossíntese", &scope, &ticket).await;
//! supersession.finish(&ticket);
//! ```

pub mod embedding_lookup;
pub mod function_client;
pub mod hybrid;
pub mod merge;
pub mod supersession;

// Re-export core types
pub use newnerd_core::*;

pub use embedding_lookup::EmbeddingSemanticLookup;
pub use function_client::{
    FunctionLookupConfig, FunctionMatch, FunctionSemanticLookup, SemanticSearchRequest,
    SemanticSearchResponse,
};
pub use hybrid::{FailurePolicy, HybridSearchConfig, HybridSearchEngine, LookupFailure};
pub use merge::{merge_results, rank, ConflictPolicy, MergeConfig, MergeReport};
pub use supersession::{SearchSupersession, SearchTicket};
