//! Centralized default constants for the New Nerd library.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// HYBRID SEARCH
// =============================================================================

/// Maximum number of title matches requested from the keyword lookup.
pub const KEYWORD_MATCH_LIMIT: i64 = 5;

/// Confidence score pinned on every title match.
pub const KEYWORD_SCORE: f32 = 1.0;

/// Maximum number of semantic matches requested per search.
pub const SEMANTIC_MATCH_COUNT: i64 = 10;

/// Similarity threshold applied inside the semantic lookup.
pub const SEMANTIC_MATCH_THRESHOLD: f32 = 0.4;

/// Secondary relevance floor applied after the semantic lookup returns.
/// Semantic matches strictly below this value are dropped before merging.
pub const SEMANTIC_RELEVANCE_FLOOR: f32 = 0.45;

/// Per-call deadline for each lookup of a hybrid search (seconds).
pub const LOOKUP_TIMEOUT_SECS: u64 = 15;

/// Provenance label shown for title matches.
pub const TITLE_MATCH_LABEL: &str = "title match";

/// Provenance label shown for embedding-similarity matches.
pub const SEMANTIC_MATCH_LABEL: &str = "semantic match";

/// Message rendered when a search completes with no results.
pub const EMPTY_STATE_MESSAGE: &str = "No documents matched your search.";

/// Generic message shown when a search fails. Details go to the log.
pub const SEARCH_FAILED_MESSAGE: &str = "Search failed. Please try again.";

/// Title used for a semantic match whose lookup row carries no title or path.
pub const UNTITLED_DOCUMENT: &str = "Untitled document";

// =============================================================================
// SEMANTIC SEARCH FUNCTION
// =============================================================================

/// Match count used by the semantic-search function when the caller omits it.
pub const FUNCTION_MATCH_COUNT: i64 = 5;

/// Match threshold used by the semantic-search function when the caller omits it.
pub const FUNCTION_MATCH_THRESHOLD: f32 = 0.3;

/// Base URL of the service hosting the semantic-search function.
pub const SEMANTIC_FUNCTION_URL: &str = "http://localhost:3000";

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model (Google Generative Language API).
pub const GEMINI_EMBED_MODEL: &str = "text-embedding-004";

/// Vector dimension produced by text-embedding-004.
pub const GEMINI_EMBED_DIMENSION: usize = 768;

/// Default Google Generative Language API base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Alternate embedding model (OpenAI).
pub const OPENAI_EMBED_MODEL: &str = "text-embedding-3-small";

/// Vector dimension produced by text-embedding-3-small.
pub const OPENAI_EMBED_DIMENSION: usize = 1536;

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Default chat completion model (OpenAI).
pub const OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";

/// Timeout for chat completion requests in seconds.
pub const CHAT_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// TEXT EXTRACTION & CHUNKING
// =============================================================================

/// Maximum characters of client-extracted text accepted on upload.
pub const UPLOAD_TEXT_LIMIT: usize = 30_000;

/// Maximum characters per chunk accepted by the embed function.
pub const EMBED_CHUNK_TEXT_LIMIT: usize = 12_000;

/// Maximum characters read from an object by the process-file function.
pub const PROCESS_FILE_TEXT_LIMIT: usize = 8_000;

/// Texts shorter than this (after whitespace cleanup) are not embedded.
pub const MIN_PROCESSABLE_TEXT_LEN: usize = 10;

/// Maximum characters per chunk for text splitting.
pub const CHUNK_SIZE: usize = 1000;

/// Overlap characters between adjacent chunks for context preservation.
pub const CHUNK_OVERLAP: usize = 100;

/// Maximum characters of extracted text kept as a result excerpt.
pub const SNIPPET_LENGTH: usize = 200;

// =============================================================================
// STORAGE
// =============================================================================

/// Object storage bucket for student libraries.
pub const STUDENT_BUCKET: &str = "alunos-biblioteca";

/// Object storage bucket for teacher libraries.
pub const TEACHER_BUCKET: &str = "newnerd_professores";

/// Default local directory backing object storage.
pub const STORAGE_PATH: &str = "./data/storage";

/// Fallback MIME type for unknown extensions.
pub const FALLBACK_MIME: &str = "application/octet-stream";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Maximum request body size in bytes (50 MB uploads).
pub const MAX_BODY_SIZE_BYTES: usize = 50 * 1024 * 1024;

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Default maximum connections in the pool.
pub const POOL_MAX_CONNECTIONS: u32 = 10;

/// Default minimum idle connections.
pub const POOL_MIN_CONNECTIONS: u32 = 1;

/// Default connection acquire timeout in seconds.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Default idle connection timeout in seconds.
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds.
pub const POOL_MAX_LIFETIME_SECS: u64 = 1800;
