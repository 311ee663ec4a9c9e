//! Structured logging schema and field name constants.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same field names in every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (search hits, chunks) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "search", "db", "inference", "storage"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "hybrid_search", "merge", "gemini", "pool", "upload"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "embed_texts", "find_by_title", "process_file"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document UUID being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Owner UUID (student or teacher) scoping the operation.
pub const OWNER_ID: &str = "owner_id";

/// Owner kind ("student" or "teacher").
pub const OWNER_KIND: &str = "owner_kind";

/// Search query text.
pub const QUERY: &str = "query";

/// Search generation number within an owner's supersession slot.
pub const GENERATION: &str = "generation";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of chunks processed (embedding, chunking).
pub const CHUNK_COUNT: &str = "chunk_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Byte length of an uploaded object.
pub const SIZE_BYTES: &str = "size_bytes";

// ─── Search-specific fields ────────────────────────────────────────────────

/// Number of title-match results before merging.
pub const KEYWORD_HITS: &str = "keyword_hits";

/// Number of semantic results before merging.
pub const SEMANTIC_HITS: &str = "semantic_hits";

/// Number of semantic results dropped by the relevance floor.
pub const BELOW_FLOOR: &str = "below_floor";

/// Conflict policy used when both lookups return a document.
pub const CONFLICT_POLICY: &str = "conflict_policy";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Database table or entity affected.
pub const DB_TABLE: &str = "db_table";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
