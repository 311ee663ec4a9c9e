//! Service layer for business logic.

pub mod assistant;
pub mod ingest;

pub use assistant::{
    AnswerKind, AssistantError, AssistantService, Grade, GradingInput, QuestionSpec,
};
pub use ingest::{
    normalize_embed_chunks, EmbeddingFailure, IngestConfig, IngestService, ProcessOutcome,
    UploadOutcome, UploadRequest,
};
