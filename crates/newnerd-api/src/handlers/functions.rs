//! Serverless-function endpoints under `/functions/v1`.
//!
//! Library functions (`semantic-search`, `embed`, `process-file`) and the
//! chat-backed assistants (`chat-ia`, `correct-answer`, `generate-question`).
//!
//! These keep the request and response shapes the web clients already
//! call: snake_case bodies, `{"error": ...}` on failure.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

use newnerd_core::{ChatMessage, ChunkInput, Error};
use newnerd_search::{FunctionMatch, SemanticSearchRequest, SemanticSearchResponse};

use crate::error::ApiError;
use crate::services::{
    normalize_embed_chunks, AnswerKind, AssistantService, Grade, GradingInput, ProcessOutcome,
    QuestionSpec,
};
use crate::state::AppState;

/// `POST /functions/v1/semantic-search`: owner-scoped chunk similarity.
pub async fn semantic_search(
    State(state): State<AppState>,
    Json(request): Json<SemanticSearchRequest>,
) -> Result<Json<SemanticSearchResponse>, ApiError> {
    let query = request.into_query()?;
    let matches = state
        .semantic
        .find_similar(&query)
        .await
        .map_err(ApiError::upstream)?;

    Ok(Json(SemanticSearchResponse {
        results: matches.into_iter().map(FunctionMatch::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    #[serde(default, alias = "professor_id")]
    pub owner_id: Option<Uuid>,
    #[serde(default, alias = "origem_id", alias = "documento_id")]
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub chunks: Vec<ChunkInput>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct EmbedResponse {
    pub ok: bool,
    pub count: usize,
    pub embedding_ids: Vec<Uuid>,
}

/// `POST /functions/v1/embed`: embed `chunks[]` (or a single `content`)
/// and append them to a document's semantic index.
pub async fn embed(
    State(state): State<AppState>,
    Json(request): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let owner_id = request
        .owner_id
        .ok_or_else(|| ApiError::BadRequest("Required field: owner_id".to_string()))?;
    let chunks = normalize_embed_chunks(request.chunks, request.content, request.metadata);
    if chunks.is_empty() {
        return Err(ApiError::BadRequest(
            "No text to embed: provide chunks[] or content".to_string(),
        ));
    }
    let document_id = request
        .document_id
        .ok_or_else(|| ApiError::BadRequest("Required field: document_id".to_string()))?;

    let ids = state
        .ingest
        .embed_chunks(owner_id, document_id, chunks)
        .await
        .map_err(ApiError::upstream)?;

    info!(document_id = %document_id, chunk_count = ids.len(), "Embedded chunks");
    Ok(Json(EmbedResponse {
        ok: true,
        count: ids.len(),
        embedding_ids: ids,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProcessFileRequest {
    pub document_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ProcessFileResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `POST /functions/v1/process-file`: read a stored document, embed the
/// start of its text, and mark it ready.
pub async fn process_file(
    State(state): State<AppState>,
    Json(request): Json<ProcessFileRequest>,
) -> Result<Json<ProcessFileResponse>, ApiError> {
    let document_id = request
        .document_id
        .ok_or_else(|| ApiError::BadRequest("Required field: document_id".to_string()))?;

    let outcome = state
        .ingest
        .process_file(document_id)
        .await
        .map_err(ApiError::upstream)?;

    Ok(Json(ProcessFileResponse {
        success: true,
        message: match outcome {
            ProcessOutcome::Ignored => Some("Ignored (short text)".to_string()),
            ProcessOutcome::Indexed { .. } => None,
        },
    }))
}

fn assistant(state: &AppState) -> Result<Arc<AssistantService>, ApiError> {
    state.assistant.clone().ok_or_else(|| {
        ApiError::Internal(Error::Config(
            "OPENAI_API_KEY is not configured".to_string(),
        ))
    })
}

/// Treat `""` like an absent field.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatContext {
    #[serde(default)]
    pub papel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub mensagens: Vec<ChatMessage>,
    #[serde(default)]
    pub contexto: ChatContext,
}

#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub texto: String,
    pub tokens: u32,
}

/// `POST /functions/v1/chat-ia`: one assistant turn. `contexto.papel`
/// selects the study tutor or the teacher assistant.
pub async fn chat_ia(
    State(state): State<AppState>,
    Json(request): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let assistant = assistant(&state)?;
    let completion = assistant
        .chat(request.mensagens, request.contexto.papel.as_deref())
        .await
        .map_err(ApiError::upstream)?;

    Ok(Json(ChatResponseBody {
        texto: completion.content,
        tokens: completion.total_tokens,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CorrectAnswerRequest {
    #[serde(default)]
    pub questao: Option<String>,
    #[serde(default)]
    pub resposta_aluno: Option<String>,
    #[serde(default)]
    pub gabarito_oficial: Option<String>,
    #[serde(default)]
    pub tipo: Option<String>,
}

/// `POST /functions/v1/correct-answer`: grade a student's answer.
/// Objective types are checked against the key; anything else is graded
/// 0 to 10.
pub async fn correct_answer(
    State(state): State<AppState>,
    Json(request): Json<CorrectAnswerRequest>,
) -> Result<Json<Grade>, ApiError> {
    let (Some(question), Some(answer)) = (
        non_empty(request.questao),
        non_empty(request.resposta_aluno),
    ) else {
        return Err(ApiError::BadRequest(
            "Incomplete data: questao and resposta_aluno are required".to_string(),
        ));
    };
    let assistant = assistant(&state)?;

    let kind = AnswerKind::from_question_type(request.tipo.as_deref());
    info!(question_type = request.tipo.as_deref().unwrap_or(""), kind = ?kind, "Grading answer");

    let grade = assistant
        .grade(&GradingInput {
            question,
            answer,
            answer_key: request.gabarito_oficial.unwrap_or_default(),
            kind,
        })
        .await?;
    Ok(Json(grade))
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuestionRequest {
    #[serde(default)]
    pub tipo_questao: Option<String>,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(default)]
    pub tema: Option<String>,
    #[serde(default)]
    pub mensagem: Option<String>,
    #[serde(default)]
    pub disciplina: Option<String>,
    #[serde(default)]
    pub serie: Option<String>,
    #[serde(default)]
    pub dificuldade: Option<String>,
    #[serde(default)]
    pub quantidade: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub variacao: Option<String>,
}

impl GenerateQuestionRequest {
    fn into_spec(self) -> Result<QuestionSpec, ApiError> {
        let topic = non_empty(self.tema)
            .or_else(|| non_empty(self.mensagem))
            .ok_or_else(|| ApiError::BadRequest("Required field: tema".to_string()))?;

        let mut spec = QuestionSpec::new(topic);
        if let Some(kind) = non_empty(self.tipo_questao).or_else(|| non_empty(self.tipo)) {
            spec.question_type = kind.to_lowercase();
        }
        if let Some(subject) = non_empty(self.disciplina) {
            spec.subject = subject;
        }
        if let Some(grade) = non_empty(self.serie) {
            spec.grade_level = grade;
        }
        if let Some(difficulty) = non_empty(self.dificuldade) {
            spec.difficulty = difficulty;
        }
        if let Some(count) = self.quantidade {
            spec.count = count.max(1);
        }
        if let Some(seed) = self.seed.filter(|s| *s != 0) {
            spec.seed = seed;
        }
        if let Some(variation) = non_empty(self.variacao) {
            spec.variation = variation;
        }
        Ok(spec)
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateQuestionResponse {
    pub questoes: Vec<Map<String, JsonValue>>,
}

/// `POST /functions/v1/generate-question`: draft questions on a topic.
/// Generated questions are returned, not stored.
pub async fn generate_question(
    State(state): State<AppState>,
    Json(request): Json<GenerateQuestionRequest>,
) -> Result<Json<GenerateQuestionResponse>, ApiError> {
    let spec = request.into_spec()?;
    let assistant = assistant(&state)?;

    let questoes = assistant.generate_questions(&spec).await?;
    Ok(Json(GenerateQuestionResponse { questoes }))
}
