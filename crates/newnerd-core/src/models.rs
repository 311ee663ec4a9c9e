//! Core data models for the document library and hybrid search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

pub use pgvector::Vector;

// =============================================================================
// OWNERS
// =============================================================================

/// Kind of user that owns a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Student,
    Teacher,
}

impl OwnerKind {
    /// Object storage bucket holding this owner kind's files.
    pub fn bucket(&self) -> &'static str {
        match self {
            Self::Student => defaults::STUDENT_BUCKET,
            Self::Teacher => defaults::TEACHER_BUCKET,
        }
    }

    /// Document fields the keyword lookup matches against.
    ///
    /// Teacher libraries hold many files uploaded under their original name
    /// with a generated title, so the original filename is matched as well.
    pub fn keyword_fields(&self) -> KeywordFields {
        match self {
            Self::Student => KeywordFields::Title,
            Self::Teacher => KeywordFields::TitleOrFilename,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OwnerKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" | "aluno" => Ok(Self::Student),
            "teacher" | "professor" => Ok(Self::Teacher),
            _ => Err(format!("Invalid owner kind: {}", s)),
        }
    }
}

/// Which document fields a title lookup compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordFields {
    Title,
    TitleOrFilename,
}

/// Row-level scope for every library operation: one owner's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerScope {
    pub kind: OwnerKind,
    pub owner_id: Uuid,
}

impl OwnerScope {
    pub fn new(kind: OwnerKind, owner_id: Uuid) -> Self {
        Self { kind, owner_id }
    }

    pub fn student(owner_id: Uuid) -> Self {
        Self::new(OwnerKind::Student, owner_id)
    }

    pub fn teacher(owner_id: Uuid) -> Self {
        Self::new(OwnerKind::Teacher, owner_id)
    }

    pub fn is_student(&self) -> bool {
        self.kind == OwnerKind::Student
    }
}

impl std::fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.owner_id)
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Processing lifecycle of a library document.
///
/// ```text
/// pending → uploading → processing → ready
///     └──────────┴───────────┴────→ error
/// ready | error → processing   (reprocessing)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Uploading,
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (*self, next),
            (Pending, Uploading)
                | (Uploading, Processing)
                | (Processing, Ready)
                | (Pending | Uploading | Processing, Error)
                | (Ready | Error, Processing)
        )
    }

    /// Validate a transition, returning `Error::InvalidInput` when illegal.
    pub fn transition(&self, next: DocumentStatus) -> Result<DocumentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidInput(format!(
                "Illegal document status transition: {} -> {}",
                self, next
            )))
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Uploading => write!(f, "uploading"),
            Self::Processing => write!(f, "processing"),
            Self::Ready => write!(f, "ready"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "uploading" => Ok(Self::Uploading),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid document status: {}", s)),
        }
    }
}

/// A file in a student's or teacher's library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub storage_path: String,
    pub title: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    pub extracted_text: Option<String>,
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn scope(&self) -> OwnerScope {
        OwnerScope::new(self.owner_kind, self.owner_id)
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey::Id(self.id)
    }

    pub fn is_owned_by(&self, scope: &OwnerScope) -> bool {
        self.owner_kind == scope.kind && self.owner_id == scope.owner_id
    }

    /// Short preview of the extracted text, if any.
    pub fn snippet(&self) -> Option<String> {
        self.extracted_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().take(defaults::SNIPPET_LENGTH).collect())
    }
}

/// Request for inserting a new document row.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub scope: OwnerScope,
    pub storage_path: String,
    pub title: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    pub metadata: JsonValue,
}

/// One chunk of text to embed and index for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    #[serde(default, alias = "texto")]
    pub text: String,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl ChunkInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: JsonValue::Null,
        }
    }
}

/// An embedded chunk ready to be stored.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vector,
    pub metadata: JsonValue,
}

// =============================================================================
// SEARCH
// =============================================================================

/// Identity used to deduplicate merged results: document id, falling back
/// to the storage path when a lookup did not report an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DocumentKey {
    Id(Uuid),
    Path(String),
}

impl DocumentKey {
    /// Build a key from optional identity parts. Returns `None` when the
    /// result carries neither an id nor a non-empty path.
    pub fn from_parts(id: Option<Uuid>, path: Option<&str>) -> Option<Self> {
        match (id, path) {
            (Some(id), _) => Some(Self::Id(id)),
            (None, Some(p)) if !p.trim().is_empty() => Some(Self::Path(p.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Path(p) => write!(f, "path:{}", p),
        }
    }
}

/// One semantic lookup row: a chunk similar to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatch {
    pub document_id: Option<Uuid>,
    pub storage_path: Option<String>,
    pub title: Option<String>,
    pub excerpt: String,
    pub similarity: f32,
}

impl SemanticMatch {
    pub fn key(&self) -> Option<DocumentKey> {
        DocumentKey::from_parts(self.document_id, self.storage_path.as_deref())
    }
}

/// Which lookup produced a merged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Title,
    Semantic,
}

impl MatchSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Title => defaults::TITLE_MATCH_LABEL,
            Self::Semantic => defaults::SEMANTIC_MATCH_LABEL,
        }
    }
}

impl std::fmt::Display for MatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the merged, relevance-ordered result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDocument {
    pub key: DocumentKey,
    pub document_id: Option<Uuid>,
    pub storage_path: Option<String>,
    pub title: String,
    pub excerpt: Option<String>,
    pub score: f32,
    pub sources: Vec<MatchSource>,
}

impl RankedDocument {
    pub fn has_source(&self, source: MatchSource) -> bool {
        self.sources.contains(&source)
    }
}

/// Parameters of one semantic lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticQuery {
    pub query: String,
    pub scope: OwnerScope,
    pub match_count: i64,
    pub match_threshold: f32,
}

/// Result of a hybrid search. An empty `results` list is a valid outcome
/// and renders as an explicit empty state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<RankedDocument>,
    pub keyword_hits: usize,
    pub semantic_hits: usize,
    pub below_floor: usize,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl SearchOutcome {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

// =============================================================================
// CHAT COMPLETION
// =============================================================================

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// One completion call: the conversation plus sampling options. Unset
/// options are left to the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    /// Constrain the reply to a single JSON object.
    pub json_object: bool,
}

/// Reply text of the first choice and the provider-reported token usage
/// (0 when the provider omits it).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub content: String,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document(scope: OwnerScope) -> Document {
        Document {
            id: Uuid::new_v4(),
            owner_kind: scope.kind,
            owner_id: scope.owner_id,
            storage_path: format!("{}/1700000000000_notes.txt", scope.owner_id),
            title: "notes".to_string(),
            original_name: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: 42,
            status: DocumentStatus::Ready,
            extracted_text: None,
            embedding: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_kind_parse_and_display() {
        assert_eq!("student".parse::<OwnerKind>().unwrap(), OwnerKind::Student);
        assert_eq!("ALUNO".parse::<OwnerKind>().unwrap(), OwnerKind::Student);
        assert_eq!("professor".parse::<OwnerKind>().unwrap(), OwnerKind::Teacher);
        assert_eq!(OwnerKind::Teacher.to_string(), "teacher");
        assert!("admin".parse::<OwnerKind>().is_err());
    }

    #[test]
    fn test_owner_kind_buckets_and_fields() {
        assert_eq!(OwnerKind::Student.bucket(), "alunos-biblioteca");
        assert_eq!(OwnerKind::Teacher.bucket(), "newnerd_professores");
        assert_eq!(OwnerKind::Student.keyword_fields(), KeywordFields::Title);
        assert_eq!(
            OwnerKind::Teacher.keyword_fields(),
            KeywordFields::TitleOrFilename
        );
    }

    #[test]
    fn test_status_happy_path_transitions() {
        let s = DocumentStatus::default();
        assert_eq!(s, DocumentStatus::Pending);
        let s = s.transition(DocumentStatus::Uploading).unwrap();
        let s = s.transition(DocumentStatus::Processing).unwrap();
        let s = s.transition(DocumentStatus::Ready).unwrap();
        assert_eq!(s, DocumentStatus::Ready);
    }

    #[test]
    fn test_status_rejects_skipping_steps() {
        assert!(!DocumentStatus::Pending.can_transition_to(DocumentStatus::Ready));
        assert!(!DocumentStatus::Uploading.can_transition_to(DocumentStatus::Ready));
        assert!(!DocumentStatus::Ready.can_transition_to(DocumentStatus::Error));
        let err = DocumentStatus::Ready
            .transition(DocumentStatus::Uploading)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_status_error_and_reprocess() {
        for from in [
            DocumentStatus::Pending,
            DocumentStatus::Uploading,
            DocumentStatus::Processing,
        ] {
            assert!(from.can_transition_to(DocumentStatus::Error));
        }
        assert!(DocumentStatus::Ready.can_transition_to(DocumentStatus::Processing));
        assert!(DocumentStatus::Error.can_transition_to(DocumentStatus::Processing));
    }

    #[test]
    fn test_status_roundtrip_text() {
        for s in [
            DocumentStatus::Pending,
            DocumentStatus::Uploading,
            DocumentStatus::Processing,
            DocumentStatus::Ready,
            DocumentStatus::Error,
        ] {
            assert_eq!(s.to_string().parse::<DocumentStatus>().unwrap(), s);
        }
        assert!("done".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_document_key_prefers_id() {
        let id = Uuid::new_v4();
        assert_eq!(
            DocumentKey::from_parts(Some(id), Some("a/b.txt")),
            Some(DocumentKey::Id(id))
        );
        assert_eq!(
            DocumentKey::from_parts(None, Some("a/b.txt")),
            Some(DocumentKey::Path("a/b.txt".to_string()))
        );
        assert_eq!(DocumentKey::from_parts(None, Some("  ")), None);
        assert_eq!(DocumentKey::from_parts(None, None), None);
    }

    #[test]
    fn test_document_ownership() {
        let scope = OwnerScope::student(Uuid::new_v4());
        let doc = sample_document(scope);
        assert!(doc.is_owned_by(&scope));
        assert!(!doc.is_owned_by(&OwnerScope::teacher(scope.owner_id)));
        assert!(!doc.is_owned_by(&OwnerScope::student(Uuid::new_v4())));
        assert_eq!(doc.scope(), scope);
    }

    #[test]
    fn test_document_snippet_truncates() {
        let mut doc = sample_document(OwnerScope::teacher(Uuid::new_v4()));
        assert_eq!(doc.snippet(), None);
        doc.extracted_text = Some("   ".to_string());
        assert_eq!(doc.snippet(), None);
        doc.extracted_text = Some("x".repeat(500));
        assert_eq!(doc.snippet().unwrap().len(), defaults::SNIPPET_LENGTH);
    }

    #[test]
    fn test_document_serialization_skips_embedding() {
        let mut doc = sample_document(OwnerScope::student(Uuid::new_v4()));
        doc.embedding = Some(Vector::from(vec![0.1, 0.2]));
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["status"], "ready");
        assert_eq!(json["owner_kind"], "student");
    }

    #[test]
    fn test_match_source_labels() {
        assert_eq!(MatchSource::Title.to_string(), "title match");
        assert_eq!(MatchSource::Semantic.label(), "semantic match");
    }

    #[test]
    fn test_search_outcome_empty_state() {
        let outcome = SearchOutcome::default();
        assert!(outcome.is_empty());
        assert_eq!(outcome.len(), 0);
    }

    #[test]
    fn test_chat_message_roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::system("oi")).unwrap();
        assert_eq!(json["role"], "system");
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"olá"}"#).unwrap();
        assert_eq!(msg.role, ChatRole::Assistant);
        assert!(serde_json::from_str::<ChatMessage>(r#"{"role":"tool","content":""}"#).is_err());
    }
}
