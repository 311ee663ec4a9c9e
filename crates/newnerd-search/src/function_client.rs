//! Client for the `semantic-search` function.
//!
//! The function embeds the query and runs the owner-scoped chunk similarity
//! procedure. The wire types here are shared with the server side of the
//! endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use newnerd_core::{
    defaults, Error, OwnerKind, OwnerScope, Result, SemanticLookup, SemanticMatch, SemanticQuery,
};

/// Request body of `POST /functions/v1/semantic-search`.
///
/// `match_count` and `match_threshold` fall back to the function defaults
/// (5 and 0.3) when omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticSearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, alias = "student_id", alias = "professor_id")]
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub is_student: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f32>,
}

impl SemanticSearchRequest {
    pub fn from_query(request: &SemanticQuery) -> Self {
        Self {
            query: request.query.clone(),
            owner_id: Some(request.scope.owner_id),
            is_student: request.scope.is_student(),
            match_count: Some(request.match_count),
            match_threshold: Some(request.match_threshold),
        }
    }

    /// Resolve into a lookup request, applying the function defaults.
    pub fn into_query(self) -> Result<SemanticQuery> {
        let query = self.query.trim().to_string();
        if query.is_empty() {
            return Err(Error::InvalidInput("query is required".to_string()));
        }
        let owner_id = self
            .owner_id
            .ok_or_else(|| Error::InvalidInput("owner_id is required".to_string()))?;
        let kind = if self.is_student {
            OwnerKind::Student
        } else {
            OwnerKind::Teacher
        };
        Ok(SemanticQuery {
            query,
            scope: OwnerScope::new(kind, owner_id),
            match_count: self
                .match_count
                .filter(|c| *c > 0)
                .unwrap_or(defaults::FUNCTION_MATCH_COUNT),
            match_threshold: self
                .match_threshold
                .filter(|t| (0.0..=1.0).contains(t))
                .unwrap_or(defaults::FUNCTION_MATCH_THRESHOLD),
        })
    }
}

/// Extra fields attached to each match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FunctionMatchMetadata {
    #[serde(default, alias = "titulo", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One row of the function response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionMatch {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    #[serde(default, alias = "caminho", skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub content: String,
    pub similarity: f32,
    #[serde(default)]
    pub metadata: FunctionMatchMetadata,
}

impl From<SemanticMatch> for FunctionMatch {
    fn from(m: SemanticMatch) -> Self {
        Self {
            document_id: m.document_id,
            storage_path: m.storage_path,
            content: m.excerpt,
            similarity: m.similarity,
            metadata: FunctionMatchMetadata { title: m.title },
        }
    }
}

impl From<FunctionMatch> for SemanticMatch {
    fn from(m: FunctionMatch) -> Self {
        Self {
            document_id: m.document_id,
            storage_path: m.storage_path,
            title: m.metadata.title,
            excerpt: m.content,
            similarity: m.similarity,
        }
    }
}

/// Response body of the function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticSearchResponse {
    #[serde(default)]
    pub results: Vec<FunctionMatch>,
}

#[derive(Debug, Deserialize)]
struct FunctionErrorBody {
    #[serde(default)]
    error: String,
}

/// Configuration for [`FunctionSemanticLookup`].
#[derive(Debug, Clone)]
pub struct FunctionLookupConfig {
    /// Base URL of the service hosting `/functions/v1/semantic-search`.
    pub base_url: String,
    /// Bearer key sent with every call.
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for FunctionLookupConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::SEMANTIC_FUNCTION_URL.to_string(),
            api_key: None,
            timeout_seconds: defaults::LOOKUP_TIMEOUT_SECS,
        }
    }
}

impl FunctionLookupConfig {
    /// Reads `SEMANTIC_FUNCTION_URL`, `SEMANTIC_FUNCTION_KEY`, and
    /// `SEARCH_LOOKUP_TIMEOUT_SECS`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            base_url: lookup("SEMANTIC_FUNCTION_URL").unwrap_or(defaults.base_url),
            api_key: lookup("SEMANTIC_FUNCTION_KEY").filter(|k| !k.trim().is_empty()),
            timeout_seconds: lookup("SEARCH_LOOKUP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Semantic lookup backed by the remote `semantic-search` function.
pub struct FunctionSemanticLookup {
    client: Client,
    config: FunctionLookupConfig,
}

impl FunctionSemanticLookup {
    pub fn new(config: FunctionLookupConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Search(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "search",
            component = "semantic_function",
            "Initializing semantic function client: url={}",
            config.base_url
        );

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/functions/v1/semantic-search",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl SemanticLookup for FunctionSemanticLookup {
    #[instrument(skip(self, request), fields(
        subsystem = "search",
        component = "semantic_function",
        op = "find_similar",
        owner_id = %request.scope.owner_id,
    ))]
    async fn find_similar(&self, request: &SemanticQuery) -> Result<Vec<SemanticMatch>> {
        let start = Instant::now();
        let mut req = self
            .client
            .post(self.endpoint())
            .json(&SemanticSearchRequest::from_query(request));
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<FunctionErrorBody>().await {
                Ok(body) if !body.error.is_empty() => body.error,
                _ => "no error detail".to_string(),
            };
            return Err(Error::Search(format!(
                "semantic-search function returned HTTP {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let body: SemanticSearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Invalid semantic-search response: {}", e)))?;

        debug!(
            result_count = body.results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Semantic function returned"
        );
        Ok(body.results.into_iter().map(SemanticMatch::from).collect())
    }
}
