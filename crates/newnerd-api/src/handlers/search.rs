//! Hybrid library search route.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use newnerd_core::{defaults, Error, MatchSource, RankedDocument, SearchOutcome};

use super::library::owner_scope;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default, alias = "query")]
    pub q: String,
}

/// One merged result with its provenance badges.
#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub score: f32,
    pub sources: Vec<MatchSource>,
    /// Display labels for `sources`, e.g. "title match".
    pub labels: Vec<&'static str>,
}

impl From<RankedDocument> for SearchHit {
    fn from(doc: RankedDocument) -> Self {
        Self {
            labels: doc.sources.iter().map(MatchSource::label).collect(),
            document_id: doc.document_id,
            storage_path: doc.storage_path,
            title: doc.title,
            excerpt: doc.excerpt,
            score: doc.score,
            sources: doc.sources,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub count: usize,
    /// True when nothing matched; `message` then carries the empty-state text.
    pub empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl From<SearchOutcome> for SearchResponse {
    fn from(outcome: SearchOutcome) -> Self {
        let empty = outcome.is_empty();
        Self {
            count: outcome.len(),
            empty,
            message: empty.then(|| defaults::EMPTY_STATE_MESSAGE.to_string()),
            warnings: outcome.warnings,
            duration_ms: outcome.duration_ms,
            results: outcome.results.into_iter().map(SearchHit::from).collect(),
        }
    }
}

/// Search an owner's library by title and meaning.
///
/// # Returns
/// - 200 OK with ranked results, or an explicit empty state
/// - 400 Bad Request on an empty query (no lookup is made)
/// - 409 Conflict when a newer search by the same owner superseded this one
/// - 500 with a generic message when a lookup fails
pub async fn search_library(
    State(state): State<AppState>,
    Path((kind, owner_id)): Path<(String, Uuid)>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let scope = owner_scope(&kind, owner_id)?;
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest(
            "Search query cannot be empty".to_string(),
        ));
    }

    let ticket = state.supersession.begin(scope);
    let result = state.search.search_with_ticket(query, &scope, &ticket).await;
    state.supersession.finish(&ticket);
    debug!(
        generation = ticket.generation(),
        active_searches = state.supersession.active_count(),
        "Search slot released"
    );

    match result {
        Ok(outcome) => Ok(Json(SearchResponse::from(outcome))),
        Err(e) if e.is_validation() => Err(e.into()),
        Err(e @ Error::Cancelled(_)) => Err(e.into()),
        Err(e) => {
            error!(
                owner_id = %scope.owner_id,
                owner_kind = %scope.kind,
                error = %e,
                "Library search failed"
            );
            Err(ApiError::SearchFailed)
        }
    }
}
