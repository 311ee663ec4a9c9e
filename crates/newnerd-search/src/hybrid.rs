//! Hybrid search combining a title lookup with a semantic lookup.
//!
//! Both lookups run concurrently, each under its own deadline, and are
//! joined all-or-fail. A lookup configured to degrade turns its failure into
//! an empty contribution plus a warning instead of failing the search.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use newnerd_core::{
    defaults, Document, Error, KeywordLookup, OwnerScope, Result, SearchOutcome, SemanticLookup,
    SemanticMatch, SemanticQuery,
};

use crate::merge::{merge_results, ConflictPolicy, MergeConfig};
use crate::supersession::SearchTicket;

/// What to do when one lookup fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupFailure {
    /// The whole search fails.
    #[default]
    Fail,
    /// The lookup contributes nothing and a warning is recorded.
    Degrade,
}

impl std::str::FromStr for LookupFailure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "degrade" => Ok(Self::Degrade),
            other => Err(Error::Config(format!("Unknown lookup failure policy: {}", other))),
        }
    }
}

/// Failure handling per lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailurePolicy {
    pub keyword: LookupFailure,
    pub semantic: LookupFailure,
}

impl FailurePolicy {
    /// Either failure fails the search.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Keep title matches when the semantic lookup is unavailable.
    pub fn degrade_semantic() -> Self {
        Self {
            keyword: LookupFailure::Fail,
            semantic: LookupFailure::Degrade,
        }
    }
}

/// Configuration for hybrid search.
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    /// Maximum title matches.
    pub keyword_limit: i64,
    /// Maximum semantic matches requested from the lookup.
    pub match_count: i64,
    /// Similarity threshold passed to the semantic lookup.
    pub match_threshold: f32,
    /// Floor applied to semantic matches after the lookup returns.
    pub relevance_floor: f32,
    /// Score pinned on title matches.
    pub keyword_score: f32,
    pub conflict: ConflictPolicy,
    pub failure: FailurePolicy,
    /// Deadline applied to each lookup separately.
    pub lookup_timeout: Duration,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            keyword_limit: defaults::KEYWORD_MATCH_LIMIT,
            match_count: defaults::SEMANTIC_MATCH_COUNT,
            match_threshold: defaults::SEMANTIC_MATCH_THRESHOLD,
            relevance_floor: defaults::SEMANTIC_RELEVANCE_FLOOR,
            keyword_score: defaults::KEYWORD_SCORE,
            conflict: ConflictPolicy::default(),
            failure: FailurePolicy::default(),
            lookup_timeout: Duration::from_secs(defaults::LOOKUP_TIMEOUT_SECS),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid value for {}: {}", key, raw))),
        _ => Ok(default),
    }
}

impl HybridSearchConfig {
    /// Load from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SEARCH_KEYWORD_LIMIT` | 5 |
    /// | `SEARCH_MATCH_COUNT` | 10 |
    /// | `SEARCH_MATCH_THRESHOLD` | 0.4 |
    /// | `SEARCH_RELEVANCE_FLOOR` | 0.45 |
    /// | `SEARCH_CONFLICT_POLICY` | `keyword_wins` |
    /// | `SEARCH_KEYWORD_FAILURE` | `fail` |
    /// | `SEARCH_SEMANTIC_FAILURE` | `fail` |
    /// | `SEARCH_LOOKUP_TIMEOUT_SECS` | 15 |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let config = Self {
            keyword_limit: parse_var(&lookup, "SEARCH_KEYWORD_LIMIT", d.keyword_limit)?,
            match_count: parse_var(&lookup, "SEARCH_MATCH_COUNT", d.match_count)?,
            match_threshold: parse_var(&lookup, "SEARCH_MATCH_THRESHOLD", d.match_threshold)?,
            relevance_floor: parse_var(&lookup, "SEARCH_RELEVANCE_FLOOR", d.relevance_floor)?,
            keyword_score: d.keyword_score,
            conflict: parse_var(&lookup, "SEARCH_CONFLICT_POLICY", d.conflict)?,
            failure: FailurePolicy {
                keyword: parse_var(&lookup, "SEARCH_KEYWORD_FAILURE", d.failure.keyword)?,
                semantic: parse_var(&lookup, "SEARCH_SEMANTIC_FAILURE", d.failure.semantic)?,
            },
            lookup_timeout: Duration::from_secs(parse_var(
                &lookup,
                "SEARCH_LOOKUP_TIMEOUT_SECS",
                d.lookup_timeout.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check limits and thresholds are in range.
    pub fn validate(&self) -> Result<()> {
        if self.keyword_limit <= 0 || self.match_count <= 0 {
            return Err(Error::Config(
                "Search limits must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("match_threshold", self.match_threshold),
            ("relevance_floor", self.relevance_floor),
            ("keyword_score", self.keyword_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.lookup_timeout.is_zero() {
            return Err(Error::Config("Lookup timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn with_keyword_limit(mut self, limit: i64) -> Self {
        self.keyword_limit = limit;
        self
    }

    pub fn with_match_count(mut self, count: i64) -> Self {
        self.match_count = count;
        self
    }

    pub fn with_match_threshold(mut self, threshold: f32) -> Self {
        self.match_threshold = threshold;
        self
    }

    pub fn with_relevance_floor(mut self, floor: f32) -> Self {
        self.relevance_floor = floor;
        self
    }

    pub fn with_conflict_policy(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    pub fn with_failure_policy(mut self, failure: FailurePolicy) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            relevance_floor: self.relevance_floor,
            keyword_score: self.keyword_score,
            conflict: self.conflict,
        }
    }
}

/// Run one lookup under `deadline` and apply its failure policy.
///
/// Returns the rows and, when the lookup degraded, a warning.
async fn run_lookup<T, F>(
    name: &'static str,
    deadline: Duration,
    policy: LookupFailure,
    lookup: F,
) -> Result<(Vec<T>, Option<String>)>
where
    F: Future<Output = Result<Vec<T>>>,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(deadline, lookup).await {
        Ok(inner) => inner,
        Err(_) => Err(Error::Timeout(format!(
            "{} lookup exceeded {}ms",
            name,
            deadline.as_millis()
        ))),
    };

    match result {
        Ok(rows) => {
            debug!(
                lookup = name,
                result_count = rows.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Lookup complete"
            );
            Ok((rows, None))
        }
        Err(e) if policy == LookupFailure::Degrade && !matches!(e, Error::Cancelled(_)) => {
            warn!(
                lookup = name,
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Lookup failed, continuing without it"
            );
            Ok((Vec::new(), Some(format!("{} lookup unavailable", name))))
        }
        Err(e) => {
            warn!(
                lookup = name,
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Lookup failed"
            );
            Err(match e {
                Error::Timeout(_) | Error::Cancelled(_) | Error::InvalidInput(_) => e,
                other => Error::Search(format!("{} lookup failed: {}", name, other)),
            })
        }
    }
}

/// Hybrid search engine over injected lookups.
pub struct HybridSearchEngine {
    keyword: Arc<dyn KeywordLookup>,
    semantic: Arc<dyn SemanticLookup>,
    config: HybridSearchConfig,
}

impl HybridSearchEngine {
    /// Create an engine with default configuration.
    pub fn new(keyword: Arc<dyn KeywordLookup>, semantic: Arc<dyn SemanticLookup>) -> Self {
        Self {
            keyword,
            semantic,
            config: HybridSearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: HybridSearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    /// Search `scope`'s library for `query`.
    ///
    /// An empty or whitespace query is rejected before any lookup runs. An
    /// empty result is returned as `Ok` with no results.
    #[instrument(skip(self), fields(
        subsystem = "search",
        component = "hybrid_search",
        op = "search",
        owner_kind = %scope.kind,
        owner_id = %scope.owner_id,
    ))]
    pub async fn search(&self, query: &str, scope: &OwnerScope) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        let start = Instant::now();
        let semantic_request = SemanticQuery {
            query: query.to_string(),
            scope: *scope,
            match_count: self.config.match_count,
            match_threshold: self.config.match_threshold,
        };

        let keyword = run_lookup::<Document, _>(
            "keyword",
            self.config.lookup_timeout,
            self.config.failure.keyword,
            self.keyword
                .find_by_title(scope, query, self.config.keyword_limit),
        );
        let semantic = run_lookup::<SemanticMatch, _>(
            "semantic",
            self.config.lookup_timeout,
            self.config.failure.semantic,
            self.semantic.find_similar(&semantic_request),
        );

        let ((keyword_docs, keyword_warning), (semantic_rows, semantic_warning)) =
            tokio::try_join!(keyword, semantic)?;

        let keyword_hits = keyword_docs.len();
        let semantic_hits = semantic_rows.len();
        let report = merge_results(keyword_docs, semantic_rows, &self.config.merge_config());
        let warnings: Vec<String> = [keyword_warning, semantic_warning]
            .into_iter()
            .flatten()
            .collect();

        let outcome = SearchOutcome {
            results: report.results,
            keyword_hits,
            semantic_hits,
            below_floor: report.below_floor,
            warnings,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if outcome.is_empty() {
            debug!(keyword_hits, semantic_hits, "No results from any source");
        }
        info!(
            keyword_hits,
            semantic_hits,
            below_floor = outcome.below_floor,
            result_count = outcome.len(),
            duration_ms = outcome.duration_ms,
            "Hybrid search completed"
        );

        Ok(outcome)
    }

    /// Like [`search`](Self::search), but abandoned as soon as `ticket` is
    /// superseded. A superseded search never returns results.
    pub async fn search_with_ticket(
        &self,
        query: &str,
        scope: &OwnerScope,
        ticket: &SearchTicket,
    ) -> Result<SearchOutcome> {
        let superseded = || {
            Error::Cancelled(format!(
                "search generation {} superseded by a newer search",
                ticket.generation()
            ))
        };
        if ticket.is_cancelled() {
            return Err(superseded());
        }

        let outcome = tokio::select! {
            biased;
            _ = ticket.cancelled() => {
                debug!(generation = ticket.generation(), "Search cancelled in flight");
                return Err(superseded());
            }
            result = self.search(query, scope) => result?,
        };

        if ticket.is_cancelled() {
            return Err(superseded());
        }
        Ok(outcome)
    }
}
