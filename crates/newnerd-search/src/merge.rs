//! Merge title matches and semantic matches into one ranked list.
//!
//! Semantic rows are filtered by the relevance floor, collapsed per document
//! identity (highest similarity wins), then title matches are laid over the
//! top. The output is sorted by score descending with the document identity
//! as a deterministic tie-break.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;
use uuid::Uuid;

use newnerd_core::files::basename;
use newnerd_core::{
    defaults, Document, DocumentKey, Error, MatchSource, RankedDocument, SemanticMatch,
};

/// How a document found by both lookups is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// The keyword score replaces the semantic similarity.
    #[default]
    KeywordWins,
    /// The larger of the keyword score and the semantic similarity.
    MaxScore,
}

impl FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword_wins" | "keyword" => Ok(Self::KeywordWins),
            "max_score" | "max" => Ok(Self::MaxScore),
            other => Err(Error::Config(format!("Unknown conflict policy: {}", other))),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeywordWins => write!(f, "keyword_wins"),
            Self::MaxScore => write!(f, "max_score"),
        }
    }
}

/// Parameters of [`merge_results`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeConfig {
    /// Semantic matches below this similarity are dropped.
    pub relevance_floor: f32,
    /// Score assigned to title matches.
    pub keyword_score: f32,
    pub conflict: ConflictPolicy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            relevance_floor: defaults::SEMANTIC_RELEVANCE_FLOOR,
            keyword_score: defaults::KEYWORD_SCORE,
            conflict: ConflictPolicy::default(),
        }
    }
}

/// Output of [`merge_results`].
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub results: Vec<RankedDocument>,
    /// Semantic rows dropped by the relevance floor (NaN included).
    pub below_floor: usize,
    /// Semantic rows dropped because they carried neither id nor path.
    pub unkeyed: usize,
}

/// Working set keyed by identity, with a path index so a row that only
/// reports a storage path finds the entry of the same document.
#[derive(Default)]
struct Merger {
    entries: HashMap<DocumentKey, RankedDocument>,
    by_path: HashMap<String, DocumentKey>,
}

impl Merger {
    /// Find the entry for a document reported as `id` and/or `path`. When
    /// the id and the path resolve to two different entries they are the same
    /// document, so the path entry is folded into the id entry.
    fn locate(&mut self, id: Option<Uuid>, path: Option<&str>) -> Option<DocumentKey> {
        let by_id = id
            .map(DocumentKey::Id)
            .filter(|key| self.entries.contains_key(key));
        let by_path = path
            .and_then(|p| self.by_path.get(p).cloned())
            .filter(|key| self.entries.contains_key(key));

        match (by_id, by_path) {
            (Some(id_key), Some(path_key)) if id_key != path_key => {
                Some(self.fold(path_key, id_key))
            }
            (Some(id_key), _) => Some(id_key),
            (None, path_key) => path_key,
        }
    }

    /// Move the entry at `from` into the entry at `into`, keeping the better
    /// semantic score and its excerpt.
    fn fold(&mut self, from: DocumentKey, into: DocumentKey) -> DocumentKey {
        if !self.entries.contains_key(&into) {
            return from;
        }
        let Some(other) = self.entries.remove(&from) else {
            return into;
        };
        let Some(entry) = self.entries.get_mut(&into) else {
            return into;
        };

        if other.score > entry.score {
            entry.score = other.score;
            if other.excerpt.is_some() {
                entry.excerpt = other.excerpt;
            }
        }
        if entry.title == defaults::UNTITLED_DOCUMENT {
            entry.title = other.title;
        }
        if entry.storage_path.is_none() {
            entry.storage_path = other.storage_path.clone();
        }
        for source in other.sources {
            if !entry.has_source(source) {
                entry.sources.push(source);
            }
        }

        let paths = [entry.storage_path.clone(), other.storage_path];
        for path in paths.into_iter().flatten() {
            self.by_path.insert(path, into.clone());
        }
        into
    }

    /// Re-key a path-identified entry once its document id becomes known.
    fn promote(&mut self, key: DocumentKey, id: Option<Uuid>) -> DocumentKey {
        let (DocumentKey::Path(_), Some(id)) = (&key, id) else {
            return key;
        };
        let Some(mut entry) = self.entries.remove(&key) else {
            return key;
        };
        let promoted = DocumentKey::Id(id);
        entry.key = promoted.clone();
        entry.document_id = Some(id);
        if let Some(ref path) = entry.storage_path {
            self.by_path.insert(path.clone(), promoted.clone());
        }
        self.entries.insert(promoted.clone(), entry);
        promoted
    }

    fn insert(&mut self, entry: RankedDocument) {
        if let Some(ref path) = entry.storage_path {
            self.by_path.insert(path.clone(), entry.key.clone());
        }
        self.entries.insert(entry.key.clone(), entry);
    }

    fn add_semantic(&mut self, hit: SemanticMatch, key: DocumentKey) {
        let path = hit.storage_path.as_deref().filter(|p| !p.trim().is_empty());
        let Some(existing) = self.locate(hit.document_id, path) else {
            let title = semantic_title(&hit);
            let storage_path = path.map(str::to_string);
            self.insert(RankedDocument {
                key,
                document_id: hit.document_id,
                storage_path,
                title,
                excerpt: non_empty(hit.excerpt),
                score: hit.similarity,
                sources: vec![MatchSource::Semantic],
            });
            return;
        };

        let existing = self.promote(existing, hit.document_id);
        let Some(entry) = self.entries.get_mut(&existing) else {
            return;
        };
        if entry.storage_path.is_none() {
            entry.storage_path = path.map(str::to_string);
        }
        if hit.similarity > entry.score {
            entry.score = hit.similarity;
            if let Some(excerpt) = non_empty(hit.excerpt) {
                entry.excerpt = Some(excerpt);
            }
        }
        let newly_indexed = entry.storage_path.clone();
        if let Some(path) = newly_indexed {
            self.by_path.entry(path).or_insert(existing);
        }
    }

    fn add_keyword(&mut self, doc: Document, config: &MergeConfig) {
        let title = if doc.title.trim().is_empty() {
            doc.original_name.clone()
        } else {
            doc.title.clone()
        };

        let Some(existing) = self.locate(Some(doc.id), Some(doc.storage_path.as_str())) else {
            self.insert(RankedDocument {
                key: DocumentKey::Id(doc.id),
                document_id: Some(doc.id),
                storage_path: Some(doc.storage_path.clone()),
                title,
                excerpt: doc.snippet(),
                score: config.keyword_score,
                sources: vec![MatchSource::Title],
            });
            return;
        };

        let existing = self.promote(existing, Some(doc.id));
        let Some(entry) = self.entries.get_mut(&existing) else {
            return;
        };
        entry.score = match config.conflict {
            ConflictPolicy::KeywordWins => config.keyword_score,
            ConflictPolicy::MaxScore => entry.score.max(config.keyword_score),
        };
        entry.title = title;
        entry.document_id = Some(doc.id);
        if entry.storage_path.is_none() {
            entry.storage_path = Some(doc.storage_path.clone());
        }
        if entry.excerpt.is_none() {
            entry.excerpt = doc.snippet();
        }
        if !entry.has_source(MatchSource::Title) {
            entry.sources.insert(0, MatchSource::Title);
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn semantic_title(hit: &SemanticMatch) -> String {
    hit.title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| hit.storage_path.as_deref().map(basename))
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(defaults::UNTITLED_DOCUMENT)
        .to_string()
}

/// Sort by score descending, then by identity ascending (ids before paths).
pub fn rank(results: &mut [RankedDocument]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Merge keyword and semantic lookup results.
///
/// Each document identity appears at most once in the output. Semantic
/// similarities below `config.relevance_floor` (and NaN) never survive.
pub fn merge_results(
    keyword: Vec<Document>,
    semantic: Vec<SemanticMatch>,
    config: &MergeConfig,
) -> MergeReport {
    let mut merger = Merger::default();
    let mut below_floor = 0usize;
    let mut unkeyed = 0usize;

    for hit in semantic {
        if hit.similarity.is_nan() || hit.similarity < config.relevance_floor {
            below_floor += 1;
            continue;
        }
        let Some(key) = hit.key() else {
            unkeyed += 1;
            continue;
        };
        merger.add_semantic(hit, key);
    }

    for doc in keyword {
        merger.add_keyword(doc, config);
    }

    let mut results: Vec<RankedDocument> = merger.entries.into_values().collect();
    rank(&mut results);

    debug!(
        subsystem = "search",
        component = "merge",
        result_count = results.len(),
        below_floor,
        unkeyed,
        conflict_policy = %config.conflict,
        "Merged lookup results"
    );

    MergeReport {
        results,
        below_floor,
        unkeyed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use newnerd_core::{DocumentStatus, OwnerKind};
    use serde_json::json;

    fn doc(id: Uuid, title: &str) -> Document {
        Document {
            id,
            owner_kind: OwnerKind::Student,
            owner_id: Uuid::nil(),
            storage_path: format!("owner/1_{}", title),
            title: title.to_string(),
            original_name: title.to_string(),
            mime_type: "text/plain".to_string(),
            size_bytes: 10,
            status: DocumentStatus::Ready,
            extracted_text: None,
            embedding: None,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    fn sem(id: Option<Uuid>, path: Option<&str>, similarity: f32) -> SemanticMatch {
        SemanticMatch {
            document_id: id,
            storage_path: path.map(str::to_string),
            title: Some("semantic title".to_string()),
            excerpt: "excerpt".to_string(),
            similarity,
        }
    }

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_keyword_overrides_semantic_score() {
        // keyword [1] + semantic [1 @ 0.52, 2 @ 0.6] -> [1 @ 1.0, 2 @ 0.6]
        let report = merge_results(
            vec![doc(id(1), "Biologia")],
            vec![sem(Some(id(1)), None, 0.52), sem(Some(id(2)), None, 0.6)],
            &MergeConfig::default(),
        );
        let got: Vec<(Uuid, f32)> = report
            .results
            .iter()
            .map(|r| (r.document_id.unwrap(), r.score))
            .collect();
        assert_eq!(got, vec![(id(1), 1.0), (id(2), 0.6)]);
        assert!(report.results[0].has_source(MatchSource::Title));
        assert!(report.results[0].has_source(MatchSource::Semantic));
        assert_eq!(report.results[0].title, "Biologia");
    }

    #[test]
    fn test_all_below_floor_is_empty() {
        let report = merge_results(
            vec![],
            vec![sem(Some(id(1)), None, 0.44), sem(Some(id(2)), None, 0.1)],
            &MergeConfig::default(),
        );
        assert!(report.results.is_empty());
        assert_eq!(report.below_floor, 2);
    }

    #[test]
    fn test_floor_is_inclusive() {
        let report = merge_results(
            vec![],
            vec![sem(Some(id(1)), None, 0.45)],
            &MergeConfig::default(),
        );
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn test_nan_similarity_is_dropped() {
        let report = merge_results(
            vec![],
            vec![sem(Some(id(1)), None, f32::NAN), sem(Some(id(2)), None, 0.9)],
            &MergeConfig::default(),
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.below_floor, 1);
    }

    #[test]
    fn test_semantic_rows_collapse_to_best_chunk() {
        let mut best = sem(Some(id(7)), None, 0.81);
        best.excerpt = "best chunk".to_string();
        let report = merge_results(
            vec![],
            vec![sem(Some(id(7)), None, 0.5), best, sem(Some(id(7)), None, 0.7)],
            &MergeConfig::default(),
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].score, 0.81);
        assert_eq!(report.results[0].excerpt.as_deref(), Some("best chunk"));
    }

    #[test]
    fn test_path_only_semantic_row_joins_keyword_document() {
        let keyword = doc(id(3), "Historia");
        let path = keyword.storage_path.clone();
        let report = merge_results(
            vec![keyword],
            vec![sem(None, Some(&path), 0.9)],
            &MergeConfig::default(),
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].key, DocumentKey::Id(id(3)));
        assert_eq!(report.results[0].score, 1.0);
    }

    #[test]
    fn test_path_and_id_rows_for_same_document_merge() {
        let report = merge_results(
            vec![],
            vec![sem(None, Some("o/1_a.txt"), 0.6), sem(Some(id(4)), Some("o/1_a.txt"), 0.7)],
            &MergeConfig::default(),
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].key, DocumentKey::Id(id(4)));
        assert_eq!(report.results[0].score, 0.7);
    }

    #[test]
    fn test_keyword_document_folds_path_and_id_entries() {
        let keyword = doc(id(8), "Genetica");
        let path = keyword.storage_path.clone();
        let report = merge_results(
            vec![keyword],
            vec![sem(None, Some(&path), 0.6), sem(Some(id(8)), None, 0.7)],
            &MergeConfig::default(),
        );
        assert_eq!(report.results.len(), 1);
        let merged = &report.results[0];
        assert_eq!(merged.key, DocumentKey::Id(id(8)));
        assert_eq!(merged.score, 1.0);
        assert_eq!(merged.storage_path.as_deref(), Some(path.as_str()));
        assert_eq!(merged.sources, vec![MatchSource::Title, MatchSource::Semantic]);
    }

    #[test]
    fn test_semantic_row_with_both_parts_folds_earlier_entries() {
        let mut path_only = sem(None, Some("o/1_b.txt"), 0.8);
        path_only.excerpt = "path chunk".to_string();
        let report = merge_results(
            vec![],
            vec![
                path_only,
                sem(Some(id(6)), None, 0.5),
                sem(Some(id(6)), Some("o/1_b.txt"), 0.6),
            ],
            &MergeConfig::default(),
        );
        assert_eq!(report.results.len(), 1);
        let merged = &report.results[0];
        assert_eq!(merged.key, DocumentKey::Id(id(6)));
        assert_eq!(merged.score, 0.8);
        assert_eq!(merged.excerpt.as_deref(), Some("path chunk"));
    }

    #[test]
    fn test_max_score_keeps_folded_similarity() {
        let keyword = doc(id(9), "Quimica");
        let path = keyword.storage_path.clone();
        let config = MergeConfig {
            keyword_score: 0.5,
            conflict: ConflictPolicy::MaxScore,
            ..MergeConfig::default()
        };
        let report = merge_results(
            vec![keyword],
            vec![sem(None, Some(&path), 0.9), sem(Some(id(9)), None, 0.6)],
            &config,
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].score, 0.9);
    }

    #[test]
    fn test_unkeyed_rows_are_counted_and_dropped() {
        let report = merge_results(
            vec![],
            vec![sem(None, None, 0.9), sem(None, Some("  "), 0.9)],
            &MergeConfig::default(),
        );
        assert!(report.results.is_empty());
        assert_eq!(report.unkeyed, 2);
    }

    #[test]
    fn test_max_score_policy() {
        let config = MergeConfig {
            keyword_score: 0.5,
            conflict: ConflictPolicy::MaxScore,
            ..MergeConfig::default()
        };
        let report = merge_results(
            vec![doc(id(1), "a"), doc(id(2), "b")],
            vec![sem(Some(id(1)), None, 0.9)],
            &config,
        );
        let by_id: HashMap<Uuid, f32> = report
            .results
            .iter()
            .map(|r| (r.document_id.unwrap(), r.score))
            .collect();
        assert_eq!(by_id[&id(1)], 0.9);
        assert_eq!(by_id[&id(2)], 0.5);
    }

    #[test]
    fn test_no_duplicates_and_non_increasing_order() {
        let keyword = vec![doc(id(1), "a"), doc(id(1), "a"), doc(id(5), "e")];
        let semantic = vec![
            sem(Some(id(2)), None, 0.99),
            sem(Some(id(3)), None, 0.46),
            sem(Some(id(2)), None, 0.5),
            sem(Some(id(5)), None, 0.95),
            sem(Some(id(6)), None, 0.3),
        ];
        let report = merge_results(keyword, semantic, &MergeConfig::default());

        let mut keys: Vec<_> = report.results.iter().map(|r| r.key.clone()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);

        for pair in report.results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for r in &report.results {
            if !r.has_source(MatchSource::Title) {
                assert!(r.score >= 0.45);
            } else {
                assert_eq!(r.score, 1.0);
            }
        }
    }

    #[test]
    fn test_ties_break_by_identity() {
        let report = merge_results(
            vec![doc(id(9), "z"), doc(id(2), "y"), doc(id(5), "x")],
            vec![],
            &MergeConfig::default(),
        );
        let order: Vec<Uuid> = report
            .results
            .iter()
            .map(|r| r.document_id.unwrap())
            .collect();
        assert_eq!(order, vec![id(2), id(5), id(9)]);
    }

    #[test]
    fn test_ties_put_ids_before_paths() {
        let report = merge_results(
            vec![],
            vec![
                sem(None, Some("0abc/1_a.txt"), 0.7),
                sem(Some(id(u128::MAX)), None, 0.7),
            ],
            &MergeConfig::default(),
        );
        let keys: Vec<DocumentKey> = report.results.iter().map(|r| r.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                DocumentKey::Id(id(u128::MAX)),
                DocumentKey::Path("0abc/1_a.txt".to_string())
            ]
        );
    }

    #[test]
    fn test_semantic_title_falls_back_to_path_then_placeholder() {
        let mut no_title = sem(None, Some("owner/123_apostila.pdf"), 0.9);
        no_title.title = None;
        let mut bare = sem(Some(id(1)), None, 0.9);
        bare.title = None;
        assert_eq!(semantic_title(&no_title), "123_apostila.pdf");
        assert_eq!(semantic_title(&bare), defaults::UNTITLED_DOCUMENT);
    }

    #[test]
    fn test_conflict_policy_parse() {
        assert_eq!("keyword_wins".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::KeywordWins);
        assert_eq!("MAX".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::MaxScore);
        assert!("average".parse::<ConflictPolicy>().is_err());
    }
}
