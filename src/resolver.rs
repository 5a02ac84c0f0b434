use crate::codes::{normalize_code, ClassificationIndex};
use crate::embedding::EmbeddingSearch;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Default number of candidates returned when the caller does not set a limit.
pub const DEFAULT_RESOLVE_LIMIT: usize = 20;
/// Hard bound on the caller-supplied limit.
pub const MAX_RESOLVE_LIMIT: usize = 100;
/// How many neighbors to request from the semantic index before merging.
const SEMANTIC_FETCH_K: usize = 50;

/// Which search produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOrigin {
    Exact,
    Semantic,
}

/// One ranked classification candidate for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub code: String,
    pub description: String,
    /// In [0, 1]; exact code matches score 1.0
    pub confidence: f64,
    pub origin: MatchOrigin,
}

/// Hybrid exact + semantic search over the classification index.
///
/// Both searches run in parallel; candidates are merged by normalized code
/// (higher confidence wins), filtered by chapter, ranked by confidence with
/// a code tie-break, and truncated to the caller's limit.
pub struct CodeResolver {
    index: Arc<ClassificationIndex>,
    semantic: Arc<dyn EmbeddingSearch>,
}

impl CodeResolver {
    pub fn new(index: Arc<ClassificationIndex>, semantic: Arc<dyn EmbeddingSearch>) -> Self {
        Self { index, semantic }
    }

    /// Resolve a free-text or code query to ranked classification candidates.
    ///
    /// Returns an empty vector (not an error) when neither search finds
    /// anything. `InvalidInput` for an empty query or an out-of-range limit.
    pub async fn resolve(
        &self,
        query: &str,
        chapter_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("query must not be empty".to_string()));
        }
        if !(1..=MAX_RESOLVE_LIMIT).contains(&limit) {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and {}",
                MAX_RESOLVE_LIMIT
            )));
        }

        // Run the lexical and semantic searches in parallel. The lexical
        // side is CPU-bound and never suspends; the semantic side may be
        // a network call.
        let (lexical_hits, semantic_result) = tokio::join!(
            async { self.index.search(query) },
            self.semantic.search(query, SEMANTIC_FETCH_K),
        );

        // A semantic backend failure degrades to lexical-only results
        // rather than failing the whole resolve.
        let semantic_hits = match semantic_result {
            Ok(hits) => hits,
            Err(e) => {
                warn!(query = query, error = %e, "Semantic search failed, using lexical results only");
                Vec::new()
            }
        };

        // Merge by normalized code. BTreeMap keeps codes in ascending
        // order, which gives the deterministic tie-break for free.
        let mut merged: BTreeMap<String, SearchCandidate> = BTreeMap::new();

        for (entry, kind) in lexical_hits {
            insert_candidate(
                &mut merged,
                SearchCandidate {
                    code: entry.code.clone(),
                    description: entry.description.clone(),
                    confidence: kind.confidence(),
                    origin: MatchOrigin::Exact,
                },
            );
        }

        for hit in semantic_hits {
            let code = normalize_code(&hit.code);
            // The semantic index may reference codes absent from the
            // loaded reference data; those are dropped.
            let Some(entry) = self.index.get(&code) else {
                continue;
            };
            let confidence = (1.0 - hit.distance).clamp(0.0, 1.0);
            insert_candidate(
                &mut merged,
                SearchCandidate {
                    code: entry.code.clone(),
                    description: entry.description.clone(),
                    confidence,
                    origin: MatchOrigin::Semantic,
                },
            );
        }

        let mut candidates: Vec<SearchCandidate> = match chapter_filter {
            Some(chapter) => merged
                .into_values()
                .filter(|c| crate::codes::chapter_of(&c.code) == chapter)
                .collect(),
            None => merged.into_values().collect(),
        };

        // Confidence descending; the BTreeMap already ordered codes
        // ascending, and the sort is stable, so ties break lexically.
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);

        Ok(candidates)
    }
}

/// Keep the higher-confidence entry when a code arrives from both sources.
fn insert_candidate(merged: &mut BTreeMap<String, SearchCandidate>, candidate: SearchCandidate) {
    match merged.get_mut(&candidate.code) {
        Some(existing) => {
            if candidate.confidence > existing.confidence {
                *existing = candidate;
            }
        }
        None => {
            merged.insert(candidate.code.clone(), candidate);
        }
    }
}
