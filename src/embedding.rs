use crate::codes::ClassificationIndex;
use crate::error::AppError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// One nearest-neighbor hit from the semantic index.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    /// Normalized classification code
    pub code: String,
    /// Similarity distance in [0, 1]; smaller is closer
    pub distance: f64,
}

/// Opaque semantic nearest-neighbor search over classification descriptions.
///
/// The engine only depends on this boundary: `search(text, k)` returns up to
/// `k` (code, distance) pairs. A vector database, an embedding API, or the
/// in-process token index below can all sit behind it.
#[async_trait]
pub trait EmbeddingSearch: Send + Sync + 'static {
    async fn search(&self, text: &str, k: usize) -> Result<Vec<SemanticHit>, AppError>;
}

// ============================================================
// Built-in Implementation
// ============================================================

/// Deterministic in-process semantic search.
///
/// Scores each description by token overlap with the query (Jaccard
/// similarity over lowercased alphanumeric tokens) and reports
/// `distance = 1 - similarity`. No I/O, stable ordering; used for local
/// development and as the test double for the real vector backend.
pub struct TokenOverlapSearch {
    entries: Vec<(String, HashSet<String>)>,
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

impl TokenOverlapSearch {
    pub fn from_index(index: &ClassificationIndex) -> Self {
        let entries = index
            .iter()
            .map(|entry| (entry.code.clone(), tokenize(&entry.description)))
            .collect();
        Self { entries }
    }

    pub fn from_index_arc(index: &Arc<ClassificationIndex>) -> Arc<dyn EmbeddingSearch> {
        Arc::new(Self::from_index(index))
    }
}

#[async_trait]
impl EmbeddingSearch for TokenOverlapSearch {
    async fn search(&self, text: &str, k: usize) -> Result<Vec<SemanticHit>, AppError> {
        let query_tokens = tokenize(text);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SemanticHit> = self
            .entries
            .iter()
            .filter_map(|(code, tokens)| {
                let shared = query_tokens.intersection(tokens).count();
                if shared == 0 {
                    return None;
                }
                let union = query_tokens.union(tokens).count();
                let similarity = shared as f64 / union as f64;
                Some(SemanticHit {
                    code: code.clone(),
                    distance: 1.0 - similarity,
                })
            })
            .collect();

        // Closest first; code ascending on equal distance for determinism
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.code.cmp(&b.code))
        });
        hits.truncate(k);

        Ok(hits)
    }
}
