use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{error_type_name, AppError};
use crate::handlers::AppState;
use crate::metrics;
use crate::resolver::{SearchCandidate, DEFAULT_RESOLVE_LIMIT};

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub query: String,
    #[serde(default)]
    pub chapter_filter: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub candidates: Vec<SearchCandidate>,
    pub total_matched: usize,
}

/// Handle POST /v1/resolve
pub async fn handle_resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    let started = Instant::now();
    let limit = request.limit.unwrap_or(DEFAULT_RESOLVE_LIMIT);

    let result = state
        .resolver
        .resolve(&request.query, request.chapter_filter.as_deref(), limit)
        .await;

    metrics::record_duration("resolve", started.elapsed());

    match result {
        Ok(candidates) => {
            metrics::record_resolve(candidates.len());
            Ok(Json(ResolveResponse {
                total_matched: candidates.len(),
                candidates,
            }))
        }
        Err(e) => {
            metrics::record_error("resolve", error_type_name(&e));
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::create_test_state;

    #[tokio::test]
    async fn test_resolve_exact_code() {
        let state = create_test_state();
        let response = handle_resolve(
            State(state),
            Json(ResolveRequest {
                query: "8471.30.01.00".to_string(),
                chapter_filter: None,
                limit: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.candidates[0].code, "8471300100");
        assert_eq!(response.0.candidates[0].confidence, 1.0);
        assert_eq!(response.0.total_matched, response.0.candidates.len());
    }

    #[tokio::test]
    async fn test_resolve_empty_query_rejected() {
        let state = create_test_state();
        let result = handle_resolve(
            State(state),
            Json(ResolveRequest {
                query: "  ".to_string(),
                chapter_filter: None,
                limit: None,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_resolve_no_match_is_empty_response() {
        let state = create_test_state();
        let response = handle_resolve(
            State(state),
            Json(ResolveRequest {
                query: "unobtainium".to_string(),
                chapter_filter: None,
                limit: None,
            }),
        )
        .await
        .unwrap();

        assert!(response.0.candidates.is_empty());
        assert_eq!(response.0.total_matched, 0);
    }
}
