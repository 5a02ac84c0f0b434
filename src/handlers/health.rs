use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::handlers::AppState;

/// Handle /health endpoint: liveness only
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Handle /ready endpoint: ready once the classification index is loaded
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.index.is_empty() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": "classification index is empty" })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({ "status": "ready", "classifications": state.index.len() })),
        )
    }
}
