use axum::{extract::State, Json};
use serde::Deserialize;
use std::time::Instant;

use crate::error::{error_type_name, AppError};
use crate::handlers::AppState;
use crate::metrics;
use crate::sourcing::CompareOutcome;

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub code: String,
    pub base_value: f64,
    pub quantity: f64,
    #[serde(default)]
    pub freight: f64,
    #[serde(default)]
    pub insurance: f64,
    #[serde(default)]
    pub other: f64,
    pub countries: Vec<String>,
    #[serde(default)]
    pub current_country: String,
}

/// Handle POST /v1/compare
pub async fn handle_compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<CompareOutcome>, AppError> {
    let started = Instant::now();

    let result = state
        .comparator
        .compare(
            &request.code,
            request.base_value,
            request.quantity,
            request.freight,
            request.insurance,
            request.other,
            &request.countries,
            &request.current_country,
        )
        .await;

    metrics::record_duration("compare", started.elapsed());

    match result {
        Ok(outcome) => {
            let failed = outcome.options.iter().filter(|o| o.error.is_some()).count();
            metrics::record_compare(outcome.options.len(), failed);
            Ok(Json(outcome))
        }
        Err(e) => {
            metrics::record_error("compare", error_type_name(&e));
            Err(e)
        }
    }
}
