use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::calculator::CostBreakdown;
use crate::error::{error_type_name, AppError};
use crate::handlers::AppState;
use crate::metrics;
use crate::rates::RateQuote;

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub code: String,
    pub country: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub freight: f64,
    #[serde(default)]
    pub insurance: f64,
    #[serde(default)]
    pub other: f64,
    #[serde(default)]
    pub adcvd_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    pub breakdown: CostBreakdown,
    pub rate: RateQuote,
}

/// Handle POST /v1/calculate
pub async fn handle_calculate(
    State(state): State<AppState>,
    Json(request): Json<CalculateRequest>,
) -> Result<Json<CalculateResponse>, AppError> {
    let started = Instant::now();

    let result = calculate(&state, &request).await;
    metrics::record_duration("calculate", started.elapsed());

    match result {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            metrics::record_error("calculate", error_type_name(&e));
            Err(e)
        }
    }
}

async fn calculate(
    state: &AppState,
    request: &CalculateRequest,
) -> Result<CalculateResponse, AppError> {
    let quote = state.rates.get_rate(&request.code, &request.country).await?;
    metrics::record_rate_lookup(quote.source.as_str());

    let breakdown = state.calculator.calculate(
        &quote,
        request.quantity,
        request.unit_price,
        request.freight,
        request.insurance,
        request.other,
        request.adcvd_rate,
    )?;

    Ok(CalculateResponse {
        breakdown,
        rate: quote,
    })
}
