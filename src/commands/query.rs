//! One-shot pipeline commands: run a resolve/calculate/compare against the
//! configured reference data without starting the server, printing JSON.

use anyhow::Result;
use std::path::Path;

use tariff_engine::config::load_config;
use tariff_engine::handlers::AppState;
use tariff_engine::server::build_state;

fn state_from(config_path: &Path) -> Result<AppState> {
    let config = load_config(config_path)?;
    build_state(config)
}

pub async fn resolve(
    config_path: &Path,
    query: &str,
    chapter: Option<&str>,
    limit: usize,
) -> Result<()> {
    let state = state_from(config_path)?;
    let candidates = state.resolver.resolve(query, chapter, limit).await?;
    println!("{}", serde_json::to_string_pretty(&candidates)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn calculate(
    config_path: &Path,
    code: &str,
    country: &str,
    quantity: f64,
    unit_price: f64,
    freight: f64,
    insurance: f64,
    other: f64,
    adcvd_rate: Option<f64>,
) -> Result<()> {
    let state = state_from(config_path)?;
    let quote = state.rates.get_rate(code, country).await?;
    let breakdown = state.calculator.calculate(
        &quote, quantity, unit_price, freight, insurance, other, adcvd_rate,
    )?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "rate": quote,
            "breakdown": breakdown,
        }))?
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn compare(
    config_path: &Path,
    code: &str,
    base_value: f64,
    quantity: f64,
    freight: f64,
    insurance: f64,
    other: f64,
    countries: &[String],
    current_country: &str,
) -> Result<()> {
    let state = state_from(config_path)?;
    let outcome = state
        .comparator
        .compare(
            code,
            base_value,
            quantity,
            freight,
            insurance,
            other,
            countries,
            current_country,
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
