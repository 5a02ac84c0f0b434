use crate::config::FeeConfig;
use crate::error::AppError;
use crate::rates::RateQuote;
use serde::{Deserialize, Serialize};

/// Full landed-cost breakdown for one shipment. Immutable value object;
/// `total` is the exact sum of its parts (no intermediate rounding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub product_value: f64,
    /// Duty rate percent the duty amount was computed from
    pub duty_rate: f64,
    pub duty: f64,
    /// Merchandise Processing Fee (percentage of value, capped)
    pub mpf: f64,
    /// Harbor Maintenance Fee (percentage of value, uncapped)
    pub hmf: f64,
    /// Antidumping/countervailing duty, when an AD/CVD rate applies
    pub adcvd: Option<f64>,
    pub freight: f64,
    pub insurance: f64,
    pub other: f64,
    pub total: f64,
    pub currency: String,
}

/// Pure landed-cost calculator. No I/O, no shared state; safe to call
/// concurrently without synchronization.
#[derive(Debug, Clone, Copy)]
pub struct CostCalculator {
    fees: FeeConfig,
}

impl CostCalculator {
    pub fn new(fees: FeeConfig) -> Self {
        Self { fees }
    }

    /// Compute the landed cost for a shipment at the quoted duty rate.
    ///
    /// Validates `quantity > 0`, `unit_price > 0` and all cost fields
    /// `>= 0`; the error names the offending field. The MPF cap applies
    /// per invocation (treated as per shipment line).
    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &self,
        rate: &RateQuote,
        quantity: f64,
        unit_price: f64,
        freight: f64,
        insurance: f64,
        other: f64,
        adcvd_rate: Option<f64>,
    ) -> Result<CostBreakdown, AppError> {
        if !(quantity > 0.0) {
            return Err(AppError::InvalidInput("quantity must be positive".to_string()));
        }
        if !(unit_price > 0.0) {
            return Err(AppError::InvalidInput("unit_price must be positive".to_string()));
        }
        for (name, value) in [("freight", freight), ("insurance", insurance), ("other", other)] {
            if !(value >= 0.0) {
                return Err(AppError::InvalidInput(format!(
                    "{} must be non-negative",
                    name
                )));
            }
        }
        if let Some(adcvd) = adcvd_rate {
            if !(adcvd >= 0.0) {
                return Err(AppError::InvalidInput(
                    "adcvd_rate must be non-negative".to_string(),
                ));
            }
        }
        if rate.rate < 0.0 {
            return Err(AppError::InvalidInput("duty rate must be non-negative".to_string()));
        }

        let product_value = quantity * unit_price;
        let duty = product_value * rate.rate / 100.0;
        let mpf = (product_value * self.fees.mpf_rate / 100.0).min(self.fees.mpf_cap);
        let hmf = product_value * self.fees.hmf_rate / 100.0;
        let adcvd = adcvd_rate.map(|r| product_value * r / 100.0);

        let total = product_value
            + duty
            + mpf
            + hmf
            + adcvd.unwrap_or(0.0)
            + freight
            + insurance
            + other;

        Ok(CostBreakdown {
            product_value,
            duty_rate: rate.rate,
            duty,
            mpf,
            hmf,
            adcvd,
            freight,
            insurance,
            other,
            total,
            currency: "USD".to_string(),
        })
    }
}
