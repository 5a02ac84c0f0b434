use crate::calculator::{CostBreakdown, CostCalculator};
use crate::codes::{chapter_of, normalize_code};
use crate::config::{ComparisonConfig, TariffPolicyConfig};
use crate::error::AppError;
use crate::rates::RateTable;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

/// Advisory origin-risk tag, from the configured static list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    High,
}

/// Outcome for one candidate country: either a full breakdown or the
/// error that prevented one. Failed countries stay in the result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcingOption {
    pub country: String,
    pub breakdown: Option<CostBreakdown>,
    /// Landed-cost saving vs. the current sourcing country; None when the
    /// baseline itself could not be resolved
    pub savings: Option<f64>,
    pub risk: RiskLevel,
    pub error: Option<String>,
}

/// Aggregated comparison result.
#[derive(Debug, Clone, Serialize)]
pub struct CompareOutcome {
    /// Sorted by total landed cost ascending, country ascending on ties;
    /// failed countries follow, sorted by country
    pub options: Vec<SourcingOption>,
    pub best_option: Option<SourcingOption>,
    pub total_compared: usize,
}

/// Fans a landed-cost calculation out across candidate countries with a
/// bounded worker pool, collects results including partial failures, and
/// ranks them deterministically.
#[derive(Clone)]
pub struct SourcingComparator {
    inner: Arc<Inner>,
}

struct Inner {
    rates: RateTable,
    calculator: CostCalculator,
    /// (chapter, country) -> preferential duty rate percent
    fta_overrides: HashMap<String, f64>,
    risk_countries: HashSet<String>,
    workers: usize,
    country_timeout: Duration,
}

fn fta_key(chapter: &str, country: &str) -> String {
    format!("{}:{}", chapter, country.trim().to_lowercase())
}

impl SourcingComparator {
    pub fn new(
        rates: RateTable,
        calculator: CostCalculator,
        policy: &TariffPolicyConfig,
        comparison: &ComparisonConfig,
    ) -> Self {
        let fta_overrides = policy
            .fta_overrides
            .iter()
            .map(|fta| (fta_key(&fta.chapter, &fta.country), fta.rate))
            .collect();
        let risk_countries = policy
            .risk_countries
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect();

        Self {
            inner: Arc::new(Inner {
                rates,
                calculator,
                fta_overrides,
                risk_countries,
                workers: comparison.workers.max(1),
                country_timeout: Duration::from_secs(comparison.country_timeout_seconds),
            }),
        }
    }

    /// Compare sourcing options for one classification across countries.
    ///
    /// Per-country failures are captured in that country's option rather
    /// than failing the call. The aggregate deadline is the per-country
    /// timeout times the number of worker waves; countries still pending
    /// at the deadline are reported as failed options.
    #[allow(clippy::too_many_arguments)]
    pub async fn compare(
        &self,
        code: &str,
        base_value: f64,
        quantity: f64,
        freight: f64,
        insurance: f64,
        other: f64,
        countries: &[String],
        current_country: &str,
    ) -> Result<CompareOutcome, AppError> {
        if countries.is_empty() {
            return Err(AppError::InvalidInput(
                "countries must contain at least one entry".to_string(),
            ));
        }
        if !(base_value > 0.0) {
            return Err(AppError::InvalidInput("base_value must be positive".to_string()));
        }
        if !(quantity > 0.0) {
            return Err(AppError::InvalidInput("quantity must be positive".to_string()));
        }

        let code = normalize_code(code);
        let unit_price = base_value / quantity;

        // Evaluate each requested country once, plus the current country
        // (needed for the savings baseline) even when it was not requested.
        let mut requested: Vec<String> = Vec::new();
        for country in countries {
            if !requested.iter().any(|c| c == country) {
                requested.push(country.clone());
            }
        }
        let mut evaluate = requested.clone();
        let current = current_country.trim().to_string();
        if !current.is_empty() && !evaluate.iter().any(|c| c == &current) {
            evaluate.push(current.clone());
        }

        let waves = evaluate.len().div_ceil(self.inner.workers);
        let deadline = self.inner.country_timeout * waves as u32;

        let semaphore = Arc::new(Semaphore::new(self.inner.workers));
        let outcomes: Arc<Mutex<HashMap<String, Result<CostBreakdown, String>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let mut handles = Vec::with_capacity(evaluate.len());
        for country in &evaluate {
            let comparator = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let outcomes = Arc::clone(&outcomes);
            let code = code.clone();
            let country = country.clone();

            handles.push(tokio::spawn(async move {
                // Closed only if the comparison was dropped entirely.
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };

                let evaluation = tokio::time::timeout(
                    comparator.inner.country_timeout,
                    comparator.evaluate_country(&code, &country, quantity, unit_price, freight, insurance, other),
                )
                .await;

                let outcome = match evaluation {
                    Ok(Ok(breakdown)) => Ok(breakdown),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "country evaluation timed out after {}s",
                        comparator.inner.country_timeout.as_secs()
                    )),
                };

                outcomes.lock().await.insert(country, outcome);
            }));
        }

        // On deadline, abort what is left and return what completed.
        let gather = futures::future::join_all(&mut handles);
        if tokio::time::timeout(deadline, gather).await.is_err() {
            warn!(
                code = %code,
                deadline_seconds = deadline.as_secs(),
                "Comparison deadline reached, returning partial results"
            );
            for handle in &handles {
                handle.abort();
            }
        }

        let outcomes = outcomes.lock().await;

        // Savings baseline: total landed cost of the current country.
        let baseline = if current.is_empty() {
            None
        } else {
            outcomes
                .get(&current)
                .and_then(|o| o.as_ref().ok())
                .map(|b| b.total)
        };

        let mut options: Vec<SourcingOption> = requested
            .iter()
            .map(|country| {
                let outcome = outcomes.get(country);
                match outcome {
                    Some(Ok(breakdown)) => SourcingOption {
                        country: country.clone(),
                        savings: baseline.map(|base| base - breakdown.total),
                        breakdown: Some(breakdown.clone()),
                        risk: self.risk_of(country),
                        error: None,
                    },
                    Some(Err(message)) => SourcingOption {
                        country: country.clone(),
                        breakdown: None,
                        savings: None,
                        risk: self.risk_of(country),
                        error: Some(message.clone()),
                    },
                    None => SourcingOption {
                        country: country.clone(),
                        breakdown: None,
                        savings: None,
                        risk: self.risk_of(country),
                        error: Some("comparison deadline exceeded".to_string()),
                    },
                }
            })
            .collect();

        // Explicit sort after gathering: ordering never depends on task
        // completion order. Successes by total then country; failures
        // after, by country.
        options.sort_by(|a, b| match (&a.breakdown, &b.breakdown) {
            (Some(x), Some(y)) => x
                .total
                .partial_cmp(&y.total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.country.cmp(&b.country)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.country.cmp(&b.country),
        });

        let best_option = options.iter().find(|o| o.breakdown.is_some()).cloned();
        let total_compared = options.len();

        Ok(CompareOutcome {
            options,
            best_option,
            total_compared,
        })
    }

    /// Rate lookup (with FTA override) followed by the pure calculation.
    async fn evaluate_country(
        &self,
        code: &str,
        country: &str,
        quantity: f64,
        unit_price: f64,
        freight: f64,
        insurance: f64,
        other: f64,
    ) -> Result<CostBreakdown, AppError> {
        let mut quote = self.inner.rates.get_rate(code, country).await?;

        let chapter = chapter_of(&quote.code).to_string();
        if let Some(rate) = self.inner.fta_overrides.get(&fta_key(&chapter, country)) {
            debug!(
                code = %quote.code,
                country = %country,
                chapter = %chapter,
                rate = rate,
                "Applying trade-preference rate override"
            );
            quote.rate = *rate;
        }

        self.inner
            .calculator
            .calculate(&quote, quantity, unit_price, freight, insurance, other, None)
    }

    fn risk_of(&self, country: &str) -> RiskLevel {
        if self
            .inner
            .risk_countries
            .contains(&country.trim().to_lowercase())
        {
            RiskLevel::High
        } else {
            RiskLevel::Low
        }
    }
}
