use crate::codes::{chapter_of, normalize_code};
use crate::config::TariffPolicyConfig;
use crate::error::{is_fallback_eligible, AppError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Confidence assigned per resolution level.
const CONFIDENCE_REMOTE: f64 = 0.95;
const CONFIDENCE_REFERENCE: f64 = 0.85;
const CONFIDENCE_CHAPTER_DEFAULT: f64 = 0.5;
const CONFIDENCE_GLOBAL_DEFAULT: f64 = 0.3;

/// Where a duty rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    /// Authoritative upstream source
    Exact,
    /// Served from the cache or the local reference table
    Cached,
    /// Chapter-level or global statistical default
    Estimated,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Exact => "exact",
            RateSource::Cached => "cached",
            RateSource::Estimated => "estimated",
        }
    }
}

/// A resolved duty rate for one (code, country) pair. Ephemeral;
/// recomputed per request or served from the TTL cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateQuote {
    pub code: String,
    pub country: String,
    /// Duty rate in percent, >= 0
    pub rate: f64,
    pub source: RateSource,
    /// In [0, 1]
    pub confidence: f64,
    pub retrieved_at: DateTime<Utc>,
}

// ============================================================
// Upstream Rate Authority
// ============================================================

/// Authoritative upstream rate source. Only its success/timeout/error
/// outcome matters to the fallback chain.
#[async_trait]
pub trait RateAuthority: Send + Sync + 'static {
    /// Fetch the duty rate percent for a normalized code and country.
    async fn fetch_rate(&self, code: &str, country: &str) -> Result<f64, AppError>;
}

#[derive(Debug, Deserialize)]
struct RateAuthorityResponse {
    rate: f64,
}

/// HTTP client for the upstream rate authority.
pub struct HttpRateAuthority {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AppError::HttpRequest)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RateAuthority for HttpRateAuthority {
    async fn fetch_rate(&self, code: &str, country: &str) -> Result<f64, AppError> {
        let url = format!("{}/rates/{}", self.base_url, code);
        let response = self
            .client
            .get(&url)
            .query(&[("country", country)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout(format!("rate authority: {}", e))
                } else {
                    AppError::HttpRequest(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "rate authority has no rate for {}/{}",
                code, country
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamError { status, message });
        }

        let body: RateAuthorityResponse = response.json().await.map_err(AppError::HttpRequest)?;
        if body.rate < 0.0 {
            return Err(AppError::UpstreamError {
                status,
                message: format!("rate authority returned negative rate {}", body.rate),
            });
        }
        Ok(body.rate)
    }
}

// ============================================================
// Reference Table
// ============================================================

/// Raw record shape accepted from the reference-rates file.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceRateRecord {
    pub code: String,
    /// None marks a general (country-independent) rate
    #[serde(default)]
    pub country: Option<String>,
    pub rate: f64,
}

/// Local read-only duty-rate table, keyed by normalized code + country,
/// with optional country-independent general rates per code.
#[derive(Debug, Default)]
pub struct ReferenceRates {
    specific: HashMap<String, f64>,
    general: HashMap<String, f64>,
}

fn normalize_country(country: &str) -> String {
    country.trim().to_lowercase()
}

impl ReferenceRates {
    pub fn from_records(records: Vec<ReferenceRateRecord>) -> Self {
        let mut specific = HashMap::new();
        let mut general = HashMap::new();
        for rec in records {
            let code = normalize_code(&rec.code);
            match rec.country {
                Some(country) => {
                    specific.insert(format!("{}:{}", code, normalize_country(&country)), rec.rate);
                }
                None => {
                    general.insert(code, rec.rate);
                }
            }
        }
        Self { specific, general }
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "cannot read reference rates file {}: {}",
                path.display(),
                e
            ))
        })?;
        let records: Vec<ReferenceRateRecord> = serde_json::from_str(&raw)?;
        info!(count = records.len(), file = %path.display(), "Loaded reference rate table");
        Ok(Self::from_records(records))
    }

    /// Country-specific entry, if present.
    fn get_specific(&self, code: &str, country: &str) -> Option<f64> {
        self.specific
            .get(&format!("{}:{}", code, normalize_country(country)))
            .copied()
    }

    /// General (country-independent) entry, if present.
    fn get_general(&self, code: &str) -> Option<f64> {
        self.general.get(code).copied()
    }
}

// ============================================================
// RateTable
// ============================================================

/// Cache entry lifecycle: a vacant key is MISS; `InFlight` while the single
/// outstanding fetch runs; `Ready` is FRESH until the TTL elapses, then
/// STALE — still served while a background refresh runs.
enum CacheEntry {
    InFlight(watch::Receiver<Option<RateQuote>>),
    Ready {
        quote: RateQuote,
        fetched_at: Instant,
        refreshing: Arc<AtomicBool>,
    },
}

/// Duty-rate source with a deterministic fallback chain and a concurrent
/// single-flight TTL cache.
///
/// Resolution order per (code, country): upstream authority (bounded
/// timeout), local reference table, chapter default, global default.
/// `NotFound` only when every level fails.
#[derive(Clone)]
pub struct RateTable {
    inner: Arc<Inner>,
}

struct Inner {
    authority: Option<Arc<dyn RateAuthority>>,
    reference: ReferenceRates,
    chapter_defaults: HashMap<String, f64>,
    global_default: Option<f64>,
    column2_countries: HashSet<String>,
    column2_multiplier: f64,
    cache: DashMap<String, CacheEntry>,
    ttl: Duration,
    upstream_timeout: Duration,
}

impl RateTable {
    pub fn new(
        authority: Option<Arc<dyn RateAuthority>>,
        reference: ReferenceRates,
        policy: &TariffPolicyConfig,
        ttl: Duration,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                authority,
                reference,
                chapter_defaults: policy.chapter_default_rates.clone(),
                global_default: policy.global_default_rate,
                column2_countries: policy
                    .column2_countries
                    .iter()
                    .map(|c| normalize_country(c))
                    .collect(),
                column2_multiplier: policy.column2_multiplier,
                cache: DashMap::new(),
                ttl,
                upstream_timeout,
            }),
        }
    }

    /// Resolve the duty rate for a classification code and origin country.
    ///
    /// Concurrent callers for the same uncached key share one outstanding
    /// fetch. A stale entry is served immediately while a background
    /// refresh runs; if the refresh fails the stale value stays.
    pub async fn get_rate(&self, code: &str, country: &str) -> Result<RateQuote, AppError> {
        let code = normalize_code(code);
        let key = format!("{}:{}", code, normalize_country(country));

        loop {
            enum Action {
                Serve(RateQuote),
                Wait(watch::Receiver<Option<RateQuote>>),
                Fetch(watch::Sender<Option<RateQuote>>),
                Retry,
            }

            // Decide under the shard lock, never await while holding it.
            let action = match self.inner.cache.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    let action = match occupied.get() {
                        CacheEntry::InFlight(rx) => {
                            // A fetcher cancelled mid-flight leaves a dead
                            // entry behind; evict it and take over the fetch.
                            if rx.borrow().is_none() && rx.has_changed().is_err() {
                                Action::Retry
                            } else {
                                Action::Wait(rx.clone())
                            }
                        }
                        CacheEntry::Ready {
                            quote,
                            fetched_at,
                            refreshing,
                        } => {
                            if fetched_at.elapsed() >= self.inner.ttl
                                && refreshing
                                    .compare_exchange(
                                        false,
                                        true,
                                        Ordering::AcqRel,
                                        Ordering::Acquire,
                                    )
                                    .is_ok()
                            {
                                self.spawn_refresh(key.clone(), code.clone(), country.to_string());
                            }
                            let mut served = quote.clone();
                            served.source = RateSource::Cached;
                            Action::Serve(served)
                        }
                    };
                    if matches!(action, Action::Retry) {
                        occupied.remove();
                    }
                    action
                }
                Entry::Vacant(vacant) => {
                    let (tx, rx) = watch::channel(None);
                    vacant.insert(CacheEntry::InFlight(rx));
                    Action::Fetch(tx)
                }
            };

            match action {
                Action::Serve(quote) => return Ok(quote),
                Action::Retry => continue,
                Action::Fetch(tx) => match self.inner.resolve_chain(&code, country).await {
                    Ok(quote) => {
                        self.inner.cache.insert(
                            key,
                            CacheEntry::Ready {
                                quote: quote.clone(),
                                fetched_at: Instant::now(),
                                refreshing: Arc::new(AtomicBool::new(false)),
                            },
                        );
                        let _ = tx.send(Some(quote.clone()));
                        return Ok(quote);
                    }
                    Err(e) => {
                        // Dropping tx wakes waiters, who retry the key.
                        self.inner.cache.remove(&key);
                        return Err(e);
                    }
                },
                Action::Wait(mut rx) => {
                    let existing = rx.borrow().as_ref().cloned();
                    if let Some(quote) = existing {
                        return Ok(quote);
                    }
                    match rx.changed().await {
                        Ok(()) => {
                            let value = rx.borrow().as_ref().cloned();
                            if let Some(quote) = value {
                                return Ok(quote);
                            }
                            // Spurious wake; retry from the top.
                        }
                        Err(_) => {
                            // Fetch failed; retry from the top (this caller
                            // may become the new fetcher and see the error).
                        }
                    }
                }
            }
        }
    }

    /// Replace a stale entry in the background; never blocks the caller.
    fn spawn_refresh(&self, key: String, code: String, country: String) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.resolve_chain(&code, &country).await {
                Ok(quote) => {
                    inner.cache.insert(
                        key,
                        CacheEntry::Ready {
                            quote,
                            fetched_at: Instant::now(),
                            refreshing: Arc::new(AtomicBool::new(false)),
                        },
                    );
                    debug!(code = %code, country = %country, "Refreshed stale rate entry");
                }
                Err(e) => {
                    // Keep serving the stale value; clear the flag so a
                    // later caller can retry the refresh.
                    if let Some(mut entry) = inner.cache.get_mut(&key) {
                        if let CacheEntry::Ready { refreshing, .. } = entry.value_mut() {
                            refreshing.store(false, Ordering::Release);
                        }
                    }
                    warn!(code = %code, country = %country, error = %e, "Stale rate refresh failed, keeping cached value");
                }
            }
        });
    }
}

impl Inner {
    /// The fallback chain, tried in order; first success wins.
    async fn resolve_chain(&self, code: &str, country: &str) -> Result<RateQuote, AppError> {
        // 1. Authoritative upstream source, bounded timeout.
        if let Some(authority) = &self.authority {
            let fetch = authority.fetch_rate(code, country);
            match tokio::time::timeout(self.upstream_timeout, fetch).await {
                Ok(Ok(rate)) => {
                    return Ok(quote(code, country, rate, RateSource::Exact, CONFIDENCE_REMOTE));
                }
                Ok(Err(e)) => {
                    if is_fallback_eligible(&e) {
                        warn!(code = %code, country = %country, error = %e, "Upstream rate lookup failed, falling back");
                    } else {
                        warn!(code = %code, country = %country, error = %e, "Upstream rate lookup rejected, falling back");
                    }
                }
                Err(_) => {
                    warn!(
                        code = %code,
                        country = %country,
                        timeout_seconds = self.upstream_timeout.as_secs(),
                        "Upstream rate lookup timed out, falling back"
                    );
                }
            }
        }

        // 2. Local reference table: country-specific first, then the
        // general rate. Column-2 countries pay the configured multiple of
        // the general rate (a placeholder heuristic, not ground truth).
        if let Some(rate) = self.reference.get_specific(code, country) {
            return Ok(quote(code, country, rate, RateSource::Cached, CONFIDENCE_REFERENCE));
        }
        if let Some(rate) = self.reference.get_general(code) {
            let rate = self.apply_column2(rate, country);
            return Ok(quote(code, country, rate, RateSource::Cached, CONFIDENCE_REFERENCE));
        }

        // 3. Chapter-level statistical default, else the global default.
        let chapter = chapter_of(code);
        if let Some(rate) = self.chapter_defaults.get(chapter).copied() {
            let rate = self.apply_column2(rate, country);
            return Ok(quote(
                code,
                country,
                rate,
                RateSource::Estimated,
                CONFIDENCE_CHAPTER_DEFAULT,
            ));
        }
        if let Some(rate) = self.global_default {
            let rate = self.apply_column2(rate, country);
            return Ok(quote(
                code,
                country,
                rate,
                RateSource::Estimated,
                CONFIDENCE_GLOBAL_DEFAULT,
            ));
        }

        Err(AppError::NotFound(format!(
            "no duty rate for {}/{} after exhausting all fallbacks",
            code, country
        )))
    }

    fn apply_column2(&self, rate: f64, country: &str) -> f64 {
        if self.column2_countries.contains(&normalize_country(country)) {
            rate * self.column2_multiplier
        } else {
            rate
        }
    }
}

fn quote(code: &str, country: &str, rate: f64, source: RateSource, confidence: f64) -> RateQuote {
    RateQuote {
        code: code.to_string(),
        country: country.to_string(),
        rate,
        source,
        confidence,
        retrieved_at: Utc::now(),
    }
}
