use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub tariff: TariffPolicyConfig,
    #[serde(default)]
    pub comparison: ComparisonConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Paths to the read-only reference data loaded at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// JSON array of { code, description, category? }
    pub classification_file: PathBuf,
    /// JSON array of { code, country, rate }; optional
    #[serde(default)]
    pub reference_rates_file: Option<PathBuf>,
}

/// Authoritative upstream rate source (optional).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub enabled: bool,
    pub base_url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            timeout_seconds: default_upstream_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Seconds a cached rate stays fresh before stale-while-revalidate
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
        }
    }
}

/// Statutory fee schedule. The MPF cap is a policy constant here, not a
/// magic literal at the call site.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct FeeConfig {
    /// Merchandise Processing Fee, percent of product value
    #[serde(default = "default_mpf_rate")]
    pub mpf_rate: f64,
    /// Absolute cap on the MPF, in currency units
    #[serde(default = "default_mpf_cap")]
    pub mpf_cap: f64,
    /// Harbor Maintenance Fee, percent of product value (uncapped)
    #[serde(default = "default_hmf_rate")]
    pub hmf_rate: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            mpf_rate: default_mpf_rate(),
            mpf_cap: default_mpf_cap(),
            hmf_rate: default_hmf_rate(),
        }
    }
}

/// Duty-rate policy: statistical defaults, trade-preference overrides and
/// advisory risk tagging.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TariffPolicyConfig {
    /// Chapter (2-digit string) -> default duty rate percent
    #[serde(default)]
    pub chapter_default_rates: HashMap<String, f64>,
    /// Last-resort duty rate percent when the chapter has no default
    #[serde(default)]
    pub global_default_rate: Option<f64>,
    /// Free-trade-agreement overrides applied per (chapter, country)
    #[serde(default)]
    pub fta_overrides: Vec<FtaOverride>,
    /// Origin countries tagged "high" risk (advisory lookup only)
    #[serde(default)]
    pub risk_countries: Vec<String>,
    /// Countries charged the column-2 (non-MFN) rate
    #[serde(default)]
    pub column2_countries: Vec<String>,
    /// Placeholder heuristic: column-2 rate = general rate x this multiplier.
    /// Not an authoritative rule; override with real column-2 data when
    /// exactness matters.
    #[serde(default = "default_column2_multiplier")]
    pub column2_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FtaOverride {
    /// 2-digit chapter the agreement covers
    pub chapter: String,
    pub country: String,
    /// Preferential duty rate percent (usually 0)
    pub rate: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComparisonConfig {
    /// Bounded-concurrency worker pool size for the per-country fan-out
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-country evaluation timeout in seconds
    #[serde(default = "default_country_timeout")]
    pub country_timeout_seconds: u64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            country_timeout_seconds: default_country_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_endpoint")]
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_metrics_endpoint(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    300
}

// 19 USC 58c: 0.3464% of value, capped at the statutory maximum.
fn default_mpf_rate() -> f64 {
    0.3464
}

fn default_mpf_cap() -> f64 {
    575.00
}

fn default_hmf_rate() -> f64 {
    0.125
}

fn default_column2_multiplier() -> f64 {
    2.0
}

fn default_workers() -> usize {
    8
}

fn default_country_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_metrics_endpoint() -> String {
    "/metrics".to_string()
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("TARIFF_ENGINE").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.upstream.enabled && cfg.upstream.base_url.is_empty() {
        anyhow::bail!("Upstream rate authority is enabled but base_url is empty");
    }

    if cfg.fees.mpf_rate < 0.0 || cfg.fees.hmf_rate < 0.0 || cfg.fees.mpf_cap < 0.0 {
        anyhow::bail!("Fee rates and the MPF cap must be non-negative");
    }

    if cfg.comparison.workers == 0 {
        anyhow::bail!("Comparison worker pool size must be at least 1");
    }

    for (chapter, rate) in &cfg.tariff.chapter_default_rates {
        if chapter.len() != 2 || !chapter.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("Chapter default '{}' is not a 2-digit chapter", chapter);
        }
        if *rate < 0.0 {
            anyhow::bail!("Chapter default rate for '{}' must be non-negative", chapter);
        }
    }

    if let Some(rate) = cfg.tariff.global_default_rate {
        if rate < 0.0 {
            anyhow::bail!("Global default rate must be non-negative");
        }
    }

    for fta in &cfg.tariff.fta_overrides {
        if fta.chapter.len() != 2 || !fta.chapter.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("FTA override chapter '{}' is not a 2-digit chapter", fta.chapter);
        }
        if fta.rate < 0.0 {
            anyhow::bail!(
                "FTA override rate for ({}, {}) must be non-negative",
                fta.chapter,
                fta.country
            );
        }
    }

    if cfg.tariff.column2_multiplier < 0.0 {
        anyhow::bail!("Column-2 multiplier must be non-negative");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        let mut chapter_default_rates = HashMap::new();
        chapter_default_rates.insert("84".to_string(), 2.5);

        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                log_level: "info".to_string(),
                log_format: "text".to_string(),
            },
            data: DataConfig {
                classification_file: PathBuf::from("data/classifications.json"),
                reference_rates_file: None,
            },
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            fees: FeeConfig::default(),
            tariff: TariffPolicyConfig {
                chapter_default_rates,
                global_default_rate: Some(5.0),
                fta_overrides: vec![FtaOverride {
                    chapter: "84".to_string(),
                    country: "Mexico".to_string(),
                    rate: 0.0,
                }],
                risk_countries: vec!["Russia".to_string()],
                column2_countries: vec!["Cuba".to_string()],
                column2_multiplier: 2.0,
            },
            comparison: ComparisonConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_default_fee_schedule() {
        let fees = FeeConfig::default();
        assert_eq!(fees.mpf_rate, 0.3464);
        assert_eq!(fees.mpf_cap, 575.00);
        assert_eq!(fees.hmf_rate, 0.125);
    }

    #[test]
    fn test_validate_config_accepts_defaults() {
        let cfg = create_test_config();
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_validate_rejects_enabled_upstream_without_url() {
        let mut cfg = create_test_config();
        cfg.upstream.enabled = true;
        cfg.upstream.base_url.clear();

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("base_url"));
    }

    #[test]
    fn test_validate_rejects_bad_chapter_key() {
        let mut cfg = create_test_config();
        cfg.tariff.chapter_default_rates.insert("8".to_string(), 1.0);

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("2-digit chapter"));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut cfg = create_test_config();
        cfg.comparison.workers = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_fta_rate() {
        let mut cfg = create_test_config();
        cfg.tariff.fta_overrides[0].rate = -1.0;
        assert!(validate_config(&cfg).is_err());
    }
}
