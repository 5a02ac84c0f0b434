pub mod calculate;
pub mod compare;
pub mod health;
pub mod metrics_handler;
pub mod resolve;

use crate::calculator::CostCalculator;
use crate::codes::ClassificationIndex;
use crate::config::Config;
use crate::rates::RateTable;
use crate::resolver::CodeResolver;
use crate::sourcing::SourcingComparator;
use std::sync::Arc;

/// Shared state for the HTTP layer: every engine component is constructed
/// once at startup and injected here, no global singletons.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub index: Arc<ClassificationIndex>,
    pub resolver: Arc<CodeResolver>,
    pub rates: RateTable,
    pub calculator: CostCalculator,
    pub comparator: SourcingComparator,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::codes::ClassificationRecord;
    use crate::config::{
        CacheConfig, ComparisonConfig, DataConfig, FeeConfig, MetricsConfig, ServerConfig,
        TariffPolicyConfig, UpstreamConfig,
    };
    use crate::embedding::TokenOverlapSearch;
    use crate::rates::{ReferenceRateRecord, ReferenceRates};
    use std::path::PathBuf;
    use std::time::Duration;

    /// Fully wired state over a small in-memory dataset; no upstream.
    pub fn create_test_state() -> AppState {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                log_level: "info".to_string(),
                log_format: "text".to_string(),
            },
            data: DataConfig {
                classification_file: PathBuf::from("unused.json"),
                reference_rates_file: None,
            },
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            fees: FeeConfig::default(),
            tariff: TariffPolicyConfig {
                chapter_default_rates: [("84".to_string(), 2.5)].into_iter().collect(),
                global_default_rate: Some(5.0),
                fta_overrides: Vec::new(),
                risk_countries: vec!["Russia".to_string()],
                column2_countries: Vec::new(),
                column2_multiplier: 2.0,
            },
            comparison: ComparisonConfig::default(),
            metrics: MetricsConfig::default(),
        };

        let index = Arc::new(ClassificationIndex::from_records(vec![
            ClassificationRecord {
                code: "8471.30.01.00".to_string(),
                description: "Portable digital computers".to_string(),
                category: Some("electronics".to_string()),
            },
            ClassificationRecord {
                code: "9503.00.00.73".to_string(),
                description: "Toys and models".to_string(),
                category: None,
            },
        ]));

        let semantic = TokenOverlapSearch::from_index_arc(&index);
        let resolver = Arc::new(CodeResolver::new(index.clone(), semantic));

        let reference = ReferenceRates::from_records(vec![ReferenceRateRecord {
            code: "8471300100".to_string(),
            country: Some("China".to_string()),
            rate: 7.5,
        }]);
        let rates = RateTable::new(
            None,
            reference,
            &config.tariff,
            Duration::from_secs(config.cache.ttl_seconds),
            Duration::from_secs(config.upstream.timeout_seconds),
        );
        let calculator = CostCalculator::new(config.fees);
        let comparator = SourcingComparator::new(
            rates.clone(),
            calculator,
            &config.tariff,
            &config.comparison,
        );

        AppState {
            config: Arc::new(config),
            index,
            resolver,
            rates,
            calculator,
            comparator,
        }
    }
}
