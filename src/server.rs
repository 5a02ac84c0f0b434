use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    calculator::CostCalculator,
    codes::ClassificationIndex,
    config::Config,
    embedding::{EmbeddingSearch, TokenOverlapSearch},
    handlers::{self, AppState},
    metrics,
    rates::{HttpRateAuthority, RateAuthority, RateTable, ReferenceRates},
    resolver::CodeResolver,
    sourcing::SourcingComparator,
};

/// Construct every engine component from the immutable configuration.
///
/// Loads the classification index and reference rate table, wires the
/// semantic search and the optional upstream authority, and injects the
/// lot into one `AppState`. No global singletons; the rate cache's
/// lifetime is this state's lifetime.
pub fn build_state(config: Config) -> Result<AppState> {
    let index = Arc::new(ClassificationIndex::load(&config.data.classification_file)?);

    let semantic: Arc<dyn EmbeddingSearch> = TokenOverlapSearch::from_index_arc(&index);
    let resolver = Arc::new(CodeResolver::new(index.clone(), semantic));

    let reference = match &config.data.reference_rates_file {
        Some(path) => ReferenceRates::load(path)?,
        None => ReferenceRates::default(),
    };

    let authority: Option<Arc<dyn RateAuthority>> = if config.upstream.enabled {
        let timeout = Duration::from_secs(config.upstream.timeout_seconds);
        info!(base_url = %config.upstream.base_url, "Upstream rate authority enabled");
        Some(Arc::new(HttpRateAuthority::new(
            &config.upstream.base_url,
            timeout,
        )?))
    } else {
        None
    };

    let rates = RateTable::new(
        authority,
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

    Ok(AppState {
        config: Arc::new(config),
        index,
        resolver,
        rates,
        calculator,
        comparator,
    })
}

/// Start the tariff engine server
///
/// This function:
/// 1. Initializes metrics
/// 2. Loads the reference data and wires the engine components
/// 3. Creates the Axum application
/// 4. Binds to the configured address
/// 5. Serves requests with graceful shutdown on ctrl-c
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics());

    let app_state = build_state(config)?;
    let config = app_state.config.clone();

    let app = create_router(app_state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting tariff engine on {}", addr);
    info!(
        "Configuration: {} chapter defaults, {} FTA overrides, {} risk countries, upstream {}",
        config.tariff.chapter_default_rates.len(),
        config.tariff.fta_overrides.len(),
        config.tariff.risk_countries.len(),
        if config.upstream.enabled { "enabled" } else { "disabled" },
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    info!("Server stopped gracefully");
    Ok(())
}

/// Create the Axum router with all routes and middleware
fn create_router(
    app_state: AppState,
    metrics_handle: Arc<metrics_exporter_prometheus::PrometheusHandle>,
) -> Router {
    let api_routes = Router::new()
        .route("/v1/resolve", post(handlers::resolve::handle_resolve))
        .route("/v1/calculate", post(handlers::calculate::handle_calculate))
        .route("/v1/compare", post(handlers::compare::handle_compare))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(app_state);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(api_routes)
        // Limit request body size to 1MB; every request here is a small JSON document
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
}
