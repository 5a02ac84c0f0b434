use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    init_metric_descriptions();

    handle
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "tariff_resolve_requests_total",
        "Total number of classification resolve requests"
    );
    describe_counter!(
        "tariff_rate_lookups_total",
        "Total number of duty-rate lookups by resolution source"
    );
    describe_counter!(
        "tariff_compare_requests_total",
        "Total number of sourcing comparison requests"
    );
    describe_histogram!(
        "tariff_request_duration_seconds",
        "Request duration in seconds by operation"
    );
    describe_counter!(
        "tariff_errors_total",
        "Total number of errors by operation and error type"
    );
    describe_gauge!(
        "tariff_engine_info",
        "Engine version and build information"
    );

    gauge!("tariff_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a resolve request with its candidate count
pub fn record_resolve(candidates: usize) {
    counter!(
        "tariff_resolve_requests_total",
        "outcome" => if candidates == 0 { "empty" } else { "matched" }
    )
    .increment(1);
}

/// Record a rate lookup by resolution source (exact/cached/estimated)
pub fn record_rate_lookup(source: &str) {
    counter!(
        "tariff_rate_lookups_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record a comparison request
pub fn record_compare(countries: usize, failed: usize) {
    counter!(
        "tariff_compare_requests_total",
        "outcome" => if failed == 0 {
            "complete"
        } else if failed < countries {
            "partial"
        } else {
            "failed"
        }
    )
    .increment(1);
}

/// Record request duration for an operation
pub fn record_duration(operation: &str, duration: Duration) {
    histogram!(
        "tariff_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record an error
pub fn record_error(operation: &str, error_type: &str) {
    counter!(
        "tariff_errors_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        init_metric_descriptions();

        record_resolve(5);
        record_resolve(0);
        record_rate_lookup("exact");
        record_compare(4, 1);
        record_duration("compare", Duration::from_millis(120));
        record_error("resolve", "invalid_input");

        // Just verify the function calls don't panic
    }
}
