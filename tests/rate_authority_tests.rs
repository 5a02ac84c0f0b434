/// Integration tests for the upstream rate authority client and the
/// single-flight TTL cache in front of it, against a mocked HTTP server.
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;

use tariff_engine::config::TariffPolicyConfig;
use tariff_engine::rates::{
    HttpRateAuthority, RateSource, RateTable, ReferenceRateRecord, ReferenceRates,
};

fn policy_with_defaults() -> TariffPolicyConfig {
    TariffPolicyConfig {
        chapter_default_rates: [("84".to_string(), 2.5)].into_iter().collect(),
        global_default_rate: Some(5.0),
        ..TariffPolicyConfig::default()
    }
}

fn rate_table(server: &MockServer, reference: ReferenceRates) -> RateTable {
    let authority =
        HttpRateAuthority::new(&server.base_url(), Duration::from_secs(2)).unwrap();
    RateTable::new(
        Some(Arc::new(authority)),
        reference,
        &policy_with_defaults(),
        Duration::from_secs(300),
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn test_remote_rate_served_with_exact_source() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rates/8471300100")
                .query_param("country", "China");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "rate": 4.2 }));
        })
        .await;

    let rates = rate_table(&server, ReferenceRates::default());
    let quote = rates.get_rate("8471.30.01.00", "China").await.unwrap();

    assert_eq!(quote.rate, 4.2);
    assert_eq!(quote.source, RateSource::Exact);
    assert_eq!(quote.code, "8471300100");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_upstream_404_falls_back_to_reference_table() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rates/8471300100");
            then.status(404);
        })
        .await;

    let reference = ReferenceRates::from_records(vec![ReferenceRateRecord {
        code: "8471300100".to_string(),
        country: Some("China".to_string()),
        rate: 7.5,
    }]);
    let rates = rate_table(&server, reference);

    let quote = rates.get_rate("8471300100", "China").await.unwrap();
    assert_eq!(quote.rate, 7.5);
    assert_eq!(quote.source, RateSource::Cached);
}

#[tokio::test]
async fn test_upstream_error_falls_back_to_chapter_default() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rates/8471300100");
            then.status(500).body("upstream exploded");
        })
        .await;

    let rates = rate_table(&server, ReferenceRates::default());

    let quote = rates.get_rate("8471300100", "Vietnam").await.unwrap();
    assert_eq!(quote.rate, 2.5);
    assert_eq!(quote.source, RateSource::Estimated);
}

#[tokio::test]
async fn test_negative_upstream_rate_is_rejected_and_falls_back() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rates/8471300100");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "rate": -1.0 }));
        })
        .await;

    let rates = rate_table(&server, ReferenceRates::default());

    let quote = rates.get_rate("8471300100", "Vietnam").await.unwrap();
    assert_eq!(quote.rate, 2.5);
    assert_eq!(quote.source, RateSource::Estimated);
}

#[tokio::test]
async fn test_single_flight_coalesces_concurrent_lookups() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/rates/8471300100");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "rate": 4.2 }))
                .delay(Duration::from_millis(100));
        })
        .await;

    let rates = rate_table(&server, ReferenceRates::default());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let rates = rates.clone();
        handles.push(tokio::spawn(async move {
            rates.get_rate("8471300100", "China").await
        }));
    }

    for handle in handles {
        let quote = handle.await.unwrap().unwrap();
        assert_eq!(quote.rate, 4.2);
    }

    // All eight callers shared one outstanding fetch.
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_fresh_entry_skips_second_upstream_call() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/rates/8471300100");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "rate": 4.2 }));
        })
        .await;

    let rates = rate_table(&server, ReferenceRates::default());

    let first = rates.get_rate("8471300100", "China").await.unwrap();
    assert_eq!(first.source, RateSource::Exact);

    let second = rates.get_rate("8471300100", "China").await.unwrap();
    assert_eq!(second.rate, 4.2);
    assert_eq!(second.source, RateSource::Cached);

    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_distinct_countries_are_cached_separately() {
    let server = MockServer::start_async().await;
    let china = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rates/8471300100")
                .query_param("country", "China");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "rate": 7.5 }));
        })
        .await;
    let vietnam = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rates/8471300100")
                .query_param("country", "Vietnam");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "rate": 3.0 }));
        })
        .await;

    let rates = rate_table(&server, ReferenceRates::default());

    assert_eq!(rates.get_rate("8471300100", "China").await.unwrap().rate, 7.5);
    assert_eq!(rates.get_rate("8471300100", "Vietnam").await.unwrap().rate, 3.0);

    assert_eq!(china.hits_async().await, 1);
    assert_eq!(vietnam.hits_async().await, 1);
}
