//! End-to-end behaviour of the oracle facade against scripted sources.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};
use common::{manual_clock, oracle, Reply, ScriptedAdapter, START_MS};
use price_oracle::config::oracle::OracleConfig;
use price_oracle::types::ids::PriceKey;
use price_oracle::{AssetType, CircuitBreakerConfig, CircuitState, Error, SourceError, SourceId, Timestamp};

fn ids(names: &[&str]) -> Vec<SourceId> {
    names.iter().map(|n| SourceId::new(*n)).collect()
}

fn crypto(id: &str, price: f64, clock: &Arc<price_oracle::utils::clock::ManualClock>) -> Arc<ScriptedAdapter> {
    Arc::new(ScriptedAdapter::new(id, AssetType::Crypto, Reply::Price(price), clock))
}

#[tokio::test]
async fn test_agreeing_sources_give_high_confidence() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    for (id, price) in [("a", 100.0), ("b", 101.0), ("c", 102.0)] {
        oracle.register_source(crypto(id, price, &clock), CircuitBreakerConfig::default());
    }

    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();

    assert_eq!(result.sources, ids(&["a", "b", "c"]));
    assert!(result.rejected.is_empty());
    assert!(result.price >= 100.0 && result.price <= 102.0);
    assert!(result.confidence >= 0.9, "confidence {}", result.confidence);
}

#[tokio::test]
async fn test_outlier_is_excluded_from_consensus() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    for (id, price) in [("a", 100.0), ("b", 101.0), ("c", 150.0)] {
        oracle.register_source(crypto(id, price, &clock), CircuitBreakerConfig::default());
    }

    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();

    assert!((result.price - 100.5).abs() < 1e-9);
    assert_eq!(result.sources, ids(&["a", "b"]));
    assert_eq!(result.rejected, ids(&["c"]));
}

#[tokio::test]
async fn test_single_source_caps_confidence() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    oracle.register_source(crypto("a", 100.0, &clock), CircuitBreakerConfig::default());

    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();

    assert_eq!(result.price, 100.0);
    assert!(result.confidence <= 0.5);
}

#[tokio::test]
async fn test_no_responding_source_is_no_data() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    for id in ["a", "b"] {
        let adapter = Arc::new(ScriptedAdapter::new(id, AssetType::Crypto, Reply::Fail, &clock));
        oracle.register_source(adapter, CircuitBreakerConfig::default());
    }

    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await;

    assert!(matches!(result, Err(Error::NoDataAvailable { ref symbol }) if symbol == "BTC"));
    assert_eq!(oracle.cache_stats().size, 0);
}

#[tokio::test]
async fn test_split_pair_is_all_rejected() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    oracle.register_source(crypto("a", 100.0, &clock), CircuitBreakerConfig::default());
    oracle.register_source(crypto("b", 200.0, &clock), CircuitBreakerConfig::default());

    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await;

    assert!(matches!(result, Err(Error::AllSourcesRejected { rejected: 2, .. })));
}

#[tokio::test]
async fn test_breaker_opens_then_retries_after_timeout() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    let flaky = Arc::new(
        ScriptedAdapter::new("flaky", AssetType::Crypto, Reply::Price(100.0), &clock)
            .script(vec![Reply::Fail; 5]),
    );
    oracle.register_source(flaky.clone(), CircuitBreakerConfig::default());
    let source = SourceId::new("flaky");

    for _ in 0..5 {
        let result = oracle.fetch_from_source(&source, "BTC", AssetType::Crypto).await;
        assert!(matches!(result, Err(Error::SourceUnavailable(SourceError::Network { .. }))));
    }
    assert_eq!(oracle.breaker_states()[0].state, CircuitState::Open);

    // Rejected without touching the source
    let result = oracle.fetch_from_source(&source, "BTC", AssetType::Crypto).await;
    assert!(matches!(result, Err(Error::SourceUnavailable(SourceError::BreakerOpen { .. }))));
    assert_eq!(flaky.calls(), 5);

    clock.advance(Duration::from_secs(61));

    let quote = oracle.fetch_from_source(&source, "BTC", AssetType::Crypto).await.unwrap();
    assert_eq!(quote.price, 100.0);
    assert_eq!(flaky.calls(), 6);
    assert_eq!(oracle.breaker_states()[0].state, CircuitState::HalfOpen);

    oracle.fetch_from_source(&source, "BTC", AssetType::Crypto).await.unwrap();
    assert_eq!(oracle.breaker_states()[0].state, CircuitState::Closed);
}

#[tokio::test]
async fn test_open_breaker_does_not_block_consensus() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    oracle.register_source(crypto("a", 100.0, &clock), CircuitBreakerConfig::default());
    oracle.register_source(crypto("b", 101.0, &clock), CircuitBreakerConfig::default());
    let broken = Arc::new(ScriptedAdapter::new("c", AssetType::Crypto, Reply::Fail, &clock));
    oracle.register_source(
        broken.clone(),
        CircuitBreakerConfig { failure_threshold: 2, ..CircuitBreakerConfig::default() },
    );

    for _ in 0..3 {
        oracle.clear_cache();
        let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();
        assert_eq!(result.sources, ids(&["a", "b"]));
    }

    // Two failures opened it, the third cycle skipped the call
    assert_eq!(broken.calls(), 2);
    let states = oracle.breaker_states();
    let c = states.iter().find(|s| s.source.as_str() == "c").unwrap();
    assert_eq!(c.state, CircuitState::Open);
    assert_eq!(c.total_rejected, 1);
}

#[tokio::test]
async fn test_no_data_does_not_trip_breaker() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    let adapter = Arc::new(ScriptedAdapter::new("a", AssetType::Crypto, Reply::NoData, &clock));
    oracle.register_source(adapter.clone(), CircuitBreakerConfig::default());

    for _ in 0..10 {
        let result = oracle.get_aggregated_price("NOPE", AssetType::Crypto).await;
        assert!(matches!(result, Err(Error::NoDataAvailable { .. })));
    }

    assert_eq!(adapter.calls(), 10);
    assert_eq!(oracle.breaker_states()[0].state, CircuitState::Closed);
}

#[tokio::test]
async fn test_cached_result_is_reused_within_ttl() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    let a = crypto("a", 100.0, &clock);
    let b = crypto("b", 101.0, &clock);
    oracle.register_source(a.clone(), CircuitBreakerConfig::default());
    oracle.register_source(b.clone(), CircuitBreakerConfig::default());

    let first = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();
    clock.advance(Duration::from_secs(10));
    let second = oracle.get_aggregated_price("btc", AssetType::Crypto).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.computed_at, second.computed_at);
    assert_eq!((a.calls(), b.calls()), (1, 1));

    clock.set(Timestamp::from_millis(START_MS + 35_000));
    let third = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();

    assert!(third.computed_at > first.computed_at);
    assert_eq!((a.calls(), b.calls()), (2, 2));
}

#[tokio::test]
async fn test_stale_quote_is_ignored() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    oracle.register_source(crypto("a", 100.0, &clock), CircuitBreakerConfig::default());
    oracle.register_source(crypto("b", 100.4, &clock), CircuitBreakerConfig::default());
    let old = Arc::new(ScriptedAdapter::new(
        "old",
        AssetType::Crypto,
        Reply::Aged(100.2, Duration::from_secs(600)),
        &clock,
    ));
    oracle.register_source(old, CircuitBreakerConfig::default());

    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();

    assert_eq!(result.sources, ids(&["a", "b"]));
    assert!(result.rejected.is_empty());
    assert_eq!(result.staleness, Duration::ZERO);
}

#[tokio::test]
async fn test_overall_timeout_aggregates_what_arrived() {
    let clock = manual_clock();
    let config = OracleConfig {
        request_timeout_ms: 200,
        per_call_timeout_ms: 5_000,
        ..OracleConfig::default()
    };
    let oracle = oracle(config, &clock);
    oracle.register_source(crypto("a", 100.0, &clock), CircuitBreakerConfig::default());
    oracle.register_source(crypto("b", 101.0, &clock), CircuitBreakerConfig::default());
    let slow = Arc::new(
        ScriptedAdapter::new("slow", AssetType::Crypto, Reply::Price(100.5), &clock)
            .delay(Duration::from_secs(3)),
    );
    oracle.register_source(slow, CircuitBreakerConfig::default());

    let started = Instant::now();
    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.sources, ids(&["a", "b"]));
}

#[tokio::test]
async fn test_per_call_timeout_counts_as_failure() {
    let clock = manual_clock();
    let config = OracleConfig {
        request_timeout_ms: 2_000,
        per_call_timeout_ms: 50,
        ..OracleConfig::default()
    };
    let oracle = oracle(config, &clock);
    oracle.register_source(crypto("a", 100.0, &clock), CircuitBreakerConfig::default());
    let slow = Arc::new(
        ScriptedAdapter::new("slow", AssetType::Crypto, Reply::Price(100.0), &clock)
            .delay(Duration::from_millis(500)),
    );
    oracle.register_source(slow, CircuitBreakerConfig::default());

    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();
    assert_eq!(result.sources, ids(&["a"]));

    let states = oracle.breaker_states();
    let slow_state = states.iter().find(|s| s.source.as_str() == "slow").unwrap();
    assert_eq!(slow_state.total_failures, 1);
    assert_eq!(slow_state.consecutive_failures, 1);
}

#[tokio::test]
async fn test_only_matching_asset_type_is_queried() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    let exchange = crypto("exchange", 50_000.0, &clock);
    let broker = Arc::new(ScriptedAdapter::new("broker", AssetType::Equity, Reply::Price(189.0), &clock));
    oracle.register_source(exchange.clone(), CircuitBreakerConfig::default());
    oracle.register_source(broker.clone(), CircuitBreakerConfig::default());

    let result = oracle.get_aggregated_price("AAPL", AssetType::Equity).await.unwrap();

    assert_eq!(result.asset_type, AssetType::Equity);
    assert_eq!(result.sources, ids(&["broker"]));
    assert_eq!(exchange.calls(), 0);
    assert_eq!(broker.calls(), 1);

    let forex = oracle.get_aggregated_price("EURUSD", AssetType::Forex).await;
    assert!(matches!(forex, Err(Error::NoSourcesRegistered(AssetType::Forex))));
}

#[tokio::test]
async fn test_multiple_prices_reports_failures_as_none() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    oracle.register_source(crypto("a", 100.0, &clock), CircuitBreakerConfig::default());
    oracle.register_source(crypto("b", 101.0, &clock), CircuitBreakerConfig::default());

    let requests = vec![
        ("BTC".to_string(), AssetType::Crypto),
        ("AAPL".to_string(), AssetType::Equity),
        ("".to_string(), AssetType::Crypto),
    ];
    let prices = oracle.get_multiple_prices(&requests).await;

    assert_eq!(prices.len(), 3);
    assert_eq!(prices["BTC"].as_ref().map(|p| p.sources.len()), Some(2));
    assert!(prices["AAPL"].is_none());
    assert!(prices[""].is_none());
}

#[tokio::test]
async fn test_confidence_weights_shift_consensus() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    let strong = ScriptedAdapter::new("strong", AssetType::Crypto, Reply::Price(100.0), &clock).confidence(0.9);
    let weak = ScriptedAdapter::new("weak", AssetType::Crypto, Reply::Price(102.0), &clock).confidence(0.1);
    oracle.register_source(Arc::new(strong), CircuitBreakerConfig::default());
    oracle.register_source(Arc::new(weak), CircuitBreakerConfig::default());

    let result = oracle.get_aggregated_price("BTC", AssetType::Crypto).await.unwrap();

    assert!((result.price - 100.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_concurrent_requests_for_one_key() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    let a = Arc::new(
        ScriptedAdapter::new("a", AssetType::Crypto, Reply::Price(100.0), &clock).delay(Duration::from_millis(50)),
    );
    let b = Arc::new(
        ScriptedAdapter::new("b", AssetType::Crypto, Reply::Price(101.0), &clock).delay(Duration::from_millis(50)),
    );
    oracle.register_source(a.clone(), CircuitBreakerConfig::default());
    oracle.register_source(b.clone(), CircuitBreakerConfig::default());

    let (first, second) = tokio::join!(
        oracle.get_aggregated_price("BTC", AssetType::Crypto),
        oracle.get_aggregated_price("btc", AssetType::Crypto),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    // Both callers missed the cache and fanned out on their own
    assert_eq!((a.calls(), b.calls()), (2, 2));
    assert_eq!(first.price, second.price);

    let cached = oracle.cache().get(&PriceKey::new("BTC", AssetType::Crypto)).unwrap();
    assert!(cached == first || cached == second);
    assert_eq!(oracle.cache_stats().size, 1);
}

#[tokio::test]
async fn test_batch_symbols_are_priced_concurrently() {
    let clock = manual_clock();
    let oracle = oracle(OracleConfig::default(), &clock);
    oracle.register_source(crypto("a", 100.0, &clock), CircuitBreakerConfig::default());
    oracle.register_source(crypto("b", 101.0, &clock), CircuitBreakerConfig::default());
    let broker = Arc::new(
        ScriptedAdapter::new("broker", AssetType::Equity, Reply::Price(189.0), &clock)
            .delay(Duration::from_millis(400)),
    );
    oracle.register_source(broker.clone(), CircuitBreakerConfig::default());

    let requests = vec![
        ("BTC".to_string(), AssetType::Crypto),
        ("AAPL".to_string(), AssetType::Equity),
        ("MSFT".to_string(), AssetType::Equity),
    ];
    let started = Instant::now();
    let prices = oracle.get_multiple_prices(&requests).await;

    assert!(started.elapsed() < Duration::from_millis(700), "took {:?}", started.elapsed());
    assert!(prices.values().all(Option::is_some));
    assert_eq!(broker.calls(), 2);
}
