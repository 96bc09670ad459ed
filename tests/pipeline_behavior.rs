//! Behavior-driven tests for the market data pipeline.
//!
//! Real adapters run against a scripted transport, so every scenario checks
//! what reached the wire as well as what came back.

mod support;

use std::sync::Arc;
use std::time::Duration;

use mktdata_core::{CacheMode, CoreError, MarketKind, ProviderId, SourceErrorKind, ValidationError};
use support::{alphavantage_daily, fast_config, router, yahoo_chart, Reply, ScriptedTransport};

const YAHOO: &str = "finance/chart";
const ALPHAVANTAGE: &str = "alphavantage";

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn when_history_is_cached_second_request_makes_no_calls() {
    // Given: Yahoo serves a 30 day chart
    let transport = ScriptedTransport::new().ok(YAHOO, yahoo_chart(30, 180.0)).shared();
    let router = router(&transport, fast_config());

    // When: The same history is requested twice
    let first = router.get_history("AAPL", MarketKind::UsEquity, 30).await.expect("first");
    let second = router.get_history("aapl", MarketKind::UsEquity, 30).await.expect("second");

    // Then: Only the first request went upstream and both share one series
    assert_eq!(transport.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.source, ProviderId::Yahoo);
    assert_eq!(second.len(), 30);
}

#[tokio::test]
async fn when_refresh_is_requested_cache_is_skipped_but_updated() {
    // Given: A cached quote
    let transport = ScriptedTransport::new().ok(YAHOO, yahoo_chart(5, 100.0)).shared();
    let router = router(&transport, fast_config());
    router.get_quote("MSFT", MarketKind::UsEquity).await.expect("warm");

    // When: The caller forces a refresh, then reads normally
    let refreshed = router
        .resolve_quote("MSFT", MarketKind::UsEquity, CacheMode::Refresh)
        .await
        .expect("refresh");
    let cached = router
        .resolve_quote("MSFT", MarketKind::UsEquity, CacheMode::Use)
        .await
        .expect("cached");

    // Then: Refresh went upstream, the normal read did not
    assert_eq!(transport.calls(), 2);
    assert!(!refreshed.cache_hit);
    assert!(cached.cache_hit);
    assert_eq!(cached.source, ProviderId::Yahoo);
}

#[tokio::test]
async fn when_cache_is_bypassed_nothing_is_stored() {
    // Given: An empty cache
    let transport = ScriptedTransport::new().ok(YAHOO, yahoo_chart(5, 100.0)).shared();
    let router = router(&transport, fast_config());

    // When: A bypassing read is followed by a normal read
    router
        .resolve_quote("MSFT", MarketKind::UsEquity, CacheMode::Bypass)
        .await
        .expect("bypass");
    let normal = router
        .resolve_quote("MSFT", MarketKind::UsEquity, CacheMode::Use)
        .await
        .expect("normal");

    // Then: Both went upstream
    assert_eq!(transport.calls(), 2);
    assert!(!normal.cache_hit);
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn when_first_provider_is_empty_second_answers_and_third_is_never_called() {
    // Given: Sina has no trade, Eastmoney has a snapshot, Yahoo is also scripted
    let transport = ScriptedTransport::new()
        .ok("hq.sinajs.cn", r#"var hq_str_sh600519="";"#)
        .ok(
            "api/qt/stock/get",
            r#"{"rc":0,"data":{"f43":1688.5,"f44":1700.0,"f45":1670.0,"f46":1675.0,"f47":25000,"f48":4.2e9,"f60":1680.0,"f86":1704182400,"f169":8.5,"f170":0.51}}"#,
        )
        .ok(YAHOO, yahoo_chart(5, 1600.0))
        .shared();
    let router = router(&transport, fast_config());

    // When: A mainland quote is resolved
    let resolved = router
        .resolve_quote("600519", MarketKind::CnEquity, CacheMode::Use)
        .await
        .expect("quote");

    // Then: Eastmoney answered and the lower-priority Yahoo was never touched
    assert_eq!(resolved.source, ProviderId::Eastmoney);
    assert_eq!(resolved.data.price, 1688.5);
    assert_eq!(resolved.data.volume, 2_500_000.0, "lots are converted to shares");
    assert_eq!(resolved.source_chain, vec![ProviderId::Sina, ProviderId::Eastmoney]);
    assert_eq!(resolved.attempts.len(), 1);
    assert_eq!(resolved.attempts[0].provider, ProviderId::Sina);
    assert_eq!(resolved.attempts[0].error.kind(), SourceErrorKind::NoData);
    assert_eq!(transport.calls_to(YAHOO), 0);
}

#[tokio::test]
async fn when_yahoo_keeps_timing_out_alphavantage_serves_the_history() {
    // Given: Yahoo times out on every attempt, Alpha Vantage is configured
    let transport = ScriptedTransport::new()
        .route(YAHOO, vec![Reply::Timeout])
        .ok(ALPHAVANTAGE, alphavantage_daily(30, 150.0))
        .shared();
    let router = router(&transport, fast_config().with_alphavantage_key("demo"));

    // When: 30 days of AAPL are requested
    let resolved = router
        .resolve_history("AAPL", MarketKind::UsEquity, 30, CacheMode::Use)
        .await
        .expect("history");

    // Then: Yahoo was retried three times before Alpha Vantage answered once
    assert_eq!(resolved.source, ProviderId::Alphavantage);
    assert_eq!(resolved.data.len(), 30);
    assert_eq!(transport.calls_to(YAHOO), 3);
    assert_eq!(transport.calls_to(ALPHAVANTAGE), 1);
    assert_eq!(transport.calls(), 4);
    assert_eq!(resolved.attempts[0].error.kind(), SourceErrorKind::TransientNetwork);
}

#[tokio::test]
async fn when_every_provider_fails_a_mock_series_is_returned_and_not_cached() {
    // Given: Every upstream answers 500
    let transport = ScriptedTransport::new()
        .status(YAHOO, 500)
        .status(ALPHAVANTAGE, 500)
        .shared();
    let router = router(&transport, fast_config().with_alphavantage_key("demo"));

    // When: History is requested twice
    let first = router
        .resolve_history("AAPL", MarketKind::UsEquity, 10, CacheMode::Use)
        .await
        .expect("mock history");
    let calls_after_first = transport.calls();
    let second = router
        .resolve_history("AAPL", MarketKind::UsEquity, 10, CacheMode::Use)
        .await
        .expect("mock history");

    // Then: Both are synthetic, both walked the chain, and no entry was cached
    assert!(first.is_mock());
    assert_eq!(first.source, ProviderId::Mock);
    assert_eq!(first.data.len(), 10);
    assert_eq!(first.attempts.len(), 2);
    assert!(first
        .attempts
        .iter()
        .all(|attempt| attempt.error.kind() == SourceErrorKind::UpstreamStatus));
    assert_eq!(calls_after_first, 6, "three attempts per provider");
    assert!(second.is_mock());
    assert!(!second.cache_hit);
    assert_eq!(transport.calls(), 12);
}

#[tokio::test]
async fn when_missing_api_key_alphavantage_is_skipped_without_a_request() {
    // Given: Yahoo rejects the symbol and no Alpha Vantage key is set
    let transport = ScriptedTransport::new().status(YAHOO, 404).shared();
    let router = router(&transport, fast_config());

    // When: A quote is resolved
    let resolved = router
        .resolve_quote("AAPL", MarketKind::UsEquity, CacheMode::Use)
        .await
        .expect("mock quote");

    // Then: 404 is not retried and Alpha Vantage is reported as misconfigured
    assert!(resolved.is_mock());
    assert_eq!(transport.calls(), 1);
    assert_eq!(transport.calls_to(ALPHAVANTAGE), 0);
    assert_eq!(resolved.attempts[1].provider, ProviderId::Alphavantage);
    assert_eq!(resolved.attempts[1].error.kind(), SourceErrorKind::Configuration);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn when_two_callers_race_for_the_same_history_only_one_fetch_happens() {
    // Given: A slow Yahoo
    let transport = ScriptedTransport::new()
        .ok(YAHOO, yahoo_chart(20, 120.0))
        .with_delay(Duration::from_millis(50))
        .shared();
    let router = router(&transport, fast_config());

    // When: Two identical requests run concurrently
    let (left, right) = tokio::join!(
        router.resolve_history("NVDA", MarketKind::UsEquity, 20, CacheMode::Use),
        router.resolve_history("NVDA", MarketKind::UsEquity, 20, CacheMode::Use),
    );
    let (left, right) = (left.expect("left"), right.expect("right"));

    // Then: One went upstream and the other was filled from its result
    assert_eq!(transport.calls(), 1);
    assert!(Arc::ptr_eq(&left.data, &right.data));
    assert!(left.cache_hit != right.cache_hit);
}

// =============================================================================
// Batch quotes
// =============================================================================

#[tokio::test]
async fn when_batch_contains_unknown_symbol_it_is_dropped_and_order_kept() {
    // Given: Yahoo knows AAPL and MSFT; everything else is 404
    let transport = ScriptedTransport::new()
        .ok("chart/AAPL", yahoo_chart(3, 190.0))
        .ok("chart/MSFT", yahoo_chart(3, 410.0))
        .shared();
    let router = router(&transport, fast_config());

    // When: A batch with an unknown symbol in the middle is requested
    let quotes = router
        .get_quotes_batch(&["AAPL", "ZZZZ", "MSFT"], MarketKind::UsEquity, 500)
        .await
        .expect("batch");

    // Then: Only the two real quotes come back, in input order
    let symbols: Vec<&str> = quotes.iter().map(|quote| quote.symbol.as_str()).collect();
    assert_eq!(symbols, ["AAPL", "MSFT"]);
    assert!(quotes.iter().all(|quote| quote.source == ProviderId::Yahoo));
}

#[tokio::test]
async fn when_many_symbols_are_unknown_valid_ones_still_get_real_quotes() {
    // Given: Yahoo answers 404 for everything except AAPL
    let transport = ScriptedTransport::new()
        .ok("chart/AAPL", yahoo_chart(3, 190.0))
        .shared();
    let router = router(&transport, fast_config());

    // When: Five unknown tickers precede a valid one
    let quotes = router
        .get_quotes_batch(
            &["ZZ1", "ZZ2", "ZZ3", "ZZ4", "ZZ5", "AAPL"],
            MarketKind::UsEquity,
            500,
        )
        .await
        .expect("batch");
    let follow_up = router
        .resolve_quote("AAPL", MarketKind::UsEquity, CacheMode::Refresh)
        .await
        .expect("quote");

    // Then: Yahoo stayed in rotation for the valid symbol
    let symbols: Vec<&str> = quotes.iter().map(|quote| quote.symbol.as_str()).collect();
    assert_eq!(symbols, ["AAPL"]);
    assert_eq!(follow_up.source, ProviderId::Yahoo);
    assert!(follow_up.attempts.is_empty());
    assert_eq!(transport.calls_to("chart/AAPL"), 2);
}

#[tokio::test]
async fn when_batch_limit_is_out_of_range_request_is_rejected() {
    // Given: Any router
    let transport = ScriptedTransport::new().shared();
    let router = router(&transport, fast_config());

    // When: Limits of zero and above 500 are used
    let zero = router.get_quotes_batch(&["AAPL"], MarketKind::UsEquity, 0).await;
    let too_many = router.get_quotes_batch(&["AAPL"], MarketKind::UsEquity, 501).await;

    // Then: Both are validation errors and nothing went upstream
    assert!(matches!(
        zero,
        Err(CoreError::Validation(ValidationError::InvalidBatchLimit { value: 0, .. }))
    ));
    assert!(matches!(
        too_many,
        Err(CoreError::Validation(ValidationError::InvalidBatchLimit { value: 501, max: 500 }))
    ));
    assert_eq!(transport.calls(), 0);
}

// =============================================================================
// Input validation
// =============================================================================

#[tokio::test]
async fn when_request_is_invalid_no_provider_is_called() {
    // Given: Any router
    let transport = ScriptedTransport::new().shared();
    let router = router(&transport, fast_config());

    // When: Empty symbols or out-of-range day counts are used
    let empty = router.get_quote("  ", MarketKind::UsEquity).await;
    let zero_days = router.get_history("AAPL", MarketKind::UsEquity, 0).await;
    let too_many_days = router.get_history("AAPL", MarketKind::UsEquity, 3651).await;

    // Then: Each is rejected before any request
    assert!(matches!(empty, Err(CoreError::Validation(_))));
    assert!(matches!(zero_days, Err(CoreError::Validation(_))));
    assert!(matches!(too_many_days, Err(CoreError::Validation(_))));
    assert_eq!(transport.calls(), 0);
}
