//! Contract tests: recorded upstream payload shapes go through the default
//! adapters and come out as validated domain values.

#[path = "../support/mod.rs"]
mod support;

use mktdata_core::{CacheMode, MarketKind, ProviderId, SourceErrorKind, VolumeSplit};
use support::{fast_config, router, yahoo_chart, ScriptedTransport};

const BTC_KLINES: &str = r#"[
  [1704067200000,"42283.58","44184.10","42180.77","44179.55","27174.29",1704153599999,"1169995673.4","1043172","13910.69","599168042.2","0"],
  [1704153600000,"44179.55","45879.63","44148.34","44946.91","65146.40",1704239999999,"2944856963.2","2029006","33115.73","1497395082.3","0"],
  [1704240000000,"44946.91","45500.00","40750.00","42845.23","81194.55",1704326399999,"3519813093.9","2538164","38224.38","1657103017.6","0"]
]"#;

const BTC_24H: &str = r#"{"symbol":"BTCUSDT","priceChange":"-1200.50","priceChangePercent":"-2.71","weightedAvgPrice":"43210.12","openPrice":"44200.00","highPrice":"44500.00","lowPrice":"42700.00","lastPrice":"43000.00","volume":"31000.5","quoteVolume":"1339000000.0","closeTime":1704326399999}"#;

// =============================================================================
// Binance
// =============================================================================

#[tokio::test]
async fn binance_klines_keep_reported_taker_volume() {
    let transport = ScriptedTransport::new().ok("api/v3/klines", BTC_KLINES).shared();
    let router = router(&transport, fast_config());

    let resolved = router
        .resolve_history("BTC-USDT", MarketKind::Crypto, 3, CacheMode::Use)
        .await
        .expect("history");

    assert_eq!(resolved.source, ProviderId::Binance);
    let series = &resolved.data;
    assert_eq!(series.symbol.as_str(), "BTC");
    assert_eq!(series.volume_split, VolumeSplit::Reported);
    assert_eq!(series.len(), 3);
    assert_eq!(series.bars[0].buy_volume, 13910.69);
    assert!(series.bars.iter().all(|bar| bar.volume_split_balances()));
    assert!(transport.urls()[0].contains("symbol=BTCUSDT"));
}

#[tokio::test]
async fn binance_quote_reconciles_stablecoin_pairs() {
    let transport = ScriptedTransport::new()
        .ok("symbol=BTCUSDT", r#"{"symbol":"BTCUSDT","price":"43000.00"}"#)
        .ok("symbol=BTCUSDC", r#"{"symbol":"BTCUSDC","price":"43010.00"}"#)
        .ok("symbol=BTCFDUSD", r#"{"symbol":"BTCFDUSD","price":"42990.00"}"#)
        .shared();
    let router = router(&transport, fast_config());

    let quote = router.get_quote("btc", MarketKind::Crypto).await.expect("quote");

    assert_eq!(quote.source, ProviderId::Binance);
    assert_eq!(quote.price, 43000.0);
    assert_eq!(transport.calls_to("ticker/price"), 3);
}

#[tokio::test]
async fn binance_quote_falls_back_to_weighted_average_when_pairs_fail() {
    let transport = ScriptedTransport::new()
        .status("ticker/price", 400)
        .ok("ticker/24hr", BTC_24H)
        .shared();
    let router = router(&transport, fast_config());

    let quote = router.get_quote("BTC", MarketKind::Crypto).await.expect("quote");

    assert_eq!(quote.source, ProviderId::Binance);
    assert_eq!(quote.price, 43210.12);
    assert_eq!(quote.change_pct, -2.71);
    assert_eq!(quote.high, 44500.0);
}

// =============================================================================
// Yahoo
// =============================================================================

#[tokio::test]
async fn yahoo_rows_with_null_close_are_dropped() {
    let chart = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":191.0},
        "timestamp":[1704205800,1704292200,1704378600],
        "indicators":{"quote":[{"open":[187.0,null,184.0],"high":[188.4,null,186.0],
        "low":[183.9,null,182.0],"close":[185.6,null,184.2],"volume":[82488700,null,58414500]}]}}],
        "error":null}}"#;
    let transport = ScriptedTransport::new().ok("finance/chart/AAPL", chart).shared();
    let router = router(&transport, fast_config());

    let series = router.get_history("AAPL", MarketKind::UsEquity, 3).await.expect("history");

    assert_eq!(series.source, ProviderId::Yahoo);
    assert_eq!(series.len(), 2);
    assert_eq!(series.bars[0].close, 185.6);
    assert_eq!(series.bars[0].ts.unix_seconds() % 86_400, 0, "daily bars start at midnight");
    assert_eq!(series.volume_split, VolumeSplit::Estimated);
}

#[tokio::test]
async fn yahoo_quote_reads_chart_meta() {
    let transport = ScriptedTransport::new().ok("finance/chart", yahoo_chart(2, 100.0)).shared();
    let router = router(&transport, fast_config());

    let quote = router.get_quote("IBM", MarketKind::UsEquity).await.expect("quote");

    assert_eq!(quote.source, ProviderId::Yahoo);
    assert_eq!(quote.price, 100.5);
    assert!((quote.change - 0.5).abs() < 1e-9);
    assert!((quote.change_pct - 0.5).abs() < 1e-9);
}

// =============================================================================
// Alpha Vantage
// =============================================================================

#[tokio::test]
async fn alphavantage_rate_limit_note_is_reported_as_no_data() {
    let transport = ScriptedTransport::new()
        .status("finance/chart", 404)
        .ok(
            "alphavantage",
            r#"{"Note":"Thank you for using Alpha Vantage! Our standard API rate limit is 25 requests per day."}"#,
        )
        .shared();
    let router = router(&transport, fast_config().with_alphavantage_key("demo"));

    let resolved = router
        .resolve_history("AAPL", MarketKind::UsEquity, 5, CacheMode::Use)
        .await
        .expect("mock history");

    assert!(resolved.is_mock());
    let alphavantage = resolved
        .attempts
        .iter()
        .find(|attempt| attempt.provider == ProviderId::Alphavantage)
        .expect("alphavantage attempt");
    assert_eq!(alphavantage.error.kind(), SourceErrorKind::NoData);
    assert!(transport.urls().iter().any(|url| url.contains("apikey=demo")));
}

// =============================================================================
// Eastmoney
// =============================================================================

#[tokio::test]
async fn eastmoney_hk_klines_are_used_after_yahoo_misses() {
    let transport = ScriptedTransport::new()
        .status("finance/chart", 404)
        .ok(
            "api/qt/stock/kline/get",
            r#"{"rc":0,"data":{"code":"00700","name":"TENCENT","klines":[
                "2024-01-02,296.0,300.2,301.0,294.6,12034567,3.6e9",
                "2024-01-03,300.0,298.4,302.4,297.0,9876543,2.9e9"]}}"#,
        )
        .shared();
    let router = router(&transport, fast_config());

    let resolved = router
        .resolve_history("700.HK", MarketKind::HkEquity, 2, CacheMode::Use)
        .await
        .expect("history");

    assert_eq!(resolved.source, ProviderId::Eastmoney);
    assert_eq!(resolved.data.symbol.as_str(), "00700");
    assert_eq!(resolved.data.bars[0].close, 300.2);
    assert_eq!(resolved.data.bars[0].volume, 12_034_567.0, "hk volume is in shares");
    assert!(transport
        .urls()
        .iter()
        .any(|url| url.contains("secid=116.00700")));
}

#[tokio::test]
async fn eastmoney_cn_klines_convert_lots_to_shares() {
    let transport = ScriptedTransport::new()
        .ok(
            "api/qt/stock/kline/get",
            r#"{"rc":0,"data":{"klines":["2024-01-02,1685.0,1690.5,1698.0,1680.0,25000,4.2e9"]}}"#,
        )
        .shared();
    let router = router(&transport, fast_config());

    let resolved = router
        .resolve_history("600519", MarketKind::CnEquity, 1, CacheMode::Use)
        .await
        .expect("history");

    assert_eq!(resolved.source, ProviderId::Eastmoney);
    assert_eq!(resolved.data.bars[0].volume, 2_500_000.0);
    assert_eq!(transport.calls_to("finance/chart"), 0);
}

// =============================================================================
// Sina
// =============================================================================

#[tokio::test]
async fn sina_hq_line_is_parsed_with_beijing_time() {
    let book = vec!["100"; 20].join(",");
    let body = format!(
        "var hq_str_sz000001=\"PAYH,9.38,9.39,9.45,9.50,9.30,9.44,9.45,123456789,1165432100.00,{book},2024-01-02,15:00:00,00\";"
    );
    let transport = ScriptedTransport::new().ok("hq.sinajs.cn", body).shared();
    let router = router(&transport, fast_config());

    let quote = router.get_quote("000001.SZ", MarketKind::CnEquity).await.expect("quote");

    assert_eq!(quote.source, ProviderId::Sina);
    assert_eq!(quote.price, 9.45);
    assert_eq!(quote.volume, 123_456_789.0);
    assert_eq!(quote.timestamp.unix_seconds(), 1_704_178_800);
    assert!((quote.change - 0.06).abs() < 1e-9);
    assert!(transport.urls()[0].ends_with("list=sz000001"));
}

#[tokio::test]
async fn eastmoney_malformed_kline_does_not_abandon_the_provider() {
    let transport = ScriptedTransport::new()
        .ok(
            "api/qt/stock/kline/get",
            r#"{"rc":0,"data":{"klines":[
                "2024-01-02,1685.0,1690.5,1698.0,1680.0,25000,4.2e9",
                "2024-01-03,10.1",
                "2024-01-04,1690.5,1702.0,1708.0,1688.0,21000,3.6e9"]}}"#,
        )
        .shared();
    let router = router(&transport, fast_config());

    let resolved = router
        .resolve_history("600519", MarketKind::CnEquity, 3, CacheMode::Use)
        .await
        .expect("history");

    assert_eq!(resolved.source, ProviderId::Eastmoney);
    assert!(resolved.attempts.is_empty());
    assert_eq!(resolved.data.len(), 2);
    assert_eq!(resolved.data.bars[1].close, 1702.0);
}
