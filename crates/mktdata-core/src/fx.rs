//! Currency conversion for quotes and series.
//!
//! Rates come from an `open.er-api.com`-style endpoint (`/v6/latest/{base}`)
//! and are cached per base currency. When the upstream is unreachable the
//! converter falls back to the configured static table. Dollar stablecoins
//! are pegged 1:1 to `USD`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{default_static_rates, duration_ms};
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::{RetryConfig, RetryingClient};
use crate::{ProviderId, Quote, Series, SourceError, ValidationError};

/// All rate tables are fetched against this base.
const PIVOT: &str = "USD";

const USD_PEGGED: [&str; 4] = ["USDT", "USDC", "FDUSD", "BUSD"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    pub base_url: String,
    #[serde(with = "duration_ms", rename = "ttl_ms")]
    pub ttl: Duration,
    /// Units of each currency per one `USD`.
    pub static_rates: BTreeMap<String, f64>,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://open.er-api.com"),
            ttl: Duration::from_secs(3600),
            static_rates: default_static_rates(),
        }
    }
}

/// Where a rate table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateOrigin {
    Live,
    Cached,
    Static,
}

#[derive(Debug, Clone)]
struct RateTable {
    rates: BTreeMap<String, f64>,
    fetched_at: Instant,
}

pub struct CurrencyConverter {
    client: RetryingClient,
    config: FxConfig,
    tables: Mutex<HashMap<String, RateTable>>,
}

impl CurrencyConverter {
    pub fn new(client: RetryingClient, config: FxConfig) -> Self {
        Self {
            client,
            config,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Converter on `http` with the pipeline's retry policy.
    pub fn with_http(http: Arc<dyn HttpClient>, config: FxConfig, retry: RetryConfig) -> Self {
        Self::new(RetryingClient::new(ProviderId::Fx, http, retry), config)
    }

    pub fn config(&self) -> &FxConfig {
        &self.config
    }

    /// Units of `to` per one unit of `from`.
    pub async fn rate(&self, from: &str, to: &str) -> Result<f64, SourceError> {
        Ok(self.rate_with_origin(from, to).await?.0)
    }

    pub async fn rate_with_origin(
        &self,
        from: &str,
        to: &str,
    ) -> Result<(f64, RateOrigin), SourceError> {
        let from = canonical_currency(from)?;
        let to = canonical_currency(to)?;
        if from == to {
            return Ok((1.0, RateOrigin::Static));
        }

        let (table, origin) = self.pivot_table().await;
        let per_usd = |code: &str| {
            table
                .get(code)
                .or_else(|| self.config.static_rates.get(code))
                .copied()
                .filter(|rate| rate.is_finite() && *rate > 0.0)
                .ok_or_else(|| SourceError::no_data(format!("no exchange rate for {code}")))
        };
        Ok((per_usd(&to)? / per_usd(&from)?, origin))
    }

    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, SourceError> {
        Ok(amount * self.rate(from, to).await?)
    }

    /// Re-prices a quote from its market currency into `to`. Volume and
    /// percentage change are currency-independent and kept.
    pub async fn convert_quote(&self, quote: &Quote, to: &str) -> Result<Quote, SourceError> {
        let rate = self.rate(quote.market.currency(), to).await?;
        let mut converted = quote.clone();
        converted.price *= rate;
        converted.change *= rate;
        converted.high *= rate;
        converted.low *= rate;
        converted.open *= rate;
        converted.turnover *= rate;
        Ok(converted)
    }

    /// Re-prices OHLC of every bar; volumes are kept.
    pub async fn convert_series(&self, series: &Series, to: &str) -> Result<Series, SourceError> {
        let rate = self.rate(series.market.currency(), to).await?;
        let mut converted = series.clone();
        for bar in &mut converted.bars {
            bar.open *= rate;
            bar.high *= rate;
            bar.low *= rate;
            bar.close *= rate;
        }
        Ok(converted)
    }

    /// USD-based table: fresh cache, then upstream, then the static rates.
    async fn pivot_table(&self) -> (BTreeMap<String, f64>, RateOrigin) {
        if let Some(table) = self.cached(PIVOT) {
            tracing::trace!(base = PIVOT, "fx rates served from cache");
            return (table, RateOrigin::Cached);
        }

        match self.fetch(PIVOT).await {
            Ok(rates) => {
                tracing::info!(base = PIVOT, currencies = rates.len(), "fx rates refreshed");
                self.store(PIVOT, rates.clone());
                (rates, RateOrigin::Live)
            }
            Err(error) => {
                tracing::warn!(base = PIVOT, error = %error, "fx upstream failed, using static rates");
                (self.config.static_rates.clone(), RateOrigin::Static)
            }
        }
    }

    fn cached(&self, base: &str) -> Option<BTreeMap<String, f64>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(base)
            .filter(|table| table.fetched_at.elapsed() < self.config.ttl)
            .map(|table| table.rates.clone())
    }

    fn store(&self, base: &str, rates: BTreeMap<String, f64>) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.insert(
            base.to_owned(),
            RateTable {
                rates,
                fetched_at: Instant::now(),
            },
        );
    }

    async fn fetch(&self, base: &str) -> Result<BTreeMap<String, f64>, SourceError> {
        let url = format!(
            "{}/v6/latest/{base}",
            self.config.base_url.trim_end_matches('/')
        );
        let response: LatestRates = self.client.get_json(HttpRequest::get(url)).await?;
        if response.result != "success" {
            return Err(SourceError::no_data(format!(
                "fx upstream answered '{}'",
                response.result
            )));
        }
        if response.rates.is_empty() {
            return Err(SourceError::provider_format("fx upstream returned no rates"));
        }
        Ok(response.rates)
    }
}

impl std::fmt::Debug for CurrencyConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrencyConverter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Uppercases, validates and applies the stablecoin peg.
fn canonical_currency(code: &str) -> Result<String, SourceError> {
    let upper = code.trim().to_ascii_uppercase();
    let valid = (3..=5).contains(&upper.len()) && upper.chars().all(|ch| ch.is_ascii_alphabetic());
    if !valid {
        let error = ValidationError::InvalidCurrency {
            value: code.to_owned(),
        };
        return Err(SourceError::invalid_request(error.to_string()));
    }
    if USD_PEGGED.contains(&upper.as_str()) {
        return Ok(String::from(PIVOT));
    }
    Ok(upper)
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    #[serde(default)]
    result: String,
    #[serde(default)]
    rates: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::RecordingHttpClient;
    use crate::{MarketKind, SourceErrorKind, Symbol, UtcDateTime};

    const LATEST: &str = r#"{"result":"success","base_code":"USD","rates":{"USD":1,"HKD":7.8,"CNY":7.25,"EUR":0.9}}"#;

    fn converter(http: &Arc<RecordingHttpClient>) -> CurrencyConverter {
        let http: Arc<dyn HttpClient> = Arc::clone(http) as Arc<dyn HttpClient>;
        CurrencyConverter::with_http(http, FxConfig::default(), RetryConfig::no_retry())
    }

    #[tokio::test]
    async fn cross_rate_goes_through_usd() {
        let http = RecordingHttpClient::with(vec![("/v6/latest/USD", 200, LATEST)]);
        let fx = converter(&http);

        let (rate, origin) = fx.rate_with_origin("HKD", "CNY").await.expect("rate");
        assert!((rate - 7.25 / 7.8).abs() < 1e-12);
        assert_eq!(origin, RateOrigin::Live);
    }

    #[tokio::test]
    async fn rates_are_cached_within_ttl() {
        let http = RecordingHttpClient::with(vec![("/v6/latest/USD", 200, LATEST)]);
        let fx = converter(&http);

        fx.rate("USD", "HKD").await.expect("first");
        let (_, origin) = fx.rate_with_origin("USD", "EUR").await.expect("second");

        assert_eq!(origin, RateOrigin::Cached);
        assert_eq!(http.urls().len(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_falls_back_to_static_rates() {
        let http = RecordingHttpClient::with(vec![("/v6/latest/USD", 500, "oops")]);
        let fx = converter(&http);

        let (rate, origin) = fx.rate_with_origin("USD", "HKD").await.expect("static");
        assert_eq!(rate, 7.8);
        assert_eq!(origin, RateOrigin::Static);
    }

    #[tokio::test]
    async fn usdt_is_pegged_without_a_request() {
        let http = RecordingHttpClient::with(vec![]);
        let fx = converter(&http);

        assert_eq!(fx.rate("usdt", "USD").await.expect("peg"), 1.0);
        assert!(http.urls().is_empty());
    }

    #[tokio::test]
    async fn quote_is_repriced_into_target_currency() {
        let http = RecordingHttpClient::with(vec![("/v6/latest/USD", 200, LATEST)]);
        let fx = converter(&http);
        let symbol = Symbol::for_market("00700", MarketKind::HkEquity).expect("symbol");
        let mut quote =
            Quote::new(symbol, MarketKind::HkEquity, 390.0, ProviderId::Eastmoney, UtcDateTime::now())
                .expect("quote");
        quote.change_pct = 1.5;

        let converted = fx.convert_quote(&quote, "USD").await.expect("converted");
        assert!((converted.price - 50.0).abs() < 1e-9);
        assert_eq!(converted.change_pct, 1.5);
    }

    #[tokio::test]
    async fn malformed_currency_is_rejected() {
        let http = RecordingHttpClient::with(vec![]);
        let err = converter(&http).rate("US$", "HKD").await.expect_err("invalid");
        assert_eq!(err.kind(), SourceErrorKind::InvalidRequest);
    }
}
