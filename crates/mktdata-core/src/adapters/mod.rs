//! Upstream provider adapters and the synthetic fallback generator.
//!
//! Each adapter maps canonical symbols to the provider's notation, issues
//! requests through its own [`RetryingClient`], and converts payload fields
//! and units into [`RawSeries`](crate::RawSeries) / [`Quote`](crate::Quote).

mod alphavantage;
mod binance;
mod eastmoney;
mod mock;
mod sina;
#[cfg(test)]
pub(crate) mod test_support;
mod yahoo;

use std::sync::Arc;

pub use alphavantage::AlphaVantageAdapter;
pub use binance::BinanceAdapter;
pub use eastmoney::EastmoneyAdapter;
pub use mock::SyntheticGenerator;
pub use sina::SinaAdapter;
pub use yahoo::YahooAdapter;

use serde::{Deserialize, Deserializer};

use crate::config::PipelineConfig;
use crate::http_client::HttpClient;
use crate::retry::RetryingClient;
use crate::throttling::RateGate;
use crate::{DataSource, MarketKind, ProviderId, Symbol};

/// Builds the retrying client an adapter for `provider` uses.
pub fn client_for(
    provider: ProviderId,
    http: Arc<dyn HttpClient>,
    config: &PipelineConfig,
) -> RetryingClient {
    let client = RetryingClient::new(provider, http, config.retry.clone())
        .with_timeout(config.providers.timeout());
    match config.providers.endpoint(provider) {
        Some(endpoint) => client.with_rate_gate(RateGate::per_minute(endpoint.rate_limit_per_minute)),
        None => client,
    }
}

/// One adapter per upstream provider, all sharing `http`.
pub fn default_adapters(
    http: Arc<dyn HttpClient>,
    config: &PipelineConfig,
) -> Vec<Arc<dyn DataSource>> {
    let providers = &config.providers;
    vec![
        Arc::new(BinanceAdapter::new(
            client_for(ProviderId::Binance, Arc::clone(&http), config),
            &providers.binance.base_url,
            config.reconciler.clone(),
        )),
        Arc::new(YahooAdapter::new(
            client_for(ProviderId::Yahoo, Arc::clone(&http), config),
            &providers.yahoo.base_url,
        )),
        Arc::new(AlphaVantageAdapter::new(
            client_for(ProviderId::Alphavantage, Arc::clone(&http), config),
            &providers.alphavantage.base_url,
            providers.alphavantage_key().map(str::to_owned),
        )),
        Arc::new(EastmoneyAdapter::new(
            client_for(ProviderId::Eastmoney, Arc::clone(&http), config),
            &providers.eastmoney.base_url,
            &providers.eastmoney_quote_url,
        )),
        Arc::new(SinaAdapter::new(
            client_for(ProviderId::Sina, http, config),
            &providers.sina.base_url,
        )),
    ]
}

/// Shanghai listings start with 6 (main board) or 9 (B shares).
pub(crate) fn is_shanghai(code: &str) -> bool {
    code.starts_with('6') || code.starts_with('9')
}

/// Yahoo notation: `BTC-USD`, `BRK-B`, `0700.HK`, `600519.SS`, `000001.SZ`.
pub(crate) fn yahoo_symbol(symbol: &Symbol, market: MarketKind) -> String {
    let code = symbol.as_str();
    match market {
        MarketKind::Crypto => format!("{code}-USD"),
        MarketKind::UsEquity => code.replace('.', "-"),
        MarketKind::HkEquity => {
            let trimmed = code.trim_start_matches('0');
            format!("{trimmed:0>4}.HK")
        }
        MarketKind::CnEquity => {
            let exchange = if is_shanghai(code) { "SS" } else { "SZ" };
            format!("{code}.{exchange}")
        }
    }
}

/// Eastmoney `secid`: market prefix plus code (`116.00700`, `1.600519`, `0.000001`).
pub(crate) fn eastmoney_secid(symbol: &Symbol, market: MarketKind) -> Option<String> {
    let code = symbol.as_str();
    match market {
        MarketKind::HkEquity => Some(format!("116.{code}")),
        MarketKind::CnEquity => {
            let prefix = if is_shanghai(code) { 1 } else { 0 };
            Some(format!("{prefix}.{code}"))
        }
        MarketKind::Crypto | MarketKind::UsEquity => None,
    }
}

/// Sina notation: `sh600519`, `sz000001`.
pub(crate) fn sina_code(symbol: &Symbol) -> String {
    let code = symbol.as_str();
    let exchange = if is_shanghai(code) { "sh" } else { "sz" };
    format!("{exchange}{code}")
}

/// Reads a number that upstreams send either as JSON number or string.
///
/// Placeholders such as `"-"` or `""` read as `None`.
pub(crate) fn value_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => parse_f64(text),
        _ => None,
    }
}

pub(crate) fn parse_f64(text: &str) -> Option<f64> {
    text.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// `deserialize_with` helper for number-or-string fields.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_f64))
}

/// Keeps the most recent `days` rows.
pub(crate) fn keep_last<T>(rows: &mut Vec<T>, days: u32) {
    let keep = usize::try_from(days).unwrap_or(usize::MAX);
    if rows.len() > keep {
        rows.drain(..rows.len() - keep);
    }
}
