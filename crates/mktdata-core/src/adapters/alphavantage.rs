use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::adapters::{keep_last, lenient_f64};
use crate::data_source::{
    CapabilitySet, DataSource, HistoryRequest, QuoteRequest, SourceError, SourceFuture,
};
use crate::http_client::HttpRequest;
use crate::retry::RetryingClient;
use crate::{MarketKind, ProviderId, Quote, RawBar, RawSeries, UtcDateTime};

/// Compact output holds the latest 100 trading days.
const COMPACT_OUTPUT_ROWS: u32 = 100;

/// Alpha Vantage adapter (US equities). Requires an API key.
#[derive(Debug, Clone)]
pub struct AlphaVantageAdapter {
    client: RetryingClient,
    base_url: String,
    api_key: Option<String>,
}

impl AlphaVantageAdapter {
    pub fn new(client: RetryingClient, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    fn api_key(&self) -> Result<&str, SourceError> {
        self.api_key.as_deref().ok_or_else(|| {
            SourceError::configuration(
                "alphavantage requires an API key (MKTDATA_ALPHAVANTAGE_API_KEY or ALPHAVANTAGE_API_KEY)",
            )
        })
    }

    async fn query(
        &self,
        function: &str,
        symbol: &str,
        extra: &[(&str, &str)],
    ) -> Result<Envelope, SourceError> {
        let api_key = self.api_key()?;
        let request = HttpRequest::get(format!("{}/query", self.base_url))
            .with_query(&[("function", function), ("symbol", symbol)])
            .with_query(extra)
            .with_query(&[("apikey", api_key)]);

        let envelope: Envelope = self.client.get_json(request).await?;
        if let Some(message) = envelope.notice() {
            return Err(SourceError::no_data(format!("alphavantage: {message}")));
        }
        Ok(envelope)
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<RawSeries, SourceError> {
        let output_size = if req.days <= COMPACT_OUTPUT_ROWS { "compact" } else { "full" };
        let envelope = self
            .query(
                "TIME_SERIES_DAILY",
                req.symbol.as_str(),
                &[("outputsize", output_size)],
            )
            .await?;

        let series = envelope
            .time_series()
            .ok_or_else(|| SourceError::provider_format("alphavantage response has no time series"))?;

        // BTreeMap on ISO dates iterates oldest first.
        let mut rows: Vec<RawBar> = series
            .iter()
            .map(|(date, day)| RawBar {
                ts: UtcDateTime::from_date(date).ok(),
                open: day.open,
                high: day.high,
                low: day.low,
                close: day.close,
                volume: day.volume,
                buy_volume: None,
            })
            .collect();
        keep_last(&mut rows, req.days);

        Ok(RawSeries::new(req.symbol, req.market, ProviderId::Alphavantage, rows))
    }

    async fn fetch_quote(&self, req: QuoteRequest) -> Result<Quote, SourceError> {
        let envelope = self.query("GLOBAL_QUOTE", req.symbol.as_str(), &[]).await?;
        let global = envelope
            .global_quote()?
            .ok_or_else(|| SourceError::no_data(format!("alphavantage has no quote for {}", req.symbol)))?;

        let price = global
            .price
            .filter(|price| *price > 0.0)
            .ok_or_else(|| SourceError::no_data(format!("alphavantage has no price for {}", req.symbol)))?;
        let timestamp = global
            .latest_trading_day
            .as_deref()
            .and_then(|day| UtcDateTime::from_date(day).ok())
            .unwrap_or_else(UtcDateTime::now);

        let mut quote = Quote::new(req.symbol, req.market, price, ProviderId::Alphavantage, timestamp)?;
        quote.open = global.open.unwrap_or(price);
        quote.high = global.high.unwrap_or(price);
        quote.low = global.low.unwrap_or(price);
        quote.volume = global.volume.unwrap_or_default();
        quote.change = global.change.unwrap_or_default();
        quote.change_pct = match (global.change_percent, global.previous_close) {
            (Some(pct), _) => pct,
            (None, Some(previous)) if previous > 0.0 => (price - previous) / previous * 100.0,
            _ => 0.0,
        };
        Ok(quote)
    }
}

impl DataSource for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Alphavantage
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn supports_market(&self, market: MarketKind) -> bool {
        market == MarketKind::UsEquity
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, RawSeries> {
        Box::pin(self.fetch_history(req))
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Quote> {
        Box::pin(self.fetch_quote(req))
    }
}

/// Top-level document. The payload key depends on the function called and
/// throttling/errors arrive as `Note`, `Information` or `Error Message`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(flatten)]
    fields: HashMap<String, serde_json::Value>,
}

impl Envelope {
    fn notice(&self) -> Option<String> {
        ["Error Message", "Note", "Information"]
            .iter()
            .find_map(|key| self.fields.get(*key))
            .map(|value| match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
    }

    fn time_series(&self) -> Option<BTreeMap<String, DailyBar>> {
        self.fields
            .iter()
            .filter(|(key, _)| key.starts_with("Time Series"))
            .find_map(|(_, value)| serde_json::from_value(value.clone()).ok())
    }

    /// An unknown symbol yields an empty `Global Quote` object.
    fn global_quote(&self) -> Result<Option<GlobalQuote>, SourceError> {
        match self.fields.get("Global Quote") {
            Some(serde_json::Value::Object(map)) if map.is_empty() => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open", default, deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(rename = "2. high", default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(rename = "3. low", default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(rename = "4. close", default, deserialize_with = "lenient_f64")]
    close: Option<f64>,
    #[serde(rename = "5. volume", default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "02. open", default, deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(rename = "03. high", default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(rename = "04. low", default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(rename = "05. price", default, deserialize_with = "lenient_f64")]
    price: Option<f64>,
    #[serde(rename = "06. volume", default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
    #[serde(rename = "07. latest trading day", default)]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close", default, deserialize_with = "lenient_f64")]
    previous_close: Option<f64>,
    #[serde(rename = "09. change", default, deserialize_with = "lenient_f64")]
    change: Option<f64>,
    #[serde(rename = "10. change percent", default, deserialize_with = "lenient_f64")]
    change_percent: Option<f64>,
}
