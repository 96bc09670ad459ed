use serde::Deserialize;

use crate::adapters::{keep_last, yahoo_symbol};
use crate::data_source::{
    CapabilitySet, DataSource, HistoryRequest, QuoteRequest, SourceError, SourceFuture,
};
use crate::http_client::HttpRequest;
use crate::retry::RetryingClient;
use crate::{MarketKind, ProviderId, Quote, RawBar, RawSeries, Symbol, UtcDateTime};

const REFERER: &str = "https://finance.yahoo.com/";

/// Yahoo Finance chart API adapter. Serves every market.
#[derive(Debug, Clone)]
pub struct YahooAdapter {
    client: RetryingClient,
    base_url: String,
}

impl YahooAdapter {
    pub fn new(client: RetryingClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn fetch_chart(
        &self,
        symbol: &Symbol,
        market: MarketKind,
        query: &[(&str, String)],
    ) -> Result<ChartResult, SourceError> {
        let ticker = yahoo_symbol(symbol, market);
        let request = HttpRequest::get(format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            urlencoding::encode(&ticker)
        ))
        .with_query(query)
        .with_header("referer", REFERER);

        let response: ChartResponse = self.client.get_json(request).await?;
        if let Some(error) = response.chart.error.filter(|value| !value.is_null()) {
            return Err(SourceError::no_data(format!("yahoo chart error for {ticker}: {error}")));
        }
        response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| SourceError::no_data(format!("yahoo returned no chart for {ticker}")))
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<RawSeries, SourceError> {
        let now = UtcDateTime::now();
        let lookback = lookback_days(req.market, req.days);
        let period1 = now.minus(time::Duration::days(lookback)).unix_seconds();
        let query = [
            ("period1", period1.to_string()),
            ("period2", now.unix_seconds().to_string()),
            ("interval", String::from("1d")),
            ("events", String::from("history")),
        ];
        let chart = self.fetch_chart(&req.symbol, req.market, &query).await?;

        let mut rows = chart_rows(&chart);
        keep_last(&mut rows, req.days);
        Ok(RawSeries::new(req.symbol, req.market, ProviderId::Yahoo, rows))
    }

    async fn fetch_quote(&self, req: QuoteRequest) -> Result<Quote, SourceError> {
        let query = [("range", String::from("1d")), ("interval", String::from("1d"))];
        let chart = self.fetch_chart(&req.symbol, req.market, &query).await?;
        let meta = &chart.meta;
        let day = chart.indicators.quote.first();

        let price = meta
            .regular_market_price
            .or_else(|| day.and_then(|q| last_value(&q.close)))
            .filter(|price| *price > 0.0)
            .ok_or_else(|| SourceError::no_data(format!("yahoo has no price for {}", req.symbol)))?;
        let timestamp = meta
            .regular_market_time
            .and_then(|seconds| UtcDateTime::from_unix_seconds(seconds).ok())
            .unwrap_or_else(UtcDateTime::now);

        let mut quote = Quote::new(req.symbol, req.market, price, ProviderId::Yahoo, timestamp)?;
        if let Some(previous) = meta
            .chart_previous_close
            .or(meta.previous_close)
            .filter(|previous| *previous > 0.0)
        {
            quote.change = price - previous;
            quote.change_pct = quote.change / previous * 100.0;
        }
        quote.open = day.and_then(|q| last_value(&q.open)).unwrap_or(price);
        quote.high = meta.regular_market_day_high.unwrap_or(price);
        quote.low = meta.regular_market_day_low.unwrap_or(price);
        quote.volume = meta.regular_market_volume.unwrap_or_default();
        Ok(quote)
    }
}

impl DataSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn supports_market(&self, _market: MarketKind) -> bool {
        true
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, RawSeries> {
        Box::pin(self.fetch_history(req))
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Quote> {
        Box::pin(self.fetch_quote(req))
    }
}

/// Calendar days to request so that `days` trading days are covered.
fn lookback_days(market: MarketKind, days: u32) -> i64 {
    let days = i64::from(days);
    if market.trades_weekends() {
        days + 2
    } else {
        days * 7 / 5 + 10
    }
}

/// Daily bars keyed by UTC date; Yahoo stamps them at the session open.
fn chart_rows(chart: &ChartResult) -> Vec<RawBar> {
    let Some(quote) = chart.indicators.quote.first() else {
        return Vec::new();
    };
    let at = |column: &[Option<f64>], index: usize| column.get(index).copied().flatten();

    chart
        .timestamp
        .iter()
        .enumerate()
        .map(|(index, seconds)| RawBar {
            ts: UtcDateTime::from_unix_seconds(*seconds)
                .ok()
                .map(UtcDateTime::start_of_day),
            open: at(&quote.open, index),
            high: at(&quote.high, index),
            low: at(&quote.low, index),
            close: at(&quote.close, index),
            volume: at(&quote.volume, index),
            buy_volume: None,
        })
        .collect()
}

fn last_value(column: &[Option<f64>]) -> Option<f64> {
    column.iter().rev().find_map(|value| *value)
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}
