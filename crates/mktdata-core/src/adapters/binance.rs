use serde::Deserialize;

use crate::adapters::{lenient_f64, value_f64};
use crate::data_source::{
    CapabilitySet, DataSource, HistoryRequest, QuoteRequest, SourceError, SourceFuture,
};
use crate::http_client::HttpRequest;
use crate::reconciler::{PairPriceSource, PriceReconciler, ReconcilerConfig};
use crate::retry::RetryingClient;
use crate::{MarketKind, ProviderId, Quote, RawBar, RawSeries, UtcDateTime};

/// Binance spot REST adapter (crypto only).
///
/// Klines carry taker-buy base volume, so history from here has a reported
/// buy/sell split. Quotes are priced by the reconciler across quote
/// currencies; the 24h ticker of the primary pair fills in the statistics.
#[derive(Debug, Clone)]
pub struct BinanceAdapter {
    client: RetryingClient,
    base_url: String,
    reconciler: PriceReconciler,
}

impl BinanceAdapter {
    pub fn new(client: RetryingClient, base_url: &str, reconciler: ReconcilerConfig) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            reconciler: PriceReconciler::new(reconciler),
        }
    }

    fn primary_pair(&self, base: &str) -> String {
        format!("{base}{}", self.reconciler.config().primary_quote)
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<RawSeries, SourceError> {
        let pair = self.primary_pair(req.symbol.as_str());
        let limit = req.days.min(1000).to_string();
        let request = HttpRequest::get(format!("{}/api/v3/klines", self.base_url)).with_query(&[
            ("symbol", pair.as_str()),
            ("interval", "1d"),
            ("limit", limit.as_str()),
        ]);
        let rows: Vec<Vec<serde_json::Value>> = self.client.get_json(request).await?;

        let bars: Vec<RawBar> = rows
            .iter()
            .filter_map(|row| {
                let bar = parse_kline(row);
                if bar.is_none() {
                    tracing::debug!(pair = %pair, fields = row.len(), "skipping malformed binance kline");
                }
                bar
            })
            .collect();

        Ok(RawSeries::new(req.symbol, MarketKind::Crypto, ProviderId::Binance, bars))
    }

    async fn fetch_ticker(&self, pair: &str) -> Result<Ticker24h, SourceError> {
        let request = HttpRequest::get(format!("{}/api/v3/ticker/24hr", self.base_url))
            .with_query(&[("symbol", pair)]);
        self.client.get_json(request).await
    }

    async fn fetch_quote(&self, req: QuoteRequest) -> Result<Quote, SourceError> {
        let base = req.symbol.as_str().to_owned();
        let reconciled = self.reconciler.reconcile(self, &base).await?;
        let ticker = match self.fetch_ticker(&self.primary_pair(&base)).await {
            Ok(ticker) => Some(ticker),
            Err(error) => {
                tracing::debug!(symbol = %req.symbol, error = %error, "binance 24h ticker unavailable");
                None
            }
        };

        let timestamp = ticker
            .as_ref()
            .and_then(|t| t.close_time)
            .and_then(|ms| UtcDateTime::from_unix_millis(ms).ok())
            .unwrap_or_else(UtcDateTime::now);

        let mut quote = Quote::new(
            req.symbol,
            MarketKind::Crypto,
            reconciled.price,
            ProviderId::Binance,
            timestamp,
        )
        .map_err(|_| SourceError::no_data(format!("binance returned non-positive price for {base}")))?;

        if let Some(ticker) = ticker {
            quote.change = ticker.price_change.unwrap_or_default();
            quote.change_pct = ticker.price_change_percent.unwrap_or_default();
            quote.open = ticker.open_price.unwrap_or(quote.price);
            quote.high = ticker.high_price.unwrap_or(quote.price);
            quote.low = ticker.low_price.unwrap_or(quote.price);
            quote.volume = ticker.volume.unwrap_or_default();
            quote.turnover = ticker.quote_volume.unwrap_or_default();
        }
        Ok(quote)
    }
}

impl PairPriceSource for BinanceAdapter {
    fn pair_price<'a>(&'a self, base: &'a str, quote: &'a str) -> SourceFuture<'a, f64> {
        Box::pin(async move {
            let request = HttpRequest::get(format!("{}/api/v3/ticker/price", self.base_url))
                .with_query(&[("symbol", format!("{base}{quote}"))]);
            let ticker: TickerPrice = self.client.get_json(request).await?;
            ticker
                .price
                .ok_or_else(|| SourceError::provider_format("binance ticker has no price"))
        })
    }

    fn weighted_average_price<'a>(&'a self, base: &'a str, quote: &'a str) -> SourceFuture<'a, f64> {
        Box::pin(async move {
            let ticker = self.fetch_ticker(&format!("{base}{quote}")).await?;
            ticker.weighted_avg_price.ok_or_else(|| {
                SourceError::provider_format("binance 24h ticker has no weightedAvgPrice")
            })
        })
    }
}

impl DataSource for BinanceAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Binance
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn supports_market(&self, market: MarketKind) -> bool {
        market == MarketKind::Crypto
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, RawSeries> {
        Box::pin(self.fetch_history(req))
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Quote> {
        Box::pin(self.fetch_quote(req))
    }
}

/// `[openTime, open, high, low, close, volume, closeTime, quoteVolume,
/// trades, takerBuyBase, takerBuyQuote, ignore]`. `None` for a short row or
/// one without a usable open time.
fn parse_kline(row: &[serde_json::Value]) -> Option<RawBar> {
    if row.len() < 10 {
        return None;
    }
    let open_time = UtcDateTime::from_unix_millis(row[0].as_i64()?).ok()?;

    Some(RawBar {
        ts: Some(open_time),
        open: value_f64(&row[1]),
        high: value_f64(&row[2]),
        low: value_f64(&row[3]),
        close: value_f64(&row[4]),
        volume: value_f64(&row[5]),
        buy_volume: value_f64(&row[9]),
    })
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[serde(default, deserialize_with = "lenient_f64")]
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    #[serde(default, deserialize_with = "lenient_f64")]
    price_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price_change_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    weighted_avg_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    open_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    high_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    low_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    quote_volume: Option<f64>,
    #[serde(default)]
    close_time: Option<i64>,
}
