use serde::Deserialize;

use crate::adapters::{eastmoney_secid, keep_last, lenient_f64, parse_f64};
use crate::data_source::{
    CapabilitySet, DataSource, HistoryRequest, QuoteRequest, SourceError, SourceFuture,
};
use crate::http_client::HttpRequest;
use crate::retry::RetryingClient;
use crate::{MarketKind, ProviderId, Quote, RawBar, RawSeries, Symbol, UtcDateTime};

/// A-share volumes are reported in lots of 100 shares.
const CN_LOT_SIZE: f64 = 100.0;

const KLINE_FIELDS: &str = "f51,f52,f53,f54,f55,f56,f57";
const QUOTE_FIELDS: &str = "f43,f44,f45,f46,f47,f48,f60,f86,f169,f170";

/// Eastmoney push API adapter for Hong Kong and mainland listings.
///
/// History comes from the kline host, quotes from the snapshot host.
#[derive(Debug, Clone)]
pub struct EastmoneyAdapter {
    client: RetryingClient,
    history_url: String,
    quote_url: String,
}

impl EastmoneyAdapter {
    pub fn new(client: RetryingClient, history_url: &str, quote_url: &str) -> Self {
        Self {
            client,
            history_url: history_url.trim_end_matches('/').to_owned(),
            quote_url: quote_url.trim_end_matches('/').to_owned(),
        }
    }

    fn secid(symbol: &Symbol, market: MarketKind) -> Result<String, SourceError> {
        eastmoney_secid(symbol, market)
            .ok_or_else(|| SourceError::unsupported_market(ProviderId::Eastmoney, market))
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<RawSeries, SourceError> {
        let secid = Self::secid(&req.symbol, req.market)?;
        let limit = req.days.to_string();
        let request = HttpRequest::get(format!("{}/api/qt/stock/kline/get", self.history_url))
            .with_query(&[
                ("secid", secid.as_str()),
                ("fields1", "f1,f2,f3,f4,f5,f6"),
                ("fields2", KLINE_FIELDS),
                ("klt", "101"),
                ("fqt", "1"),
                ("end", "20500101"),
                ("lmt", limit.as_str()),
            ]);

        let envelope: Envelope<KlineData> = self.client.get_json(request).await?;
        let data = envelope
            .data
            .ok_or_else(|| SourceError::no_data(format!("eastmoney has no klines for {secid}")))?;

        let volume_scale = volume_scale(req.market);
        let mut rows: Vec<RawBar> = data
            .klines
            .iter()
            .filter_map(|line| {
                let row = parse_kline(line, volume_scale);
                if row.is_none() {
                    tracing::debug!(%secid, line = %line, "skipping malformed eastmoney kline");
                }
                row
            })
            .collect();
        keep_last(&mut rows, req.days);

        Ok(RawSeries::new(req.symbol, req.market, ProviderId::Eastmoney, rows))
    }

    async fn fetch_quote(&self, req: QuoteRequest) -> Result<Quote, SourceError> {
        let secid = Self::secid(&req.symbol, req.market)?;
        let request = HttpRequest::get(format!("{}/api/qt/stock/get", self.quote_url)).with_query(&[
            ("secid", secid.as_str()),
            ("fields", QUOTE_FIELDS),
            ("fltt", "2"),
        ]);

        let envelope: Envelope<Snapshot> = self.client.get_json(request).await?;
        let snapshot = envelope
            .data
            .ok_or_else(|| SourceError::no_data(format!("eastmoney has no snapshot for {secid}")))?;
        let price = snapshot
            .price
            .filter(|price| *price > 0.0)
            .ok_or_else(|| SourceError::no_data(format!("eastmoney has no price for {secid}")))?;
        let timestamp = snapshot
            .timestamp
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
            .and_then(|seconds| UtcDateTime::from_unix_seconds(seconds as i64).ok())
            .unwrap_or_else(UtcDateTime::now);

        let mut quote = Quote::new(req.symbol, req.market, price, ProviderId::Eastmoney, timestamp)?;
        quote.open = snapshot.open.unwrap_or(price);
        quote.high = snapshot.high.unwrap_or(price);
        quote.low = snapshot.low.unwrap_or(price);
        quote.volume = snapshot.volume.unwrap_or_default() * volume_scale(req.market);
        quote.turnover = snapshot.amount.unwrap_or_default();
        quote.change = snapshot
            .change
            .or_else(|| snapshot.previous_close.map(|previous| price - previous))
            .unwrap_or_default();
        quote.change_pct = snapshot.change_pct.unwrap_or_default();
        Ok(quote)
    }
}

impl DataSource for EastmoneyAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Eastmoney
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn supports_market(&self, market: MarketKind) -> bool {
        matches!(market, MarketKind::HkEquity | MarketKind::CnEquity)
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, RawSeries> {
        Box::pin(self.fetch_history(req))
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Quote> {
        Box::pin(self.fetch_quote(req))
    }
}

fn volume_scale(market: MarketKind) -> f64 {
    if market == MarketKind::CnEquity {
        CN_LOT_SIZE
    } else {
        1.0
    }
}

/// `date,open,close,high,low,volume,amount`. `None` for a truncated line.
fn parse_kline(line: &str, volume_scale: f64) -> Option<RawBar> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 6 {
        return None;
    }
    Some(RawBar {
        ts: UtcDateTime::from_date(fields[0]).ok(),
        open: parse_f64(fields[1]),
        close: parse_f64(fields[2]),
        high: parse_f64(fields[3]),
        low: parse_f64(fields[4]),
        volume: parse_f64(fields[5]).map(|volume| volume * volume_scale),
        buy_volume: None,
    })
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

/// Snapshot fields with `fltt=2`; unavailable values arrive as `"-"`.
#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(rename = "f43", default, deserialize_with = "lenient_f64")]
    price: Option<f64>,
    #[serde(rename = "f44", default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(rename = "f45", default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(rename = "f46", default, deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(rename = "f47", default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
    #[serde(rename = "f48", default, deserialize_with = "lenient_f64")]
    amount: Option<f64>,
    #[serde(rename = "f60", default, deserialize_with = "lenient_f64")]
    previous_close: Option<f64>,
    #[serde(rename = "f86", default, deserialize_with = "lenient_f64")]
    timestamp: Option<f64>,
    #[serde(rename = "f169", default, deserialize_with = "lenient_f64")]
    change: Option<f64>,
    #[serde(rename = "f170", default, deserialize_with = "lenient_f64")]
    change_pct: Option<f64>,
}
