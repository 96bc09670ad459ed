use time::macros::offset;
use time::UtcOffset;

use crate::adapters::{parse_f64, sina_code};
use crate::data_source::{
    CapabilitySet, DataSource, HistoryRequest, Operation, QuoteRequest, SourceError, SourceFuture,
};
use crate::http_client::HttpRequest;
use crate::retry::RetryingClient;
use crate::{MarketKind, ProviderId, Quote, RawSeries, UtcDateTime};

/// Requests without this referer are refused.
const REFERER: &str = "https://finance.sina.com.cn/";

/// Sina stamps quotes in Beijing time.
const EXCHANGE_OFFSET: UtcOffset = offset!(+8);

/// Sina `hq` snapshot adapter: mainland quotes only.
#[derive(Debug, Clone)]
pub struct SinaAdapter {
    client: RetryingClient,
    base_url: String,
}

impl SinaAdapter {
    pub fn new(client: RetryingClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn fetch_quote(&self, req: QuoteRequest) -> Result<Quote, SourceError> {
        if req.market != MarketKind::CnEquity {
            return Err(SourceError::unsupported_market(ProviderId::Sina, req.market));
        }
        let code = sina_code(&req.symbol);
        let request = HttpRequest::get(format!("{}/list={code}", self.base_url))
            .with_header("referer", REFERER);
        let response = self.client.execute(request).await?;
        let snapshot = parse_hq_line(&response.body)?;

        let price = snapshot
            .price
            .filter(|price| *price > 0.0)
            .ok_or_else(|| SourceError::no_data(format!("sina reports no trade for {code}")))?;
        let mut quote = Quote::new(
            req.symbol,
            req.market,
            price,
            ProviderId::Sina,
            snapshot.timestamp.unwrap_or_else(UtcDateTime::now),
        )?;
        quote.open = snapshot.open.filter(|open| *open > 0.0).unwrap_or(price);
        quote.high = snapshot.high.filter(|high| *high > 0.0).unwrap_or(price);
        quote.low = snapshot.low.filter(|low| *low > 0.0).unwrap_or(price);
        quote.volume = snapshot.volume.unwrap_or_default();
        quote.turnover = snapshot.amount.unwrap_or_default();
        if let Some(previous) = snapshot.previous_close.filter(|previous| *previous > 0.0) {
            quote.change = price - previous;
            quote.change_pct = quote.change / previous * 100.0;
        }
        Ok(quote)
    }
}

impl DataSource for SinaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Sina
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(false, true)
    }

    fn supports_market(&self, market: MarketKind) -> bool {
        market == MarketKind::CnEquity
    }

    fn history<'a>(&'a self, _req: HistoryRequest) -> SourceFuture<'a, RawSeries> {
        Box::pin(async { Err(SourceError::unsupported_operation(Operation::History)) })
    }

    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Quote> {
        Box::pin(self.fetch_quote(req))
    }
}

#[derive(Debug, Default, PartialEq)]
struct HqSnapshot {
    open: Option<f64>,
    previous_close: Option<f64>,
    price: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    volume: Option<f64>,
    amount: Option<f64>,
    timestamp: Option<UtcDateTime>,
}

/// Parses `var hq_str_sh600519="name,open,prev_close,price,high,low,bid,ask,
/// volume,amount,<20 book fields>,date,time,status";`. Volume is in shares.
fn parse_hq_line(body: &str) -> Result<HqSnapshot, SourceError> {
    let payload = body
        .split_once('"')
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(payload, _)| payload)
        .ok_or_else(|| SourceError::provider_format("sina response is not an hq_str assignment"))?;

    if payload.trim().is_empty() {
        return Err(SourceError::no_data("sina returned an empty quote (unknown symbol)"));
    }

    let fields: Vec<&str> = payload.split(',').collect();
    if fields.len() < 10 {
        return Err(SourceError::provider_format(format!(
            "sina quote has {} fields, expected at least 32",
            fields.len()
        )));
    }

    let number = |index: usize| fields.get(index).and_then(|field| parse_f64(field));
    let timestamp = match (fields.get(30), fields.get(31)) {
        (Some(date), Some(clock)) => UtcDateTime::from_local(date, clock, EXCHANGE_OFFSET).ok(),
        _ => None,
    };

    Ok(HqSnapshot {
        open: number(1),
        previous_close: number(2),
        price: number(3),
        high: number(4),
        low: number(5),
        volume: number(8),
        amount: number(9),
        timestamp,
    })
}
