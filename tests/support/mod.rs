//! Scripted HTTP transport and payload builders shared by integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mktdata_core::{
    HttpClient, HttpError, HttpRequest, HttpResponse, MarketDataRouter, PipelineConfig,
    RetryConfig,
};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Timeout,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Status(200, body.into())
    }
}

struct Route {
    needle: String,
    replies: Vec<Reply>,
    served: AtomicUsize,
}

/// Transport that answers by URL substring and records every call.
///
/// A route plays its replies in order and repeats the last one. Unmatched
/// URLs get `404 {}`.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Vec<Route>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, needle: &str, replies: Vec<Reply>) -> Self {
        self.routes.push(Route {
            needle: needle.to_owned(),
            replies,
            served: AtomicUsize::new(0),
        });
        self
    }

    pub fn ok(self, needle: &str, body: impl Into<String>) -> Self {
        self.route(needle, vec![Reply::ok(body)])
    }

    pub fn status(self, needle: &str, status: u16) -> Self {
        self.route(needle, vec![Reply::Status(status, String::from("{}"))])
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls(&self) -> usize {
        self.urls().len()
    }

    pub fn calls_to(&self, needle: &str) -> usize {
        self.urls().iter().filter(|url| url.contains(needle)).count()
    }

    fn reply_for(&self, url: &str) -> Reply {
        let Some(route) = self.routes.iter().find(|route| url.contains(&route.needle)) else {
            return Reply::Status(404, String::from("{}"));
        };
        let index = route.served.fetch_add(1, Ordering::SeqCst);
        route
            .replies
            .get(index)
            .or_else(|| route.replies.last())
            .cloned()
            .unwrap_or(Reply::Status(404, String::from("{}")))
    }
}

impl HttpClient for ScriptedTransport {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .expect("calls lock")
                .push(request.url.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.reply_for(&request.url) {
                Reply::Status(status, body) => Ok(HttpResponse::new(status, body)),
                Reply::Timeout => Err(HttpError::timeout("scripted timeout")),
            }
        })
    }
}

/// Defaults with a 1 ms retry backoff so failing scripts stay fast.
pub fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.retry = RetryConfig::fixed(Duration::from_millis(1), 3);
    config
}

pub fn router(transport: &Arc<ScriptedTransport>, config: PipelineConfig) -> MarketDataRouter {
    MarketDataRouter::builder(config)
        .with_http(Arc::clone(transport) as Arc<dyn HttpClient>)
        .build()
}

const DAY: i64 = 86_400;
/// 2024-01-01T14:30:00Z, a US session open.
const FIRST_SESSION: i64 = 1_704_119_400;

/// Yahoo chart document with `days` consecutive daily rows.
pub fn yahoo_chart(days: usize, base_price: f64) -> String {
    let timestamps: Vec<String> = (0..days)
        .map(|day| (FIRST_SESSION + day as i64 * DAY).to_string())
        .collect();
    let closes: Vec<f64> = (0..days).map(|day| base_price + day as f64 * 0.5).collect();
    let column = |offset: f64| {
        closes
            .iter()
            .map(|close| format!("{:.2}", close + offset))
            .collect::<Vec<_>>()
            .join(",")
    };
    let volumes = vec!["1000000"; days].join(",");
    let last = closes.last().copied().unwrap_or(base_price);

    format!(
        r#"{{"chart":{{"result":[{{"meta":{{"regularMarketPrice":{last:.2},"chartPreviousClose":{base_price:.2},"regularMarketTime":{time}}},"timestamp":[{ts}],"indicators":{{"quote":[{{"open":[{open}],"high":[{high}],"low":[{low}],"close":[{close}],"volume":[{volumes}]}}]}}}}],"error":null}}}}"#,
        time = FIRST_SESSION,
        ts = timestamps.join(","),
        open = column(-0.2),
        high = column(1.0),
        low = column(-1.0),
        close = column(0.0),
    )
}

/// Alpha Vantage `TIME_SERIES_DAILY` document with `days` rows.
pub fn alphavantage_daily(days: usize, base_price: f64) -> String {
    let rows: Vec<String> = (0..days)
        .map(|day| {
            let date = time::Date::from_calendar_date(2024, time::Month::January, 1)
                .expect("date")
                .saturating_add(time::Duration::days(day as i64));
            let close = base_price + day as f64 * 0.5;
            format!(
                r#""{date}": {{"1. open": "{:.4}", "2. high": "{:.4}", "3. low": "{:.4}", "4. close": "{:.4}", "5. volume": "2500000"}}"#,
                close - 0.2,
                close + 1.0,
                close - 1.0,
                close
            )
        })
        .collect();
    format!(
        r#"{{"Meta Data": {{"2. Symbol": "AAPL"}}, "Time Series (Daily)": {{{}}}}}"#,
        rows.join(",")
    )
}
