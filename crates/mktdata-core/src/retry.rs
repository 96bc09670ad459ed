//! Retry logic with exponential backoff and jitter.
//!
//! [`RetryingClient`] is the single path every adapter uses to reach its
//! upstream: it applies the provider's rate gate, a per-call timeout and the
//! [`RetryConfig`] policy, and turns whatever is left into a [`SourceError`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http_client::{HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse};
use crate::throttling::RateGate;
use crate::{ProviderId, SourceError};

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        #[serde(with = "crate::config::duration_ms", rename = "delay_ms")]
        delay: Duration,
    },
    /// Delay is `base * factor^attempt`, capped at `max`.
    Exponential {
        #[serde(with = "crate::config::duration_ms", rename = "base_ms")]
        base: Duration,
        factor: f64,
        #[serde(with = "crate::config::duration_ms", rename = "max_ms")]
        max: Duration,
        /// Applies +/- 50% random jitter to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = seconds.min(max.as_secs_f64()).max(0.0);

                let mut delay = Duration::from_secs_f64(capped_seconds);

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Configuration for the retry mechanism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts per request, the first one included.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// HTTP statuses that trigger a retry. Any other non-2xx is terminal.
    pub retry_on_status: Vec<u16>,
    pub retry_on_timeout: bool,
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    pub fn should_retry_error(&self, error: &HttpError) -> bool {
        match error.kind() {
            HttpErrorKind::Timeout => self.retry_on_timeout,
            HttpErrorKind::Connect => self.retry_on_connect,
            _ => error.retryable(),
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Number of calls a request may make.
    pub fn attempt_budget(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

/// HTTP client wrapper that owns one provider's retry policy and rate budget.
///
/// The only state shared across calls is the rate gate.
#[derive(Clone)]
pub struct RetryingClient {
    provider: ProviderId,
    http: Arc<dyn HttpClient>,
    config: RetryConfig,
    gate: Option<RateGate>,
    timeout: Duration,
}

impl RetryingClient {
    pub fn new(provider: ProviderId, http: Arc<dyn HttpClient>, config: RetryConfig) -> Self {
        Self {
            provider,
            http,
            config,
            gate: None,
            timeout: Duration::from_millis(crate::http_client::DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn with_rate_gate(mut self, gate: RateGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executes `request` until it succeeds or the attempt budget is spent.
    ///
    /// A call that exceeds the timeout counts as a network error. On HTTP 429
    /// the wait before the next attempt is at least the upstream's
    /// `Retry-After`.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, SourceError> {
        let budget = self.config.attempt_budget();
        let timeout = self.timeout.min(request.timeout());
        let url = request.redacted_url();
        let mut last_error = String::from("no attempt was made");

        for attempt in 0..budget {
            if let Some(gate) = &self.gate {
                gate.acquire().await;
            }

            tracing::trace!(provider = %self.provider, attempt = attempt + 1, url = %url, "http request");
            let outcome = tokio::time::timeout(timeout, self.http.execute(request.clone())).await;
            let is_last = attempt + 1 >= budget;

            let delay = match outcome {
                Ok(Ok(response)) if response.is_success() => return Ok(response),
                Ok(Ok(response)) => {
                    let retryable = self.config.should_retry_status(response.status);
                    if !retryable || is_last {
                        return Err(SourceError::upstream_status(
                            response.status,
                            truncate(&response.body),
                        ));
                    }
                    let backoff = self.config.delay_for_attempt(attempt);
                    last_error = format!("HTTP {}", response.status);
                    match (response.status, response.retry_after) {
                        (429, Some(retry_after)) => backoff.max(retry_after),
                        _ => backoff,
                    }
                }
                Ok(Err(error)) => {
                    if !self.config.should_retry_error(&error) {
                        return Err(SourceError::transient_network(error.to_string()));
                    }
                    last_error = error.to_string();
                    self.config.delay_for_attempt(attempt)
                }
                Err(_) => {
                    last_error = format!("request timed out after {}ms", timeout.as_millis());
                    if !self.config.retry_on_timeout {
                        return Err(SourceError::transient_network(last_error));
                    }
                    self.config.delay_for_attempt(attempt)
                }
            };

            if is_last {
                break;
            }

            tracing::debug!(
                provider = %self.provider,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "retrying upstream request"
            );
            tokio::time::sleep(delay).await;
        }

        Err(SourceError::transient_network(format!(
            "{} failed after {budget} attempt(s): {last_error}",
            self.provider
        )))
    }

    /// Executes `request` and deserializes the body.
    pub async fn get_json<T>(&self, request: HttpRequest) -> Result<T, SourceError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.execute(request).await?;
        Ok(serde_json::from_str(&response.body)?)
    }
}

impl std::fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingClient")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_owned(),
    }
}
