use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::data_source::SourceError;

/// Runtime circuit state for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "crate::config::duration_ms", rename = "open_timeout_ms")]
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Start of the half-open trial request currently in flight.
    trial_started: Option<Instant>,
}

/// Per-provider circuit breaker.
///
/// Counts consecutive upstream faults (see [`SourceError::is_upstream_fault`]).
/// Once `failure_threshold` is reached the provider is skipped for
/// `open_timeout`. After that a single trial fetch is admitted; any answer
/// that is not an upstream fault closes the circuit, a fault re-opens it. A
/// trial that never reports back is replaced after another `open_timeout`.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a fetch may go to the provider now.
    ///
    /// In half-open state only the first caller gets `true`.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        let timeout = self.config.open_timeout;
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.is_none_or(|at| at.elapsed() >= timeout);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.opened_at = None;
                    inner.trial_started = Some(Instant::now());
                }
                elapsed
            }
            CircuitState::HalfOpen => {
                let stale = inner.trial_started.is_none_or(|at| at.elapsed() >= timeout);
                if stale {
                    inner.trial_started = Some(Instant::now());
                }
                stale
            }
        }
    }

    /// Feeds the result of an admitted fetch back into the breaker.
    pub fn record<T>(&self, outcome: &Result<T, SourceError>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(error) if error.is_upstream_fault() => self.record_failure(),
            Err(_) => self.record_answer(),
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        *inner = CircuitInner::default();
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.trial_started = None;

        if inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// A failure that is not the provider's fault, such as no data for one
    /// symbol. Closes a half-open circuit and leaves the fault count of a
    /// closed one alone.
    fn record_answer(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            *inner = CircuitInner::default();
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}
