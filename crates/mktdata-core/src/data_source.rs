//! Data source trait and request types.
//!
//! This module defines the adapter contract (`DataSource`) every upstream
//! provider implements, the per-operation request types, and the
//! [`SourceError`] taxonomy the router uses to decide whether to move on to
//! the next provider.
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | History | [`HistoryRequest`] | [`RawSeries`] |
//! | Quote | [`QuoteRequest`] | [`Quote`] |
//!
//! Adapters only build requests, parse payloads and map units. They never
//! validate, cache or fall back; the router owns all of that.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{MarketKind, ProviderId, Quote, RawSeries, Symbol, ValidationError};

/// Largest history window a caller may request.
pub const MAX_HISTORY_DAYS: u32 = 3650;

/// Operation class used for routing, capability checks and cache TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    History,
    Quote,
}

impl Operation {
    pub const ALL: [Self; 2] = [Self::History, Self::Quote];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Quote => "quote",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported operation matrix for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub history: bool,
    pub quote: bool,
}

impl CapabilitySet {
    pub const fn new(history: bool, quote: bool) -> Self {
        Self { history, quote }
    }

    pub const fn full() -> Self {
        Self::new(true, true)
    }

    pub const fn supports(self, operation: Operation) -> bool {
        match operation {
            Operation::History => self.history,
            Operation::Quote => self.quote,
        }
    }

    pub fn supported_operations(self) -> Vec<&'static str> {
        Operation::ALL
            .into_iter()
            .filter(|operation| self.supports(*operation))
            .map(Operation::as_str)
            .collect()
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Network failure or timeout that survived local retries.
    TransientNetwork,
    /// Upstream answered with a terminal HTTP status.
    UpstreamStatus,
    /// Payload could not be parsed into the canonical schema.
    ProviderFormat,
    /// Upstream answered but had nothing usable.
    NoData,
    /// Nothing survived validation.
    ValidationFailure,
    /// Provider is missing required configuration such as an API key.
    Configuration,
    UnsupportedOperation,
    InvalidRequest,
    CircuitOpen,
}

/// Structured source error used by router fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
    status: Option<u16>,
}

impl SourceError {
    fn new(kind: SourceErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            status: None,
        }
    }

    pub fn transient_network(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::TransientNetwork, message, true)
    }

    pub fn upstream_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("upstream returned HTTP {status}: {}", message.into());
        Self {
            status: Some(status),
            ..Self::new(SourceErrorKind::UpstreamStatus, message, status == 429)
        }
    }

    pub fn provider_format(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::ProviderFormat, message, false)
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NoData, message, false)
    }

    pub fn validation_failure(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::ValidationFailure, message, false)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Configuration, message, false)
    }

    pub fn unsupported_operation(operation: Operation) -> Self {
        Self::new(
            SourceErrorKind::UnsupportedOperation,
            format!("operation '{operation}' is not supported by this source"),
            false,
        )
    }

    pub fn unsupported_market(provider: ProviderId, market: MarketKind) -> Self {
        Self::new(
            SourceErrorKind::UnsupportedOperation,
            format!("source '{provider}' does not serve market '{market}'"),
            false,
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message, false)
    }

    pub fn circuit_open(provider: ProviderId) -> Self {
        Self::new(
            SourceErrorKind::CircuitOpen,
            format!("circuit open for source '{provider}'"),
            true,
        )
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// HTTP status of an [`SourceErrorKind::UpstreamStatus`] failure.
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the failure says something about the provider's health.
    ///
    /// Only these count toward opening the provider's circuit. A terminal 4xx
    /// such as an unknown symbol is about the request, not the provider.
    pub const fn is_upstream_fault(&self) -> bool {
        match self.kind {
            SourceErrorKind::TransientNetwork | SourceErrorKind::ProviderFormat => true,
            SourceErrorKind::UpstreamStatus => match self.status {
                Some(status) => status == 408 || status == 429 || status >= 500,
                None => true,
            },
            _ => false,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::TransientNetwork => "source.transient_network",
            SourceErrorKind::UpstreamStatus => "source.upstream_status",
            SourceErrorKind::ProviderFormat => "source.provider_format",
            SourceErrorKind::NoData => "source.no_data",
            SourceErrorKind::ValidationFailure => "source.validation_failure",
            SourceErrorKind::Configuration => "source.configuration",
            SourceErrorKind::UnsupportedOperation => "source.unsupported_operation",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::CircuitOpen => "source.circuit_open",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        Self::provider_format(format!("failed to parse upstream payload: {error}"))
    }
}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::provider_format(error.to_string())
    }
}

/// Request payload for history operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub market: MarketKind,
    pub days: u32,
}

impl HistoryRequest {
    pub fn new(symbol: Symbol, market: MarketKind, days: u32) -> Result<Self, ValidationError> {
        if days == 0 || days > MAX_HISTORY_DAYS {
            return Err(ValidationError::InvalidDays {
                value: days,
                max: MAX_HISTORY_DAYS,
            });
        }
        Ok(Self {
            symbol,
            market,
            days,
        })
    }
}

/// Request payload for quote operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbol: Symbol,
    pub market: MarketKind,
}

impl QuoteRequest {
    pub fn new(symbol: Symbol, market: MarketKind) -> Self {
        Self { symbol, market }
    }
}

/// Boxed future returned by adapter operations.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`id`](DataSource::id) | Provider identifier |
/// | [`capabilities`](DataSource::capabilities) | Supported operations |
/// | [`supports_market`](DataSource::supports_market) | Markets the upstream serves |
/// | [`history`](DataSource::history) | Fetch daily bars |
/// | [`quote`](DataSource::quote) | Fetch a real-time snapshot |
///
/// Implementations must be `Send + Sync`; the router shares them across tasks.
pub trait DataSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    fn supports_market(&self, market: MarketKind) -> bool;

    /// Fetches up to `req.days` daily bars, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the upstream is unreachable, answers with
    /// a terminal status, or sends a payload that cannot be parsed.
    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, RawSeries>;

    /// Fetches the latest quote.
    ///
    /// # Errors
    ///
    /// Same conditions as [`history`](DataSource::history), plus
    /// [`SourceErrorKind::NoData`] when the upstream reports a non-positive price.
    fn quote<'a>(&'a self, req: QuoteRequest) -> SourceFuture<'a, Quote>;
}
