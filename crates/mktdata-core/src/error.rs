use thiserror::Error;

/// Validation and contract errors exposed by `mktdata-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },
    #[error("symbol '{value}' is not valid for market '{market}'")]
    SymbolMarketMismatch { value: String, market: &'static str },

    #[error("invalid market '{value}', expected one of crypto, us_equity, hk_equity, cn_equity")]
    InvalidMarket { value: String },
    #[error("invalid source '{value}'")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unparseable exchange date/time '{value}'")]
    InvalidTimestamp { value: String },
    #[error("epoch value {value} is out of range")]
    TimestampOutOfRange { value: i64 },

    #[error("currency must be a 3-5 letter uppercase code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be positive")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,
    #[error("buy_volume + sell_volume must equal volume")]
    VolumeSplitMismatch,

    #[error("history request days must be between 1 and {max}, got {value}")]
    InvalidDays { value: u32, max: u32 },
    #[error("batch limit must be between 1 and {max}, got {value}")]
    InvalidBatchLimit { value: usize, max: usize },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Top-level error type for router entry points.
///
/// Upstream failures never surface here; they end in the synthetic fallback.
/// Only caller mistakes and configuration problems do.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
