//! # Domain Models
//!
//! Canonical market data types shared by every adapter and pipeline stage.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MarketKind`] | Closed set of supported markets |
//! | [`Symbol`] | Normalized instrument symbol |
//! | [`UtcDateTime`] | UTC timestamp |
//! | [`Bar`] | OHLCV bar with buy/sell volume split |
//! | [`Series`] | Validated bar sequence tagged with its source |
//! | [`RawBar`] / [`RawSeries`] | Unvalidated adapter output |
//! | [`Quote`] | Real-time snapshot |
//!
//! Adapters never build [`Series`] directly. They emit [`RawSeries`], and the
//! validator is the only producer of [`Series`] values (the synthetic
//! generator aside), which is what lets the rest of the pipeline rely on the
//! OHLC and timestamp invariants.

mod market;
mod models;
mod symbol;
mod timestamp;

pub use market::MarketKind;
pub use models::{Bar, Quote, RawBar, RawSeries, Series, VolumeSplit, VOLUME_TOLERANCE};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
