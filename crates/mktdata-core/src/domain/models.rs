use serde::{Deserialize, Serialize};

use crate::{MarketKind, ProviderId, Symbol, UtcDateTime, ValidationError};

/// Relative tolerance used when comparing `buy_volume + sell_volume` to `volume`.
pub const VOLUME_TOLERANCE: f64 = 1e-9;

/// OHLCV bar in the canonical wire schema.
///
/// Serialized as
/// `{"timestamps":..,"open":..,"high":..,"low":..,"close":..,"volume":..,"buy_volume":..,"sell_volume":..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(rename = "timestamps")]
    pub ts: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ts: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        buy_volume: f64,
        sell_volume: f64,
    ) -> Result<Self, ValidationError> {
        validate_positive("open", open)?;
        validate_positive("high", high)?;
        validate_positive("low", low)?;
        validate_positive("close", close)?;
        validate_non_negative("volume", volume)?;
        validate_non_negative("buy_volume", buy_volume)?;
        validate_non_negative("sell_volume", sell_volume)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }
        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        let bar = Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
            buy_volume,
            sell_volume,
        };
        if !bar.volume_split_balances() {
            return Err(ValidationError::VolumeSplitMismatch);
        }
        Ok(bar)
    }

    /// `low <= open,close <= high`, non-negative volumes, buy + sell == volume.
    pub fn satisfies_invariants(&self) -> bool {
        let prices_ok = self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high;
        let volume_ok = self.volume >= 0.0 && self.buy_volume >= 0.0 && self.sell_volume >= 0.0;
        prices_ok && volume_ok && self.volume_split_balances()
    }

    pub fn volume_split_balances(&self) -> bool {
        let tolerance = VOLUME_TOLERANCE * self.volume.abs().max(1.0);
        (self.buy_volume + self.sell_volume - self.volume).abs() <= tolerance
    }
}

/// How the buy/sell split of a series was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSplit {
    /// The provider reported taker-side volume.
    Reported,
    /// Derived from price momentum by the volume decomposer.
    Estimated,
    /// No split yet; `buy_volume`/`sell_volume` are zero.
    Unavailable,
}

/// Validated, immutable bar series for one `(symbol, market)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub symbol: Symbol,
    pub market: MarketKind,
    pub source: ProviderId,
    pub volume_split: VolumeSplit,
    pub bars: Vec<Bar>,
}

impl Series {
    pub fn new(
        symbol: Symbol,
        market: MarketKind,
        source: ProviderId,
        volume_split: VolumeSplit,
        bars: Vec<Bar>,
    ) -> Self {
        Self {
            symbol,
            market,
            source,
            volume_split,
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|bar| bar.close)
    }

    pub fn is_mock(&self) -> bool {
        self.source.is_mock()
    }
}

/// Unvalidated row as parsed from an upstream payload.
///
/// Any field may be missing or non-finite; the validator coerces or drops it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawBar {
    pub ts: Option<UtcDateTime>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub buy_volume: Option<f64>,
}

impl RawBar {
    pub fn ohlcv(ts: UtcDateTime, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            ts: Some(ts),
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
            buy_volume: None,
        }
    }

    pub fn with_buy_volume(mut self, buy_volume: f64) -> Self {
        self.buy_volume = Some(buy_volume);
        self
    }
}

/// Adapter output awaiting validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub symbol: Symbol,
    pub market: MarketKind,
    pub source: ProviderId,
    pub volume_split: VolumeSplit,
    pub rows: Vec<RawBar>,
}

impl RawSeries {
    pub fn new(symbol: Symbol, market: MarketKind, source: ProviderId, rows: Vec<RawBar>) -> Self {
        let volume_split = if !rows.is_empty() && rows.iter().all(|row| row.buy_volume.is_some()) {
            VolumeSplit::Reported
        } else {
            VolumeSplit::Unavailable
        };
        Self {
            symbol,
            market,
            source,
            volume_split,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<&Series> for RawSeries {
    fn from(series: &Series) -> Self {
        let keep_split = series.volume_split != VolumeSplit::Unavailable;
        let rows = series
            .bars
            .iter()
            .map(|bar| RawBar {
                ts: Some(bar.ts),
                open: Some(bar.open),
                high: Some(bar.high),
                low: Some(bar.low),
                close: Some(bar.close),
                volume: Some(bar.volume),
                buy_volume: keep_split.then_some(bar.buy_volume),
            })
            .collect();
        Self {
            symbol: series.symbol.clone(),
            market: series.market,
            source: series.source,
            volume_split: series.volume_split,
            rows,
        }
    }
}

/// Real-time quote snapshot. `price > 0` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub market: MarketKind,
    pub price: f64,
    pub change: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub volume: f64,
    pub turnover: f64,
    pub source: ProviderId,
    pub timestamp: UtcDateTime,
}

impl Quote {
    /// Minimal quote carrying only a price; optional fields default to zero.
    pub fn new(
        symbol: Symbol,
        market: MarketKind,
        price: f64,
        source: ProviderId,
        timestamp: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        validate_positive("price", price)?;
        Ok(Self {
            symbol,
            market,
            price,
            change: 0.0,
            change_pct: 0.0,
            high: price,
            low: price,
            open: price,
            volume: 0.0,
            turnover: 0.0,
            source,
            timestamp,
        })
    }

    pub fn is_mock(&self) -> bool {
        self.source.is_mock()
    }
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}
