//! Series and quote validation.
//!
//! [`Validator::validate_series`] turns an adapter's [`RawSeries`] into a
//! [`Series`] whose bars satisfy the OHLC, volume and timestamp invariants.
//! Every step is a repair: a bad bar is fixed, and a row is dropped only when
//! it has no timestamp or no usable close.
//!
//! | Step | Effect |
//! |------|--------|
//! | coerce | drop unusable rows, fill missing open/high/low/volume, order by timestamp |
//! | OHLC repair | widen high/low to contain open and close |
//! | continuity | rebuild bars whose close jumps more than the threshold |
//! | outlier clamp | replace per-column values beyond the z-score threshold with the median |
//! | volume | zero negatives, clamp spikes to a multiple of the median |
//! | range clamp | keep prices inside the market's bounds |
//! | timestamps | ascending and unique |
//!
//! The repair steps feed each other (a clamped close can open a new jump), so
//! they are repeated until a pass changes nothing. That makes validation
//! idempotent: a validated series validates to itself.

use serde::{Deserialize, Serialize};

use crate::config::{PriceBounds, PriceRange};
use crate::volume::VolumeDecomposer;
use crate::{Bar, Quote, RawSeries, Series, SourceError, UtcDateTime, VolumeSplit};

const MAX_REPAIR_PASSES: usize = 32;

/// Tunables of the repair steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Relative close-to-close move treated as a glitch.
    pub jump_threshold: f64,
    /// Bound of the random move used when rebuilding a glitched bar.
    pub jitter: f64,
    pub zscore_threshold: f64,
    /// Volumes above `median + volume_spike_sigma * stddev` are spikes.
    pub volume_spike_sigma: f64,
    /// Spikes are clamped to `volume_clamp_multiple * median`.
    pub volume_clamp_multiple: f64,
    /// Fixed RNG seed for reproducible smoothing.
    pub seed: Option<u64>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            jump_threshold: 0.20,
            jitter: 0.02,
            zscore_threshold: 3.0,
            volume_spike_sigma: 3.0,
            volume_clamp_multiple: 3.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Row {
    ts: UtcDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    buy: Option<f64>,
}

impl Row {
    fn set_volume(&mut self, volume: f64) {
        if let Some(buy) = self.buy {
            self.buy = Some(if self.volume > 0.0 {
                buy * (volume / self.volume)
            } else {
                0.0
            });
        }
        self.volume = volume;
    }
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Open,
    High,
    Low,
    Close,
}

impl Column {
    const ALL: [Self; 4] = [Self::Open, Self::High, Self::Low, Self::Close];

    fn get(self, row: &Row) -> f64 {
        match self {
            Self::Open => row.open,
            Self::High => row.high,
            Self::Low => row.low,
            Self::Close => row.close,
        }
    }

    fn set(self, row: &mut Row, value: f64) {
        match self {
            Self::Open => row.open = value,
            Self::High => row.high = value,
            Self::Low => row.low = value,
            Self::Close => row.close = value,
        }
    }
}

/// Pure, network-free validation of fetched data.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
    bounds: PriceBounds,
    decomposer: VolumeDecomposer,
}

impl Validator {
    pub fn new(config: ValidatorConfig, bounds: PriceBounds, decomposer: VolumeDecomposer) -> Self {
        Self {
            config,
            bounds,
            decomposer,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Repairs `raw` into a series satisfying every bar invariant.
    ///
    /// Series without a reported buy/sell split get an estimated one.
    ///
    /// # Errors
    ///
    /// [`SourceErrorKind::ValidationFailure`](crate::SourceErrorKind::ValidationFailure)
    /// when no row survives.
    pub fn validate_series(&self, raw: RawSeries) -> Result<Series, SourceError> {
        let RawSeries {
            symbol,
            market,
            source,
            volume_split,
            rows,
        } = raw;

        let mut rows = coerce(rows);
        if rows.is_empty() {
            return Err(SourceError::validation_failure(format!(
                "no usable data for {symbol} from {source}"
            )));
        }

        let range = self.bounds.for_market(market);
        let mut rng = match self.config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        for pass in 0..MAX_REPAIR_PASSES {
            let mut changed = false;
            changed |= repair_ohlc(&mut rows);
            changed |= self.smooth_jumps(&mut rows, &mut rng);
            changed |= self.clamp_outliers(&mut rows);
            changed |= self.sanitize_volume(&mut rows);
            changed |= clamp_to_range(&mut rows, range);
            changed |= repair_ohlc(&mut rows);
            if !changed {
                break;
            }
            if pass + 1 == MAX_REPAIR_PASSES {
                tracing::debug!(%symbol, %source, "validator stopped before reaching a fixpoint");
            }
        }

        let keep_split = volume_split != VolumeSplit::Unavailable
            && rows.iter().all(|row| row.buy.is_some());

        let mut bars: Vec<Bar> = rows
            .into_iter()
            .map(|row| {
                let buy = if keep_split {
                    row.buy.unwrap_or(0.0).clamp(0.0, row.volume)
                } else {
                    0.0
                };
                Bar {
                    ts: row.ts,
                    open: row.open,
                    high: row.high,
                    low: row.low,
                    close: row.close,
                    volume: row.volume,
                    buy_volume: buy,
                    sell_volume: if keep_split { row.volume - buy } else { 0.0 },
                }
            })
            .collect();

        let volume_split = if keep_split {
            volume_split
        } else {
            self.decomposer.decompose(&mut bars);
            VolumeSplit::Estimated
        };

        debug_assert!(bars.iter().all(Bar::satisfies_invariants));
        debug_assert!(bars.windows(2).all(|pair| pair[0].ts < pair[1].ts));

        Ok(Series::new(symbol, market, source, volume_split, bars))
    }

    /// Runs an already-built series through validation again.
    pub fn revalidate(&self, series: &Series) -> Result<Series, SourceError> {
        self.validate_series(RawSeries::from(series))
    }

    /// Checks and normalizes a quote.
    ///
    /// The price must be positive and inside the market's bounds; anything
    /// else is rejected so the router moves on to the next provider. The
    /// remaining fields are repaired.
    pub fn validate_quote(&self, quote: Quote) -> Result<Quote, SourceError> {
        let mut quote = quote;
        if !(quote.price.is_finite() && quote.price > 0.0) {
            return Err(SourceError::validation_failure(format!(
                "{} quote for {} has non-positive price",
                quote.source, quote.symbol
            )));
        }

        let range = self.bounds.for_market(quote.market);
        if !range.contains(quote.price) {
            return Err(SourceError::validation_failure(format!(
                "{} quote price {} for {} is outside [{}, {}]",
                quote.source, quote.price, quote.symbol, range.min, range.max
            )));
        }

        let positive_or = |value: f64, fallback: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };
        let finite_or_zero = |value: f64| if value.is_finite() { value } else { 0.0 };

        quote.open = positive_or(quote.open, quote.price);
        quote.high = positive_or(quote.high, quote.price)
            .max(quote.price)
            .max(quote.open);
        quote.low = positive_or(quote.low, quote.price)
            .min(quote.price)
            .min(quote.open);
        quote.volume = finite_or_zero(quote.volume).max(0.0);
        quote.turnover = finite_or_zero(quote.turnover).max(0.0);
        quote.change = finite_or_zero(quote.change);
        quote.change_pct = finite_or_zero(quote.change_pct);

        let previous = quote.price - quote.change;
        if quote.change_pct == 0.0 && quote.change != 0.0 && previous > 0.0 {
            quote.change_pct = quote.change / previous * 100.0;
        }

        Ok(quote)
    }

    fn smooth_jumps(&self, rows: &mut [Row], rng: &mut fastrand::Rng) -> bool {
        let mut changed = false;
        for index in 1..rows.len() {
            let previous_close = rows[index - 1].close;
            let row = &mut rows[index];
            let jump = (row.close / previous_close - 1.0).abs();
            if jump <= self.config.jump_threshold {
                continue;
            }

            let offset = (rng.f64() * 2.0 - 1.0) * self.config.jitter;
            let close = previous_close * (1.0 + offset);
            row.open = previous_close;
            row.close = close;
            row.high = previous_close.max(close);
            row.low = previous_close.min(close);
            changed = true;
        }
        changed
    }

    fn clamp_outliers(&self, rows: &mut [Row]) -> bool {
        let mut changed = false;
        for column in Column::ALL {
            let values: Vec<f64> = rows.iter().map(|row| column.get(row)).collect();
            let (mean, stddev) = mean_stddev(&values);
            if !(stddev > 0.0) {
                continue;
            }
            let median = median(&values);
            for row in rows.iter_mut() {
                let value = column.get(row);
                if ((value - mean) / stddev).abs() > self.config.zscore_threshold && value != median {
                    column.set(row, median);
                    changed = true;
                }
            }
        }
        changed
    }

    fn sanitize_volume(&self, rows: &mut [Row]) -> bool {
        let mut changed = false;
        for row in rows.iter_mut() {
            if row.volume < 0.0 {
                row.set_volume(0.0);
                changed = true;
            }
        }

        let volumes: Vec<f64> = rows.iter().map(|row| row.volume).collect();
        let (_, stddev) = mean_stddev(&volumes);
        let median = median(&volumes);
        let threshold = median + self.config.volume_spike_sigma * stddev;
        let cap = self.config.volume_clamp_multiple * median;
        if !(stddev > 0.0) {
            return changed;
        }

        for row in rows.iter_mut() {
            if row.volume > threshold && row.volume > cap {
                row.set_volume(cap);
                changed = true;
            }
        }
        changed
    }
}

/// Drops unusable rows, fills gaps, sorts and dedupes by timestamp.
fn coerce(raw: Vec<crate::RawBar>) -> Vec<Row> {
    let positive = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0);

    let mut usable: Vec<(UtcDateTime, crate::RawBar)> = raw
        .into_iter()
        .filter_map(|bar| {
            let ts = bar.ts?;
            positive(bar.close)?;
            Some((ts, bar))
        })
        .collect();

    // Stable sort keeps arrival order among equal timestamps; the later one wins.
    usable.sort_by_key(|(ts, _)| *ts);
    let mut deduped: Vec<(UtcDateTime, crate::RawBar)> = Vec::with_capacity(usable.len());
    for entry in usable {
        match deduped.last_mut() {
            Some(last) if last.0 == entry.0 => *last = entry,
            _ => deduped.push(entry),
        }
    }

    let mut rows = Vec::with_capacity(deduped.len());
    let mut previous_close: Option<f64> = None;
    for (ts, bar) in deduped {
        let close = positive(bar.close).unwrap_or_default();
        let open = positive(bar.open).unwrap_or(previous_close.unwrap_or(close));
        let high = positive(bar.high).unwrap_or(open.max(close));
        let low = positive(bar.low).unwrap_or(open.min(close));
        let volume = bar.volume.filter(|v| v.is_finite()).unwrap_or(0.0);
        let buy = bar.buy_volume.filter(|v| v.is_finite() && *v >= 0.0);
        rows.push(Row {
            ts,
            open,
            high,
            low,
            close,
            volume,
            buy,
        });
        previous_close = Some(close);
    }
    rows
}

fn repair_ohlc(rows: &mut [Row]) -> bool {
    let mut changed = false;
    for row in rows.iter_mut() {
        let before = (row.high, row.low);
        if row.high < row.low {
            row.high = row.low;
        }
        let top = row.open.max(row.close);
        if row.high < top {
            row.high = top;
        }
        let bottom = row.open.min(row.close);
        if row.low > bottom {
            row.low = bottom;
        }
        changed |= before != (row.high, row.low);
    }
    changed
}

fn clamp_to_range(rows: &mut [Row], range: PriceRange) -> bool {
    let mut changed = false;
    for row in rows.iter_mut() {
        for column in Column::ALL {
            let value = column.get(row);
            let clamped = range.clamp(value);
            if clamped != value {
                column.set(row, clamped);
                changed = true;
            }
        }
    }
    changed
}

fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
