use serde::{Deserialize, Serialize};

use crate::Bar;

/// Tunables of the buy/sell volume heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeDecomposerConfig {
    /// Buy share of a bar whose price did not move.
    pub neutral_bias: f64,
    /// Buy share gained per unit of relative price change.
    pub sensitivity: f64,
}

impl Default for VolumeDecomposerConfig {
    fn default() -> Self {
        Self {
            neutral_bias: 0.5,
            sensitivity: 5.0,
        }
    }
}

/// Estimates taker buy/sell volume from price momentum when a provider only
/// reports aggregate volume.
///
/// `buy = volume * clamp(bias + sensitivity * pct_change, 0, 1)`. The result
/// is an estimate, not order flow.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeDecomposer {
    config: VolumeDecomposerConfig,
}

impl VolumeDecomposer {
    pub fn new(config: VolumeDecomposerConfig) -> Self {
        Self { config }
    }

    /// Splits `volume` given the move from `reference` to `close`.
    pub fn split(&self, reference: f64, close: f64, volume: f64) -> (f64, f64) {
        if !(volume > 0.0) {
            return (0.0, 0.0);
        }

        let pct = if reference > 0.0 {
            (close - reference) / reference
        } else {
            0.0
        };
        let share = self.config.neutral_bias + self.config.sensitivity * pct;
        let share = if share.is_finite() {
            share.clamp(0.0, 1.0)
        } else {
            0.5
        };

        let buy = volume * share;
        let sell = volume - buy;
        if buy <= 0.0 && sell <= 0.0 {
            return (volume / 2.0, volume / 2.0);
        }
        (buy, sell)
    }

    /// Overwrites `buy_volume`/`sell_volume` of every bar.
    ///
    /// Each bar is measured against the previous close; the first bar against
    /// its own open.
    pub fn decompose(&self, bars: &mut [Bar]) {
        let mut previous_close = None;
        for bar in bars.iter_mut() {
            let reference = previous_close.unwrap_or(bar.open);
            let (buy, sell) = self.split(reference, bar.close, bar.volume);
            bar.buy_volume = buy;
            bar.sell_volume = sell;
            previous_close = Some(bar.close);
        }
    }
}
