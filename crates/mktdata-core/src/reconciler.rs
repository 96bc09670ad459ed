//! Crypto spot price reconciliation across quote currencies.
//!
//! A single pair can be stale or mispriced. The reconciler asks for the same
//! base asset against the primary and backup quote currencies, drops samples
//! outside the Tukey fences and reports the median of the rest.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::data_source::SourceFuture;
use crate::SourceError;

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub primary_quote: String,
    pub backup_quotes: Vec<String>,
    /// Pair queries in flight at once.
    pub concurrency: usize,
    pub iqr_multiplier: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            primary_quote: String::from("USDT"),
            backup_quotes: vec![String::from("USDC"), String::from("FDUSD")],
            concurrency: 3,
            iqr_multiplier: 1.5,
        }
    }
}

impl ReconcilerConfig {
    /// Primary quote currency first, then at most two backups.
    pub fn quote_currencies(&self) -> Vec<&str> {
        std::iter::once(self.primary_quote.as_str())
            .chain(self.backup_quotes.iter().take(2).map(String::as_str))
            .collect()
    }
}

/// Exchange able to price a `base/quote` pair.
pub trait PairPriceSource: Send + Sync {
    /// Last traded price of the pair.
    fn pair_price<'a>(&'a self, base: &'a str, quote: &'a str) -> SourceFuture<'a, f64>;

    /// 24h volume-weighted average price of the pair.
    fn weighted_average_price<'a>(&'a self, base: &'a str, quote: &'a str)
        -> SourceFuture<'a, f64>;
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledPrice {
    pub price: f64,
    /// Every price retrieved, outliers included.
    pub samples: Vec<f64>,
    /// Whether the 24h weighted average stood in for direct pair prices.
    pub used_weighted_average: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PriceReconciler {
    config: ReconcilerConfig,
}

impl PriceReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Queries all configured pairs for `base` concurrently and reconciles them.
    ///
    /// # Errors
    ///
    /// Returns the weighted-average failure when every direct pair query and
    /// the fallback fail.
    pub async fn reconcile<S>(&self, source: &S, base: &str) -> Result<ReconciledPrice, SourceError>
    where
        S: PairPriceSource + ?Sized,
    {
        // Futures are created up front so the stream holds no borrowing closure.
        let lookups: Vec<_> = self
            .config
            .quote_currencies()
            .into_iter()
            .map(|quote| {
                let price = source.pair_price(base, quote);
                async move { (quote.to_owned(), price.await) }
            })
            .collect();
        let results: Vec<(String, Result<f64, SourceError>)> = stream::iter(lookups)
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut samples = Vec::with_capacity(results.len());
        for (quote, result) in results {
            match result {
                Ok(price) if price.is_finite() && price > 0.0 => samples.push(price),
                Ok(price) => {
                    tracing::debug!(base, quote = %quote, price, "discarding non-positive pair price");
                }
                Err(error) => {
                    tracing::debug!(base, quote = %quote, error = %error, "pair price unavailable");
                }
            }
        }

        if samples.is_empty() {
            let primary = self.config.primary_quote.as_str();
            tracing::warn!(base, quote = primary, "all pair prices failed, using 24h weighted average");
            let price = source.weighted_average_price(base, primary).await?;
            if !(price.is_finite() && price > 0.0) {
                return Err(SourceError::no_data(format!(
                    "weighted average price for {base}/{primary} is not positive"
                )));
            }
            return Ok(ReconciledPrice {
                price,
                samples: vec![price],
                used_weighted_average: true,
            });
        }

        let price = robust_price(&samples, self.config.iqr_multiplier).unwrap_or(samples[0]);
        Ok(ReconciledPrice {
            price,
            samples,
            used_weighted_average: false,
        })
    }
}

/// Median of the samples inside `[Q1 - k*IQR, Q3 + k*IQR]`.
///
/// Quartiles use linear interpolation between order statistics. Falls back to
/// the unfiltered median when filtering leaves nothing.
pub fn robust_price(samples: &[f64], iqr_multiplier: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - iqr_multiplier * iqr;
    let upper = q3 + iqr_multiplier * iqr;

    let kept: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|value| *value >= lower && *value <= upper)
        .collect();

    if kept.is_empty() {
        Some(sorted_median(&sorted))
    } else {
        Some(sorted_median(&kept))
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

fn sorted_median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    struct FixedPrices {
        prices: HashMap<String, f64>,
        weighted: Option<f64>,
        calls: Mutex<Vec<String>>,
    }

    impl FixedPrices {
        fn new(prices: &[(&str, f64)], weighted: Option<f64>) -> Self {
            Self {
                prices: prices
                    .iter()
                    .map(|(quote, price)| ((*quote).to_owned(), *price))
                    .collect(),
                weighted,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl PairPriceSource for FixedPrices {
        fn pair_price<'a>(&'a self, base: &'a str, quote: &'a str) -> SourceFuture<'a, f64> {
            self.calls.lock().expect("lock").push(format!("{base}{quote}"));
            let result = self
                .prices
                .get(quote)
                .copied()
                .ok_or_else(|| SourceError::upstream_status(400, "Invalid symbol."));
            Box::pin(async move { result })
        }

        fn weighted_average_price<'a>(&'a self, _base: &'a str, _quote: &'a str) -> SourceFuture<'a, f64> {
            let result = self
                .weighted
                .ok_or_else(|| SourceError::transient_network("down"));
            Box::pin(async move { result })
        }
    }

    #[test]
    fn outlier_is_excluded_from_the_median() {
        let price = robust_price(&[100.0, 101.0, 99.0, 1_000_000.0], 1.5).expect("price");
        assert_eq!(price, 100.0);
    }

    #[test]
    fn single_sample_is_returned_as_is() {
        assert_eq!(robust_price(&[42.0], 1.5), Some(42.0));
        assert_eq!(robust_price(&[], 1.5), None);
    }

    #[tokio::test]
    async fn queries_primary_and_two_backups() {
        let source = FixedPrices::new(&[("USDT", 100.0), ("USDC", 100.2), ("FDUSD", 99.8)], None);
        let reconciled = PriceReconciler::default()
            .reconcile(&source, "BTC")
            .await
            .expect("reconciled");

        assert_eq!(reconciled.price, 100.0);
        assert_eq!(reconciled.samples.len(), 3);
        let mut calls = source.calls.lock().expect("lock").clone();
        calls.sort();
        assert_eq!(calls, vec!["BTCFDUSD", "BTCUSDC", "BTCUSDT"]);
    }

    #[tokio::test]
    async fn falls_back_to_weighted_average_when_all_pairs_fail() {
        let source = FixedPrices::new(&[], Some(43_000.0));
        let reconciled = PriceReconciler::default()
            .reconcile(&source, "BTC")
            .await
            .expect("reconciled");

        assert!(reconciled.used_weighted_average);
        assert_eq!(reconciled.price, 43_000.0);
    }

    #[tokio::test]
    async fn fails_when_fallback_fails_too() {
        let source = FixedPrices::new(&[], None);
        let err = PriceReconciler::default()
            .reconcile(&source, "BTC")
            .await
            .expect_err("nothing to reconcile");
        assert!(err.retryable());
    }
}
