//! Property tests for the validator, the volume decomposer and the
//! crypto reconciler.

use mktdata_core::reconciler::robust_price;
use mktdata_core::{
    MarketKind, PriceBounds, ProviderId, RawBar, RawSeries, Symbol, UtcDateTime, Validator,
    ValidatorConfig, VolumeDecomposer, VolumeDecomposerConfig,
};
use proptest::prelude::*;

const DAY: i64 = 86_400;
const EPOCH_2024: i64 = 1_704_067_200;

fn validator() -> Validator {
    let config = ValidatorConfig {
        seed: Some(7),
        ..ValidatorConfig::default()
    };
    Validator::new(
        config,
        PriceBounds::default(),
        VolumeDecomposer::new(VolumeDecomposerConfig::default()),
    )
}

fn symbol() -> Symbol {
    Symbol::parse("AAPL").expect("symbol")
}

/// Rows as a provider might send them: shuffled days, duplicates, gaps,
/// missing or inconsistent OHLC fields.
fn messy_row() -> impl Strategy<Value = RawBar> {
    (
        proptest::option::weighted(0.95, 0i64..120),
        proptest::option::weighted(0.8, 1.0f64..500.0),
        proptest::option::weighted(0.8, 1.0f64..500.0),
        proptest::option::weighted(0.8, 1.0f64..500.0),
        proptest::option::weighted(0.95, 1.0f64..500.0),
        proptest::option::weighted(0.9, 0.0f64..5e6),
    )
        .prop_map(|(day, open, high, low, close, volume)| RawBar {
            ts: day.map(|day| {
                UtcDateTime::from_unix_seconds(EPOCH_2024 + day * DAY).expect("timestamp")
            }),
            open,
            high,
            low,
            close,
            volume,
            buy_volume: None,
        })
}

/// Well-formed daily walk with moves of at most 3%.
fn steady_rows() -> impl Strategy<Value = Vec<RawBar>> {
    (
        10.0f64..400.0,
        proptest::collection::vec((-0.03f64..0.03, 1e5f64..2e6), 5..60),
    )
        .prop_map(|(start, steps)| {
            let mut close = start;
            steps
                .into_iter()
                .enumerate()
                .map(|(day, (step, volume))| {
                    let open = close;
                    close *= 1.0 + step;
                    let ts = UtcDateTime::from_unix_seconds(EPOCH_2024 + day as i64 * DAY)
                        .expect("timestamp");
                    RawBar::ohlcv(
                        ts,
                        open,
                        open.max(close) * 1.005,
                        open.min(close) * 0.995,
                        close,
                        volume,
                    )
                })
                .collect()
        })
}

fn raw(rows: Vec<RawBar>) -> RawSeries {
    RawSeries::new(symbol(), MarketKind::UsEquity, ProviderId::Yahoo, rows)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn validated_bars_keep_ohlc_order(rows in proptest::collection::vec(messy_row(), 1..80)) {
        if let Ok(series) = validator().validate_series(raw(rows)) {
            for bar in &series.bars {
                prop_assert!(bar.low <= bar.open && bar.open <= bar.high, "{bar:?}");
                prop_assert!(bar.low <= bar.close && bar.close <= bar.high, "{bar:?}");
                prop_assert!(bar.low > 0.0);
                prop_assert!(bar.volume >= 0.0);
            }
        }
    }

    #[test]
    fn validated_timestamps_strictly_increase(rows in proptest::collection::vec(messy_row(), 1..80)) {
        if let Ok(series) = validator().validate_series(raw(rows)) {
            prop_assert!(!series.bars.is_empty());
            for pair in series.bars.windows(2) {
                prop_assert!(pair[0].ts < pair[1].ts);
            }
        }
    }

    #[test]
    fn buy_and_sell_always_sum_to_volume(rows in proptest::collection::vec(messy_row(), 1..80)) {
        if let Ok(series) = validator().validate_series(raw(rows)) {
            for bar in &series.bars {
                prop_assert!(bar.buy_volume >= 0.0 && bar.sell_volume >= 0.0);
                prop_assert!(bar.volume_split_balances(), "{bar:?}");
            }
        }
    }

    #[test]
    fn revalidating_a_clean_series_changes_nothing(rows in steady_rows()) {
        let validator = validator();
        let once = validator.validate_series(raw(rows)).expect("steady rows are usable");
        let twice = validator.revalidate(&once).expect("revalidate");
        prop_assert_eq!(&once.bars, &twice.bars);
        prop_assert_eq!(once.volume_split, twice.volume_split);
    }

    #[test]
    fn robust_price_stays_inside_the_sample_range(
        samples in proptest::collection::vec(1.0f64..1e5, 1..12),
    ) {
        let price = robust_price(&samples, 1.5).expect("non-empty samples");
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(price >= min && price <= max);
    }
}

#[test]
fn robust_price_ignores_a_single_wild_exchange() {
    let price = robust_price(&[100.0, 101.0, 99.0, 100.5, 99.5, 1e6], 1.5);
    assert_eq!(price, Some(100.0));
}

#[test]
fn rows_without_close_are_rejected_as_a_whole() {
    let rows = vec![RawBar {
        ts: UtcDateTime::from_unix_seconds(EPOCH_2024).ok(),
        open: Some(10.0),
        high: Some(11.0),
        low: Some(9.0),
        close: None,
        volume: Some(100.0),
        buy_volume: None,
    }];
    let error = validator().validate_series(raw(rows)).expect_err("no usable row");
    assert_eq!(error.kind(), mktdata_core::SourceErrorKind::ValidationFailure);
}
