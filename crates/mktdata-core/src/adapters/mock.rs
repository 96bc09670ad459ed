use time::{Duration, Weekday};

use crate::config::PriceBounds;
use crate::volume::VolumeDecomposer;
use crate::{Bar, MarketKind, ProviderId, Quote, Series, Symbol, UtcDateTime, VolumeSplit};

/// Largest close-to-close move of a synthetic day.
const DAILY_MOVE: f64 = 0.02;

/// Deterministic stand-in data for when every provider failed.
///
/// Output is always tagged [`ProviderId::Mock`] and structurally valid: bars
/// satisfy the OHLC invariants, stay inside the market's price range and carry
/// an estimated volume split. The same symbol always walks the same path.
#[derive(Debug, Clone, Default)]
pub struct SyntheticGenerator {
    bounds: PriceBounds,
    decomposer: VolumeDecomposer,
}

impl SyntheticGenerator {
    pub fn new(bounds: PriceBounds, decomposer: VolumeDecomposer) -> Self {
        Self { bounds, decomposer }
    }

    pub fn history(&self, symbol: &Symbol, market: MarketKind, days: u32) -> Series {
        let range = self.bounds.for_market(market);
        let seed = symbol_seed(symbol);
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut close = range.clamp(anchor_price(seed, market));

        let sessions = trading_days(market, days, UtcDateTime::now().start_of_day());
        let mut bars = Vec::with_capacity(sessions.len());
        for ts in sessions {
            let open = close;
            close = range.clamp(open * (1.0 + (rng.f64() * 2.0 - 1.0) * DAILY_MOVE));
            let high = range.clamp(open.max(close) * (1.0 + rng.f64() * DAILY_MOVE / 2.0));
            let low = range.clamp(open.min(close) * (1.0 - rng.f64() * DAILY_MOVE / 2.0));
            bars.push(Bar {
                ts,
                open,
                high,
                low,
                close,
                volume: (10_000.0 + rng.f64() * 90_000.0).round(),
                buy_volume: 0.0,
                sell_volume: 0.0,
            });
        }
        self.decomposer.decompose(&mut bars);

        Series::new(symbol.clone(), market, ProviderId::Mock, VolumeSplit::Estimated, bars)
    }

    pub fn quote(&self, symbol: &Symbol, market: MarketKind) -> Quote {
        let series = self.history(symbol, market, 2);
        let (previous_close, last) = match series.bars.as_slice() {
            [.., previous, last] => (previous.close, *last),
            _ => {
                let price = self
                    .bounds
                    .for_market(market)
                    .clamp(anchor_price(symbol_seed(symbol), market));
                return flat_quote(symbol, market, price);
            }
        };

        let change = last.close - previous_close;
        Quote {
            symbol: symbol.clone(),
            market,
            price: last.close,
            change,
            change_pct: change / previous_close * 100.0,
            high: last.high,
            low: last.low,
            open: last.open,
            volume: last.volume,
            turnover: last.volume * last.close,
            source: ProviderId::Mock,
            timestamp: UtcDateTime::now(),
        }
    }
}

fn flat_quote(symbol: &Symbol, market: MarketKind, price: f64) -> Quote {
    Quote {
        symbol: symbol.clone(),
        market,
        price,
        change: 0.0,
        change_pct: 0.0,
        high: price,
        low: price,
        open: price,
        volume: 0.0,
        turnover: 0.0,
        source: ProviderId::Mock,
        timestamp: UtcDateTime::now(),
    }
}

fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol
        .as_str()
        .bytes()
        .fold(11_u64, |acc, byte| acc.wrapping_mul(31).wrapping_add(u64::from(byte)))
}

/// Plausible starting level per market, varied by symbol.
fn anchor_price(seed: u64, market: MarketKind) -> f64 {
    let level = match market {
        MarketKind::Crypto => 1_000.0,
        MarketKind::UsEquity => 100.0,
        MarketKind::HkEquity => 50.0,
        MarketKind::CnEquity => 20.0,
    };
    level * (0.5 + (seed % 1_000) as f64 / 1_000.0)
}

/// The last `days` sessions up to and including `today`, oldest first.
fn trading_days(market: MarketKind, days: u32, today: UtcDateTime) -> Vec<UtcDateTime> {
    let wanted = days as usize;
    let mut sessions = Vec::with_capacity(wanted);
    let mut day = today;
    while sessions.len() < wanted {
        let weekday = day.into_inner().weekday();
        let weekend = matches!(weekday, Weekday::Saturday | Weekday::Sunday);
        if market.trades_weekends() || !weekend {
            sessions.push(day);
        }
        day = day.minus(Duration::days(1));
    }
    sessions.reverse();
    sessions
}
