use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{MarketKind, ValidationError};

const MAX_SYMBOL_LEN: usize = 20;

/// Quote currencies stripped from crypto pair notation (`BTCUSDT`, `ETH-USD`).
/// Longest first so `FDUSD` wins over `USD`.
const CRYPTO_QUOTE_SUFFIXES: [&str; 5] = ["FDUSD", "USDT", "USDC", "BUSD", "USD"];

/// Normalized instrument symbol.
///
/// After [`Symbol::for_market`] the value is in the canonical form of its market:
/// crypto base asset (`BTC`), US ticker (`AAPL`), 5-digit HK code (`00700`),
/// 6-digit CN code (`600519`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase without market-specific rules.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '/';
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    /// Parse a symbol and rewrite it into the canonical form for `market`.
    pub fn for_market(input: &str, market: MarketKind) -> Result<Self, ValidationError> {
        let parsed = Self::parse(input)?;
        let raw = parsed.0.as_str();
        let mismatch = || ValidationError::SymbolMarketMismatch {
            value: raw.to_owned(),
            market: market.as_str(),
        };

        let canonical = match market {
            MarketKind::Crypto => {
                let compact: String = raw.chars().filter(|ch| *ch != '-' && *ch != '/').collect();
                let base = CRYPTO_QUOTE_SUFFIXES
                    .iter()
                    .find_map(|suffix| {
                        compact
                            .strip_suffix(suffix)
                            .filter(|base| !base.is_empty())
                    })
                    .unwrap_or(compact.as_str());
                if !base.chars().all(|ch| ch.is_ascii_alphanumeric()) {
                    return Err(mismatch());
                }
                base.to_owned()
            }
            MarketKind::UsEquity => {
                if !raw.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
                    return Err(mismatch());
                }
                raw.to_owned()
            }
            MarketKind::HkEquity => {
                let code = raw.strip_suffix(".HK").unwrap_or(raw);
                if code.is_empty() || code.len() > 5 || !code.chars().all(|ch| ch.is_ascii_digit())
                {
                    return Err(mismatch());
                }
                format!("{code:0>5}")
            }
            MarketKind::CnEquity => {
                let code = [".SS", ".SH", ".SZ"]
                    .iter()
                    .find_map(|suffix| raw.strip_suffix(suffix))
                    .unwrap_or(raw);
                let code = ["SH", "SZ"]
                    .iter()
                    .find_map(|prefix| code.strip_prefix(prefix))
                    .unwrap_or(code);
                if code.len() != 6 || !code.chars().all(|ch| ch.is_ascii_digit()) {
                    return Err(mismatch());
                }
                code.to_owned()
            }
        };

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_symbol() {
        let parsed = Symbol::parse(" aapl ").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "AAPL");
    }

    #[test]
    fn rejects_invalid_chars() {
        let err = Symbol::parse("AAPL$").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidChar { .. }));
    }

    #[test]
    fn crypto_pairs_reduce_to_base_asset() {
        for raw in ["btc", "BTCUSDT", "btc-usd", "BTC/USDC", "BTCFDUSD"] {
            let symbol = Symbol::for_market(raw, MarketKind::Crypto).expect("crypto symbol");
            assert_eq!(symbol.as_str(), "BTC", "input {raw}");
        }
    }

    #[test]
    fn hk_codes_are_zero_padded() {
        let symbol = Symbol::for_market("700.hk", MarketKind::HkEquity).expect("hk symbol");
        assert_eq!(symbol.as_str(), "00700");
    }

    #[test]
    fn cn_codes_strip_exchange_markers() {
        assert_eq!(
            Symbol::for_market("sh600519", MarketKind::CnEquity)
                .expect("prefixed")
                .as_str(),
            "600519"
        );
        assert_eq!(
            Symbol::for_market("000001.SZ", MarketKind::CnEquity)
                .expect("suffixed")
                .as_str(),
            "000001"
        );
        assert!(Symbol::for_market("60051", MarketKind::CnEquity).is_err());
    }

    #[test]
    fn us_tickers_must_start_with_letter() {
        assert!(Symbol::for_market("1AAPL", MarketKind::UsEquity).is_err());
        assert_eq!(
            Symbol::for_market("brk.b", MarketKind::UsEquity)
                .expect("class share")
                .as_str(),
            "BRK.B"
        );
    }
}
