use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Market family of an instrument.
///
/// Decides which provider chain, price bounds and symbol rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Crypto,
    UsEquity,
    HkEquity,
    CnEquity,
}

impl MarketKind {
    pub const ALL: [Self; 4] = [Self::Crypto, Self::UsEquity, Self::HkEquity, Self::CnEquity];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::UsEquity => "us_equity",
            Self::HkEquity => "hk_equity",
            Self::CnEquity => "cn_equity",
        }
    }

    /// Native quote currency of prices reported for this market.
    pub const fn currency(self) -> &'static str {
        match self {
            Self::Crypto => "USDT",
            Self::UsEquity => "USD",
            Self::HkEquity => "HKD",
            Self::CnEquity => "CNY",
        }
    }

    /// Whether the market trades around the clock (affects synthetic calendars).
    pub const fn trades_weekends(self) -> bool {
        matches!(self, Self::Crypto)
    }
}

impl Display for MarketKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "crypto" | "cryptocurrency" => Ok(Self::Crypto),
            "us" | "us_equity" | "us_stocks" => Ok(Self::UsEquity),
            "hk" | "hk_equity" | "hk_stocks" => Ok(Self::HkEquity),
            "cn" | "cn_equity" | "cn_stocks" | "a_share" => Ok(Self::CnEquity),
            other => Err(ValidationError::InvalidMarket {
                value: other.to_owned(),
            }),
        }
    }
}
