use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers carried as `source` metadata on every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Binance,
    Yahoo,
    Alphavantage,
    Eastmoney,
    Sina,
    /// Exchange-rate upstream used by the currency converter.
    Fx,
    /// Synthetic data produced after every real provider failed.
    Mock,
}

impl ProviderId {
    /// Market-data upstreams; excludes the FX feed and the synthetic generator.
    pub const UPSTREAM: [Self; 5] = [
        Self::Binance,
        Self::Yahoo,
        Self::Alphavantage,
        Self::Eastmoney,
        Self::Sina,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Yahoo => "yahoo",
            Self::Alphavantage => "alphavantage",
            Self::Eastmoney => "eastmoney",
            Self::Sina => "sina",
            Self::Fx => "fx",
            Self::Mock => "mock",
        }
    }

    pub const fn is_mock(self) -> bool {
        matches!(self, Self::Mock)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "yahoo" => Ok(Self::Yahoo),
            "alphavantage" | "alpha_vantage" => Ok(Self::Alphavantage),
            "eastmoney" => Ok(Self::Eastmoney),
            "sina" => Ok(Self::Sina),
            "fx" => Ok(Self::Fx),
            "mock" => Ok(Self::Mock),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
