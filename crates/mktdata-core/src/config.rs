//! Pipeline configuration.
//!
//! [`PipelineConfig`] is built once at start-up, either from defaults, a JSON
//! document, or `MKTDATA_*` environment variables layered on the defaults,
//! and is read-only afterwards.

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheTtls;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::fx::FxConfig;
use crate::reconciler::ReconcilerConfig;
use crate::retry::{Backoff, RetryConfig};
use crate::validator::ValidatorConfig;
use crate::volume::VolumeDecomposerConfig;
use crate::{MarketKind, ProviderId, ValidationError};

/// Hard ceiling on symbols per batch quote call.
pub const MAX_BATCH_LIMIT: usize = 500;

const ENV_PREFIX: &str = "MKTDATA_";

/// Serializes a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Base URL and request budget of one upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub rate_limit_per_minute: u32,
}

impl ProviderEndpoint {
    fn new(base_url: &str, rate_limit_per_minute: u32) -> Self {
        Self {
            base_url: base_url.to_owned(),
            rate_limit_per_minute,
        }
    }
}

/// Upstream endpoints and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub binance: ProviderEndpoint,
    pub yahoo: ProviderEndpoint,
    pub alphavantage: ProviderEndpoint,
    pub eastmoney: ProviderEndpoint,
    /// Eastmoney serves snapshots from a different host than klines.
    pub eastmoney_quote_url: String,
    pub sina: ProviderEndpoint,
    #[serde(skip_serializing)]
    pub alphavantage_api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            binance: ProviderEndpoint::new("https://api.binance.com", 1200),
            yahoo: ProviderEndpoint::new("https://query1.finance.yahoo.com", 60),
            alphavantage: ProviderEndpoint::new("https://www.alphavantage.co", 5),
            eastmoney: ProviderEndpoint::new("https://push2his.eastmoney.com", 120),
            eastmoney_quote_url: String::from("https://push2.eastmoney.com"),
            sina: ProviderEndpoint::new("https://hq.sinajs.cn", 120),
            alphavantage_api_key: None,
            timeout_ms: crate::http_client::DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ProviderSettings {
    pub fn endpoint(&self, provider: ProviderId) -> Option<&ProviderEndpoint> {
        match provider {
            ProviderId::Binance => Some(&self.binance),
            ProviderId::Yahoo => Some(&self.yahoo),
            ProviderId::Alphavantage => Some(&self.alphavantage),
            ProviderId::Eastmoney => Some(&self.eastmoney),
            ProviderId::Sina => Some(&self.sina),
            ProviderId::Fx | ProviderId::Mock => None,
        }
    }

    fn endpoint_mut(&mut self, provider: ProviderId) -> Option<&mut ProviderEndpoint> {
        match provider {
            ProviderId::Binance => Some(&mut self.binance),
            ProviderId::Yahoo => Some(&mut self.yahoo),
            ProviderId::Alphavantage => Some(&mut self.alphavantage),
            ProviderId::Eastmoney => Some(&mut self.eastmoney),
            ProviderId::Sina => Some(&mut self.sina),
            ProviderId::Fx | ProviderId::Mock => None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// API key with blank values treated as absent.
    pub fn alphavantage_key(&self) -> Option<&str> {
        self.alphavantage_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Inclusive price range accepted for one market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }

    pub fn clamp(self, price: f64) -> f64 {
        price.clamp(self.min, self.max)
    }
}

/// Per-market sanity bounds for prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceBounds {
    pub crypto: PriceRange,
    pub us_equity: PriceRange,
    pub hk_equity: PriceRange,
    pub cn_equity: PriceRange,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            crypto: PriceRange::new(1e-8, 10_000_000.0),
            us_equity: PriceRange::new(0.01, 1_000_000.0),
            hk_equity: PriceRange::new(0.001, 100_000.0),
            cn_equity: PriceRange::new(0.01, 100_000.0),
        }
    }
}

impl PriceBounds {
    pub const fn for_market(&self, market: MarketKind) -> PriceRange {
        match market {
            MarketKind::Crypto => self.crypto,
            MarketKind::UsEquity => self.us_equity,
            MarketKind::HkEquity => self.hk_equity,
            MarketKind::CnEquity => self.cn_equity,
        }
    }

    fn for_market_mut(&mut self, market: MarketKind) -> &mut PriceRange {
        match market {
            MarketKind::Crypto => &mut self.crypto,
            MarketKind::UsEquity => &mut self.us_equity,
            MarketKind::HkEquity => &mut self.hk_equity,
            MarketKind::CnEquity => &mut self.cn_equity,
        }
    }
}

/// Complete configuration surface of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub providers: ProviderSettings,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheTtls,
    pub bounds: PriceBounds,
    pub validator: ValidatorConfig,
    pub volume: VolumeDecomposerConfig,
    pub reconciler: ReconcilerConfig,
    pub fx: FxConfig,
    pub batch_limit: usize,
    pub batch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            providers: ProviderSettings::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheTtls::default(),
            bounds: PriceBounds::default(),
            validator: ValidatorConfig::default(),
            volume: VolumeDecomposerConfig::default(),
            reconciler: ReconcilerConfig::default(),
            fx: FxConfig::default(),
            batch_limit: MAX_BATCH_LIMIT,
            batch_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Parses a JSON document; missing sections keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(input).map_err(|e| ValidationError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `MKTDATA_*` environment variables.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefixed = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };
        let mut config = Self::default();

        config.providers.alphavantage_api_key = prefixed("ALPHAVANTAGE_API_KEY")
            .or_else(|| lookup("ALPHAVANTAGE_API_KEY"))
            .filter(|value| !value.trim().is_empty());

        for provider in ProviderId::UPSTREAM {
            let name = provider.as_str().to_ascii_uppercase();
            let base_url = prefixed(&format!("{name}_BASE_URL"));
            let rate_limit = parse_var(&prefixed, &format!("{name}_RATE_LIMIT"))?;
            if let Some(endpoint) = config.providers.endpoint_mut(provider) {
                if let Some(url) = base_url {
                    endpoint.base_url = url;
                }
                if let Some(limit) = rate_limit {
                    endpoint.rate_limit_per_minute = limit;
                }
            }
        }
        if let Some(url) = prefixed("EASTMONEY_QUOTE_URL") {
            config.providers.eastmoney_quote_url = url;
        }
        if let Some(timeout_ms) = parse_var(&prefixed, "TIMEOUT_MS")? {
            config.providers.timeout_ms = timeout_ms;
        }

        if let Some(max_attempts) = parse_var(&prefixed, "RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(base_ms) = parse_var::<u64, _>(&prefixed, "RETRY_BASE_MS")? {
            if let Backoff::Exponential { base, .. } = &mut config.retry.backoff {
                *base = Duration::from_millis(base_ms);
            }
        }

        if let Some(secs) = parse_var(&prefixed, "QUOTE_TTL_SECS")? {
            config.cache.quote = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&prefixed, "HISTORY_TTL_SECS")? {
            config.cache.history = Duration::from_secs(secs);
        }

        for market in MarketKind::ALL {
            let key = format!("BOUNDS_{}", market.as_str().to_ascii_uppercase());
            if let Some(raw) = prefixed(&key) {
                *config.bounds.for_market_mut(market) = parse_range(&raw)?;
            }
        }

        if let Some(seed) = parse_var(&prefixed, "VALIDATOR_SEED")? {
            config.validator.seed = Some(seed);
        }
        if let Some(limit) = parse_var(&prefixed, "BATCH_LIMIT")? {
            config.batch_limit = limit;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_alphavantage_key(mut self, key: impl Into<String>) -> Self {
        self.providers.alphavantage_api_key = Some(key.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.batch_limit == 0 || self.batch_limit > MAX_BATCH_LIMIT {
            return Err(ValidationError::InvalidBatchLimit {
                value: self.batch_limit,
                max: MAX_BATCH_LIMIT,
            });
        }
        if self.batch_concurrency == 0 {
            return Err(invalid("batch_concurrency must be at least 1"));
        }
        for market in MarketKind::ALL {
            let range = self.bounds.for_market(market);
            if !(range.min.is_finite() && range.max.is_finite() && range.min > 0.0 && range.min < range.max) {
                return Err(invalid(format!(
                    "price bounds for {market} must satisfy 0 < min < max"
                )));
            }
        }
        if !(self.validator.jump_threshold > 0.0 && self.validator.jitter >= 0.0) {
            return Err(invalid("validator thresholds must be positive"));
        }
        if self.validator.jitter >= self.validator.jump_threshold {
            return Err(invalid("validator.jitter must be below validator.jump_threshold"));
        }
        if self.reconciler.concurrency == 0 {
            return Err(invalid("reconciler.concurrency must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        message: message.into(),
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ValidationError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| invalid(format!("{ENV_PREFIX}{name} has invalid value '{raw}'")))
        })
        .transpose()
}

fn parse_range(raw: &str) -> Result<PriceRange, ValidationError> {
    let (min, max) = raw
        .split_once(',')
        .ok_or_else(|| invalid(format!("price range '{raw}' must be 'min,max'")))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("price range '{raw}' must be numeric")))
    };
    Ok(PriceRange::new(parse(min)?, parse(max)?))
}

/// Static reference rates used when the FX upstream is unreachable.
pub(crate) fn default_static_rates() -> BTreeMap<String, f64> {
    [
        ("USD", 1.0),
        ("USDT", 1.0),
        ("USDC", 1.0),
        ("HKD", 7.8),
        ("CNY", 7.2),
        ("EUR", 0.92),
        ("JPY", 150.0),
    ]
    .into_iter()
    .map(|(code, rate)| (code.to_owned(), rate))
    .collect()
}
