//! # mktdata Core
//!
//! Multi-source market data acquisition for crypto, US, Hong Kong and
//! mainland China listings.
//!
//! ## Overview
//!
//! A request for daily bars or a real-time quote is answered from the cache
//! when a fresh entry exists. Otherwise the router walks the provider chain
//! configured for the market, validates and repairs the first usable payload,
//! caches it and returns it. When every provider fails the caller receives a
//! clearly tagged synthetic payload (`source = "mock"`) instead of an error.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Binance, Yahoo, Alpha Vantage, Eastmoney and Sina adapters plus the synthetic generator |
//! | [`cache`] | TTL cache with per-key fetch locks |
//! | [`circuit_breaker`] | Per-provider circuit breaker |
//! | [`config`] | Pipeline configuration and env loading |
//! | [`data_source`] | Adapter trait, requests and [`SourceError`] |
//! | [`domain`] | Bars, series, quotes, symbols, markets, timestamps |
//! | [`error`] | Caller-facing error types |
//! | [`fx`] | Currency conversion |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`reconciler`] | Multi-pair crypto price reconciliation |
//! | [`registry`] | Provider specs and route table |
//! | [`retry`] | Retrying HTTP client |
//! | [`routing`] | Cache-first fallback resolution |
//! | [`throttling`] | Per-provider rate gate |
//! | [`validator`] | Series and quote validation/repair |
//! | [`volume`] | Buy/sell volume decomposition |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mktdata_core::{MarketDataRouter, MarketKind, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = MarketDataRouter::builder(PipelineConfig::from_env()?).build();
//!
//!     let series = router.get_history("AAPL", MarketKind::UsEquity, 30).await?;
//!     println!("{} bars from {}", series.len(), series.source);
//!
//!     let quote = router.get_quote("600519", MarketKind::CnEquity).await?;
//!     println!("{} @ {}", quote.symbol, quote.price);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ MarketDataRouter│────▶│ CacheStore       │
//! └────────┬────────┘     └──────────────────┘
//!          │ chain per (market, operation)
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ DataSource      │────▶│ RetryingClient   │
//! │ (adapters)      │     │ + RateGate       │
//! └────────┬────────┘     └──────────────────┘
//!          │ RawSeries / Quote
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Validator       │────▶│ VolumeDecomposer │
//! └─────────────────┘     └──────────────────┘
//! ```

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod fx;
pub mod http_client;
pub mod reconciler;
pub mod registry;
pub mod retry;
pub mod routing;
pub mod source;
pub mod throttling;
pub mod validator;
pub mod volume;

// Adapters
pub use adapters::{
    AlphaVantageAdapter, BinanceAdapter, EastmoneyAdapter, SinaAdapter, SyntheticGenerator,
    YahooAdapter,
};

// Caching
pub use cache::{CacheKey, CacheMode, CachePayload, CacheStore, CacheTtls};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Configuration
pub use config::{PipelineConfig, PriceBounds, PriceRange, ProviderEndpoint, ProviderSettings};

// Data source trait and types
pub use data_source::{
    CapabilitySet, DataSource, HistoryRequest, Operation, QuoteRequest, SourceError,
    SourceErrorKind, SourceFuture, MAX_HISTORY_DAYS,
};

// Domain models
pub use domain::{
    Bar, MarketKind, Quote, RawBar, RawSeries, Series, Symbol, UtcDateTime, VolumeSplit,
};

// Error types
pub use error::{CoreError, ValidationError};

// Currency conversion
pub use fx::{CurrencyConverter, FxConfig, RateOrigin};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Reconciliation
pub use reconciler::{PairPriceSource, PriceReconciler, ReconciledPrice, ReconcilerConfig};

// Registry
pub use registry::{ProviderSpec, RouteTable, RouteTableBuilder};

// Retry logic
pub use retry::{Backoff, RetryConfig, RetryingClient};

// Routing types
pub use routing::{AttemptFailure, MarketDataRouter, MarketDataRouterBuilder, Resolved, RoutePlanEntry};

// Source identifiers
pub use source::ProviderId;

// Throttling
pub use throttling::RateGate;

// Validation
pub use validator::{Validator, ValidatorConfig};
pub use volume::{VolumeDecomposer, VolumeDecomposerConfig};
