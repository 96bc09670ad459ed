//! Fallback resolution across providers.
//!
//! [`MarketDataRouter`] owns the adapters, the static route table, one
//! circuit breaker per provider, the cache and the validator. A resolution
//! walks the `(market, operation)` chain strictly in order and stops at the
//! first provider whose payload survives validation. When every provider
//! fails the caller still gets an answer: a synthetic payload tagged
//! [`ProviderId::Mock`], which is never cached.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};

use crate::adapters::{default_adapters, SyntheticGenerator};
use crate::cache::{CacheKey, CacheMode, CachePayload, CacheStore};
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::{PipelineConfig, MAX_BATCH_LIMIT};
use crate::data_source::{DataSource, HistoryRequest, Operation, QuoteRequest, SourceError};
use crate::fx::CurrencyConverter;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::registry::{ProviderSpec, RouteTable};
use crate::validator::Validator;
use crate::volume::VolumeDecomposer;
use crate::{CoreError, MarketKind, ProviderId, Quote, RawSeries, Series, Symbol, ValidationError};

type InvokeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// One provider that was tried, or skipped, and why it did not answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub provider: ProviderId,
    pub error: SourceError,
}

impl AttemptFailure {
    pub const fn code(&self) -> &'static str {
        self.error.code()
    }
}

/// Result of a resolution plus how it was reached.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub data: T,
    pub source: ProviderId,
    /// Providers considered, in the order they were walked.
    pub source_chain: Vec<ProviderId>,
    pub attempts: Vec<AttemptFailure>,
    pub cache_hit: bool,
    pub latency_ms: u64,
}

impl<T> Resolved<T> {
    pub fn is_mock(&self) -> bool {
        self.source.is_mock()
    }

    fn from_cache(data: T, source: ProviderId, started: Instant) -> Self {
        Self {
            data,
            source,
            source_chain: Vec::new(),
            attempts: Vec::new(),
            cache_hit: true,
            latency_ms: elapsed_ms(started),
        }
    }
}

/// Chain entry as reported by [`MarketDataRouter::route_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlanEntry {
    pub spec: ProviderSpec,
    /// Whether an adapter for the provider is installed.
    pub registered: bool,
    pub circuit: CircuitState,
}

struct ChainSuccess<T> {
    data: T,
    source: ProviderId,
    source_chain: Vec<ProviderId>,
    attempts: Vec<AttemptFailure>,
}

struct ChainFailure {
    source_chain: Vec<ProviderId>,
    attempts: Vec<AttemptFailure>,
}

/// Cache-first, fallback-chain market data resolver.
pub struct MarketDataRouter {
    adapters: HashMap<ProviderId, Arc<dyn DataSource>>,
    routes: RouteTable,
    breakers: HashMap<ProviderId, CircuitBreaker>,
    cache: CacheStore,
    validator: Validator,
    generator: SyntheticGenerator,
    converter: CurrencyConverter,
    batch_limit: usize,
    batch_concurrency: usize,
}

/// Builder for [`MarketDataRouter`].
///
/// Without explicit adapters the router gets one adapter per upstream, all
/// sharing a single HTTP client.
///
/// ```rust,ignore
/// use mktdata_core::{MarketDataRouterBuilder, MarketKind, PipelineConfig};
///
/// let router = MarketDataRouterBuilder::new(PipelineConfig::from_env()?).build();
/// let series = router.get_history("AAPL", MarketKind::UsEquity, 30).await?;
/// ```
pub struct MarketDataRouterBuilder {
    config: PipelineConfig,
    http: Option<Arc<dyn HttpClient>>,
    adapters: Option<Vec<Arc<dyn DataSource>>>,
    routes: Option<RouteTable>,
}

impl MarketDataRouterBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            http: None,
            adapters: None,
            routes: None,
        }
    }

    /// Transport shared by the default adapters and the currency converter.
    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Replaces the default adapter set.
    pub fn with_adapters(mut self, adapters: Vec<Arc<dyn DataSource>>) -> Self {
        self.adapters = Some(adapters);
        self
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn build(self) -> MarketDataRouter {
        let Self {
            config,
            http,
            adapters,
            routes,
        } = self;

        let http: Arc<dyn HttpClient> = http.unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()) as Arc<dyn HttpClient>);
        let adapters = adapters.unwrap_or_else(|| default_adapters(Arc::clone(&http), &config));
        let routes = routes.unwrap_or_else(|| RouteTable::from_settings(&config.providers));

        let breakers = routes
            .providers()
            .into_iter()
            .map(|id| (id, CircuitBreaker::new(config.circuit_breaker)))
            .collect();

        MarketDataRouter {
            adapters: adapters
                .into_iter()
                .map(|adapter| (adapter.id(), adapter))
                .collect(),
            routes,
            breakers,
            cache: CacheStore::new(config.cache),
            validator: Validator::new(
                config.validator,
                config.bounds,
                VolumeDecomposer::new(config.volume),
            ),
            generator: SyntheticGenerator::new(config.bounds, VolumeDecomposer::new(config.volume)),
            converter: CurrencyConverter::with_http(http, config.fx.clone(), config.retry.clone()),
            batch_limit: config.batch_limit.min(MAX_BATCH_LIMIT),
            batch_concurrency: config.batch_concurrency.max(1),
        }
    }
}

impl MarketDataRouter {
    pub fn builder(config: PipelineConfig) -> MarketDataRouterBuilder {
        MarketDataRouterBuilder::new(config)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn converter(&self) -> &CurrencyConverter {
        &self.converter
    }

    /// Validated daily bars for the last `days` sessions.
    ///
    /// # Errors
    ///
    /// Only for invalid input (symbol, `days`). Upstream failures end in a
    /// mock series instead.
    pub async fn get_history(
        &self,
        symbol: &str,
        market: MarketKind,
        days: u32,
    ) -> Result<Arc<Series>, CoreError> {
        Ok(self
            .resolve_history(symbol, market, days, CacheMode::Use)
            .await?
            .data)
    }

    pub async fn get_quote(&self, symbol: &str, market: MarketKind) -> Result<Quote, CoreError> {
        Ok(self.resolve_quote(symbol, market, CacheMode::Use).await?.data)
    }

    pub async fn resolve_history(
        &self,
        symbol: &str,
        market: MarketKind,
        days: u32,
        mode: CacheMode,
    ) -> Result<Resolved<Arc<Series>>, CoreError> {
        let started = Instant::now();
        let symbol = Symbol::for_market(symbol, market)?;
        let request = HistoryRequest::new(symbol.clone(), market, days)?;
        let key = CacheKey::history(&symbol, market, days);

        if mode.reads() {
            if let Some(series) = self.cache.get_history(&key).await {
                tracing::trace!(%key, "history served from cache");
                let source = series.source;
                return Ok(Resolved::from_cache(series, source, started));
            }
        }

        let lock = self.cache.fetch_lock(&key);
        let _in_flight = lock.lock().await;
        if mode.reads() {
            if let Some(series) = self.cache.get_history(&key).await {
                tracing::trace!(%key, "history filled by concurrent fetch");
                let source = series.source;
                return Ok(Resolved::from_cache(series, source, started));
            }
        }

        let validator = &self.validator;
        let outcome = self
            .walk_chain(
                market,
                Operation::History,
                &symbol,
                |source| source.history(request.clone()),
                |raw: RawSeries| validator.validate_series(raw),
            )
            .await;

        Ok(match outcome {
            Ok(success) => {
                let series = Arc::new(success.data);
                if mode.writes() {
                    self.cache
                        .put(key.clone(), CachePayload::History(Arc::clone(&series)))
                        .await;
                    tracing::info!(%key, source = %success.source, bars = series.len(), "history cached");
                }
                Resolved {
                    data: series,
                    source: success.source,
                    source_chain: success.source_chain,
                    attempts: success.attempts,
                    cache_hit: false,
                    latency_ms: elapsed_ms(started),
                }
            }
            Err(failure) => {
                tracing::warn!(
                    %symbol,
                    %market,
                    attempts = failure.attempts.len(),
                    "all providers failed, serving synthetic history"
                );
                Resolved {
                    data: Arc::new(self.generator.history(&symbol, market, days)),
                    source: ProviderId::Mock,
                    source_chain: failure.source_chain,
                    attempts: failure.attempts,
                    cache_hit: false,
                    latency_ms: elapsed_ms(started),
                }
            }
        })
    }

    pub async fn resolve_quote(
        &self,
        symbol: &str,
        market: MarketKind,
        mode: CacheMode,
    ) -> Result<Resolved<Quote>, CoreError> {
        let started = Instant::now();
        let symbol = Symbol::for_market(symbol, market)?;
        let request = QuoteRequest::new(symbol.clone(), market);
        let key = CacheKey::quote(&symbol, market);

        if mode.reads() {
            if let Some(quote) = self.cache.get_quote(&key).await {
                tracing::trace!(%key, "quote served from cache");
                let source = quote.source;
                return Ok(Resolved::from_cache(quote, source, started));
            }
        }

        let lock = self.cache.fetch_lock(&key);
        let _in_flight = lock.lock().await;
        if mode.reads() {
            if let Some(quote) = self.cache.get_quote(&key).await {
                tracing::trace!(%key, "quote filled by concurrent fetch");
                let source = quote.source;
                return Ok(Resolved::from_cache(quote, source, started));
            }
        }

        let validator = &self.validator;
        let outcome = self
            .walk_chain(
                market,
                Operation::Quote,
                &symbol,
                |source| source.quote(request.clone()),
                |quote: Quote| validator.validate_quote(quote),
            )
            .await;

        Ok(match outcome {
            Ok(success) => {
                if mode.writes() {
                    self.cache
                        .put(key.clone(), CachePayload::Quote(success.data.clone()))
                        .await;
                    tracing::info!(%key, source = %success.source, "quote cached");
                }
                Resolved {
                    data: success.data,
                    source: success.source,
                    source_chain: success.source_chain,
                    attempts: success.attempts,
                    cache_hit: false,
                    latency_ms: elapsed_ms(started),
                }
            }
            Err(failure) => {
                tracing::warn!(
                    %symbol,
                    %market,
                    attempts = failure.attempts.len(),
                    "all providers failed, serving synthetic quote"
                );
                Resolved {
                    data: self.generator.quote(&symbol, market),
                    source: ProviderId::Mock,
                    source_chain: failure.source_chain,
                    attempts: failure.attempts,
                    cache_hit: false,
                    latency_ms: elapsed_ms(started),
                }
            }
        })
    }

    /// Quotes for up to `limit` of `symbols`, in input order.
    ///
    /// Symbols that fail to parse or only resolve to synthetic data are left
    /// out rather than failing the batch.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidBatchLimit`] when `limit` is zero or above
    /// the configured batch limit.
    pub async fn get_quotes_batch<S>(
        &self,
        symbols: &[S],
        market: MarketKind,
        limit: usize,
    ) -> Result<Vec<Quote>, CoreError>
    where
        S: AsRef<str>,
    {
        if limit == 0 || limit > self.batch_limit {
            return Err(ValidationError::InvalidBatchLimit {
                value: limit,
                max: self.batch_limit,
            }
            .into());
        }

        let quotes: Vec<Quote> = stream::iter(symbols.iter().take(limit))
            .map(|symbol| async move {
                let symbol: &str = symbol.as_ref();
                match self.resolve_quote(symbol, market, CacheMode::Use).await {
                    Ok(resolved) if !resolved.is_mock() => Some(resolved.data),
                    Ok(_) => {
                        tracing::debug!(symbol, %market, "dropping synthetic quote from batch");
                        None
                    }
                    Err(error) => {
                        tracing::debug!(symbol, %market, error = %error, "dropping invalid batch symbol");
                        None
                    }
                }
            })
            .buffered(self.batch_concurrency)
            .filter_map(|quote| async move { quote })
            .collect()
            .await;
        Ok(quotes)
    }

    /// The chain for `(market, operation)` with each provider's live state.
    pub fn route_plan(&self, market: MarketKind, operation: Operation) -> Vec<RoutePlanEntry> {
        self.routes
            .chain(market, operation)
            .iter()
            .map(|spec| RoutePlanEntry {
                spec: spec.clone(),
                registered: self.adapters.contains_key(&spec.id),
                circuit: self
                    .breakers
                    .get(&spec.id)
                    .map(CircuitBreaker::state)
                    .unwrap_or(CircuitState::Closed),
            })
            .collect()
    }

    async fn walk_chain<R, T, F, V>(
        &self,
        market: MarketKind,
        operation: Operation,
        symbol: &Symbol,
        mut invoke: F,
        accept: V,
    ) -> Result<ChainSuccess<T>, ChainFailure>
    where
        F: for<'a> FnMut(&'a dyn DataSource) -> InvokeFuture<'a, R>,
        V: Fn(R) -> Result<T, SourceError>,
    {
        let chain = self.routes.chain(market, operation);
        let mut source_chain = Vec::with_capacity(chain.len());
        let mut attempts = Vec::new();

        for (index, spec) in chain.iter().enumerate() {
            let provider = spec.id;
            source_chain.push(provider);

            let Some(adapter) = self.adapters.get(&provider) else {
                attempts.push(AttemptFailure {
                    provider,
                    error: SourceError::configuration(format!("no adapter registered for '{provider}'")),
                });
                continue;
            };
            if !adapter.capabilities().supports(operation) {
                attempts.push(AttemptFailure {
                    provider,
                    error: SourceError::unsupported_operation(operation),
                });
                continue;
            }
            if !adapter.supports_market(market) {
                attempts.push(AttemptFailure {
                    provider,
                    error: SourceError::unsupported_market(provider, market),
                });
                continue;
            }

            let breaker = self.breakers.get(&provider);
            if breaker.is_some_and(|breaker| !breaker.allow_request()) {
                tracing::debug!(%provider, %market, %symbol, "circuit open, skipping provider");
                attempts.push(AttemptFailure {
                    provider,
                    error: SourceError::circuit_open(provider),
                });
                continue;
            }

            tracing::debug!(
                %provider,
                %market,
                %symbol,
                %operation,
                attempt = index + 1,
                "trying provider"
            );
            let outcome = invoke(adapter.as_ref()).await.and_then(&accept);
            if let Some(breaker) = breaker {
                breaker.record(&outcome);
            }
            match outcome {
                Ok(data) => {
                    return Ok(ChainSuccess {
                        data,
                        source: provider,
                        source_chain,
                        attempts,
                    });
                }
                Err(error) => {
                    tracing::warn!(%provider, %market, %symbol, code = error.code(), error = %error, "provider failed");
                    attempts.push(AttemptFailure { provider, error });
                }
            }
        }

        Err(ChainFailure {
            source_chain,
            attempts,
        })
    }
}

impl std::fmt::Debug for MarketDataRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut adapters: Vec<ProviderId> = self.adapters.keys().copied().collect();
        adapters.sort();
        f.debug_struct("MarketDataRouter")
            .field("adapters", &adapters)
            .field("routes", &self.routes)
            .field("batch_limit", &self.batch_limit)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
