//! In-memory cache for resolved series and quotes.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{MarketKind, Operation, Quote, Series, Symbol};

type FetchLockMap = Arc<std::sync::Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>>;

/// Defines how one call interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a fresh entry if present; otherwise fetch and store. (Default)
    #[default]
    Use,
    /// Skip the read, fetch, and store the new result.
    Refresh,
    /// Neither read nor write.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

/// Time-to-live per operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    #[serde(with = "crate::config::duration_ms", rename = "quote_ttl_ms")]
    pub quote: Duration,
    #[serde(with = "crate::config::duration_ms", rename = "history_ttl_ms")]
    pub history: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            quote: Duration::from_secs(30),
            history: Duration::from_secs(300),
        }
    }
}

impl CacheTtls {
    pub const fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::History => self.history,
            Operation::Quote => self.quote,
        }
    }
}

/// Identity of one cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: Operation,
    market: MarketKind,
    symbol: Symbol,
    days: Option<u32>,
}

impl CacheKey {
    pub fn history(symbol: &Symbol, market: MarketKind, days: u32) -> Self {
        Self {
            operation: Operation::History,
            market,
            symbol: symbol.clone(),
            days: Some(days),
        }
    }

    pub fn quote(symbol: &Symbol, market: MarketKind) -> Self {
        Self {
            operation: Operation::Quote,
            market,
            symbol: symbol.clone(),
            days: None,
        }
    }

    pub const fn operation(&self) -> Operation {
        self.operation
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.operation, self.market, self.symbol)?;
        if let Some(days) = self.days {
            write!(f, ":{days}")?;
        }
        Ok(())
    }
}

/// Cached payload. Series are shared, never copied or mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum CachePayload {
    History(Arc<Series>),
    Quote(Quote),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: CachePayload,
    fetched_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
    ttls: CacheTtls,
}

impl CacheInner {
    fn get(&self, key: &CacheKey) -> Option<CachePayload> {
        let ttl = self.ttls.for_operation(key.operation);
        self.map.get(key).and_then(|entry| {
            if entry.fetched_at.elapsed() < ttl {
                Some(entry.payload.clone())
            } else {
                None
            }
        })
    }
}

/// Thread-safe TTL cache.
///
/// All entry reads and writes go through one mutex. Stale entries are not
/// evicted; a read past the TTL is a miss and the next `put` overwrites it.
///
/// The store also hands out per-key fetch locks so the router can keep at
/// most one upstream fetch in flight per key.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<Mutex<CacheInner>>,
    fetch_locks: FetchLockMap,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheTtls::default())
    }
}

impl CacheStore {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                map: HashMap::new(),
                ttls,
            })),
            fetch_locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Returns the payload when an entry exists and is younger than its TTL.
    pub async fn get(&self, key: &CacheKey) -> Option<CachePayload> {
        self.inner.lock().await.get(key)
    }

    pub async fn put(&self, key: CacheKey, payload: CachePayload) {
        let mut store = self.inner.lock().await;
        if store.ttls.for_operation(key.operation).is_zero() {
            return;
        }
        store.map.insert(
            key,
            CacheEntry {
                payload,
                fetched_at: Instant::now(),
            },
        );
    }

    pub async fn get_history(&self, key: &CacheKey) -> Option<Arc<Series>> {
        match self.get(key).await {
            Some(CachePayload::History(series)) => Some(series),
            _ => None,
        }
    }

    pub async fn get_quote(&self, key: &CacheKey) -> Option<Quote> {
        match self.get(key).await {
            Some(CachePayload::Quote(quote)) => Some(quote),
            _ => None,
        }
    }

    pub async fn clear(&self) {
        self.inner.lock().await.map.clear();
    }

    /// Number of entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lock serializing upstream fetches for `key`.
    ///
    /// Locks nobody else holds are dropped while the map is being updated.
    pub fn fetch_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self
            .fetch_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(lock) = locks.get(key) {
            return Arc::clone(lock);
        }

        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
