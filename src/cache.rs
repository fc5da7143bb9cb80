//! Rate-limited coin lookup cache
//!
//! Serves coin detail, price and chart lookups. Fresh entries are answered
//! from memory (or from durable storage after a restart); everything else goes
//! upstream through the shared `RequestPacer`. Only successful, fully decoded
//! responses are stored, so a failed lookup never leaves an entry behind.
//!
//! Expiry is lazy: a stale entry stays in the map until a later successful
//! fetch overwrites it or `purge_expired` sweeps it, but it is never served.
//!
//! Two concurrent misses on the same key both go upstream. They are paced like
//! any other requests and the later response simply overwrites the earlier one.

use crate::{
    clock::{Clock, SystemClock},
    constants::{COIN_STORAGE_PREFIX, DETAIL_TTL_SECS},
    error::{ProviderError, StorageError},
    metrics::{MetricsCollector, ProviderMetrics},
    normalize::{normalize_body, Normalized},
    pacer::RequestPacer,
    provider::{Endpoint, MarketDataProvider},
    storage::{load_json, save_json, KeyValueStore},
    types::{
        Candle, ChartDays, CoinDetail, LookupKind, LookupParams, MarketChart, Payload, PricePoint,
        SimplePrice,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Identity of a cached lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: LookupKind,
    pub coin_id: String,
    /// Canonical parameter fingerprint, empty when the lookup takes none
    pub params: String,
}

impl CacheKey {
    pub fn new(kind: LookupKind, coin_id: &str, params: &LookupParams) -> Self {
        Self {
            kind,
            coin_id: coin_id.to_string(),
            params: params.fingerprint(),
        }
    }

    /// Durable storage key, e.g. `coin-detail-ethereum`
    pub fn storage_key(&self) -> String {
        let mut key = format!(
            "{}-{}-{}",
            COIN_STORAGE_PREFIX,
            self.kind.as_str(),
            self.coin_id
        );
        if !self.params.is_empty() {
            key.push('-');
            key.push_str(&self.params);
        }
        key
    }
}

/// A successfully decoded lookup and when it was retrieved
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: Payload,
    pub retrieved_at: DateTime<Utc>,
}

impl CacheEntry {
    /// True while the entry is younger than `ttl`
    ///
    /// An entry stamped in the future (the clock stepped back) is stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.retrieved_at);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age >= chrono::Duration::zero() && age < ttl,
            Err(_) => false,
        }
    }
}

/// On-disk shape of a persisted entry
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    data: serde_json::Value,
    /// Retrieval time in epoch milliseconds
    timestamp: i64,
}

/// Hit and miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Rate-limited, TTL-bounded cache of coin lookups
pub struct DetailCache {
    provider: Arc<dyn MarketDataProvider>,
    pacer: Arc<RequestPacer>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    default_ttl: Duration,
    ttl_overrides: HashMap<LookupKind, Duration>,
    storage: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    metrics: MetricsCollector,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DetailCache {
    /// Creates a cache that paces its upstream requests with `pacer`
    pub fn new(provider: Arc<dyn MarketDataProvider>, pacer: Arc<RequestPacer>) -> Self {
        Self {
            provider,
            pacer,
            entries: RwLock::new(HashMap::new()),
            default_ttl: Duration::from_secs(DETAIL_TTL_SECS),
            ttl_overrides: HashMap::new(),
            storage: None,
            clock: Arc::new(SystemClock),
            metrics: MetricsCollector::new("detail_cache"),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Sets the TTL used for every kind without an override
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the TTL for one lookup kind
    pub fn with_ttl(mut self, kind: LookupKind, ttl: Duration) -> Self {
        self.ttl_overrides.insert(kind, ttl);
        self
    }

    /// Persists entries so they survive a restart within their TTL
    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// TTL applied to entries of `kind`
    pub fn ttl_for(&self, kind: LookupKind) -> Duration {
        self.ttl_overrides
            .get(&kind)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Returns the payload for a lookup, fetching it when no fresh entry exists
    ///
    /// # Arguments
    /// * `kind` - What to look up
    /// * `coin_id` - CoinGecko identifier, e.g. "ethereum"
    /// * `params` - Chart timeframe; ignored by detail and price lookups
    ///
    /// # Returns
    /// The cached or freshly fetched payload. Network and parse failures are
    /// returned to the caller and leave the cache untouched.
    pub async fn lookup(
        &self,
        kind: LookupKind,
        coin_id: &str,
        params: &LookupParams,
    ) -> Result<Payload, ProviderError> {
        validate_coin_id(coin_id)?;
        let params = effective_params(kind, params);
        let key = CacheKey::new(kind, coin_id, &params);
        let ttl = self.ttl_for(kind);
        let now = self.clock.now();

        if let Some(entry) = self.fresh_entry(&key, now, ttl).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(coin_id, kind = %kind, "Cache hit");
            return Ok(entry.payload);
        }

        if let Some(entry) = self.load_persisted(&key, now, ttl).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(coin_id, kind = %kind, "Restored lookup from storage");
            let payload = entry.payload.clone();
            self.entries.write().await.insert(key, entry);
            return Ok(payload);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let payload = self.fetch(kind, coin_id, &params).await?;

        let entry = CacheEntry {
            payload: payload.clone(),
            retrieved_at: self.clock.now(),
        };
        self.persist(&key, &entry).await;
        self.entries.write().await.insert(key, entry);

        Ok(payload)
    }

    /// Coin detail with nested market data
    pub async fn coin_detail(&self, coin_id: &str) -> Result<CoinDetail, ProviderError> {
        match self
            .lookup(LookupKind::Detail, coin_id, &LookupParams::default())
            .await?
        {
            Payload::Detail(detail) => Ok(detail),
            other => Err(unexpected_payload(LookupKind::Detail, &other)),
        }
    }

    /// Current USD price
    pub async fn simple_price(&self, coin_id: &str) -> Result<SimplePrice, ProviderError> {
        match self
            .lookup(LookupKind::Price, coin_id, &LookupParams::default())
            .await?
        {
            Payload::Price(price) => Ok(price),
            other => Err(unexpected_payload(LookupKind::Price, &other)),
        }
    }

    /// Daily price series for the given timeframe
    pub async fn market_chart(
        &self,
        coin_id: &str,
        days: ChartDays,
    ) -> Result<MarketChart, ProviderError> {
        match self
            .lookup(LookupKind::MarketChart, coin_id, &LookupParams::days(days))
            .await?
        {
            Payload::MarketChart(chart) => Ok(chart),
            other => Err(unexpected_payload(LookupKind::MarketChart, &other)),
        }
    }

    /// OHLC candles for the given timeframe
    pub async fn ohlc(&self, coin_id: &str, days: ChartDays) -> Result<Vec<Candle>, ProviderError> {
        match self
            .lookup(LookupKind::Ohlc, coin_id, &LookupParams::days(days))
            .await?
        {
            Payload::Ohlc(candles) => Ok(candles),
            other => Err(unexpected_payload(LookupKind::Ohlc, &other)),
        }
    }

    /// Drops one entry from memory and storage
    pub async fn invalidate(&self, kind: LookupKind, coin_id: &str, params: &LookupParams) {
        let key = CacheKey::new(kind, coin_id, &effective_params(kind, params));
        self.entries.write().await.remove(&key);
        if let Some(storage) = self.storage.clone() {
            let storage_key = key.storage_key();
            let remove_key = storage_key.clone();
            if let Err(e) = run_blocking(move || storage.remove(&remove_key)).await {
                tracing::warn!(key = %storage_key, error = %e, "Failed to remove persisted lookup");
            }
        }
    }

    /// Drops every entry held in memory, along with its persisted copy
    pub async fn clear(&self) {
        let drained: Vec<String> = self
            .entries
            .write()
            .await
            .drain()
            .map(|(key, _)| key.storage_key())
            .collect();
        let Some(storage) = self.storage.clone() else {
            return;
        };
        let result = run_blocking(move || {
            for key in &drained {
                if let Err(e) = storage.remove(key) {
                    tracing::warn!(key = %key, error = %e, "Failed to remove persisted lookup");
                }
            }
            Ok(())
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to clear persisted lookups");
        }
    }

    /// Removes expired entries from memory
    ///
    /// # Returns
    /// Number of entries removed
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, entry| entry.is_fresh(now, self.ttl_for(key.kind)));
        before - entries.len()
    }

    /// Number of entries in memory, stale ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len().await,
        }
    }

    /// Gets upstream request metrics for cache misses
    pub async fn metrics(&self) -> ProviderMetrics {
        self.metrics.get_metrics().await
    }

    async fn fresh_entry(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(now, ttl))
            .cloned()
    }

    async fn load_persisted(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        let storage = self.storage.clone()?;
        let storage_key = key.storage_key();

        let load_key = storage_key.clone();
        let loaded =
            run_blocking(move || load_json::<PersistedEntry>(storage.as_ref(), &load_key)).await;
        let persisted = match loaded {
            Ok(persisted) => persisted?,
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Ignoring unreadable persisted lookup");
                return None;
            }
        };

        let retrieved_at = DateTime::from_timestamp_millis(persisted.timestamp)?;
        let payload = match Payload::from_data(key.kind, persisted.data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Ignoring malformed persisted lookup");
                return None;
            }
        };
        let entry = CacheEntry {
            payload,
            retrieved_at,
        };

        entry.is_fresh(now, ttl).then_some(entry)
    }

    async fn persist(&self, key: &CacheKey, entry: &CacheEntry) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        let storage_key = key.storage_key();
        let save_key = storage_key.clone();
        let payload = entry.payload.clone();
        let timestamp = entry.retrieved_at.timestamp_millis();

        let result = run_blocking(move || {
            let persisted = PersistedEntry {
                data: payload.data_value()?,
                timestamp,
            };
            save_json(storage.as_ref(), &save_key, &persisted)
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(key = %storage_key, error = %e, "Failed to persist lookup");
        }
    }

    async fn fetch(
        &self,
        kind: LookupKind,
        coin_id: &str,
        params: &LookupParams,
    ) -> Result<Payload, ProviderError> {
        let endpoint = endpoint_for(kind, coin_id, params);

        self.pacer.acquire().await;
        let start = Instant::now();
        let result = self.fetch_and_decode(kind, coin_id, &endpoint).await;
        self.metrics
            .record_request(start.elapsed(), result.is_ok())
            .await;

        match &result {
            Ok(_) => tracing::debug!(
                coin_id,
                kind = %kind,
                latency_ms = start.elapsed().as_millis() as u64,
                "Fetched lookup"
            ),
            Err(e) => tracing::warn!(coin_id, kind = %kind, error = %e, "Lookup failed"),
        }
        result
    }

    async fn fetch_and_decode(
        &self,
        kind: LookupKind,
        coin_id: &str,
        endpoint: &Endpoint,
    ) -> Result<Payload, ProviderError> {
        let body = self.provider.fetch_body(endpoint).await?;
        let normalized = normalize_body(&body)?;
        if normalized.is_wrapped() {
            tracing::debug!(coin_id, kind = %kind, "Unwrapped relay response");
        }
        decode_payload(kind, coin_id, normalized)
    }
}

/// Runs a storage call on the blocking pool so file I/O never stalls a worker
async fn run_blocking<T, F>(op: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

/// Drops parameters a kind does not use and fills in chart defaults
fn effective_params(kind: LookupKind, params: &LookupParams) -> LookupParams {
    match kind {
        LookupKind::Detail | LookupKind::Price => LookupParams::default(),
        LookupKind::MarketChart | LookupKind::Ohlc => LookupParams {
            days: params.days.or(kind.default_days()),
        },
    }
}

fn validate_coin_id(coin_id: &str) -> Result<(), ProviderError> {
    // "." and ".." would be resolved away as path segments
    let valid = !coin_id.is_empty()
        && !coin_id.chars().all(|c| c == '.')
        && coin_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ProviderError::InvalidUrl(format!("Invalid coin id: {:?}", coin_id)))
    }
}

fn endpoint_for(kind: LookupKind, coin_id: &str, params: &LookupParams) -> Endpoint {
    let id = coin_id.to_string();
    let days = params.days.unwrap_or(ChartDays::Week);
    match kind {
        LookupKind::Detail => Endpoint::CoinDetail { id },
        LookupKind::Price => Endpoint::SimplePrice { ids: vec![id] },
        LookupKind::MarketChart => Endpoint::MarketChart { id, days },
        LookupKind::Ohlc => Endpoint::Ohlc { id, days },
    }
}

#[derive(Debug, Deserialize)]
struct SimplePriceRow {
    #[serde(default)]
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMarketChart {
    prices: Vec<(f64, f64)>,
}

fn timestamp(ms: f64) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::from_timestamp_millis(ms as i64)
        .ok_or_else(|| ProviderError::invalid_response(format!("Timestamp out of range: {}", ms)))
}

/// Decodes a normalized body into the payload for `kind`
fn decode_payload(
    kind: LookupKind,
    coin_id: &str,
    normalized: Normalized,
) -> Result<Payload, ProviderError> {
    match kind {
        LookupKind::Detail => Ok(Payload::Detail(normalized.decode::<CoinDetail>()?)),
        LookupKind::Price => {
            let rows: HashMap<String, SimplePriceRow> = normalized.decode()?;
            let usd = rows
                .get(coin_id)
                .and_then(|row| row.usd)
                .ok_or_else(|| {
                    ProviderError::invalid_response(format!("No USD price for {}", coin_id))
                })?;
            Ok(Payload::Price(SimplePrice {
                coin_id: coin_id.to_string(),
                usd,
            }))
        }
        LookupKind::MarketChart => {
            let raw: RawMarketChart = normalized.decode()?;
            let prices = raw
                .prices
                .into_iter()
                .map(|(ts, price)| -> Result<PricePoint, ProviderError> {
                    Ok(PricePoint {
                        timestamp: timestamp(ts)?,
                        price,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Payload::MarketChart(MarketChart { prices }))
        }
        LookupKind::Ohlc => {
            let raw: Vec<(f64, f64, f64, f64, f64)> = normalized.decode()?;
            let candles = raw
                .into_iter()
                .map(|(ts, open, high, low, close)| -> Result<Candle, ProviderError> {
                    Ok(Candle {
                        time: timestamp(ts)?,
                        open,
                        high,
                        low,
                        close,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Payload::Ohlc(candles))
        }
    }
}

fn unexpected_payload(expected: LookupKind, found: &Payload) -> ProviderError {
    ProviderError::invalid_response(format!(
        "Expected {} payload, found {}",
        expected,
        found.kind()
    ))
}
