//! Market snapshot tracker
//!
//! Polls the ranked coin list on a fixed schedule and publishes it through a
//! `SnapshotStore`. A failed poll keeps the previous coins and only records
//! the error; the next tick is the retry.

use crate::{
    clock::{Clock, SystemClock},
    constants::{MARKETS_PER_PAGE, SNAPSHOT_STALE_THRESHOLD_SECS},
    error::ProviderError,
    metrics::{MetricsCollector, ProviderMetrics},
    normalize::normalize_body,
    pacer::RequestPacer,
    provider::{Endpoint, MarketDataProvider},
    store::SnapshotStore,
    types::{CoinSummary, ComponentHealth, HealthStatus, Snapshot, SnapshotError},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Market Snapshot tracker
///
/// # Example
/// ```no_run
/// use coin_dashboard_sdk::{CoinGeckoProvider, DashboardConfig, SnapshotTracker};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = Arc::new(CoinGeckoProvider::new(&DashboardConfig::default())?);
/// let tracker = SnapshotTracker::with_provider(provider);
/// tracker.start(Duration::from_secs(60));
///
/// let snapshot = tracker.current();
/// for coin in snapshot.coins.iter() {
///     println!("{} {:?}", coin.name, coin.current_price);
/// }
/// tracker.stop();
/// # Ok(())
/// # }
/// ```
pub struct SnapshotTracker {
    inner: Arc<TrackerInner>,
    schedule: Mutex<Option<Schedule>>,
}

struct TrackerInner {
    provider: Arc<dyn MarketDataProvider>,
    pacer: Option<Arc<RequestPacer>>,
    store: SnapshotStore,
    metrics: MetricsCollector,
    clock: Arc<dyn Clock>,
    refresh_lock: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
}

/// Running schedule; dropping it ends the loop
struct Schedule {
    _shutdown: watch::Sender<()>,
}

impl SnapshotTracker {
    /// Creates a tracker that talks to the provider directly
    pub fn with_provider(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self::from_parts(provider, None, Arc::new(SystemClock))
    }

    /// Creates a tracker whose requests go through a shared pacer
    pub fn with_shared_pacer(
        provider: Arc<dyn MarketDataProvider>,
        pacer: Arc<RequestPacer>,
    ) -> Self {
        Self::from_parts(provider, Some(pacer), Arc::new(SystemClock))
    }

    pub fn from_parts(
        provider: Arc<dyn MarketDataProvider>,
        pacer: Option<Arc<RequestPacer>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                provider,
                pacer,
                store: SnapshotStore::new(),
                metrics: MetricsCollector::new("snapshot"),
                clock,
                refresh_lock: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
            }),
            schedule: Mutex::new(None),
        }
    }

    /// Starts the periodic refresh loop
    ///
    /// The first refresh runs immediately. A refresh that outlasts the
    /// interval makes the loop skip the ticks it missed, so at most one
    /// snapshot request is in flight. Calling `start` on a running tracker
    /// does nothing.
    pub fn start(&self, interval: Duration) {
        let mut schedule = self.schedule.lock().unwrap_or_else(|e| e.into_inner());
        if schedule.is_some() {
            tracing::warn!("Snapshot tracker already running, ignoring start");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();

        tokio::spawn(async move {
            tracing::info!(
                refresh_interval_secs = interval.as_secs(),
                "Starting market snapshot refresh loop"
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                inner.scheduled_refresh(epoch).await;
            }

            tracing::info!("Market snapshot refresh loop stopped");
        });

        *schedule = Some(Schedule {
            _shutdown: shutdown_tx,
        });
    }

    /// Stops the periodic refresh loop
    ///
    /// Safe to call repeatedly or before `start`. A refresh already in flight
    /// is allowed to finish but its result is discarded.
    pub fn stop(&self) {
        let mut schedule = self.schedule.lock().unwrap_or_else(|e| e.into_inner());
        if schedule.take().is_some() {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// True while the refresh loop is scheduled
    pub fn is_running(&self) -> bool {
        self.schedule
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Fetches the ranked coin list now and publishes it
    ///
    /// # Returns
    /// The new snapshot, or the failure after it has been recorded on the
    /// current snapshot
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, ProviderError> {
        let _guard = self.inner.refresh_lock.lock().await;
        let result = self.inner.fetch_coins().await;
        self.inner.apply(result)
    }

    /// Returns the current snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        self.inner.store.current()
    }

    /// Error recorded by the most recent refresh, if it failed
    pub fn last_error(&self) -> Option<SnapshotError> {
        self.inner.store.last_error()
    }

    /// Subscribes to snapshot replacements
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.store.subscribe()
    }

    /// Returns the name of the current provider
    pub fn provider_name(&self) -> &str {
        self.inner.provider.provider_name()
    }

    /// Gets request metrics including latency percentiles and success rates
    pub async fn metrics(&self) -> ProviderMetrics {
        self.inner.metrics.get_metrics().await
    }

    /// Perform a health check on the snapshot tracker
    ///
    /// # Returns
    /// ComponentHealth indicating whether fresh snapshot data is available
    pub async fn health_check(&self) -> ComponentHealth {
        let now = self.inner.clock.now();
        let snapshot = self.current();
        let mut details = std::collections::HashMap::new();

        details.insert("coins".to_string(), serde_json::json!(snapshot.len()));
        details.insert(
            "provider_name".to_string(),
            serde_json::json!(self.provider_name()),
        );
        details.insert("running".to_string(), serde_json::json!(self.is_running()));

        let age = snapshot.age(now);
        if let Some(age) = age {
            details.insert("age_secs".to_string(), serde_json::json!(age.as_secs()));
        }
        if let Some(error) = &snapshot.error {
            details.insert("last_error".to_string(), serde_json::json!(error.message));
        }

        let stale = age.is_some_and(|a| a.as_secs() > SNAPSHOT_STALE_THRESHOLD_SECS);
        let status = if snapshot.is_empty() {
            HealthStatus::Unhealthy
        } else if snapshot.error.is_some() || stale {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let message = match status {
            HealthStatus::Healthy => "Snapshot tracker is operational with fresh data".to_string(),
            HealthStatus::Degraded => match &snapshot.error {
                Some(error) => format!("Serving previous snapshot after {} failure", error.kind),
                None => "Snapshot is older than the stale threshold".to_string(),
            },
            HealthStatus::Unhealthy => "Snapshot tracker has no market data".to_string(),
        };

        ComponentHealth {
            name: "snapshot_tracker".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: now,
        }
    }
}

impl TrackerInner {
    async fn fetch_coins(&self) -> Result<Vec<CoinSummary>, ProviderError> {
        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }

        let start = Instant::now();
        let result = self.fetch_and_decode().await;
        self.metrics
            .record_request(start.elapsed(), result.is_ok())
            .await;

        if let Ok(coins) = &result {
            tracing::debug!(
                count = coins.len(),
                provider = self.provider.provider_name(),
                latency_ms = start.elapsed().as_millis() as u64,
                "Fetched market snapshot"
            );
        }
        result
    }

    async fn fetch_and_decode(&self) -> Result<Vec<CoinSummary>, ProviderError> {
        let body = self.provider.fetch_body(&Endpoint::top_markets()).await?;
        let mut coins: Vec<CoinSummary> = normalize_body(&body)?.decode()?;
        coins.truncate(MARKETS_PER_PAGE as usize);
        Ok(coins)
    }

    fn apply(
        &self,
        result: Result<Vec<CoinSummary>, ProviderError>,
    ) -> Result<Arc<Snapshot>, ProviderError> {
        match result {
            Ok(coins) => Ok(self.store.publish(coins, self.clock.now())),
            Err(e) => {
                tracing::warn!(error = %e, kind = %e.kind(), "Market snapshot refresh failed");
                self.store.record_error(SnapshotError {
                    kind: e.kind(),
                    message: e.to_string(),
                    occurred_at: self.clock.now(),
                });
                Err(e)
            }
        }
    }

    async fn scheduled_refresh(&self, epoch: u64) {
        let _guard = self.refresh_lock.lock().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }

        let result = self.fetch_coins().await;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Discarding snapshot refresh from a stopped schedule");
            return;
        }
        // Already logged and recorded on the snapshot
        let _ = self.apply(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provider::mock::{MockProvider, MockResponse};
    use serde_json::json;

    const MARKETS: &str = "/coins/markets";

    fn markets_json(count: u32) -> serde_json::Value {
        let rows: Vec<_> = (1..=count)
            .map(|rank| {
                json!({
                    "id": format!("coin-{}", rank),
                    "symbol": format!("c{}", rank),
                    "name": format!("Coin {}", rank),
                    "image": "https://example.org/logo.png",
                    "current_price": 1000.0 / rank as f64,
                    "market_cap": 1.0e12 / rank as f64,
                    "market_cap_rank": rank,
                    "price_change_percentage_24h": 1.5,
                    "price_change_percentage_7d_in_currency": -2.0,
                    "total_volume": 5.0e9,
                    "circulating_supply": 19_000_000.0
                })
            })
            .collect();
        json!(rows)
    }

    fn tracker_with(provider: Arc<MockProvider>) -> SnapshotTracker {
        SnapshotTracker::with_provider(provider)
    }

    #[tokio::test]
    async fn test_refresh_publishes_ranked_snapshot() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json(MARKETS, markets_json(100));
        let tracker = tracker_with(provider.clone());

        let snapshot = tracker.refresh().await.unwrap();

        assert_eq!(snapshot.len(), 100);
        let ranks: Vec<u32> = snapshot
            .coins
            .iter()
            .map(|c| c.market_cap_rank.unwrap())
            .collect();
        assert_eq!(ranks, (1..=100).collect::<Vec<_>>());
        assert!(snapshot
            .coins
            .windows(2)
            .all(|w| w[0].market_cap >= w[1].market_cap));
        assert!(tracker.last_error().is_none());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_market_page_is_truncated_to_top_100() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json(MARKETS, markets_json(150));
        let tracker = tracker_with(provider);

        let snapshot = tracker.refresh().await.unwrap();

        assert_eq!(snapshot.len(), 100);
        let ranks: Vec<u32> = snapshot
            .coins
            .iter()
            .map(|c| c.market_cap_rank.unwrap())
            .collect();
        assert_eq!(ranks, (1..=100).collect::<Vec<_>>());
        assert!(snapshot.get("coin-101").is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json(MARKETS, markets_json(3));
        let tracker = tracker_with(provider.clone());
        let first = tracker.refresh().await.unwrap();

        provider.set_response(MARKETS, MockResponse::Status(500));
        let err = tracker.refresh().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        let current = tracker.current();
        assert_eq!(current.coins, first.coins);
        assert_eq!(current.fetched_at, first.fetched_at);
        assert_eq!(current.error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));

        provider.set_body(MARKETS, "<html>Too busy</html>");
        let err = tracker.refresh().await.unwrap_err();
        assert!(err.is_parse_failure());
        assert_eq!(tracker.current().len(), 3);
        assert_eq!(tracker.last_error().map(|e| e.kind), Some(ErrorKind::Parse));

        provider.set_json(MARKETS, markets_json(2));
        tracker.refresh().await.unwrap();
        assert_eq!(tracker.current().len(), 2);
        assert!(tracker.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failure_before_any_data_leaves_empty_snapshot() {
        let provider = Arc::new(MockProvider::new());
        provider.set_response(MARKETS, MockResponse::Timeout);
        let tracker = tracker_with(provider);

        assert!(tracker.refresh().await.is_err());
        let current = tracker.current();
        assert!(current.is_empty());
        assert!(current.error.is_some());
    }

    #[tokio::test]
    async fn test_relay_wrapped_markets_are_accepted() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json(
            MARKETS,
            json!({ "contents": markets_json(5).to_string() }),
        );
        let tracker = tracker_with(provider);

        assert_eq!(tracker.refresh().await.unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_refreshes_immediately_then_every_interval() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json(MARKETS, markets_json(10));
        let tracker = tracker_with(provider.clone());
        let start = tokio::time::Instant::now();

        tracker.start(Duration::from_secs(60));
        assert!(tracker.is_running());
        tokio::time::sleep(Duration::from_secs(125)).await;

        let offsets: Vec<u64> = provider
            .calls()
            .iter()
            .map(|(_, at)| (*at - start).as_secs())
            .collect();
        assert_eq!(offsets, vec![0, 60, 120]);
        assert_eq!(tracker.current().len(), 10);
        tracker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refreshes_never_overlap() {
        let provider = Arc::new(MockProvider::new().with_latency(Duration::from_secs(90)));
        provider.set_json(MARKETS, markets_json(10));
        let tracker = tracker_with(provider.clone());

        tracker.start(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(400)).await;
        tracker.stop();

        let calls = provider.calls();
        assert!(calls.len() >= 2);
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(90));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_halts_schedule() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json(MARKETS, markets_json(1));
        let tracker = tracker_with(provider.clone());

        tracker.stop();
        tracker.start(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        tracker.stop();
        tracker.stop();
        assert!(!tracker.is_running());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_refresh_is_discarded_after_stop() {
        let provider = Arc::new(MockProvider::new().with_latency(Duration::from_secs(30)));
        provider.set_json(MARKETS, markets_json(4));
        let tracker = tracker_with(provider.clone());

        tracker.start(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        tracker.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(provider.call_count(), 1);
        assert!(tracker.current().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_pacer_spaces_snapshot_requests() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json(MARKETS, markets_json(1));
        let pacer = Arc::new(RequestPacer::new(Duration::from_millis(6000)));
        let tracker = SnapshotTracker::with_shared_pacer(provider.clone(), pacer);

        tracker.refresh().await.unwrap();
        tracker.refresh().await.unwrap();

        let calls = provider.calls();
        assert_eq!(calls[1].1 - calls[0].1, Duration::from_millis(6000));
    }

    #[tokio::test]
    async fn test_health_check_reflects_snapshot_state() {
        let provider = Arc::new(MockProvider::new());
        let tracker = tracker_with(provider.clone());
        assert_eq!(tracker.health_check().await.status, HealthStatus::Unhealthy);

        provider.set_json(MARKETS, markets_json(2));
        tracker.refresh().await.unwrap();
        assert_eq!(tracker.health_check().await.status, HealthStatus::Healthy);

        provider.set_response(MARKETS, MockResponse::Status(429));
        let _ = tracker.refresh().await;
        let health = tracker.health_check().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.details.contains_key("last_error"));

        let metrics = tracker.metrics().await;
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.failed_requests, 1);
    }
}
