//! Dashboard facade
//!
//! Wires one provider, one shared `RequestPacer`, the snapshot tracker, the
//! detail cache and the user preferences over a single store. Every outbound
//! request made through a `Dashboard` is paced against the same clock.

use crate::{
    cache::DetailCache,
    clock::{Clock, SystemClock},
    config::DashboardConfig,
    error::DashboardError,
    pacer::RequestPacer,
    preferences::{ThemePreference, Watchlist},
    provider::MarketDataProvider,
    providers::CoinGeckoProvider,
    storage::{FileStore, KeyValueStore, MemoryStore},
    tracker::SnapshotTracker,
    types::{CoinSummary, ComponentHealth, Snapshot},
};
use std::sync::Arc;

/// Entry point for a dashboard front end
///
/// # Example
/// ```no_run
/// use coin_dashboard_sdk::{Dashboard, DashboardConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let dashboard = Dashboard::new(DashboardConfig::from_env())?;
/// dashboard.start();
///
/// let detail = dashboard.cache().coin_detail("ethereum").await?;
/// println!("{}: {:?}", detail.name, detail.price_usd());
///
/// dashboard.watchlist().toggle("ethereum")?;
/// for coin in dashboard.watched_coins() {
///     println!("{} {:?}", coin.symbol, coin.current_price);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Dashboard {
    config: DashboardConfig,
    pacer: Arc<RequestPacer>,
    tracker: SnapshotTracker,
    cache: Arc<DetailCache>,
    watchlist: Watchlist,
    theme: ThemePreference,
}

impl Dashboard {
    /// Builds a dashboard backed by CoinGecko
    ///
    /// Persisted state lives in `config.storage_dir` when set and in memory
    /// otherwise.
    pub fn new(config: DashboardConfig) -> Result<Self, DashboardError> {
        let provider: Arc<dyn MarketDataProvider> = Arc::new(CoinGeckoProvider::new(&config)?);
        let store: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };

        tracing::info!(
            provider = provider.provider_name(),
            persistent = config.storage_dir.is_some(),
            relay = config.relay.is_some(),
            "Initializing coin dashboard"
        );

        Ok(Self::from_parts(config, provider, store, Arc::new(SystemClock)))
    }

    /// Builds a dashboard from explicit parts
    pub fn from_parts(
        config: DashboardConfig,
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pacer = Arc::new(RequestPacer::new(config.min_request_delay));
        let tracker =
            SnapshotTracker::from_parts(provider.clone(), Some(pacer.clone()), clock.clone());
        let cache = Arc::new(
            DetailCache::new(provider, pacer.clone())
                .with_default_ttl(config.detail_ttl)
                .with_storage(store.clone())
                .with_clock(clock),
        );

        Self {
            watchlist: Watchlist::load(store.clone()),
            theme: ThemePreference::load(store),
            config,
            pacer,
            tracker,
            cache,
        }
    }

    /// Starts the snapshot schedule at the configured interval
    pub fn start(&self) {
        self.tracker.start(self.config.refresh_interval);
    }

    pub fn stop(&self) {
        self.tracker.stop();
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn tracker(&self) -> &SnapshotTracker {
        &self.tracker
    }

    /// Detail cache, shareable with spawned tasks
    pub fn cache(&self) -> &Arc<DetailCache> {
        &self.cache
    }

    pub fn pacer(&self) -> &Arc<RequestPacer> {
        &self.pacer
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    pub fn theme(&self) -> &ThemePreference {
        &self.theme
    }

    /// Current market snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.tracker.current()
    }

    /// Watched coins from the current snapshot, in snapshot order
    pub fn watched_coins(&self) -> Vec<CoinSummary> {
        self.watchlist.filter(&self.tracker.current())
    }

    pub async fn health_check(&self) -> ComponentHealth {
        self.tracker.health_check().await
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.tracker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::types::HealthStatus;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn markets() -> serde_json::Value {
        json!([
            {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "market_cap_rank": 1},
            {"id": "ethereum", "symbol": "eth", "name": "Ethereum", "market_cap_rank": 2},
            {"id": "solana", "symbol": "sol", "name": "Solana", "market_cap_rank": 5}
        ])
    }

    fn dashboard(provider: Arc<MockProvider>, store: Arc<dyn KeyValueStore>) -> Dashboard {
        Dashboard::from_parts(
            DashboardConfig::default(),
            provider,
            store,
            Arc::new(SystemClock),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_and_detail_share_one_pacer() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json("/coins/markets", markets());
        provider.set_json(
            "/coins/ethereum",
            json!({"id": "ethereum", "symbol": "eth", "name": "Ethereum"}),
        );
        let dashboard = dashboard(provider.clone(), Arc::new(MemoryStore::new()));
        let start = Instant::now();

        let (snapshot, detail) = tokio::join!(
            dashboard.tracker().refresh(),
            dashboard.cache().coin_detail("ethereum")
        );
        assert_eq!(snapshot.unwrap().len(), 3);
        assert_eq!(detail.unwrap().name, "Ethereum");

        let mut offsets: Vec<Duration> = provider
            .calls()
            .into_iter()
            .map(|(_, at)| at - start)
            .collect();
        offsets.sort();
        assert_eq!(offsets, vec![Duration::ZERO, Duration::from_millis(6000)]);
    }

    #[tokio::test]
    async fn test_watched_coins_follow_snapshot() {
        let provider = Arc::new(MockProvider::new());
        provider.set_json("/coins/markets", markets());
        let dashboard = dashboard(provider, Arc::new(MemoryStore::new()));

        dashboard.watchlist().toggle("solana").unwrap();
        dashboard.watchlist().toggle("bitcoin").unwrap();
        assert!(dashboard.watched_coins().is_empty());

        dashboard.tracker().refresh().await.unwrap();
        let ids: Vec<String> = dashboard
            .watched_coins()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["bitcoin", "solana"]);
        assert_eq!(dashboard.health_check().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_preferences_survive_reopen_of_storage_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = DashboardConfig {
            storage_dir: Some(dir.path().to_path_buf()),
            ..DashboardConfig::default()
        };

        {
            let dashboard = Dashboard::new(config.clone()).unwrap();
            dashboard.watchlist().add("cardano").unwrap();
            dashboard.theme().toggle().unwrap();
        }

        let reopened = Dashboard::new(config).unwrap();
        assert_eq!(reopened.watchlist().ids(), vec!["cardano".to_string()]);
        assert!(reopened.theme().is_dark());
        assert!(!reopened.tracker().is_running());
    }
}
