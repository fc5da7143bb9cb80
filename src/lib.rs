//! # Coin Dashboard SDK
//!
//! Data core for a cryptocurrency market dashboard backed by CoinGecko.
//!
//! - A **snapshot tracker** polls the top 100 coins by market cap on a fixed
//!   schedule and keeps the last good snapshot when a poll fails.
//! - A **detail cache** serves per-coin lookups (detail, price, charts) with a
//!   TTL, and spaces every outbound request through a shared pacer so the
//!   free-tier rate limit is never hit.
//! - A **watchlist** and a **theme** flag are persisted per user.
//!
//! Responses may arrive wrapped by a CORS relay; both wrapped and raw bodies
//! are accepted.
//!
//! ## Usage
//!
//! ```no_run
//! use coin_dashboard_sdk::{ChartDays, Dashboard, DashboardConfig, SortKey, SortOrder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dashboard = Dashboard::new(DashboardConfig::from_env())?;
//! dashboard.start();
//!
//! // Ranked table
//! let snapshot = dashboard.snapshot();
//! for coin in snapshot.sorted_by(SortKey::Change24h, SortOrder::Descending) {
//!     println!("{}: {:?}", coin.symbol, coin.price_change_percentage_24h);
//! }
//!
//! // Detail view
//! let detail = dashboard.cache().coin_detail("bitcoin").await?;
//! let chart = dashboard.cache().market_chart("bitcoin", ChartDays::Month).await?;
//! println!("{} has {} price points", detail.name, chart.prices.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod pacer;
pub mod preferences;
pub mod provider;
pub mod providers;
pub mod storage;
pub mod store;
pub mod tracker;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheStats, DetailCache};
pub use config::{DashboardConfig, Relay};
pub use dashboard::Dashboard;
pub use error::{DashboardError, ErrorKind, ProviderError, StorageError};
pub use metrics::ProviderMetrics;
pub use pacer::RequestPacer;
pub use preferences::{ThemePreference, Watchlist};
pub use provider::{Endpoint, MarketDataProvider};
pub use providers::CoinGeckoProvider;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use tracker::SnapshotTracker;
pub use types::{
    Candle, ChartDays, CoinDetail, CoinSummary, ComponentHealth, HealthStatus, LookupKind,
    LookupParams, MarketChart, Payload, PricePoint, SimplePrice, Snapshot, SnapshotError, SortKey,
    SortOrder,
};
