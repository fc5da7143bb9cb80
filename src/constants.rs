//! Constants for the coin dashboard core
//!
//! Compile-time defaults for every tunable. `DashboardConfig` starts from
//! these values and lets environment variables override a subset of them.

/// How often the market snapshot is refreshed (in seconds)
pub const REFRESH_INTERVAL_SECS: u64 = 60;

/// Minimum spacing between outbound requests to the upstream host (in milliseconds)
pub const MIN_REQUEST_DELAY_MS: u64 = 6000;

/// Time-to-live for cached coin lookups (in seconds)
pub const DETAIL_TTL_SECS: u64 = 120;

/// How old a snapshot may get before health reports it as degraded (in seconds)
pub const SNAPSHOT_STALE_THRESHOLD_SECS: u64 = 300;

/// HTTP request timeout (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Number of ranked coins fetched per snapshot
pub const MARKETS_PER_PAGE: u32 = 100;

/// Quote currency used for every upstream query
pub const VS_CURRENCY: &str = "usd";

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Header carrying the optional CoinGecko demo API key
pub const COINGECKO_API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "coin-dashboard-sdk/0.1.0";

/// Storage key holding the watchlist
pub const WATCHLIST_STORAGE_KEY: &str = "watchlist";

/// Storage key holding the dark-mode flag
pub const THEME_STORAGE_KEY: &str = "theme";

/// Prefix of storage keys holding persisted coin lookups
pub const COIN_STORAGE_PREFIX: &str = "coin";
