//! Types for the coin dashboard core

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// One row of the ranked market table, as returned by `/coins/markets`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSummary {
    /// Unique CoinGecko identifier (e.g. "bitcoin")
    pub id: String,
    /// Ticker symbol (e.g. "btc")
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Logo URL
    #[serde(default)]
    pub image: String,
    /// Price in USD
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// Rank by market cap, absent for unranked coins
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_7d_in_currency: Option<f64>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub circulating_supply: Option<f64>,
}

/// Failure recorded on a snapshot by the last refresh attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotError {
    pub kind: ErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// The ranked coin list as of the last successful refresh
///
/// Coins are shared behind an `Arc` so publishing an error on top of the
/// previous data never copies the rows.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Coins in upstream order (market cap descending)
    pub coins: Arc<[CoinSummary]>,
    /// When the coins were fetched, `None` before the first success
    pub fetched_at: Option<DateTime<Utc>>,
    /// Set when the most recent refresh failed
    pub error: Option<SnapshotError>,
}

impl Snapshot {
    /// Snapshot with no data and no error
    pub fn empty() -> Self {
        Self {
            coins: Arc::from(Vec::new()),
            fetched_at: None,
            error: None,
        }
    }

    /// Snapshot produced by a successful fetch
    pub fn new(coins: Vec<CoinSummary>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            coins: Arc::from(coins),
            fetched_at: Some(fetched_at),
            error: None,
        }
    }

    /// Same data with the error indicator set
    pub fn with_error(&self, error: SnapshotError) -> Self {
        Self {
            coins: self.coins.clone(),
            fetched_at: self.fetched_at,
            error: Some(error),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    /// Looks up a coin by identifier
    pub fn get(&self, coin_id: &str) -> Option<&CoinSummary> {
        self.coins.iter().find(|c| c.id == coin_id)
    }

    /// Time elapsed since the data was fetched
    pub fn age(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.fetched_at.map(|at| {
            let ms = now.signed_duration_since(at).num_milliseconds().max(0);
            std::time::Duration::from_millis(ms as u64)
        })
    }

    /// Coins ordered by a table column
    ///
    /// Coins missing the sorted value always come last. The sort is stable,
    /// so ties keep upstream order.
    pub fn sorted_by(&self, key: SortKey, order: SortOrder) -> Vec<&CoinSummary> {
        let mut rows: Vec<&CoinSummary> = self.coins.iter().collect();
        rows.sort_by(|a, b| match key {
            SortKey::Name => order.apply(a.name.to_lowercase().cmp(&b.name.to_lowercase())),
            _ => compare_present(key.value(a), key.value(b), order),
        });
        rows
    }

    /// Coins whose name or symbol contains the query, ignoring case
    pub fn search(&self, query: &str) -> Vec<&CoinSummary> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.coins
            .iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&needle) || c.symbol.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Orders two optional values, keeping absent ones last in either direction
fn compare_present(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => order.apply(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sortable market table columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Rank,
    Name,
    Price,
    Change24h,
    Change7d,
    MarketCap,
    Volume,
}

impl SortKey {
    fn value(&self, coin: &CoinSummary) -> Option<f64> {
        match self {
            SortKey::Rank => coin.market_cap_rank.map(f64::from),
            SortKey::Name => None,
            SortKey::Price => coin.current_price,
            SortKey::Change24h => coin.price_change_percentage_24h,
            SortKey::Change7d => coin.price_change_percentage_7d_in_currency,
            SortKey::MarketCap => coin.market_cap,
            SortKey::Volume => coin.total_volume,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Kind of on-demand coin lookup served by the detail cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    /// Full coin detail with nested market data
    Detail,
    /// Current USD price only
    Price,
    /// Daily price series for the line chart
    MarketChart,
    /// OHLC candles for the candlestick chart
    Ohlc,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Detail => "detail",
            LookupKind::Price => "price",
            LookupKind::MarketChart => "market-chart",
            LookupKind::Ohlc => "ohlc",
        }
    }

    /// Days used when a chart lookup carries no explicit timeframe
    pub fn default_days(&self) -> Option<ChartDays> {
        match self {
            LookupKind::MarketChart | LookupKind::Ohlc => Some(ChartDays::Week),
            LookupKind::Detail | LookupKind::Price => None,
        }
    }
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart timeframes offered by the detail view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartDays {
    Day,
    Week,
    Month,
    Year,
}

impl ChartDays {
    pub fn as_days(&self) -> u32 {
        match self {
            ChartDays::Day => 1,
            ChartDays::Week => 7,
            ChartDays::Month => 30,
            ChartDays::Year => 365,
        }
    }
}

/// Extra parameters that distinguish lookups of the same kind and coin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LookupParams {
    pub days: Option<ChartDays>,
}

impl LookupParams {
    pub fn days(days: ChartDays) -> Self {
        Self { days: Some(days) }
    }

    /// Canonical text form, empty when no parameter is set
    pub fn fingerprint(&self) -> String {
        match self.days {
            Some(days) => format!("days={}", days.as_days()),
            None => String::new(),
        }
    }
}

type CurrencyMap = HashMap<String, Option<f64>>;

fn usd(map: &Option<CurrencyMap>) -> Option<f64> {
    map.as_ref().and_then(|m| m.get("usd").copied().flatten())
}

/// Coin logo in the sizes served by `/coins/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinImage {
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

/// Nested `market_data` object of the coin detail response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub current_price: Option<CurrencyMap>,
    #[serde(default)]
    pub market_cap: Option<CurrencyMap>,
    #[serde(default)]
    pub total_volume: Option<CurrencyMap>,
    #[serde(default)]
    pub price_change_percentage_24h_in_currency: Option<CurrencyMap>,
    #[serde(default)]
    pub price_change_percentage_7d_in_currency: Option<CurrencyMap>,
    #[serde(default)]
    pub price_change_percentage_30d_in_currency: Option<CurrencyMap>,
    #[serde(default)]
    pub price_change_percentage_1y_in_currency: Option<CurrencyMap>,
}

/// Coin detail payload from `/coins/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: CoinImage,
    #[serde(default)]
    pub market_data: Option<MarketData>,
}

impl CoinDetail {
    /// Current USD price, if the upstream reported one
    pub fn price_usd(&self) -> Option<f64> {
        self.market_data.as_ref().and_then(|m| usd(&m.current_price))
    }

    pub fn market_cap_usd(&self) -> Option<f64> {
        self.market_data.as_ref().and_then(|m| usd(&m.market_cap))
    }

    /// USD percentage changes over the detail view's timeframes
    pub fn price_changes(&self) -> PriceChanges {
        match &self.market_data {
            Some(m) => PriceChanges {
                h24: usd(&m.price_change_percentage_24h_in_currency),
                d7: usd(&m.price_change_percentage_7d_in_currency),
                d30: usd(&m.price_change_percentage_30d_in_currency),
                y1: usd(&m.price_change_percentage_1y_in_currency),
            },
            None => PriceChanges::default(),
        }
    }
}

/// Percentage price changes; `None` means not reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChanges {
    pub h24: Option<f64>,
    pub d7: Option<f64>,
    pub d30: Option<f64>,
    pub y1: Option<f64>,
}

/// Result of a `/simple/price` query for one coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplePrice {
    pub coin_id: String,
    pub usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Price history from `/coins/{id}/market_chart`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketChart {
    pub prices: Vec<PricePoint>,
}

/// One OHLC bar from `/coins/{id}/ohlc`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Decoded lookup result as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Detail(CoinDetail),
    Price(SimplePrice),
    MarketChart(MarketChart),
    Ohlc(Vec<Candle>),
}

impl Payload {
    pub fn kind(&self) -> LookupKind {
        match self {
            Payload::Detail(_) => LookupKind::Detail,
            Payload::Price(_) => LookupKind::Price,
            Payload::MarketChart(_) => LookupKind::MarketChart,
            Payload::Ohlc(_) => LookupKind::Ohlc,
        }
    }

    /// Untagged JSON form of the inner value
    pub fn data_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Payload::Detail(detail) => serde_json::to_value(detail),
            Payload::Price(price) => serde_json::to_value(price),
            Payload::MarketChart(chart) => serde_json::to_value(chart),
            Payload::Ohlc(candles) => serde_json::to_value(candles),
        }
    }

    /// Rebuilds a payload of `kind` from its untagged JSON form
    pub fn from_data(kind: LookupKind, data: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            LookupKind::Detail => Payload::Detail(serde_json::from_value(data)?),
            LookupKind::Price => Payload::Price(serde_json::from_value(data)?),
            LookupKind::MarketChart => Payload::MarketChart(serde_json::from_value(data)?),
            LookupKind::Ohlc => Payload::Ohlc(serde_json::from_value(data)?),
        })
    }
}

/// Overall component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Component is operational with fresh data
    Healthy,
    /// Component still serves data but the last refresh failed or data is old
    Degraded,
    /// Component has no data to serve
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(id: &str, name: &str, rank: Option<u32>, price: Option<f64>) -> CoinSummary {
        CoinSummary {
            id: id.to_string(),
            symbol: id[..3].to_string(),
            name: name.to_string(),
            image: String::new(),
            current_price: price,
            market_cap: price.map(|p| p * 1000.0),
            market_cap_rank: rank,
            price_change_percentage_24h: None,
            price_change_percentage_7d_in_currency: None,
            total_volume: None,
            circulating_supply: None,
        }
    }

    fn sample() -> Snapshot {
        Snapshot::new(
            vec![
                coin("bitcoin", "Bitcoin", Some(1), Some(60000.0)),
                coin("ethereum", "Ethereum", Some(2), Some(3000.0)),
                coin("unranked-coin", "Unranked", None, None),
                coin("dogecoin", "Dogecoin", Some(9), Some(0.1)),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn test_sort_by_price_keeps_missing_last() {
        let snapshot = sample();

        let asc: Vec<_> = snapshot
            .sorted_by(SortKey::Price, SortOrder::Ascending)
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(asc, vec!["dogecoin", "ethereum", "bitcoin", "unranked-coin"]);

        let desc: Vec<_> = snapshot
            .sorted_by(SortKey::Price, SortOrder::Descending)
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(desc, vec!["bitcoin", "ethereum", "dogecoin", "unranked-coin"]);
    }

    #[test]
    fn test_sort_by_name_ignores_case() {
        let snapshot = sample();
        let names: Vec<_> = snapshot
            .sorted_by(SortKey::Name, SortOrder::Ascending)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Bitcoin", "Dogecoin", "Ethereum", "Unranked"]);
    }

    #[test]
    fn test_search_matches_name_and_symbol() {
        let snapshot = sample();
        assert_eq!(snapshot.search("ETH").len(), 1);
        assert_eq!(snapshot.search("coin").len(), 2);
        assert!(snapshot.search("   ").is_empty());
    }

    #[test]
    fn test_with_error_keeps_coins() {
        let snapshot = sample();
        let failed = snapshot.with_error(SnapshotError {
            kind: ErrorKind::Network,
            message: "boom".to_string(),
            occurred_at: Utc::now(),
        });
        assert_eq!(failed.len(), 4);
        assert_eq!(failed.fetched_at, snapshot.fetched_at);
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_coin_detail_tolerates_null_currency_values() {
        let detail: CoinDetail = serde_json::from_value(serde_json::json!({
            "id": "ethereum",
            "symbol": "eth",
            "name": "Ethereum",
            "image": {"large": "https://example.org/eth.png"},
            "market_data": {
                "current_price": {"usd": 3100.5, "eur": null},
                "price_change_percentage_24h_in_currency": {"usd": -1.25},
                "price_change_percentage_1y_in_currency": null
            }
        }))
        .unwrap();

        assert_eq!(detail.price_usd(), Some(3100.5));
        let changes = detail.price_changes();
        assert_eq!(changes.h24, Some(-1.25));
        assert_eq!(changes.d7, None);
        assert_eq!(changes.y1, None);
    }

    #[test]
    fn test_lookup_params_fingerprint() {
        assert_eq!(LookupParams::default().fingerprint(), "");
        assert_eq!(LookupParams::days(ChartDays::Year).fingerprint(), "days=365");
    }

    #[test]
    fn test_age_keeps_millisecond_precision_and_clamps_future() {
        let fetched_at = Utc::now();
        let snapshot = Snapshot::new(Vec::new(), fetched_at);

        let later = fetched_at + chrono::Duration::milliseconds(1500);
        assert_eq!(
            snapshot.age(later),
            Some(std::time::Duration::from_millis(1500))
        );

        let earlier = fetched_at - chrono::Duration::seconds(5);
        assert_eq!(snapshot.age(earlier), Some(std::time::Duration::ZERO));
        assert_eq!(Snapshot::empty().age(later), None);
    }
}
