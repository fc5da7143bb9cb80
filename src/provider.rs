//! Provider abstraction for fetching market data from the upstream API

use crate::{
    constants::{MARKETS_PER_PAGE, VS_CURRENCY},
    error::ProviderError,
    types::ChartDays,
};
use async_trait::async_trait;

/// Upstream endpoints consumed by the dashboard core
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Ranked coin list ordered by market cap
    Markets { per_page: u32, page: u32 },
    /// Full coin detail with market data
    CoinDetail { id: String },
    /// Current USD price for one or more coins
    SimplePrice { ids: Vec<String> },
    /// Daily price series
    MarketChart { id: String, days: ChartDays },
    /// OHLC candles
    Ohlc { id: String, days: ChartDays },
}

impl Endpoint {
    /// First page of the top coins
    pub fn top_markets() -> Self {
        Endpoint::Markets {
            per_page: MARKETS_PER_PAGE,
            page: 1,
        }
    }

    /// Path relative to the API base URL
    pub fn path(&self) -> String {
        match self {
            Endpoint::Markets { .. } => "/coins/markets".to_string(),
            Endpoint::CoinDetail { id } => format!("/coins/{}", id),
            Endpoint::SimplePrice { .. } => "/simple/price".to_string(),
            Endpoint::MarketChart { id, .. } => format!("/coins/{}/market_chart", id),
            Endpoint::Ohlc { id, .. } => format!("/coins/{}/ohlc", id),
        }
    }

    /// Query parameters in the order they are sent
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Endpoint::Markets { per_page, page } => vec![
                ("vs_currency", VS_CURRENCY.to_string()),
                ("order", "market_cap_desc".to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
                ("sparkline", "false".to_string()),
                ("price_change_percentage", "24h,7d".to_string()),
            ],
            Endpoint::CoinDetail { .. } => vec![
                ("localization", "false".to_string()),
                ("tickers", "false".to_string()),
                ("market_data", "true".to_string()),
                ("community_data", "false".to_string()),
                ("developer_data", "false".to_string()),
                ("sparkline", "false".to_string()),
            ],
            Endpoint::SimplePrice { ids } => vec![
                ("ids", ids.join(",")),
                ("vs_currencies", VS_CURRENCY.to_string()),
            ],
            Endpoint::MarketChart { days, .. } => vec![
                ("vs_currency", VS_CURRENCY.to_string()),
                ("days", days.as_days().to_string()),
                ("interval", "daily".to_string()),
            ],
            Endpoint::Ohlc { days, .. } => vec![
                ("vs_currency", VS_CURRENCY.to_string()),
                ("days", days.as_days().to_string()),
            ],
        }
    }

    /// Path with the unencoded query string appended, for logs
    pub fn path_and_query(&self) -> String {
        let query = self
            .query()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path(), query)
    }
}

/// Trait for market data providers
///
/// Implementations return the raw response body. Relay unwrapping and typed
/// decoding happen in the caller so every provider shares one normalization
/// path.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetches the body of a single upstream endpoint
    ///
    /// # Arguments
    /// * `endpoint` - The endpoint to request
    ///
    /// # Returns
    /// The response body, or an error for transport failures and non-2xx statuses
    async fn fetch_body(&self, endpoint: &Endpoint) -> Result<String, ProviderError>;

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markets_url_matches_upstream_contract() {
        assert_eq!(
            Endpoint::top_markets().path_and_query(),
            "/coins/markets?vs_currency=usd&order=market_cap_desc&per_page=100&page=1&sparkline=false&price_change_percentage=24h,7d"
        );
    }

    #[test]
    fn test_detail_and_chart_urls() {
        let detail = Endpoint::CoinDetail {
            id: "ethereum".to_string(),
        };
        assert_eq!(
            detail.path_and_query(),
            "/coins/ethereum?localization=false&tickers=false&market_data=true&community_data=false&developer_data=false&sparkline=false"
        );

        let chart = Endpoint::MarketChart {
            id: "bitcoin".to_string(),
            days: ChartDays::Week,
        };
        assert_eq!(
            chart.path_and_query(),
            "/coins/bitcoin/market_chart?vs_currency=usd&days=7&interval=daily"
        );

        let price = Endpoint::SimplePrice {
            ids: vec!["bitcoin".to_string()],
        };
        assert_eq!(
            price.path_and_query(),
            "/simple/price?ids=bitcoin&vs_currencies=usd"
        );
    }
}
