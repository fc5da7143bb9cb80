//! CoinGecko market data provider implementation

use crate::{
    config::{DashboardConfig, Relay},
    constants::{COINGECKO_API_KEY_HEADER, USER_AGENT},
    error::ProviderError,
    provider::{Endpoint, MarketDataProvider},
};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use std::time::Instant;

/// CoinGecko market data provider
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    relay: Option<Relay>,
}

impl CoinGeckoProvider {
    /// Creates a new CoinGecko provider from the dashboard configuration
    pub fn new(config: &DashboardConfig) -> Result<Self, ProviderError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(key) = &config.api_key {
            let value = header::HeaderValue::from_str(key)
                .map_err(|e| ProviderError::InvalidConfig(format!("Invalid API key header: {}", e)))?;
            headers.insert(COINGECKO_API_KEY_HEADER, value);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            relay: config.relay.clone(),
        })
    }

    /// Builds the request URL for an endpoint, routed through the relay when set
    pub fn build_url(&self, endpoint: &Endpoint) -> Result<Url, ProviderError> {
        let target = Url::parse_with_params(
            &format!("{}{}", self.base_url, endpoint.path()),
            endpoint.query(),
        )
        .map_err(|e| ProviderError::InvalidUrl(e.to_string()))?;

        match &self.relay {
            Some(relay) => relay.wrap(&target),
            None => Ok(target),
        }
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new(&DashboardConfig::default()).expect("Failed to create CoinGecko provider")
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    async fn fetch_body(&self, endpoint: &Endpoint) -> Result<String, ProviderError> {
        let url = self.build_url(endpoint)?;
        let start = Instant::now();
        tracing::debug!(url = %url, "Fetching from CoinGecko");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::NetworkError(e)
            }
        })?;

        // Check for rate limiting
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(endpoint = %endpoint.path_and_query(), "CoinGecko rate limit hit");
            return Err(ProviderError::RateLimitExceeded);
        }

        // Check for other errors
        if !response.status().is_success() {
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response.text().await.map_err(ProviderError::NetworkError)?;

        tracing::debug!(
            endpoint = %endpoint.path_and_query(),
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Fetched from CoinGecko"
        );

        Ok(body)
    }

    fn provider_name(&self) -> &'static str {
        "coingecko"
    }
}
