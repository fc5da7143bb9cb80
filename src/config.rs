//! Runtime configuration
//!
//! Defaults come from `constants`. `DashboardConfig::from_env` lets a
//! deployment override them without code changes:
//!
//! | Variable                         | Meaning                                   |
//! |----------------------------------|-------------------------------------------|
//! | `COINGECKO_API_URL`              | API base URL                              |
//! | `COINGECKO_API_KEY`              | Demo API key sent as `x-cg-demo-api-key`  |
//! | `COIN_DASHBOARD_RELAY_PREFIX`    | Pass-through relay in front of the API    |
//! | `COIN_DASHBOARD_REFRESH_SECS`    | Snapshot refresh interval                 |
//! | `COIN_DASHBOARD_MIN_DELAY_MS`    | Minimum spacing between requests          |
//! | `COIN_DASHBOARD_DETAIL_TTL_SECS` | Lifetime of cached lookups                |
//! | `COIN_DASHBOARD_STORAGE_DIR`     | Directory for persisted state             |

use crate::{
    constants::{
        COINGECKO_API_URL, DETAIL_TTL_SECS, MIN_REQUEST_DELAY_MS, REFRESH_INTERVAL_SECS,
        REQUEST_TIMEOUT_SECS,
    },
    error::ProviderError,
};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

/// Pass-through relay used when the API cannot be reached directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relay {
    /// Target URL appended verbatim (`https://relay.example/https://api...`)
    Prefix(String),
    /// Target URL encoded into a query parameter (`https://relay.example/raw?url=...`)
    QueryParam { base: String, param: String },
}

impl Relay {
    /// Interprets a relay string
    ///
    /// A relay ending in `?name=` takes the target as that query parameter;
    /// anything else is used as a plain prefix.
    pub fn parse(relay: &str) -> Self {
        if let Some((base, query)) = relay.split_once('?') {
            if let Some(param) = query.strip_suffix('=') {
                if !param.is_empty() && !param.contains('&') {
                    return Relay::QueryParam {
                        base: base.to_string(),
                        param: param.to_string(),
                    };
                }
            }
        }
        Relay::Prefix(relay.to_string())
    }

    /// Builds the relay URL that fetches `target`
    pub fn wrap(&self, target: &Url) -> Result<Url, ProviderError> {
        match self {
            Relay::Prefix(prefix) => Url::parse(&format!("{}{}", prefix, target))
                .map_err(|e| ProviderError::InvalidUrl(e.to_string())),
            Relay::QueryParam { base, param } => {
                Url::parse_with_params(base, &[(param.as_str(), target.as_str())])
                    .map_err(|e| ProviderError::InvalidUrl(e.to_string()))
            }
        }
    }
}

/// Configuration for the dashboard core
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// API base URL without trailing slash
    pub api_base_url: String,
    /// Optional demo API key
    pub api_key: Option<String>,
    /// Optional relay in front of the API
    pub relay: Option<Relay>,
    /// Snapshot refresh interval
    pub refresh_interval: Duration,
    /// Minimum spacing between outbound requests
    pub min_request_delay: Duration,
    /// Lifetime of cached lookups
    pub detail_ttl: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// Directory for persisted state; in-memory storage when unset
    pub storage_dir: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: COINGECKO_API_URL.to_string(),
            api_key: None,
            relay: None,
            refresh_interval: Duration::from_secs(REFRESH_INTERVAL_SECS),
            min_request_delay: Duration::from_millis(MIN_REQUEST_DELAY_MS),
            detail_ttl: Duration::from_secs(DETAIL_TTL_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            storage_dir: None,
        }
    }
}

impl DashboardConfig {
    /// Builds a configuration from defaults and environment overrides
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            api_base_url: non_empty("COINGECKO_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            api_key: non_empty("COINGECKO_API_KEY"),
            relay: non_empty("COIN_DASHBOARD_RELAY_PREFIX").map(|r| Relay::parse(&r)),
            refresh_interval: duration_var(
                &lookup,
                "COIN_DASHBOARD_REFRESH_SECS",
                Duration::from_secs,
                defaults.refresh_interval,
            ),
            min_request_delay: duration_var(
                &lookup,
                "COIN_DASHBOARD_MIN_DELAY_MS",
                Duration::from_millis,
                defaults.min_request_delay,
            ),
            detail_ttl: duration_var(
                &lookup,
                "COIN_DASHBOARD_DETAIL_TTL_SECS",
                Duration::from_secs,
                defaults.detail_ttl,
            ),
            request_timeout: defaults.request_timeout,
            storage_dir: non_empty("COIN_DASHBOARD_STORAGE_DIR").map(PathBuf::from),
        }
    }
}

fn duration_var<F>(lookup: &F, name: &str, unit: fn(u64) -> Duration, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => unit(value),
            _ => {
                tracing::warn!(variable = name, value = %raw, "Ignoring invalid duration override");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = DashboardConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.api_base_url, COINGECKO_API_URL);
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.min_request_delay, Duration::from_millis(6000));
        assert_eq!(config.detail_ttl, Duration::from_secs(120));
        assert!(config.relay.is_none());
        assert!(config.storage_dir.is_none());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = DashboardConfig::from_lookup(lookup_from(&[
            ("COINGECKO_API_URL", "https://pro-api.example.com/api/v3/"),
            ("COINGECKO_API_KEY", "demo-key"),
            ("COIN_DASHBOARD_MIN_DELAY_MS", "2500"),
            ("COIN_DASHBOARD_REFRESH_SECS", "soon"),
            ("COIN_DASHBOARD_DETAIL_TTL_SECS", "0"),
        ]));
        assert_eq!(config.api_base_url, "https://pro-api.example.com/api/v3");
        assert_eq!(config.api_key.as_deref(), Some("demo-key"));
        assert_eq!(config.min_request_delay, Duration::from_millis(2500));
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.detail_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_relay_styles() {
        let target = Url::parse("https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd").unwrap();

        let query = Relay::parse("https://api.allorigins.win/raw?url=");
        assert_eq!(
            query,
            Relay::QueryParam {
                base: "https://api.allorigins.win/raw".to_string(),
                param: "url".to_string(),
            }
        );
        let wrapped = query.wrap(&target).unwrap();
        let (_, value) = wrapped.query_pairs().next().unwrap();
        assert_eq!(value, target.as_str());

        let prefix = Relay::parse("https://cors-anywhere.herokuapp.com/");
        let wrapped = prefix.wrap(&target).unwrap();
        assert!(wrapped
            .as_str()
            .starts_with("https://cors-anywhere.herokuapp.com/https:"));
        assert!(wrapped.as_str().ends_with("ids=bitcoin&vs_currencies=usd"));
    }
}
