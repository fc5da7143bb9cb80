//! Error types for the coin dashboard core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when fetching data from the upstream API
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Invalid or unexpected response payload
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Upstream answered with HTTP 429
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Upstream answered with a non-success status
    #[error("Provider API error: {0}")]
    ApiError(String),

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Request URL could not be built from the configuration
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Provider settings cannot be turned into a client
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    /// Creates an InvalidResponse error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Classifies the error into the transport or payload family
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::InvalidResponse(_) => ErrorKind::Parse,
            ProviderError::NetworkError(e) if e.is_decode() => ErrorKind::Parse,
            _ => ErrorKind::Network,
        }
    }

    /// True when the payload could not be understood
    pub fn is_parse_failure(&self) -> bool {
        self.kind() == ErrorKind::Parse
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Broad failure family surfaced to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure or non-2xx status
    Network,
    /// Malformed or unexpected payload shape
    Parse,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Errors raised by durable key-value storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing medium failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key contains characters the backend cannot store
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// The blocking task running a storage call panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors that can occur while assembling a `Dashboard`
#[derive(Debug, Error)]
pub enum DashboardError {
    /// The HTTP provider could not be built
    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    /// The storage directory could not be opened
    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),
}
