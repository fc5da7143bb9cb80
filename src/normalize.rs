//! Response body normalization
//!
//! Upstream bodies arrive either as the plain JSON document or wrapped by a
//! pass-through relay. Relays use two conventions: the whole document
//! encoded as a JSON string, or an object whose `contents` field carries the
//! document. Both are unwrapped here so callers only ever decode one shape.

use crate::error::ProviderError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A response body with any relay wrapping removed
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Body was the document itself
    Raw(Value),
    /// Body was a relay envelope around the document
    Wrapped(Value),
}

impl Normalized {
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Normalized::Wrapped(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            Normalized::Raw(value) | Normalized::Wrapped(value) => value,
        }
    }

    /// Decodes the unwrapped document into a typed value
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ProviderError> {
        serde_json::from_value(self.into_value()).map_err(|e| {
            ProviderError::invalid_response(format!("Unexpected payload shape: {}", e))
        })
    }
}

/// Parses a response body and strips relay wrapping
pub fn normalize_body(body: &str) -> Result<Normalized, ProviderError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("Response is not JSON: {}", e))
    })?;
    normalize_value(value)
}

/// Strips relay wrapping from an already parsed body
pub fn normalize_value(value: Value) -> Result<Normalized, ProviderError> {
    match value {
        Value::String(inner) => parse_inner(&inner).map(Normalized::Wrapped),
        Value::Object(mut map) => match map.remove("contents") {
            Some(Value::String(inner)) => parse_inner(&inner).map(Normalized::Wrapped),
            Some(contents @ (Value::Object(_) | Value::Array(_))) => {
                Ok(Normalized::Wrapped(contents))
            }
            Some(other) => {
                map.insert("contents".to_string(), other);
                Ok(Normalized::Raw(Value::Object(map)))
            }
            None => Ok(Normalized::Raw(Value::Object(map))),
        },
        other => Ok(Normalized::Raw(other)),
    }
}

fn parse_inner(inner: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(inner).map_err(|e| {
        ProviderError::invalid_response(format!("Relay envelope holds invalid JSON: {}", e))
    })
}
