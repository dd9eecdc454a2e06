//! Common utilities shared across connectors.
//!
//! This module provides reusable functions for vector parsing, HTTP client
//! creation, URL validation, and HTTP status classification.

use crate::error::{Error, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Default HTTP timeout for all connectors.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Wait suggested for a 429 without a usable `Retry-After` header.
pub const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 1;

/// Creates a configured HTTP client with timeout.
#[must_use]
pub fn create_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Validates a store URL.
pub fn validate_url(url: &str) -> Result<()> {
    let has_valid_scheme = ["http://", "https://"].iter().any(|s| url.starts_with(s));

    if !has_valid_scheme {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }

    if url.len() < 10 || url.trim_end_matches('/').ends_with("://") {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }

    Ok(())
}

/// Parses a vector from a JSON value.
///
/// Accepts a JSON array of numbers, or an object holding exactly one named
/// vector.
pub fn parse_vector_from_json(value: &Value, field_name: &str) -> Result<Vec<f32>> {
    match value {
        Value::Array(arr) => arr
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    Error::InvalidRecord(format!("Vector '{}' has a non-numeric element", field_name))
                })
            })
            .collect(),
        Value::Object(map) if map.len() == 1 => match map.values().next() {
            Some(inner) => parse_vector_from_json(inner, field_name),
            None => Err(Error::InvalidRecord(format!("Vector '{}' is empty", field_name))),
        },
        _ => Err(Error::InvalidRecord(format!(
            "Vector field '{}' is not an array",
            field_name
        ))),
    }
}

/// Maps an HTTP error status to the error taxonomy.
pub fn handle_http_error(
    status_code: u16,
    retry_after: Option<u64>,
    body: &str,
    source_name: &str,
) -> Error {
    match status_code {
        429 => Error::RateLimit(retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS)),
        401 | 403 => Error::Authentication(format!("{} auth failed: {}", source_name, body)),
        408 | 500..=599 => Error::TransientNetwork(format!(
            "{} error {}: {}",
            source_name, status_code, body
        )),
        _ => Error::Http(format!("{} error {}: {}", source_name, status_code, body)),
    }
}
