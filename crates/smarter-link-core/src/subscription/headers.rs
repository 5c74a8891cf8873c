//! Parsing for the subscribe request headers.
//!
//! The timeout travels as `Second-<n>` and the callback as `<url>`, the same
//! shapes UPnP eventing uses.

use std::time::Duration;

use reqwest::Url;

use crate::error::SubscriptionError;

const TIMEOUT_PREFIX: &str = "Second-";

/// Parse a `Second-<n>` timeout header into a duration.
pub fn parse_timeout_header(value: &str) -> Result<Duration, SubscriptionError> {
    let seconds = value
        .trim()
        .strip_prefix(TIMEOUT_PREFIX)
        .ok_or_else(|| SubscriptionError::InvalidTimeout(value.to_string()))?;

    if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SubscriptionError::InvalidTimeout(value.to_string()));
    }

    seconds
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| SubscriptionError::InvalidTimeout(value.to_string()))
}

/// Parse a `<url>` callback header. Only http and https callbacks are accepted.
pub fn parse_callback_header(value: &str) -> Result<Url, SubscriptionError> {
    let inner = value
        .trim()
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'))
        .ok_or_else(|| SubscriptionError::InvalidCallback(value.to_string()))?;

    let url = Url::parse(inner)
        .map_err(|e| SubscriptionError::InvalidCallback(format!("{}: {}", value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SubscriptionError::InvalidCallback(format!(
            "unsupported scheme '{}'",
            other
        ))),
    }
}
