//! HTTP client utilities shared by HTTP-backed adapters.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, StatusCode};

use crate::error::{ErrorKind, Result, TrackError};

/// Build a configured HTTP client.
///
/// # Errors
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("shiptrack/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TrackError::Network(e.to_string()))
}

/// Provider failure kind for a non-success HTTP status.
#[must_use]
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::AuthError,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        s if s.is_server_error() => ErrorKind::NetworkError,
        _ => ErrorKind::InvalidResponse,
    }
}

/// Provider failure kind for a transport error.
#[must_use]
pub fn classify_transport(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_decode() {
        ErrorKind::InvalidResponse
    } else {
        ErrorKind::NetworkError
    }
}

/// `Retry-After` header in delta-seconds form.
///
/// HTTP-date values are ignored; the caller's backoff applies instead.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
