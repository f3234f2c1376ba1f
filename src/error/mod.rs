//! Error types for shiptrack.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Two layers of errors exist:
//! - [`ErrorKind`]: the provider-failure taxonomy adapters classify into. These are
//!   captured inside `RawResult`s and never abort an aggregation on their own.
//! - [`TrackError`]: errors surfaced by the engine to callers, grouped into
//!   categories (Routing, Provider, Network, Configuration, Storage, Internal).
//!
//! Each `TrackError` has a stable error code (e.g., `SHIP-R001`) for programmatic
//! handling.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Provider Failure Taxonomy
// =============================================================================

/// Classification of a single provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad or missing credential.
    AuthError,
    /// The provider does not know this tracking number.
    NotFound,
    /// The provider throttled us.
    RateLimit,
    /// The call did not complete in time.
    Timeout,
    /// Connection-level or 5xx failure.
    NetworkError,
    /// The provider answered with something unparseable.
    InvalidResponse,
    /// The router found no eligible provider.
    NoProviderAvailable,
    /// Every attempted provider failed.
    NoData,
}

impl ErrorKind {
    /// Whether a call that failed with this kind may be retried against the same provider.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Timeout | Self::NetworkError)
    }

    /// Whether this kind reflects the provider being unhealthy.
    ///
    /// `NOT_FOUND` is a valid answer from a responsive provider.
    #[must_use]
    pub const fn counts_against_health(self) -> bool {
        !matches!(self, Self::NotFound)
    }

    /// Stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthError => "AUTH_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::NoProviderAvailable => "NO_PROVIDER_AVAILABLE",
            Self::NoData => "NO_DATA",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider's failure, kept for diagnostics when everything fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailure {
    pub provider_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.provider_id, self.kind, self.message)
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// No provider could be selected for a request.
    Routing,
    /// Providers answered with failures.
    Provider,
    /// Timeouts and transport issues.
    Network,
    /// Config file parsing, validation, or bad input.
    Configuration,
    /// Cache persistence issues.
    Storage,
    /// Unexpected errors.
    Internal,
}

impl ErrorCategory {
    /// Human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Routing => "Routing error",
            Self::Provider => "Provider error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Internal => "Internal error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// No provider could serve the request
    NoProvider = 2,
    /// Bad input or configuration
    ConfigError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

// =============================================================================
// Engine Errors
// =============================================================================

/// Main error type for shiptrack operations.
#[derive(Error, Debug)]
pub enum TrackError {
    // ==========================================================================
    // Routing errors (Category: Routing)
    // ==========================================================================
    /// No provider supports the request, has tokens, and is up.
    #[error("no provider available for {tracking_number} ({tracking_type})")]
    NoProviderAvailable {
        tracking_number: String,
        tracking_type: String,
    },

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// Every attempted provider failed and no stale cache entry exists.
    #[error("no data for {tracking_number}: {}", join_failures(.failures))]
    AllProvidersFailed {
        tracking_number: String,
        failures: Vec<ProviderFailure>,
    },

    /// The resolver was given no successful result.
    #[error("no successful provider result to resolve")]
    NoData,

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// A whole tracking request exceeded its deadline.
    #[error("tracking request for {tracking_number} timed out after {}ms", .after.as_millis())]
    Timeout {
        tracking_number: String,
        after: Duration,
    },

    /// Generic HTTP client failure outside of a provider call.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Tracking number failed basic validation.
    #[error("invalid tracking number '{0}'")]
    InvalidTrackingNumber(String),

    /// Unknown tracking type label.
    #[error("invalid tracking type '{0}'")]
    InvalidTrackingType(String),

    /// Unknown priority label.
    #[error("invalid priority '{0}'")]
    InvalidPriority(String),

    /// Error parsing the configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid { key: String, message: String },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Lifecycle errors (Category: Internal)
    // ==========================================================================
    /// The engine or batch queue is shutting down.
    #[error("engine is shutting down")]
    ShuttingDown,

    /// A request was dropped before its completion was delivered.
    #[error("request {0} was dropped before completion")]
    Dropped(String),

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// Cache snapshot store failure.
    #[error("cache store error: {0}")]
    Store(String),

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrackError {
    /// Map error to CLI exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::NoProviderAvailable { .. } => ExitCode::NoProvider,

            Self::InvalidTrackingNumber(_)
            | Self::InvalidTrackingType(_)
            | Self::InvalidPriority(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_) => ExitCode::ConfigError,

            Self::Timeout { .. } => ExitCode::Timeout,

            Self::AllProvidersFailed { .. }
            | Self::NoData
            | Self::Network(_)
            | Self::ShuttingDown
            | Self::Dropped(_)
            | Self::Store(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NoProviderAvailable { .. } => ErrorCategory::Routing,
            Self::AllProvidersFailed { .. } | Self::NoData => ErrorCategory::Provider,
            Self::Timeout { .. } | Self::Network(_) => ErrorCategory::Network,
            Self::InvalidTrackingNumber(_)
            | Self::InvalidTrackingType(_)
            | Self::InvalidPriority(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_) => ErrorCategory::Configuration,
            Self::Store(_) => ErrorCategory::Storage,
            Self::ShuttingDown
            | Self::Dropped(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Stable error code for programmatic handling.
    ///
    /// Format: `SHIP-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoProviderAvailable { .. } => "SHIP-R001",

            Self::AllProvidersFailed { .. } => "SHIP-P001",
            Self::NoData => "SHIP-P002",

            Self::Timeout { .. } => "SHIP-N001",
            Self::Network(_) => "SHIP-N099",

            Self::InvalidTrackingNumber(_) => "SHIP-C001",
            Self::InvalidTrackingType(_) => "SHIP-C002",
            Self::InvalidPriority(_) => "SHIP-C003",
            Self::ConfigParse { .. } => "SHIP-C010",
            Self::ConfigInvalid { .. } => "SHIP-C011",
            Self::Config(_) => "SHIP-C012",

            Self::Store(_) => "SHIP-S001",

            Self::ShuttingDown => "SHIP-X001",
            Self::Dropped(_) => "SHIP-X002",
            Self::Io(_) => "SHIP-X010",
            Self::Json(_) => "SHIP-X011",
            Self::Other(_) => "SHIP-X099",
        }
    }

    /// Whether the caller may reasonably retry the whole request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Network(_)
                | Self::AllProvidersFailed { .. }
                | Self::NoProviderAvailable { .. }
        )
    }

    /// Whether this failure should fall back to a stale cache read.
    #[must_use]
    pub const fn allows_stale_fallback(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::AllProvidersFailed { .. }
                | Self::NoData
                | Self::NoProviderAvailable { .. }
        )
    }

    /// Per-provider failures carried by this error, if any.
    #[must_use]
    pub fn provider_failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Result type alias for shiptrack operations.
pub type Result<T> = std::result::Result<T, TrackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(!ErrorKind::AuthError.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::InvalidResponse.is_retryable());
    }

    #[test]
    fn error_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::NetworkError).unwrap();
        assert_eq!(json, "\"NETWORK_ERROR\"");
        assert_eq!(ErrorKind::NetworkError.to_string(), "NETWORK_ERROR");
    }

    #[test]
    fn aggregated_error_lists_every_failure() {
        let err = TrackError::AllProvidersFailed {
            tracking_number: "MAEU1234567".to_string(),
            failures: vec![
                ProviderFailure {
                    provider_id: "alpha".to_string(),
                    kind: ErrorKind::NetworkError,
                    message: "connection reset".to_string(),
                },
                ProviderFailure {
                    provider_id: "beta".to_string(),
                    kind: ErrorKind::AuthError,
                    message: "bad key".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("alpha: NETWORK_ERROR"));
        assert!(text.contains("beta: AUTH_ERROR"));
        assert_eq!(err.provider_failures().len(), 2);
        assert_eq!(err.error_code(), "SHIP-P001");
        assert_eq!(err.category(), ErrorCategory::Provider);
    }

    #[test]
    fn exit_codes() {
        let err = TrackError::NoProviderAvailable {
            tracking_number: "X".to_string(),
            tracking_type: "container".to_string(),
        };
        assert_eq!(err.exit_code(), ExitCode::NoProvider);
        assert_eq!(
            TrackError::InvalidPriority("urgent".to_string()).exit_code(),
            ExitCode::ConfigError
        );
        assert_eq!(i32::from(ExitCode::Timeout), 4);
    }

    #[test]
    fn stale_fallback_applies_to_total_failures_only() {
        assert!(TrackError::NoData.allows_stale_fallback());
        assert!(!TrackError::InvalidTrackingNumber("x".to_string()).allows_stale_fallback());
        assert!(!TrackError::ShuttingDown.allows_stale_fallback());
    }
}
