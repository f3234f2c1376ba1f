//! Built-in provider adapters.

pub mod http_json;

pub use http_json::HttpJsonAdapter;

use std::sync::Arc;

use crate::core::adapter::SharedAdapter;
use crate::error::Result;
use crate::storage::config::Config;

/// One adapter per `[[providers]]` entry that names a `base_url`.
///
/// Entries without a `base_url` only override metadata of adapters registered
/// in code.
///
/// # Errors
/// Returns an error if an HTTP client cannot be built.
pub fn adapters_from_config(config: &Config) -> Result<Vec<SharedAdapter>> {
    let timeout = config.engine.call_timeout();
    config
        .providers
        .iter()
        .filter(|p| p.base_url.is_some())
        .map(|p| -> Result<SharedAdapter> {
            Ok(Arc::new(HttpJsonAdapter::from_settings(p, timeout)?))
        })
        .collect()
}
