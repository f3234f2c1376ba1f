//! CLI argument parsing and command dispatch.

pub mod args;
pub mod config;
pub mod providers;
pub mod track;

pub use args::{Cli, Commands, OutputFormat};

use std::path::Path;
use std::sync::Arc;

use crate::core::engine::Engine;
use crate::error::Result;
use crate::providers::adapters_from_config;
use crate::storage::config::Config;
use crate::storage::paths::AppPaths;
use crate::storage::snapshot::SqliteCacheStore;

/// Load config from `path` (or the default location), apply env overrides, validate.
///
/// # Errors
/// Returns an error if the file cannot be parsed or a value is invalid.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Build an engine with one HTTP adapter per configured provider.
///
/// With `persist`, the cache is backed by the snapshot database; a database that
/// cannot be opened is logged and skipped.
///
/// # Errors
/// Returns an error if an adapter cannot be built or the config is invalid.
pub fn open_engine(config: Config, persist: bool) -> Result<Arc<Engine>> {
    let adapters = adapters_from_config(&config)?;
    let snapshot_path = config
        .cache
        .persist_path
        .clone()
        .unwrap_or_else(|| AppPaths::new().cache_snapshot_db());

    let mut builder = Engine::builder(config).with_adapters(adapters);
    if persist {
        match SqliteCacheStore::open(&snapshot_path) {
            Ok(store) => builder = builder.with_store(Arc::new(store)),
            Err(e) => tracing::warn!(
                path = %snapshot_path.display(),
                error = %e,
                "Cache snapshot unavailable, continuing without persistence"
            ),
        }
    }
    Ok(Arc::new(builder.build()?))
}
