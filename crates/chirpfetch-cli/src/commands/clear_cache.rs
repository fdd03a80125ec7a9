use std::process::ExitCode;

use serde::Serialize;

use chirpfetch_core::{AcquisitionConfig, ConfigError, ResponseCache, StoreError};

use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ClearCacheReport {
    cleared: usize,
    cache_file: String,
}

pub fn run(config: &AcquisitionConfig, pretty: bool) -> Result<ExitCode, CliError> {
    let path = config.cache_file.as_ref().ok_or(ConfigError::CacheNotConfigured)?;
    let cache = ResponseCache::new(path);
    let cleared = cache.clear().map_err(|error| match error {
        StoreError::Io(error) => CliError::Io(error),
        StoreError::Corrupt(error) => CliError::Serialization(error),
    })?;
    tracing::info!(cleared, cache_file = %path.display(), "response cache cleared");

    output::render(
        &ClearCacheReport {
            cleared,
            cache_file: path.display().to_string(),
        },
        pretty,
    )?;
    Ok(ExitCode::SUCCESS)
}
