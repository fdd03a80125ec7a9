use std::process::ExitCode;
use std::sync::Arc;

use serde::Serialize;

use chirpfetch_core::{AcquisitionConfig, JsonFileStore, RateLimiter};

use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct StatusReport {
    allowed: bool,
    retry_after_secs: u64,
    used: usize,
    budget_ceiling: u32,
    window_secs: u64,
    state_file: String,
}

/// Runs an admission check against the state file. Like any admission, it
/// may reset an expired window or prune stale entries.
pub fn run(config: &AcquisitionConfig, pretty: bool) -> Result<ExitCode, CliError> {
    if config.budget_ceiling == 0 {
        return Err(chirpfetch_core::ConfigError::ZeroBudgetCeiling.into());
    }
    let limiter = RateLimiter::new(
        Arc::new(JsonFileStore::new(&config.state_file)),
        config.budget_ceiling,
    );
    let admission = limiter.admit();

    let report = StatusReport {
        allowed: admission.allowed,
        retry_after_secs: admission.retry_after.as_secs_f64().ceil() as u64,
        used: admission.used,
        budget_ceiling: limiter.budget_ceiling(),
        window_secs: limiter.window().as_secs(),
        state_file: config.state_file.display().to_string(),
    };
    output::render(&report, pretty)?;
    Ok(ExitCode::SUCCESS)
}
