use std::process::ExitCode;
use std::sync::Arc;

use serde::Serialize;

use chirpfetch_core::{AcquisitionConfig, ReqwestHttpClient};

use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct StrategyRow {
    name: String,
    priority: u16,
    timeout_ms: u64,
    network: bool,
}

#[derive(Debug, Serialize)]
struct StrategiesReport {
    strategies: Vec<StrategyRow>,
}

pub fn run(config: &AcquisitionConfig, pretty: bool) -> Result<ExitCode, CliError> {
    let chain = config.build_strategies(Arc::new(ReqwestHttpClient::new()))?;
    let mut strategies: Vec<StrategyRow> = chain
        .iter()
        .map(|strategy| {
            let descriptor = strategy.descriptor();
            StrategyRow {
                name: descriptor.name.clone(),
                priority: descriptor.priority,
                timeout_ms: u64::try_from(descriptor.timeout.as_millis()).unwrap_or(u64::MAX),
                network: descriptor.network,
            }
        })
        .collect();
    strategies.sort_by_key(|row| row.priority);

    output::render(&StrategiesReport { strategies }, pretty)?;
    Ok(ExitCode::SUCCESS)
}
