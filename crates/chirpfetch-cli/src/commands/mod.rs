mod clear_cache;
mod fetch;
mod status;
mod strategies;

use std::process::ExitCode;

use chirpfetch_core::AcquisitionConfig;

use crate::cli::{ChainArgs, Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<ExitCode, CliError> {
    match &cli.command {
        Command::Fetch(args) => {
            let config = load_config(cli, Some(&args.chain))?;
            fetch::run(args, &config, cli.pretty).await
        }
        Command::Status => {
            let config = load_config(cli, None)?;
            status::run(&config, cli.pretty)
        }
        Command::Strategies(chain) => {
            let config = load_config(cli, Some(chain))?;
            strategies::run(&config, cli.pretty)
        }
        Command::ClearCache => {
            let config = load_config(cli, None)?;
            clear_cache::run(&config, cli.pretty)
        }
    }
}

/// Environment first, then command-line overrides.
fn load_config(cli: &Cli, chain: Option<&ChainArgs>) -> Result<AcquisitionConfig, CliError> {
    let mut config = AcquisitionConfig::from_env()?;
    if let Some(path) = &cli.state_file {
        config = config.with_state_file(path);
    }
    if let Some(path) = &cli.cache_file {
        config = config.with_cache_file(path);
    }
    if let Some(chain) = chain {
        if !chain.strategies.is_empty() {
            config = config.with_strategies(chain.strategies.clone());
        }
        config = config.with_offline(!chain.no_offline);
    }
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}
