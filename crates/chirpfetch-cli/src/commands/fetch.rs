use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use chirpfetch_core::{
    AcquisitionConfig, AcquisitionReport, CacheMode, OrchestratorBuilder, ReqwestHttpClient,
};

use crate::cli::FetchArgs;
use crate::error::CliError;
use crate::output;

/// Exit status for a completed but unsuccessful acquisition.
const ACQUISITION_FAILED: u8 = 1;

pub async fn run(args: &FetchArgs, config: &AcquisitionConfig, pretty: bool) -> Result<ExitCode, CliError> {
    let orchestrator =
        OrchestratorBuilder::from_config(config, Arc::new(ReqwestHttpClient::new()))?.build()?;
    let max_count = usize::try_from(args.max_count).unwrap_or(usize::MAX);

    let token = CancellationToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling acquisition");
                token.cancel();
            }
        })
    };
    let deadline = args.deadline_secs.map(|secs| {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::warn!(deadline_secs = secs, "deadline reached; cancelling acquisition");
            token.cancel();
        })
    });

    let mode = if args.no_cache {
        CacheMode::Bypass
    } else if args.refresh {
        CacheMode::Refresh
    } else {
        CacheMode::Use
    };
    let result = orchestrator
        .acquire_with(&args.handle, max_count, mode, &token)
        .await;

    interrupt.abort();
    if let Some(deadline) = deadline {
        deadline.abort();
    }

    let success = result.success;
    output::render(&AcquisitionReport::from(result), pretty)?;

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(ACQUISITION_FAILED)
    })
}
