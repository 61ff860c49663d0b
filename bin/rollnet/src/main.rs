//! rollnet brings up a local rollup devnet and keeps it running until Ctrl+C.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::Cli;
use rollnet_devnet::{CONFIG_FILENAME, Lifecycle, LoggingListener, RunOutcome, Stack, StackConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = match &cli.config {
        Some(path) => StackConfig::load_from_file(path)?,
        None => StackConfig::default(),
    };
    let config = cli.apply(config);

    std::fs::create_dir_all(&config.artifacts_dir).with_context(|| {
        format!("Failed to create artifacts dir {}", config.artifacts_dir.display())
    })?;
    config.save_to_file(&config.artifacts_dir.join(CONFIG_FILENAME))?;

    tracing::info!(
        contracts = %config.contracts_root.display(),
        artifacts = %config.artifacts_dir.display(),
        l1 = %config.anvil.endpoint,
        engine = %config.engine,
        "Starting devnet..."
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            cancel.cancel();
        }
    });

    let lifecycle = Lifecycle::new(&cancel);
    let stack = Stack::from_config(config, Arc::new(LoggingListener));

    match stack.run(&cancel, &lifecycle).await? {
        RunOutcome::Ready(devnet) => {
            tracing::info!(
                l1_rpc = %devnet.l1_rpc,
                l2_engine = %devnet.l2_engine,
                l2_genesis = %devnet.l2_genesis_hash,
                funding_address = %devnet.funding_address,
                "Devnet is up, press Ctrl+C to stop"
            );
        }
        RunOutcome::Skipped { stage } => {
            tracing::warn!(%stage, "Devnet did not come up, press Ctrl+C to stop");
        }
    }

    cancel.cancelled().await;

    let report = lifecycle.release().await;
    for failure in &report.failures {
        tracing::error!(cleanup = %failure.label, error = %format!("{:#}", failure.error), "Cleanup failed");
    }
    anyhow::ensure!(report.is_clean(), "{} cleanup(s) failed", report.failures.len());

    Ok(())
}
