//! Pelican CLI: drains the log queue and bulk-loads records into the
//! index store.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pelican::error::{AddressParseSnafu, MetricsSnafu, PipelineError};
use pelican::{Config, Drain, init_metrics, init_tracing, shutdown_signal};
use squall_common::retry::RetryPolicy;
use squall_common::{IndexClient, QueueConnection};

#[derive(Debug, Parser)]
#[command(name = "pelican", about = "Drain the log queue into the index store")]
struct CliArgs {
    /// Path to the YAML config file.
    #[arg(long, default_value = "pelican.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Consumer failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), PipelineError> {
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        init_metrics(addr).context(MetricsSnafu)?;
    }

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let mut queue = QueueConnection::new(&config.queue.url, &config.queue.namespace)?;
    queue.connect(&RetryPolicy::connection(), &shutdown).await;

    let index = IndexClient::new(config.index.nodes.clone())?;

    info!(
        queue = %config.queue.url,
        namespace = %config.queue.namespace,
        "Starting consumer"
    );

    let drain = Drain::new(
        queue,
        index,
        config.drain.batch_size,
        Duration::from_secs(config.drain.poll_interval_secs),
        RetryPolicy::bulk_flush(),
        shutdown,
    );
    drain.run().await;

    Ok(())
}
