//! Squall CLI: ships remote request logs into a replicated queue.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use squall::checkpoint::CheckpointStore;
use squall::config::{Config, SinkMode, job_name_from_path};
use squall::envelope::EnvelopeContext;
use squall::error::{AddressParseSnafu, MetricsSnafu, PipelineError};
use squall::pipeline::JobParams;
use squall::sink::{LocalFileSink, TransportSink};
use squall::source::{HttpLogSource, LogLevel};
use squall::{Extractor, WindowWalker, init_metrics, init_tracing, shutdown_signal};
use squall_common::transport::SideChannel;
use squall_common::{Format, IndexClient, ReplicatedTransport};

#[derive(Debug, Parser)]
#[command(name = "squall", about = "Ship remote request logs to a replicated queue")]
struct CliArgs {
    /// Path to the YAML config file.
    #[arg(long, default_value = "squall.yaml")]
    config: PathBuf,

    /// Resume point override: first window start, epoch seconds.
    /// Default is the persisted checkpoint, else "now" minus the safety lag.
    #[arg(long)]
    start_timestamp: Option<i64>,

    /// Stop bound, epoch seconds. With --start-timestamp this runs a
    /// bounded replay that leaves the tailing job's checkpoint untouched.
    #[arg(long)]
    end_timestamp: Option<i64>,

    /// Checkpoint/metrics identity override; defaults to the config
    /// file stem.
    #[arg(long)]
    job_name: Option<String>,
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

    let job = args
        .job_name
        .clone()
        .unwrap_or_else(|| job_name_from_path(&args.config));

    match run(config, args, job).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Extraction failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config, args: CliArgs, job: String) -> Result<(), PipelineError> {
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

    // Explicit bounded replays must not perturb the tailing job's
    // resumable checkpoint.
    let bounded_replay = args.start_timestamp.is_some() && args.end_timestamp.is_some();
    let checkpoint = if bounded_replay {
        info!("Bounded replay, checkpointing disabled");
        CheckpointStore::disabled()
    } else {
        CheckpointStore::new(Path::new(&config.checkpoint.dir), &job)
    };

    let start_after = match args.start_timestamp {
        Some(start) => Some(start),
        None => checkpoint.load().await,
    };

    let walker = WindowWalker::new(
        config.windows.slice_secs,
        config.windows.safety_lag_secs,
        start_after,
        args.end_timestamp,
        shutdown.clone(),
    );

    let host = source_host(&config.source.base_url);
    let format = Format::from_name(&config.queue.format, Format::Raw);

    let mut transport =
        ReplicatedTransport::connect(&config.queue, host.clone(), &shutdown).await?;
    if config.sink.mode == SinkMode::BulkIndex {
        transport = transport.with_index_client(IndexClient::new(config.index.nodes.clone())?);
    }
    if let Some(addr) = &config.sink.side_channel_addr {
        if let Some(channel) = SideChannel::bind(addr.clone()).await {
            transport = transport.with_side_channel(channel);
        }
    }

    let file_sink = config
        .sink
        .file_dir
        .as_ref()
        .map(|dir| LocalFileSink::new(PathBuf::from(dir), format, host.clone()));
    let sink = TransportSink::new(transport, config.sink.mode, file_sink, shutdown.clone());

    let source = HttpLogSource::new(&config.source)?;

    let params = JobParams {
        job: job.clone(),
        app_name: config.source.app_name.clone(),
        min_level: LogLevel::from_name(&config.source.min_level),
        versions: config.source.versions.clone(),
        tz: config.tz(),
    };
    let ctx = EnvelopeContext {
        record_type: config.record_type(),
        tags: config.source.tags.clone(),
        environment: config.source.environment.clone(),
        tz: config.tz(),
    };

    info!(job = %job, app = %config.source.app_name, "Starting extraction");

    let extractor = Extractor::new(params, ctx, source, sink, walker, checkpoint);
    extractor.run().await;

    Ok(())
}

/// Host tag carried on wire records: the source's host, falling back to
/// the local machine name.
fn source_host(base_url: &str) -> String {
    let host = base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or("")
        .to_string();

    if host.is_empty() {
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string())
    } else {
        host
    }
}
