//! playlake: builds the tracks, artists, users, time and session-play
//! tables from raw NDJSON track metadata and session logs.
//!
//! A bare invocation reads `playlake.yaml` and runs every step.

use clap::Parser;
use playlake::config::{Config, DEFAULT_CONFIG_PATH};
use playlake::error::{ConfigSnafu, MetricsSnafu, PipelineError};
use playlake::pipeline::tables::DESTINATIONS;
use playlake::{metrics, run_pipeline};
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Raw music logs to partitioned Parquet analytics tables.
#[derive(Parser, Debug)]
#[command(name = "playlake")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, env = "PLAYLAKE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration and print the plan without processing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("playlake starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if config.metrics.enabled {
        let addr = metrics::server::parse_address(&config.metrics.address)
            .context(MetricsSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Source: {}", config.source.path);
        info!("  Tracks: {}", config.source.tracks_pattern);
        info!("  Events: {}", config.source.events_pattern);
        info!("Sink: {}", config.sink.path);
        for (destination, partition_columns) in DESTINATIONS {
            if partition_columns.is_empty() {
                info!("  - {}", destination);
            } else {
                info!(
                    "  - {} partitioned by {}",
                    destination,
                    partition_columns.join(", ")
                );
            }
        }
        info!("Timezone: {}", config.transform.timezone);
        info!("Configuration is valid");
        return Ok(());
    }

    let stats = run_pipeline(config).await?;

    info!("Pipeline completed successfully");
    info!("  Tracks: {}", stats.tracks);
    info!("  Artists: {}", stats.artists);
    info!("  Users: {}", stats.users);
    info!("  Time: {}", stats.time);
    info!("  Session plays: {}", stats.session_plays);
    info!("  Parquet files written: {}", stats.files_written);
    info!("  Bytes written: {}", stats.bytes_written);

    Ok(())
}
