//! Borderly
//!
//! Usage:
//!     borderly --config borderly.toml
//!     borderly --config appsettings.json --log-level debug

mod config;

use std::path::PathBuf;

use anyhow::Context;
use borderly_pipeline::Worker;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "borderly",
    version,
    about = "Watch a directory and write bordered, resized copies of every image"
)]
struct Args {
    /// Configuration file (`.json` or TOML)
    #[arg(long, env = "BORDERLY_CONFIG", default_value = "borderly.toml")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `borderly_pipeline=trace` (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    let config = config::load(&args.config)?;
    info!(
        "Loaded {} profiles from {}",
        config.profiles.len(),
        args.config.display()
    );
    if args.check {
        info!("Configuration is valid");
        return Ok(());
    }

    let worker = Worker::new(config).context("failed to create pipeline")?;
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => error!("Failed to listen for Ctrl+C: {e}"),
            }
        }
    });

    worker.run(shutdown).await.context("pipeline failed")?;
    Ok(())
}

fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level: {level}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
