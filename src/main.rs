//! CLI Entry Point for telemerge
//!
//! Reads a GoPro clip, extracts its telemetry track with ffmpeg, renders the sensor
//! channels with gpmd2csv, and writes one merged CSV table.
//!
//! # Usage
//!
//! ```bash
//! telemerge GX010042.MP4 GX010042.csv
//! telemerge GX010042.MP4 GX010042.csv --strategy timestamp --config telemerge.toml
//! ```
//!
//! Exit status is zero on success and non-zero on any failure.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use telemerge::{logging, MergeStrategy, Pipeline, TelemergeConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "telemerge")]
#[command(about = "Merge GoPro accelerometer, gyroscope and GPS telemetry into one CSV", long_about = None)]
struct Cli {
    /// GoPro clip to read
    input: PathBuf,

    /// Destination CSV file (overwritten)
    output: PathBuf,

    /// Configuration file (TOML). Defaults to ./telemerge.toml when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Merge strategy override
    #[arg(long, value_enum)]
    strategy: Option<MergeStrategy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TelemergeConfig::load_from(path),
        None => TelemergeConfig::load(),
    }
    .context("failed to load configuration")?;

    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    if let Some(strategy) = cli.strategy {
        config.merge.strategy = strategy;
    }
    config.validate().context("invalid configuration")?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let pipeline = Pipeline::with_external_tools(config);
    let summary = pipeline
        .run(&cli.input, &cli.output)
        .await
        .with_context(|| format!("failed to merge telemetry from '{}'", cli.input.display()))?;

    info!(
        rows = summary.data_rows,
        channels = summary.channels,
        output = %cli.output.display(),
        "done"
    );
    Ok(())
}
