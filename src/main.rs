//! # InfluxDB Uploader - Replay Driver
//!
//! Plays the role of the host test engine: reads aggregated snapshots as JSON
//! lines and drives the uploader through its lifecycle.
//!
//! 1. **Initialize logging** with the uploader's console formatter
//! 2. **Load settings** from `--config` plus command-line overrides
//! 3. **Prepare**: resolve credentials and ping InfluxDB (fatal on failure)
//! 4. **Feed**: deliver each snapshot, then poll `check` as the engine would
//! 5. **Post-process**: flush whatever is still buffered
//!
//! Example:
//!
//! ```text
//! INFLUXDB_USER=admin INFLUXDB_PASSWORD=secret \
//!   influxdb-uploader --config uploader.json --input kpis.jsonl
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use influxdb_uploader::{cli::Args, logging, InfluxDbUploader, MetricSnapshot, SendOutcome};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(if args.verbose { "debug" } else { "info" });

    info!("Starting InfluxDB Uploader v{}", influxdb_uploader::VERSION);

    let settings = args.settings().context("Failed to load settings")?;
    debug!("Settings: {:?}", settings);

    let mut uploader: InfluxDbUploader = InfluxDbUploader::new(settings);
    uploader
        .prepare()
        .await
        .context("Failed to prepare uploader")?;
    uploader.startup()?;

    let reader = open_input(&args.input)?;
    let mut delivered = 0usize;
    let mut skipped = 0usize;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read input line {}", lineno + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<MetricSnapshot>(&line) {
            Ok(snapshot) => {
                uploader.aggregated_second(snapshot)?;
                delivered += 1;
            }
            Err(e) => {
                warn!("Skipping malformed snapshot on line {}: {}", lineno + 1, e);
                skipped += 1;
                continue;
            }
        }

        if let Some(outcome) = uploader.check().await? {
            report(outcome);
        }
    }

    let outcome = uploader.post_process().await?;
    report(outcome);

    info!(
        "Delivered {} snapshots to the pipeline ({} skipped)",
        delivered, skipped
    );
    Ok(())
}

fn open_input(input: &str) -> Result<Box<dyn BufRead>> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).with_context(|| format!("Failed to open input {}", input))?;
    Ok(Box::new(BufReader::new(file)))
}

fn report(outcome: SendOutcome) {
    match outcome {
        SendOutcome::Delivered { attempts } => debug!("Batch delivered after {} attempt(s)", attempts),
        SendOutcome::Dropped => warn!("Batch dropped after retry; the series will have a gap"),
        SendOutcome::Rejected => warn!("Batch rejected by InfluxDB"),
    }
}
