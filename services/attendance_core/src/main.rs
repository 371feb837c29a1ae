//! Attendance core service binary
//!
//! Usage:
//!   attendance-core run
//!   attendance-core --config core.toml status
//!   attendance-core lookup --lat 40.4093 --lon 49.8671

use anyhow::{Context, Result};
use attendance_core::CoreRuntime;
use clap::{Parser, Subcommand};
use core_config::Settings;
use geocoding_service::{Coordinate, GeocodingService, LookupOutcome};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "attendance-core")]
#[command(about = "Attendance backend pool and geocoding service")]
#[command(version)]
struct Args {
    /// Optional TOML settings file; environment variables take precedence
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the pool and lookup service and run until Ctrl-C
    Run {
        /// Seconds between status log lines
        #[arg(long, default_value_t = 60)]
        status_interval: u64,
    },
    /// Start, print status as JSON, and stop
    Status,
    /// Resolve one coordinate to an address
    Lookup {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let settings = Settings::load(args.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    match args.command {
        Command::Run { status_interval } => {
            run(settings, Duration::from_secs(status_interval.max(1))).await
        }
        Command::Status => status(settings).await,
        Command::Lookup { lat, lon } => lookup(settings, Coordinate::new(lat, lon)).await,
    }
}

async fn run(settings: Settings, status_interval: Duration) -> Result<()> {
    info!("Starting attendance core");
    let mut runtime = CoreRuntime::start(settings)
        .await
        .context("Failed to start core runtime")?;

    let mut ticker = tokio::time::interval(status_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = runtime.status();
                info!(
                    live = report.pool.live,
                    idle = report.pool.idle,
                    in_use = report.pool.in_use,
                    acquire_timeouts = report.pool.acquire_timeouts,
                    cache_entries = report.lookup.cache_entries,
                    cache_hits = report.lookup.metrics.cache_hits,
                    provider_calls = report.lookup.metrics.provider_calls,
                    "Status"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Received shutdown signal");
                break;
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}

async fn status(settings: Settings) -> Result<()> {
    let mut runtime = CoreRuntime::start(settings)
        .await
        .context("Failed to start core runtime")?;

    let report = serde_json::to_string_pretty(&runtime.status())?;
    runtime.shutdown().await;

    println!("{}", report);
    Ok(())
}

async fn lookup(settings: Settings, coord: Coordinate) -> Result<()> {
    let service = GeocodingService::new(settings.lookup).context("Failed to build provider")?;

    let outcome = service.lookup_default(coord).await;
    let (source, address, reason) = match &outcome {
        LookupOutcome::Cached(address) => ("cache", Some(address.as_str()), None),
        LookupOutcome::Resolved(address) => (service.provider_name(), Some(address.as_str()), None),
        LookupOutcome::Unavailable(reason) => ("none", None, Some(reason.to_string())),
    };

    let output = serde_json::json!({
        "lat": coord.lat,
        "lon": coord.lon,
        "address": address,
        "source": source,
        "reason": reason,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&args.log_level)
            .with_context(|| format!("Invalid log level: {}", args.log_level))?,
    };

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}
