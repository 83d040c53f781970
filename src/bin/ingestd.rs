//! Ingestion daemon: minute-boundary wallet snapshots plus the
//! interleaved six-hourly universe refresh.
//!
//! # Usage
//! ```sh
//! ingestd                    # run forever
//! ingestd --once             # one cycle, then exit
//! ingestd --once --refresh-universe
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 fatal init failure, 130 interrupt.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;
use walletpulse::application::ingest::{IngestionRunner, SnapshotIngester, UniverseRefresher};
use walletpulse::config::Config;
use walletpulse::domain::ports::ExchangeService;
use walletpulse::domain::repositories::{SnapshotRepository, UniverseRepository};
use walletpulse::infrastructure::exchange::HyperliquidClient;
use walletpulse::infrastructure::persistence::database::Database;
use walletpulse::infrastructure::persistence::repositories::{
    PgSnapshotRepository, PgUniverseRepository,
};

#[derive(Parser, Debug)]
#[command(name = "ingestd", about = "Wallet position snapshot ingestion")]
struct Args {
    /// Run a single ingestion cycle, then exit.
    #[arg(long)]
    once: bool,

    /// Force a universe refresh before the first cycle.
    #[arg(long)]
    refresh_universe: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(interrupted) => {
            if interrupted {
                std::process::exit(130);
            }
        }
        Err(e) => {
            tracing::error!("Fatal: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether we exited on an interrupt.
async fn run(args: Args) -> Result<bool> {
    info!("ingestd {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Universe size {}, snapshot interval {}s, refresh every {}h",
        config.universe_size, config.snapshot_interval_sec, config.universe_refresh_hours
    );

    let database = Database::new(&config.database_url).await?;

    let exchange: Arc<dyn ExchangeService> = Arc::new(HyperliquidClient::new(&config));
    let universe: Arc<dyn UniverseRepository> =
        Arc::new(PgUniverseRepository::new(database.clone()));
    let snapshots: Arc<dyn SnapshotRepository> =
        Arc::new(PgSnapshotRepository::new(database.clone()));

    let refresher = UniverseRefresher::new(
        exchange.clone(),
        universe.clone(),
        config.universe_size,
    );
    let ingester = SnapshotIngester::new(
        exchange,
        universe,
        snapshots,
        config.max_concurrency,
        chrono::Duration::minutes(config.stale_threshold_minutes),
    );
    let mut runner = IngestionRunner::new(
        refresher,
        ingester,
        config.snapshot_interval(),
        chrono::Duration::hours(config.universe_refresh_hours),
    );

    if args.once {
        info!("Running in single-shot mode");
        let result = runner.run_once(args.refresh_universe).await;
        database.close().await;
        result?;
        return Ok(false);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(runner.run(shutdown_rx));

    info!("Ingestion running. Press Ctrl+C to shut down.");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, draining in-flight cycle...");
    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;
    database.close().await;

    Ok(true)
}
