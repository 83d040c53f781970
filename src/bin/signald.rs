//! Signal daemon: five-minute behavioral signal computation and alert
//! evaluation over the snapshots the ingestion daemon writes.
//!
//! # Usage
//! ```sh
//! signald            # run forever
//! signald --once     # one cycle, then exit
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 fatal init failure, 130 interrupt.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;
use walletpulse::application::alerts::AlertEngine;
use walletpulse::application::signals::{SignalEngine, SignalRunner};
use walletpulse::config::Config;
use walletpulse::domain::repositories::{
    AlertRepository, SignalRepository, SnapshotRepository,
};
use walletpulse::infrastructure::persistence::database::Database;
use walletpulse::infrastructure::persistence::repositories::{
    PgAlertRepository, PgSignalRepository, PgSnapshotRepository,
};

#[derive(Parser, Debug)]
#[command(name = "signald", about = "Behavioral signal computation")]
struct Args {
    /// Run a single signal cycle, then exit.
    #[arg(long)]
    once: bool,
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
    info!("signald {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Signal interval {}s", config.signal_interval_sec);

    let database = Database::new(&config.database_url).await?;

    let snapshots: Arc<dyn SnapshotRepository> =
        Arc::new(PgSnapshotRepository::new(database.clone()));
    let signals: Arc<dyn SignalRepository> = Arc::new(PgSignalRepository::new(database.clone()));
    let alerts: Arc<dyn AlertRepository> = Arc::new(PgAlertRepository::new(database.clone()));

    let alert_engine = AlertEngine::new(alerts, snapshots.clone());
    let engine = SignalEngine::new(snapshots, signals, alert_engine, config.signal_interval());
    let runner = SignalRunner::new(engine, config.signal_interval());

    if args.once {
        info!("Running in single-shot mode");
        let result = runner.run_once().await;
        database.close().await;
        result?;
        return Ok(false);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(runner.run(shutdown_rx));

    info!("Signal computation running. Press Ctrl+C to shut down.");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, draining in-flight cycle...");
    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;
    database.close().await;

    Ok(true)
}
