//! The five-minute signal loop.

use super::SignalEngine;
use crate::application::clock;
use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

pub struct SignalRunner {
    engine: SignalEngine,
    signal_interval: chrono::Duration,
}

impl SignalRunner {
    pub fn new(engine: SignalEngine, signal_interval: chrono::Duration) -> Self {
        Self {
            engine,
            signal_interval,
        }
    }

    /// Run cycles at every aligned boundary until `shutdown` flips.
    /// Cycle errors are logged and never escape the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Signal loop started (interval {}s)",
            self.signal_interval.num_seconds()
        );

        loop {
            let now = Utc::now();
            let next = clock::next_boundary(now, self.signal_interval);
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }

            let signal_ts = clock::floor(Utc::now(), self.signal_interval);
            if let Err(e) = self.engine.run_cycle(signal_ts).await {
                error!("Signal cycle failed: {:#}", e);
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!("Signal loop stopped");
    }

    /// Single cycle for `--once`, against the current aligned boundary.
    pub async fn run_once(&self) -> Result<()> {
        let signal_ts = clock::floor(Utc::now(), self.signal_interval);
        self.engine.run_cycle(signal_ts).await
    }
}
