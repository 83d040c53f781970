//! The minute-boundary ingestion loop.

use super::{SnapshotIngester, UniverseRefresher};
use crate::application::clock;
use crate::domain::types::IngestStatus;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info};

pub struct IngestionRunner {
    refresher: UniverseRefresher,
    ingester: SnapshotIngester,
    snapshot_interval: chrono::Duration,
    refresh_after: chrono::Duration,
    last_refresh: Option<DateTime<Utc>>,
}

impl IngestionRunner {
    pub fn new(
        refresher: UniverseRefresher,
        ingester: SnapshotIngester,
        snapshot_interval: chrono::Duration,
        refresh_after: chrono::Duration,
    ) -> Self {
        Self {
            refresher,
            ingester,
            snapshot_interval,
            refresh_after,
            last_refresh: None,
        }
    }

    /// Run cycles at every minute boundary until `shutdown` flips.
    /// Cycles never overlap; an overrun simply delays the next boundary.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Ingestion loop started (interval {}s, universe refresh every {}h)",
            self.snapshot_interval.num_seconds(),
            self.refresh_after.num_hours()
        );

        // Populate the cohort before the first aligned cycle.
        self.refresh_if_due(false).await;

        loop {
            let now = Utc::now();
            let next = clock::next_boundary(now, self.snapshot_interval);
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }

            self.refresh_if_due(false).await;

            if let Err(e) = self.ingester.ingest(Utc::now()).await {
                error!("Ingestion cycle could not be recorded: {:#}", e);
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!("Ingestion loop stopped");
    }

    /// Single cycle for `--once`, optionally forcing a universe refresh.
    pub async fn run_once(&mut self, force_refresh: bool) -> Result<()> {
        if force_refresh {
            self.refresher.refresh().await?;
        }
        self.ingester.ingest(Utc::now()).await?;
        Ok(())
    }

    async fn refresh_if_due(&mut self, force: bool) {
        let due = force
            || match self.last_refresh {
                None => true,
                Some(at) => Utc::now() - at >= self.refresh_after,
            };
        if !due {
            return;
        }

        match self.refresher.refresh().await {
            Ok(run) if run.status == IngestStatus::Success => {
                self.last_refresh = Some(Utc::now());
            }
            Ok(run) => {
                error!(
                    "Universe refresh failed: {}",
                    run.error.as_deref().unwrap_or("unknown error")
                );
            }
            Err(e) => error!("Universe refresh could not be recorded: {:#}", e),
        }
    }
}
