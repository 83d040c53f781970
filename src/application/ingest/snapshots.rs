//! Minute-boundary snapshot ingestion.

use crate::application::clock;
use crate::domain::ports::ExchangeService;
use crate::domain::repositories::{SnapshotRepository, UniverseRepository};
use crate::domain::types::{Asset, IngestRun, IngestStatus, PositionSnapshot};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct SnapshotIngester {
    exchange: Arc<dyn ExchangeService>,
    universe: Arc<dyn UniverseRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    max_concurrency: usize,
    stale_after: chrono::Duration,
}

impl SnapshotIngester {
    pub fn new(
        exchange: Arc<dyn ExchangeService>,
        universe: Arc<dyn UniverseRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        max_concurrency: usize,
        stale_after: chrono::Duration,
    ) -> Self {
        Self {
            exchange,
            universe,
            snapshots,
            max_concurrency,
            stale_after,
        }
    }

    /// Run one ingestion cycle for the minute containing `now`.
    ///
    /// Mid-cycle failures (universe read, persistence) roll back the
    /// cycle's transaction and are converted into a recorded failed run;
    /// only a failure to record that run propagates.
    pub async fn ingest(&self, now: DateTime<Utc>) -> Result<IngestRun> {
        let snapshot_ts = clock::floor(now, chrono::Duration::minutes(1));
        let timer = Instant::now();

        match self.run_cycle(snapshot_ts, &timer).await {
            Ok(run) => Ok(run),
            Err(e) => {
                error!("Snapshot ingestion failed: {:#}", e);
                let run = IngestRun {
                    snapshot_ts,
                    status: IngestStatus::Failed,
                    wallets_expected: 0,
                    wallets_succeeded: 0,
                    wallets_failed: 0,
                    rows_expected: 0,
                    rows_written: 0,
                    coverage_pct: 0.0,
                    duration_ms: timer.elapsed().as_millis() as i64,
                    error: Some(format!("{e:#}")),
                };
                self.snapshots
                    .record_cycle(&[], &run, self.stale_after)
                    .await
                    .context("Failed to record failed ingest run")?;
                Ok(run)
            }
        }
    }

    async fn run_cycle(&self, snapshot_ts: DateTime<Utc>, timer: &Instant) -> Result<IngestRun> {
        info!("Starting snapshot ingestion for {}", snapshot_ts);

        let members = self
            .universe
            .current()
            .await
            .context("Failed to read current universe")?;

        let wallets_expected = members.len();
        let rows_expected = (wallets_expected * Asset::ALL.len()) as i64;

        if wallets_expected == 0 {
            warn!("No wallets in universe");
            let run = IngestRun {
                snapshot_ts,
                status: IngestStatus::Failed,
                wallets_expected: 0,
                wallets_succeeded: 0,
                wallets_failed: 0,
                rows_expected: 0,
                rows_written: 0,
                coverage_pct: 0.0,
                duration_ms: timer.elapsed().as_millis() as i64,
                error: Some("No wallets in universe".to_string()),
            };
            let health = self.snapshots.record_cycle(&[], &run, self.stale_after).await?;
            info!("Health state updated: {}", health.health_state.as_str());
            return Ok(run);
        }

        let wallet_ids: Vec<String> = members.into_iter().map(|m| m.wallet_id).collect();

        info!("Fetching positions for {} wallets...", wallets_expected);
        let results = self
            .exchange
            .fetch_multiple(&wallet_ids, self.max_concurrency)
            .await;

        let wallets_succeeded = results.values().filter(|r| r.is_some()).count();
        let wallets_failed = wallets_expected - wallets_succeeded;
        let coverage_pct = wallets_succeeded as f64 / wallets_expected as f64 * 100.0;

        info!(
            "Wallet fetch complete: {} succeeded, {} failed ({:.1}% coverage)",
            wallets_succeeded, wallets_failed, coverage_pct
        );

        // Failed wallets contribute no rows at all; succeeded wallets get
        // a row per tracked asset, zero-szi when they hold nothing.
        let mut rows = Vec::with_capacity(wallets_succeeded * Asset::ALL.len());
        for (wallet_id, result) in &results {
            let Some(positions) = result else {
                continue;
            };
            for asset in Asset::ALL {
                let detail = positions.for_asset(asset);
                rows.push(PositionSnapshot {
                    snapshot_ts,
                    wallet_id: wallet_id.clone(),
                    asset,
                    szi: detail.szi,
                    entry_px: detail.entry_px,
                    liq_px: detail.liq_px,
                    leverage: detail.leverage,
                    margin_used: detail.margin_used,
                });
            }
        }

        let status = IngestStatus::from_coverage(coverage_pct);
        let error = match status {
            IngestStatus::Failed => Some(format!("Coverage too low: {coverage_pct:.1}%")),
            _ => None,
        };

        let run = IngestRun {
            snapshot_ts,
            status,
            wallets_expected: wallets_expected as i64,
            wallets_succeeded: wallets_succeeded as i64,
            wallets_failed: wallets_failed as i64,
            rows_expected,
            rows_written: rows.len() as i64,
            coverage_pct,
            duration_ms: timer.elapsed().as_millis() as i64,
            error,
        };

        let health = self
            .snapshots
            .record_cycle(&rows, &run, self.stale_after)
            .await?;

        info!(
            "Snapshot {} complete: status={} rows={} health={} ({}ms)",
            snapshot_ts,
            run.status.as_str(),
            run.rows_written,
            health.health_state.as_str(),
            run.duration_ms
        );

        Ok(run)
    }
}
