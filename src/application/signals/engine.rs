//! One five-minute signal cycle: lock check, per-asset computation,
//! persistence, then alert evaluation.

use crate::application::alerts::AlertEngine;
use crate::domain::repositories::{SignalRepository, SnapshotRepository};
use crate::domain::signals::aggregation::{build_wallet_deltas, delta_counts};
use crate::domain::signals::classifier::{classify_cohort, count_states};
use crate::domain::signals::core::{
    TREND_HISTORY_PERIODS, alignment_score, alignment_trend, dispersion_index,
    exit_cluster_score,
};
use crate::domain::signals::playbook;
use crate::domain::types::{
    Asset, ContributorBreakdown, HealthState, IngestStatus, SignalRecord, SignalSet,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Snapshot history consulted for the per-wallet noise floor.
const EPSILON_LOOKBACK_HOURS: i64 = 24;

pub struct SignalEngine {
    snapshots: Arc<dyn SnapshotRepository>,
    signals: Arc<dyn SignalRepository>,
    alerts: AlertEngine,
    signal_interval: chrono::Duration,
}

impl SignalEngine {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        signals: Arc<dyn SignalRepository>,
        alerts: AlertEngine,
        signal_interval: chrono::Duration,
    ) -> Self {
        Self {
            snapshots,
            signals,
            alerts,
            signal_interval,
        }
    }

    /// Run the full cycle for one aligned boundary. Per-asset failures
    /// are isolated; the error surface is the log.
    pub async fn run_cycle(&self, signal_ts: DateTime<Utc>) -> Result<()> {
        info!("Signal computation cycle: {}", signal_ts);
        let now = Utc::now();

        // The dead-man's-switch is evaluated every cycle, lock or not:
        // it is exactly the unhealthy case it must cover.
        if let Err(e) = self.alerts.evaluate_system(now).await {
            error!("System stale evaluation failed: {:#}", e);
        }

        if !self.signal_lock_open().await? {
            warn!("Signal lock engaged - skipping computation");
            return Ok(());
        }

        let mut computed = Vec::new();
        for asset in Asset::ALL {
            match self.compute_asset(signal_ts, asset).await {
                Ok(record) => {
                    let s = &record.signals;
                    info!(
                        "{}: {} / {} | CAS={:.1} trend={} Di={:.1} EC={:.1} | {} wallets ({} missing) in {}ms",
                        asset,
                        s.allowed_playbook,
                        s.risk_mode,
                        s.alignment_score,
                        s.alignment_trend,
                        s.dispersion_index,
                        s.exit_cluster_score,
                        record.wallet_count,
                        record.missing_count,
                        record.computation_ms
                    );
                    computed.push(record);
                }
                Err(e) => error!("Signal computation failed for {}: {:#}", asset, e),
            }
        }

        info!(
            "Signal computation complete: {}/{} assets",
            computed.len(),
            Asset::ALL.len()
        );

        if let Err(e) = self.alerts.evaluate_behavioral(now, &computed).await {
            error!("Alert evaluation failed: {:#}", e);
        }

        Ok(())
    }

    /// The lock is open only when a health row exists, is not stale, and
    /// the last run did not fail.
    async fn signal_lock_open(&self) -> Result<bool> {
        let Some(health) = self.snapshots.latest_health().await? else {
            warn!("No health state found - signal lock engaged");
            return Ok(false);
        };

        if health.health_state == HealthState::Stale {
            warn!(
                "Signal lock engaged: data is stale (last success: {:?})",
                health.last_success_snapshot_ts
            );
            return Ok(false);
        }

        if health.snapshot_status == IngestStatus::Failed {
            warn!("Signal lock engaged: last ingestion failed");
            return Ok(false);
        }

        Ok(true)
    }

    async fn compute_asset(&self, signal_ts: DateTime<Utc>, asset: Asset) -> Result<SignalRecord> {
        let timer = Instant::now();

        let current = self
            .snapshots
            .latest_in_window(asset, signal_ts - self.signal_interval, signal_ts)
            .await?;
        let previous = self
            .snapshots
            .latest_in_window(
                asset,
                signal_ts - self.signal_interval * 2,
                signal_ts - self.signal_interval,
            )
            .await?;

        let deltas = build_wallet_deltas(&current, &previous);
        let (wallet_count, missing_count) = delta_counts(&deltas);

        let medians = self
            .snapshots
            .median_abs_szi(
                asset,
                signal_ts - chrono::Duration::hours(EPSILON_LOOKBACK_HOURS),
            )
            .await?;

        let classifications = classify_cohort(&deltas, asset, &medians);
        let counts = count_states(&classifications);

        let ec = exit_cluster_score(counts.reducer, counts.total());
        let cas = alignment_score(counts.adder_long, counts.adder_short, counts.total(), ec);
        let history = self
            .signals
            .alignment_history(asset, signal_ts, TREND_HISTORY_PERIODS as i64)
            .await?;
        let trend = alignment_trend(cas, &history);
        let di = dispersion_index(&classifications);

        let resolution = playbook::resolve(cas, trend, di, ec);

        let record = SignalRecord {
            signal_ts,
            asset,
            signals: SignalSet {
                alignment_score: cas,
                alignment_trend: trend,
                dispersion_index: di,
                exit_cluster_score: ec,
                allowed_playbook: resolution.playbook,
                risk_mode: resolution.risk_mode,
                add_exposure: resolution.add_exposure,
                tighten_stops: resolution.tighten_stops,
            },
            wallet_count: wallet_count as i64,
            missing_count: missing_count as i64,
            computation_ms: timer.elapsed().as_millis() as i64,
        };

        self.signals.upsert_signal(&record).await?;

        if counts.total() > 0 {
            self.signals
                .upsert_contributors(&ContributorBreakdown {
                    signal_ts,
                    asset,
                    counts,
                    percentages: counts.percentages(),
                })
                .await?;
        }

        Ok(record)
    }
}
