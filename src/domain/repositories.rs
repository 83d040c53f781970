//! Repository Pattern Abstractions
//!
//! Persistence seams between orchestration and SQL. The Postgres
//! implementations live under `infrastructure::persistence`; integration
//! tests substitute in-memory fakes behind the same traits.

use crate::domain::alerts::regime::RegimeTracking;
use crate::domain::signals::aggregation::WindowPosition;
use crate::domain::types::{
    AlertRecord, AlertScope, AlertStateRecord, AlertType, Asset, ContributorBreakdown,
    HealthRecord, IngestRun, PositionSnapshot, SignalRecord, UniverseMember, UniverseRun,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// The tracked cohort and its refresh history.
#[async_trait]
pub trait UniverseRepository: Send + Sync {
    /// The current cohort, ordered by rank.
    async fn current(&self) -> Result<Vec<UniverseMember>>;

    /// Record a refresh run that did not replace the universe.
    async fn record_run(&self, run: &UniverseRun) -> Result<i64>;

    /// Atomically record a run, its member list, and the new current
    /// universe. Returns the run id.
    async fn replace(&self, run: &UniverseRun, members: &[UniverseMember]) -> Result<i64>;
}

/// Position snapshots, ingest runs and the health feed.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Commit one ingestion cycle as a unit: snapshot rows, the run row
    /// and the derived health row. Re-running a snapshot_ts replaces all
    /// of its rows. Returns the health row it appended.
    async fn record_cycle(
        &self,
        rows: &[PositionSnapshot],
        run: &IngestRun,
        stale_after: chrono::Duration,
    ) -> Result<HealthRecord>;

    /// Latest non-dirty snapshot per wallet with `from < ts <= to`.
    async fn latest_in_window(
        &self,
        asset: Asset,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<String, WindowPosition>>;

    /// Median |szi| per wallet over non-dirty snapshots since `since`.
    /// Wallets without history are simply absent.
    async fn median_abs_szi(
        &self,
        asset: Asset,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, f64>>;

    /// Most recent health row, if any.
    async fn latest_health(&self) -> Result<Option<HealthRecord>>;
}

/// Persisted signals and contributor breakdowns.
#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Alignment scores strictly before `before`, most recent first.
    async fn alignment_history(
        &self,
        asset: Asset,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<f64>>;

    async fn upsert_signal(&self, record: &SignalRecord) -> Result<()>;

    async fn upsert_contributors(&self, contributors: &ContributorBreakdown) -> Result<()>;
}

/// Alert log and the durable per-(scope, type) alert state.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn state(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
    ) -> Result<Option<AlertStateRecord>>;

    /// Flip the active flag, leaving cooldown and tracking columns as
    /// they are.
    async fn set_active(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
        is_active: bool,
    ) -> Result<()>;

    /// Record a successful fire: last_triggered_ts and, when the type
    /// carries one, cooldown_until.
    async fn mark_fired(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
        triggered_at: DateTime<Utc>,
        cooldown_until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Persist the regime tracking columns for an asset.
    async fn save_regime_tracking(&self, asset: Asset, tracking: &RegimeTracking) -> Result<()>;

    /// Append to the alert log (suppressed entries included). Returns
    /// the alert id.
    async fn insert_alert(&self, alert: &AlertRecord) -> Result<i64>;

    /// Non-suppressed alerts for a scope since `since` (quota input).
    async fn fired_count_since(&self, scope: AlertScope, since: DateTime<Utc>) -> Result<i64>;
}
