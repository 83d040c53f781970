//! Core domain types: tracked assets, behavioral enumerations and the
//! durable row shapes shared between the ingestion and signal sides.
//!
//! Enum values cross the persistence boundary as strings via
//! `as_str`/`FromStr`; everywhere else they are matched exhaustively.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Coverage at or above this is a successful ingest run.
pub const SUCCESS_COVERAGE_PCT: f64 = 95.0;
/// Coverage at or above this (but below success) is a partial run.
pub const PARTIAL_COVERAGE_PCT: f64 = 5.0;
/// Partial runs at or above this coverage leave health merely degraded.
pub const DEGRADED_COVERAGE_PCT: f64 = 80.0;

/// A tracked perpetual instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Asset {
    #[serde(rename = "HYPE")]
    Hype,
    #[serde(rename = "BTC")]
    Btc,
    #[serde(rename = "ETH")]
    Eth,
}

impl Asset {
    /// The fixed tracked universe of instruments.
    pub const ALL: [Asset; 3] = [Asset::Hype, Asset::Btc, Asset::Eth];

    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::Hype => "HYPE",
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
        }
    }

    /// Absolute noise floor for position changes, in base-asset units.
    pub fn epsilon_floor(&self) -> f64 {
        match self {
            Asset::Hype => 0.01,
            Asset::Btc => 0.0001,
            Asset::Eth => 0.001,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Asset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HYPE" => Ok(Asset::Hype),
            "BTC" => Ok(Asset::Btc),
            "ETH" => Ok(Asset::Eth),
            _ => bail!("Unknown asset: {}", s),
        }
    }
}

/// The discrete trading stance permitted by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Playbook {
    #[serde(rename = "Long-only")]
    LongOnly,
    #[serde(rename = "Short-only")]
    ShortOnly,
    #[serde(rename = "No-trade")]
    NoTrade,
}

impl Playbook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Playbook::LongOnly => "Long-only",
            Playbook::ShortOnly => "Short-only",
            Playbook::NoTrade => "No-trade",
        }
    }
}

impl fmt::Display for Playbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Playbook {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Long-only" => Ok(Playbook::LongOnly),
            "Short-only" => Ok(Playbook::ShortOnly),
            "No-trade" => Ok(Playbook::NoTrade),
            _ => bail!("Unknown playbook: {}", s),
        }
    }
}

/// Position-sizing posture attached to a playbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskMode {
    Normal,
    Reduced,
    Defensive,
}

impl RiskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskMode::Normal => "Normal",
            RiskMode::Reduced => "Reduced",
            RiskMode::Defensive => "Defensive",
        }
    }
}

impl fmt::Display for RiskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the alignment score relative to its recent average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Flat,
    Falling,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::Flat => "flat",
            Trend::Falling => "falling",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral state of a single wallet over one signal period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletState {
    AdderLong,
    AdderShort,
    Reducer,
    Flat,
}

impl WalletState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletState::AdderLong => "adder_long",
            WalletState::AdderShort => "adder_short",
            WalletState::Reducer => "reducer",
            WalletState::Flat => "flat",
        }
    }
}

/// Outcome of one ingest (or universe-refresh) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Success,
    Partial,
    Failed,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Success => "success",
            IngestStatus::Partial => "partial",
            IngestStatus::Failed => "failed",
        }
    }

    /// Map fetch coverage (percent) to a run status.
    pub fn from_coverage(coverage_pct: f64) -> Self {
        if coverage_pct >= SUCCESS_COVERAGE_PCT {
            IngestStatus::Success
        } else if coverage_pct >= PARTIAL_COVERAGE_PCT {
            IngestStatus::Partial
        } else {
            IngestStatus::Failed
        }
    }
}

impl FromStr for IngestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(IngestStatus::Success),
            "partial" => Ok(IngestStatus::Partial),
            "failed" => Ok(IngestStatus::Failed),
            _ => bail!("Unknown ingest status: {}", s),
        }
    }
}

/// The authoritative pipeline traffic light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Stale,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Stale => "stale",
        }
    }
}

impl FromStr for HealthState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(HealthState::Healthy),
            "degraded" => Ok(HealthState::Degraded),
            "stale" => Ok(HealthState::Stale),
            _ => bail!("Unknown health state: {}", s),
        }
    }
}

/// Which leaderboard endpoint satisfied a universe refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardSource {
    Stats,
    InfoApi,
    /// Neither endpoint answered; recorded on failed refresh runs.
    Unknown,
}

impl LeaderboardSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardSource::Stats => "stats-data",
            LeaderboardSource::InfoApi => "info-api",
            LeaderboardSource::Unknown => "unknown",
        }
    }
}

/// Alert kinds, with their fire-time cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    SystemStale,
    RegimeChange,
    ExitCluster,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SystemStale => "system_stale",
            AlertType::RegimeChange => "regime_change",
            AlertType::ExitCluster => "exit_cluster",
        }
    }

    /// Cooldown applied after a successful fire. The stale alert is
    /// single-fire until resolved and carries none.
    pub fn cooldown(&self) -> Option<chrono::Duration> {
        match self {
            AlertType::SystemStale => None,
            AlertType::RegimeChange => Some(chrono::Duration::minutes(30)),
            AlertType::ExitCluster => Some(chrono::Duration::minutes(60)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// What an alert row is about: a tracked asset, or the pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertScope {
    System,
    Asset(Asset),
}

impl AlertScope {
    /// Key used in `alert_state` (the SYSTEM sentinel is a literal there).
    pub fn state_key(&self) -> &'static str {
        match self {
            AlertScope::System => "SYSTEM",
            AlertScope::Asset(asset) => asset.as_str(),
        }
    }

    /// Asset column value for the `alerts` log (NULL for system scope).
    pub fn asset(&self) -> Option<Asset> {
        match self {
            AlertScope::System => None,
            AlertScope::Asset(asset) => Some(*asset),
        }
    }
}

impl fmt::Display for AlertScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_key())
    }
}

/// One parsed leaderboard entry.
#[derive(Debug, Clone)]
pub struct LeaderboardWallet {
    pub wallet_id: String,
    pub account_value: Option<f64>,
    pub month_pnl: f64,
    pub month_roi: f64,
}

/// One member of the tracked cohort. Ranks are dense and unique, 1..=N.
#[derive(Debug, Clone)]
pub struct UniverseMember {
    pub wallet_id: String,
    pub rank: i32,
    pub month_pnl: f64,
    pub month_roi: f64,
    pub account_value: Option<f64>,
}

/// Metadata of one universe-refresh run.
#[derive(Debug, Clone)]
pub struct UniverseRun {
    pub as_of_ts: DateTime<Utc>,
    pub status: IngestStatus,
    pub source: LeaderboardSource,
    pub n_requested: i64,
    pub n_received: i64,
    pub entered_count: i64,
    pub exited_count: i64,
    pub duration_ms: i64,
    pub error: Option<String>,
}

/// One per-(ts, wallet, asset) position observation. A wallet whose fetch
/// succeeded always yields a row per tracked asset, zero-szi when it has
/// no position.
#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    pub snapshot_ts: DateTime<Utc>,
    pub wallet_id: String,
    pub asset: Asset,
    pub szi: f64,
    pub entry_px: Option<f64>,
    pub liq_px: Option<f64>,
    pub leverage: Option<f64>,
    pub margin_used: Option<f64>,
}

/// Accounting for one ingestion cycle.
#[derive(Debug, Clone)]
pub struct IngestRun {
    pub snapshot_ts: DateTime<Utc>,
    pub status: IngestStatus,
    pub wallets_expected: i64,
    pub wallets_succeeded: i64,
    pub wallets_failed: i64,
    pub rows_expected: i64,
    pub rows_written: i64,
    pub coverage_pct: f64,
    pub duration_ms: i64,
    pub error: Option<String>,
}

/// One appended health observation; readers use the most recent row.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub health_ts: DateTime<Utc>,
    /// None until the first successful run ever.
    pub last_success_snapshot_ts: Option<DateTime<Utc>>,
    pub snapshot_status: IngestStatus,
    pub coverage_pct: f64,
    pub health_state: HealthState,
    pub error: Option<String>,
}

impl HealthRecord {
    /// Derive the health row for a finished run. `last_success` must be
    /// the most recent successful snapshot_ts including this run itself,
    /// read in the same transaction as the run upsert.
    pub fn derive(
        run: &IngestRun,
        last_success: Option<DateTime<Utc>>,
        stale_after: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let mut health_state = match run.status {
            IngestStatus::Success => HealthState::Healthy,
            IngestStatus::Partial if run.coverage_pct >= DEGRADED_COVERAGE_PCT => {
                HealthState::Degraded
            }
            _ => HealthState::Stale,
        };

        // A success older than the threshold (or none at all) overrides
        // whatever the current run looked like.
        match last_success {
            Some(ts) if now - ts <= stale_after => {}
            _ => health_state = HealthState::Stale,
        }

        Self {
            health_ts: run.snapshot_ts,
            last_success_snapshot_ts: last_success,
            snapshot_status: run.status,
            coverage_pct: run.coverage_pct,
            health_state,
            error: run.error.clone(),
        }
    }
}

/// Per-wallet signed-size movement between the two aggregation windows.
#[derive(Debug, Clone)]
pub struct WalletDelta {
    pub szi_current: f64,
    pub szi_previous: Option<f64>,
    /// None when the wallet has no snapshot in the previous window.
    pub delta: Option<f64>,
    pub ts_current: DateTime<Utc>,
    pub ts_previous: Option<DateTime<Utc>>,
}

/// A classified wallet. Only wallets with a computable delta are
/// classified, so every field here is concrete.
#[derive(Debug, Clone)]
pub struct WalletClassification {
    pub state: WalletState,
    pub szi_current: f64,
    pub szi_previous: f64,
    pub delta: f64,
    pub epsilon: f64,
}

/// Counts of the four behavioral states for one (signal_ts, asset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub adder_long: usize,
    pub adder_short: usize,
    pub reducer: usize,
    pub flat: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.adder_long + self.adder_short + self.reducer + self.flat
    }

    pub fn percentages(&self) -> StatePercentages {
        let total = self.total();
        if total == 0 {
            return StatePercentages::default();
        }
        let pct = |n: usize| n as f64 / total as f64 * 100.0;
        StatePercentages {
            add_long: pct(self.adder_long),
            add_short: pct(self.adder_short),
            reducers: pct(self.reducer),
            flat: pct(self.flat),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatePercentages {
    pub add_long: f64,
    pub add_short: f64,
    pub reducers: f64,
    pub flat: f64,
}

/// The four scalar signals plus their playbook resolution.
#[derive(Debug, Clone, Serialize)]
pub struct SignalSet {
    pub alignment_score: f64,
    pub alignment_trend: Trend,
    pub dispersion_index: f64,
    pub exit_cluster_score: f64,
    pub allowed_playbook: Playbook,
    pub risk_mode: RiskMode,
    pub add_exposure: bool,
    pub tighten_stops: bool,
}

/// One persisted signal row.
#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub signal_ts: DateTime<Utc>,
    pub asset: Asset,
    pub signals: SignalSet,
    pub wallet_count: i64,
    pub missing_count: i64,
    pub computation_ms: i64,
}

/// Contributor breakdown persisted alongside a signal when the cohort
/// was non-empty.
#[derive(Debug, Clone)]
pub struct ContributorBreakdown {
    pub signal_ts: DateTime<Utc>,
    pub asset: Asset,
    pub counts: StateCounts,
    pub percentages: StatePercentages,
}

/// Durable per-(scope, alert type) state row.
#[derive(Debug, Clone)]
pub struct AlertStateRecord {
    pub scope: AlertScope,
    pub alert_type: AlertType,
    pub is_active: bool,
    pub last_triggered_ts: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub previous_playbook: Option<Playbook>,
    pub pending_playbook: Option<Playbook>,
    pub pending_periods: i32,
}

/// One appended alert-log entry; never updated after insertion.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub alert_ts: DateTime<Utc>,
    pub scope: AlertScope,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub signal_snapshot: serde_json::Value,
    pub cooldown_until: DateTime<Utc>,
    pub suppressed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run(status: IngestStatus, coverage_pct: f64, ts: DateTime<Utc>) -> IngestRun {
        IngestRun {
            snapshot_ts: ts,
            status,
            wallets_expected: 200,
            wallets_succeeded: 0,
            wallets_failed: 0,
            rows_expected: 600,
            rows_written: 0,
            coverage_pct,
            duration_ms: 100,
            error: None,
        }
    }

    #[test]
    fn test_status_from_coverage_thresholds() {
        assert_eq!(IngestStatus::from_coverage(100.0), IngestStatus::Success);
        assert_eq!(IngestStatus::from_coverage(95.0), IngestStatus::Success);
        assert_eq!(IngestStatus::from_coverage(94.9), IngestStatus::Partial);
        assert_eq!(IngestStatus::from_coverage(5.0), IngestStatus::Partial);
        assert_eq!(IngestStatus::from_coverage(4.9), IngestStatus::Failed);
        assert_eq!(IngestStatus::from_coverage(0.0), IngestStatus::Failed);
    }

    #[test]
    fn test_health_derivation() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let stale_after = chrono::Duration::minutes(3);

        // Fresh success is healthy.
        let h = HealthRecord::derive(
            &run(IngestStatus::Success, 100.0, now),
            Some(now),
            stale_after,
            now,
        );
        assert_eq!(h.health_state, HealthState::Healthy);

        // Partial with decent coverage degrades while a recent success exists.
        let h = HealthRecord::derive(
            &run(IngestStatus::Partial, 85.0, now),
            Some(now - chrono::Duration::minutes(1)),
            stale_after,
            now,
        );
        assert_eq!(h.health_state, HealthState::Degraded);

        // Partial with poor coverage is already stale.
        let h = HealthRecord::derive(
            &run(IngestStatus::Partial, 50.0, now),
            Some(now - chrono::Duration::minutes(1)),
            stale_after,
            now,
        );
        assert_eq!(h.health_state, HealthState::Stale);

        // An old last-success forces stale regardless of current status.
        let h = HealthRecord::derive(
            &run(IngestStatus::Partial, 85.0, now),
            Some(now - chrono::Duration::minutes(4)),
            stale_after,
            now,
        );
        assert_eq!(h.health_state, HealthState::Stale);

        // Never-succeeded forces stale too.
        let h = HealthRecord::derive(
            &run(IngestStatus::Partial, 85.0, now),
            None,
            stale_after,
            now,
        );
        assert_eq!(h.health_state, HealthState::Stale);
        assert!(h.last_success_snapshot_ts.is_none());
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let counts = StateCounts {
            adder_long: 10,
            adder_short: 10,
            reducer: 5,
            flat: 75,
        };
        let pct = counts.percentages();
        let sum = pct.add_long + pct.add_short + pct.reducers + pct.flat;
        assert!((sum - 100.0).abs() < 0.1);
        assert_eq!(counts.total(), 100);
    }

    #[test]
    fn test_playbook_round_trip() {
        for playbook in [Playbook::LongOnly, Playbook::ShortOnly, Playbook::NoTrade] {
            assert_eq!(playbook.as_str().parse::<Playbook>().unwrap(), playbook);
        }
        assert!("long-only".parse::<Playbook>().is_err());
    }

    #[test]
    fn test_alert_cooldowns() {
        assert_eq!(AlertType::SystemStale.cooldown(), None);
        assert_eq!(
            AlertType::RegimeChange.cooldown(),
            Some(chrono::Duration::minutes(30))
        );
        assert_eq!(
            AlertType::ExitCluster.cooldown(),
            Some(chrono::Duration::minutes(60))
        );
    }
}
