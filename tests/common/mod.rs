//! In-memory repository fakes and a scripted exchange stub shared by the
//! integration suites. Everything runs behind the same traits the
//! Postgres implementations serve.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use walletpulse::domain::alerts::regime::RegimeTracking;
use walletpulse::domain::ports::{AssetPositionDetail, ExchangeService, WalletPositions};
use walletpulse::domain::repositories::{
    AlertRepository, SignalRepository, SnapshotRepository, UniverseRepository,
};
use walletpulse::domain::signals::aggregation::WindowPosition;
use walletpulse::domain::types::{
    AlertRecord, AlertScope, AlertStateRecord, AlertType, Asset, ContributorBreakdown,
    HealthRecord, IngestRun, LeaderboardSource, LeaderboardWallet, PositionSnapshot,
    SignalRecord, UniverseMember, UniverseRun,
};

#[derive(Default)]
pub struct ScriptedExchange {
    pub leaderboard: Vec<LeaderboardWallet>,
    pub fail_leaderboard: bool,
    pub positions: HashMap<String, Option<WalletPositions>>,
}

impl ScriptedExchange {
    /// Script a wallet whose fetch succeeds with the given HYPE size and
    /// no other positions.
    pub fn with_hype_position(mut self, wallet_id: &str, szi: f64) -> Self {
        self.positions.insert(
            wallet_id.to_string(),
            Some(WalletPositions {
                positions: vec![(
                    "HYPE".to_string(),
                    AssetPositionDetail {
                        szi,
                        ..Default::default()
                    },
                )],
            }),
        );
        self
    }

    /// Script a wallet whose fetch fails.
    pub fn with_failed_wallet(mut self, wallet_id: &str) -> Self {
        self.positions.insert(wallet_id.to_string(), None);
        self
    }
}

#[async_trait]
impl ExchangeService for ScriptedExchange {
    async fn fetch_leaderboard(&self) -> Result<(Vec<LeaderboardWallet>, LeaderboardSource)> {
        if self.fail_leaderboard {
            anyhow::bail!("both leaderboard endpoints failed");
        }
        Ok((self.leaderboard.clone(), LeaderboardSource::Stats))
    }

    async fn fetch_wallet_positions(&self, wallet_id: &str) -> Option<WalletPositions> {
        self.positions.get(wallet_id).cloned().flatten()
    }

    async fn fetch_multiple(
        &self,
        wallet_ids: &[String],
        _max_concurrency: usize,
    ) -> HashMap<String, Option<WalletPositions>> {
        let mut results = HashMap::new();
        for wallet_id in wallet_ids {
            results.insert(
                wallet_id.clone(),
                self.fetch_wallet_positions(wallet_id).await,
            );
        }
        results
    }
}

#[derive(Default)]
pub struct MemoryUniverseRepository {
    pub members: Mutex<Vec<UniverseMember>>,
    pub runs: Mutex<Vec<UniverseRun>>,
}

impl MemoryUniverseRepository {
    pub fn with_members(members: Vec<UniverseMember>) -> Self {
        Self {
            members: Mutex::new(members),
            runs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl UniverseRepository for MemoryUniverseRepository {
    async fn current(&self) -> Result<Vec<UniverseMember>> {
        Ok(self.members.lock().unwrap().clone())
    }

    async fn record_run(&self, run: &UniverseRun) -> Result<i64> {
        let mut runs = self.runs.lock().unwrap();
        runs.push(run.clone());
        Ok(runs.len() as i64)
    }

    async fn replace(&self, run: &UniverseRun, members: &[UniverseMember]) -> Result<i64> {
        let mut runs = self.runs.lock().unwrap();
        runs.push(run.clone());
        *self.members.lock().unwrap() = members.to_vec();
        Ok(runs.len() as i64)
    }
}

#[derive(Default)]
pub struct MemorySnapshotRepository {
    pub rows: Mutex<HashMap<(DateTime<Utc>, String, Asset), PositionSnapshot>>,
    pub runs: Mutex<BTreeMap<DateTime<Utc>, IngestRun>>,
    pub health: Mutex<BTreeMap<DateTime<Utc>, HealthRecord>>,
}

#[async_trait]
impl SnapshotRepository for MemorySnapshotRepository {
    async fn record_cycle(
        &self,
        rows: &[PositionSnapshot],
        run: &IngestRun,
        stale_after: chrono::Duration,
    ) -> Result<HealthRecord> {
        {
            let mut stored = self.rows.lock().unwrap();
            for row in rows {
                stored.insert(
                    (row.snapshot_ts, row.wallet_id.clone(), row.asset),
                    row.clone(),
                );
            }
        }

        let last_success = {
            let mut runs = self.runs.lock().unwrap();
            runs.insert(run.snapshot_ts, run.clone());
            runs.values()
                .filter(|r| r.status == walletpulse::domain::types::IngestStatus::Success)
                .map(|r| r.snapshot_ts)
                .max()
        };

        let health = HealthRecord::derive(run, last_success, stale_after, Utc::now());
        self.health
            .lock()
            .unwrap()
            .insert(health.health_ts, health.clone());
        Ok(health)
    }

    async fn latest_in_window(
        &self,
        asset: Asset,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<String, WindowPosition>> {
        let rows = self.rows.lock().unwrap();
        let mut latest: HashMap<String, WindowPosition> = HashMap::new();
        for row in rows.values() {
            if row.asset != asset || row.snapshot_ts <= from || row.snapshot_ts > to {
                continue;
            }
            let candidate = WindowPosition {
                szi: row.szi,
                snapshot_ts: row.snapshot_ts,
            };
            latest
                .entry(row.wallet_id.clone())
                .and_modify(|existing| {
                    if candidate.snapshot_ts > existing.snapshot_ts {
                        *existing = candidate;
                    }
                })
                .or_insert(candidate);
        }
        Ok(latest)
    }

    async fn median_abs_szi(
        &self,
        asset: Asset,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, f64>> {
        let rows = self.rows.lock().unwrap();
        let mut samples: HashMap<String, Vec<f64>> = HashMap::new();
        for row in rows.values() {
            if row.asset == asset && row.snapshot_ts > since {
                samples
                    .entry(row.wallet_id.clone())
                    .or_default()
                    .push(row.szi.abs());
            }
        }

        Ok(samples
            .into_iter()
            .map(|(wallet_id, mut values)| {
                values.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let n = values.len();
                let median = if n % 2 == 0 {
                    (values[n / 2 - 1] + values[n / 2]) / 2.0
                } else {
                    values[n / 2]
                };
                (wallet_id, median)
            })
            .collect())
    }

    async fn latest_health(&self) -> Result<Option<HealthRecord>> {
        Ok(self.health.lock().unwrap().values().last().cloned())
    }
}

#[derive(Default)]
pub struct MemorySignalRepository {
    pub signals: Mutex<BTreeMap<(DateTime<Utc>, Asset), SignalRecord>>,
    pub contributors: Mutex<BTreeMap<(DateTime<Utc>, Asset), ContributorBreakdown>>,
}

#[async_trait]
impl SignalRepository for MemorySignalRepository {
    async fn alignment_history(
        &self,
        asset: Asset,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<f64>> {
        let signals = self.signals.lock().unwrap();
        Ok(signals
            .iter()
            .filter(|((ts, a), _)| *a == asset && *ts < before)
            .rev()
            .take(limit as usize)
            .map(|(_, record)| record.signals.alignment_score)
            .collect())
    }

    async fn upsert_signal(&self, record: &SignalRecord) -> Result<()> {
        self.signals
            .lock()
            .unwrap()
            .insert((record.signal_ts, record.asset), record.clone());
        Ok(())
    }

    async fn upsert_contributors(&self, contributors: &ContributorBreakdown) -> Result<()> {
        self.contributors
            .lock()
            .unwrap()
            .insert((contributors.signal_ts, contributors.asset), contributors.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAlertRepository {
    pub states: Mutex<HashMap<(String, AlertType), AlertStateRecord>>,
    pub alerts: Mutex<Vec<AlertRecord>>,
}

fn blank_state(scope: AlertScope, alert_type: AlertType) -> AlertStateRecord {
    AlertStateRecord {
        scope,
        alert_type,
        is_active: false,
        last_triggered_ts: None,
        cooldown_until: None,
        previous_playbook: None,
        pending_playbook: None,
        pending_periods: 0,
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn state(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
    ) -> Result<Option<AlertStateRecord>> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(&(scope.state_key().to_string(), alert_type))
            .cloned())
    }

    async fn set_active(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
        is_active: bool,
    ) -> Result<()> {
        let mut states = self.states.lock().unwrap();
        states
            .entry((scope.state_key().to_string(), alert_type))
            .or_insert_with(|| blank_state(scope, alert_type))
            .is_active = is_active;
        Ok(())
    }

    async fn mark_fired(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
        triggered_at: DateTime<Utc>,
        cooldown_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .entry((scope.state_key().to_string(), alert_type))
            .or_insert_with(|| blank_state(scope, alert_type));
        state.last_triggered_ts = Some(triggered_at);
        state.cooldown_until = cooldown_until;
        Ok(())
    }

    async fn save_regime_tracking(&self, asset: Asset, tracking: &RegimeTracking) -> Result<()> {
        let scope = AlertScope::Asset(asset);
        let mut states = self.states.lock().unwrap();
        let state = states
            .entry((scope.state_key().to_string(), AlertType::RegimeChange))
            .or_insert_with(|| blank_state(scope, AlertType::RegimeChange));
        state.previous_playbook = Some(tracking.previous);
        state.pending_playbook = tracking.pending;
        state.pending_periods = tracking.periods;
        Ok(())
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<i64> {
        let mut alerts = self.alerts.lock().unwrap();
        alerts.push(alert.clone());
        Ok(alerts.len() as i64)
    }

    async fn fired_count_since(&self, scope: AlertScope, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                a.scope.asset() == scope.asset() && a.alert_ts > since && !a.suppressed
            })
            .count() as i64)
    }
}
