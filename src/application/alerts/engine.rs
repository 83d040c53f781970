//! Alert evaluation for one signal cycle.
//!
//! The system-stale dead-man's-switch runs every cycle, before and
//! independent of the signal lock; while it is active every behavioral
//! alert is a no-op. All alert memory lives in `alert_state` rows, so a
//! restart changes nothing.

use super::throttling;
use crate::domain::alerts::exit_cluster::{self, HysteresisStep};
use crate::domain::alerts::regime::{self, RegimeTracking};
use crate::domain::repositories::{AlertRepository, SnapshotRepository};
use crate::domain::types::{
    AlertRecord, AlertScope, AlertType, Asset, Severity, SignalRecord, SignalSet,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Minutes without a successful ingest before the dead-man's-switch trips.
const SYSTEM_STALE_MINUTES: i64 = 10;

pub struct AlertEngine {
    alerts: Arc<dyn AlertRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
}

impl AlertEngine {
    pub fn new(alerts: Arc<dyn AlertRepository>, snapshots: Arc<dyn SnapshotRepository>) -> Self {
        Self { alerts, snapshots }
    }

    /// Evaluate the system-stale alert. Fires once (critical, no
    /// cooldown, no throttling) when the last successful ingest is more
    /// than ten minutes old; clears silently on recovery.
    pub async fn evaluate_system(&self, now: DateTime<Utc>) -> Result<bool> {
        let scope = AlertScope::System;
        let last_success = self
            .snapshots
            .latest_health()
            .await?
            .and_then(|h| h.last_success_snapshot_ts);

        let (is_stale, age_minutes) = match last_success {
            Some(ts) => (
                now - ts > chrono::Duration::minutes(SYSTEM_STALE_MINUTES),
                Some((now - ts).num_minutes()),
            ),
            None => (true, None),
        };

        let is_active = self
            .alerts
            .state(scope, AlertType::SystemStale)
            .await?
            .map(|s| s.is_active)
            .unwrap_or(false);

        if is_stale && !is_active {
            let message = match age_minutes {
                Some(minutes) => format!(
                    "[SYSTEM] Data stale: ingestion has not succeeded for {} minutes. \
                     All behavioral alerts suppressed. Do not trade until resolved.",
                    minutes
                ),
                None => "[SYSTEM] Data stale: no successful ingestion recorded. \
                         All behavioral alerts suppressed. Do not trade until resolved."
                    .to_string(),
            };
            warn!("{}", message);

            // Flip active first so this fires exactly once per outage.
            self.alerts
                .set_active(scope, AlertType::SystemStale, true)
                .await?;
            self.alerts
                .mark_fired(scope, AlertType::SystemStale, now, None)
                .await?;
            self.alerts
                .insert_alert(&AlertRecord {
                    alert_ts: now,
                    scope,
                    alert_type: AlertType::SystemStale,
                    severity: Severity::Critical,
                    message,
                    signal_snapshot: json!({
                        "minutes_stale": age_minutes,
                        "last_success_snapshot_ts": last_success,
                    }),
                    cooldown_until: now,
                    suppressed: false,
                })
                .await?;
            return Ok(true);
        }

        if !is_stale && is_active {
            // Recovery is silent; no alert row.
            info!("System recovered from stale state");
            self.alerts
                .set_active(scope, AlertType::SystemStale, false)
                .await?;
        }

        Ok(false)
    }

    /// Whether the dead-man's-switch is currently latched.
    pub async fn is_system_stale_active(&self) -> Result<bool> {
        Ok(self
            .alerts
            .state(AlertScope::System, AlertType::SystemStale)
            .await?
            .map(|s| s.is_active)
            .unwrap_or(false))
    }

    /// Evaluate behavioral alerts for every computed asset. Failures are
    /// isolated per (asset, alert type). Returns what actually fired.
    pub async fn evaluate_behavioral(
        &self,
        now: DateTime<Utc>,
        computed: &[SignalRecord],
    ) -> Result<Vec<(AlertScope, AlertType)>> {
        let mut fired = Vec::new();

        if self.is_system_stale_active().await? {
            info!("Behavioral alerts suppressed (system stale active)");
            return Ok(fired);
        }

        for record in computed {
            let asset = record.asset;

            match self.evaluate_regime(now, asset, &record.signals).await {
                Ok(true) => fired.push((AlertScope::Asset(asset), AlertType::RegimeChange)),
                Ok(false) => {}
                Err(e) => error!("Regime change evaluation failed for {}: {:#}", asset, e),
            }

            match self.evaluate_exit_cluster(now, asset, &record.signals).await {
                Ok(true) => fired.push((AlertScope::Asset(asset), AlertType::ExitCluster)),
                Ok(false) => {}
                Err(e) => error!("Exit cluster evaluation failed for {}: {:#}", asset, e),
            }
        }

        if !fired.is_empty() {
            info!("Alerts fired this cycle: {}", fired.len());
        }

        Ok(fired)
    }

    async fn evaluate_regime(
        &self,
        now: DateTime<Utc>,
        asset: Asset,
        signals: &SignalSet,
    ) -> Result<bool> {
        let scope = AlertScope::Asset(asset);
        let current = signals.allowed_playbook;

        let tracking: Option<RegimeTracking> = self
            .alerts
            .state(scope, AlertType::RegimeChange)
            .await?
            .and_then(|state| {
                state.previous_playbook.map(|previous| RegimeTracking {
                    previous,
                    pending: state.pending_playbook,
                    periods: state.pending_periods,
                })
            });

        let step = regime::observe(tracking.as_ref(), current);

        let mut fired = false;
        if step.fire {
            info!(
                "{}: regime change confirmed: {} -> {}",
                asset,
                tracking.map(|t| t.previous.as_str()).unwrap_or("?"),
                current
            );
            let message = format!(
                "[{}] Regime change: playbook switched to {}. Risk mode: {}.",
                asset, current, signals.risk_mode
            );
            fired = self
                .try_fire(
                    now,
                    scope,
                    AlertType::RegimeChange,
                    Severity::Medium,
                    message,
                    signals,
                )
                .await?;
        }

        // The machine advances whether or not the fire was throttled.
        self.alerts.save_regime_tracking(asset, &step.next).await?;

        Ok(fired)
    }

    async fn evaluate_exit_cluster(
        &self,
        now: DateTime<Utc>,
        asset: Asset,
        signals: &SignalSet,
    ) -> Result<bool> {
        let scope = AlertScope::Asset(asset);
        let score = signals.exit_cluster_score;

        let is_active = self
            .alerts
            .state(scope, AlertType::ExitCluster)
            .await?
            .map(|s| s.is_active)
            .unwrap_or(false);

        match exit_cluster::observe(is_active, score) {
            HysteresisStep::Trigger => {
                info!(
                    "{}: exit cluster crossed above {:.0}% ({:.1}%)",
                    asset,
                    exit_cluster::TRIGGER_PCT,
                    score
                );
                self.alerts
                    .set_active(scope, AlertType::ExitCluster, true)
                    .await?;
                let message = format!(
                    "[{}] Smart money de-risking: exit cluster elevated ({:.1}%). \
                     Stop adding exposure. Tighten stops.",
                    asset, score
                );
                self.try_fire(
                    now,
                    scope,
                    AlertType::ExitCluster,
                    Severity::High,
                    message,
                    signals,
                )
                .await
            }
            HysteresisStep::Reset => {
                info!(
                    "{}: exit cluster dropped below {:.0}% ({:.1}%), resetting",
                    asset,
                    exit_cluster::RESET_PCT,
                    score
                );
                self.alerts
                    .set_active(scope, AlertType::ExitCluster, false)
                    .await?;
                Ok(false)
            }
            HysteresisStep::Hold => Ok(false),
        }
    }

    /// Persist a fire attempt: throttled attempts are logged with
    /// `suppressed = true` for audit and set no cooldown; successful
    /// fires stamp `cooldown_until` on the state row.
    async fn try_fire(
        &self,
        now: DateTime<Utc>,
        scope: AlertScope,
        alert_type: AlertType,
        severity: Severity,
        message: String,
        signals: &SignalSet,
    ) -> Result<bool> {
        let allowed = throttling::should_fire(self.alerts.as_ref(), scope, alert_type, now).await?;
        let cooldown_until = alert_type.cooldown().map(|d| now + d);

        self.alerts
            .insert_alert(&AlertRecord {
                alert_ts: now,
                scope,
                alert_type,
                severity,
                message: message.clone(),
                signal_snapshot: serde_json::to_value(signals)?,
                cooldown_until: cooldown_until.unwrap_or(now),
                suppressed: !allowed,
            })
            .await?;

        if allowed {
            self.alerts
                .mark_fired(scope, alert_type, now, cooldown_until)
                .await?;
            info!(
                "Alert fired: [{}] {} ({}): {}",
                scope,
                alert_type.as_str(),
                severity.as_str(),
                message
            );
        }

        Ok(allowed)
    }
}
