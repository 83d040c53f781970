use crate::domain::alerts::regime::RegimeTracking;
use crate::domain::repositories::AlertRepository;
use crate::domain::types::{
    AlertRecord, AlertScope, AlertStateRecord, AlertType, Asset, Playbook,
};
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub struct PgAlertRepository {
    database: Database,
}

impl PgAlertRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

fn parse_playbook(value: Option<String>) -> Result<Option<Playbook>> {
    value.map(|s| s.parse::<Playbook>()).transpose()
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn state(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
    ) -> Result<Option<AlertStateRecord>> {
        let row = sqlx::query_as::<
            _,
            (
                bool,
                Option<DateTime<Utc>>,
                Option<DateTime<Utc>>,
                Option<String>,
                Option<String>,
                i32,
            ),
        >(
            r#"
            SELECT is_active, last_triggered_ts, cooldown_until,
                   previous_playbook, pending_playbook, pending_periods
            FROM alert_state
            WHERE asset = $1 AND alert_type = $2
            "#,
        )
        .bind(scope.state_key())
        .bind(alert_type.as_str())
        .fetch_optional(&self.database.pool)
        .await
        .context("Failed to load alert state")?;

        let Some((is_active, last_triggered_ts, cooldown_until, previous, pending, periods)) = row
        else {
            return Ok(None);
        };

        Ok(Some(AlertStateRecord {
            scope,
            alert_type,
            is_active,
            last_triggered_ts,
            cooldown_until,
            previous_playbook: parse_playbook(previous)?,
            pending_playbook: parse_playbook(pending)?,
            pending_periods: periods,
        }))
    }

    async fn set_active(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
        is_active: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_state (asset, alert_type, is_active)
            VALUES ($1, $2, $3)
            ON CONFLICT (asset, alert_type) DO UPDATE SET
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(scope.state_key())
        .bind(alert_type.as_str())
        .bind(is_active)
        .execute(&self.database.pool)
        .await
        .context("Failed to update alert active flag")?;

        Ok(())
    }

    async fn mark_fired(
        &self,
        scope: AlertScope,
        alert_type: AlertType,
        triggered_at: DateTime<Utc>,
        cooldown_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_state (asset, alert_type, is_active, last_triggered_ts, cooldown_until)
            VALUES ($1, $2, FALSE, $3, $4)
            ON CONFLICT (asset, alert_type) DO UPDATE SET
                last_triggered_ts = EXCLUDED.last_triggered_ts,
                cooldown_until = EXCLUDED.cooldown_until,
                updated_at = NOW()
            "#,
        )
        .bind(scope.state_key())
        .bind(alert_type.as_str())
        .bind(triggered_at)
        .bind(cooldown_until)
        .execute(&self.database.pool)
        .await
        .context("Failed to record alert fire")?;

        Ok(())
    }

    async fn save_regime_tracking(&self, asset: Asset, tracking: &RegimeTracking) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_state (
                asset, alert_type, is_active,
                previous_playbook, pending_playbook, pending_periods
            )
            VALUES ($1, $2, FALSE, $3, $4, $5)
            ON CONFLICT (asset, alert_type) DO UPDATE SET
                previous_playbook = EXCLUDED.previous_playbook,
                pending_playbook = EXCLUDED.pending_playbook,
                pending_periods = EXCLUDED.pending_periods,
                updated_at = NOW()
            "#,
        )
        .bind(asset.as_str())
        .bind(AlertType::RegimeChange.as_str())
        .bind(tracking.previous.as_str())
        .bind(tracking.pending.map(|p| p.as_str()))
        .bind(tracking.periods)
        .execute(&self.database.pool)
        .await
        .context("Failed to save regime tracking")?;

        Ok(())
    }

    async fn insert_alert(&self, alert: &AlertRecord) -> Result<i64> {
        let alert_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO alerts (
                alert_ts, asset, alert_type, severity,
                message, signal_snapshot, cooldown_until, suppressed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(alert.alert_ts)
        .bind(alert.scope.asset().map(|a| a.as_str()))
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(&alert.signal_snapshot)
        .bind(alert.cooldown_until)
        .bind(alert.suppressed)
        .fetch_one(&self.database.pool)
        .await
        .context("Failed to insert alert")?;

        Ok(alert_id)
    }

    async fn fired_count_since(&self, scope: AlertScope, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM alerts
            WHERE asset IS NOT DISTINCT FROM $1
              AND alert_ts > $2
              AND suppressed = FALSE
            "#,
        )
        .bind(scope.asset().map(|a| a.as_str()))
        .bind(since)
        .fetch_one(&self.database.pool)
        .await
        .context("Failed to count recent alerts")?;

        Ok(count)
    }
}
