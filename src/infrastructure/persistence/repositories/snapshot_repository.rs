use crate::domain::repositories::SnapshotRepository;
use crate::domain::signals::aggregation::WindowPosition;
use crate::domain::types::{Asset, HealthRecord, HealthState, IngestRun, IngestStatus, PositionSnapshot};
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub struct PgSnapshotRepository {
    database: Database,
}

impl PgSnapshotRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    /// Snapshot rows, run row and health row commit as one transaction:
    /// readers never observe a run without its rows. The upsert leaves
    /// `is_dirty` untouched on existing rows.
    async fn record_cycle(
        &self,
        rows: &[PositionSnapshot],
        run: &IngestRun,
        stale_after: chrono::Duration,
    ) -> Result<HealthRecord> {
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .context("Failed to begin ingest transaction")?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO wallet_snapshots (
                    snapshot_ts, wallet_id, asset,
                    position_szi, entry_px, liq_px, leverage, margin_used
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (snapshot_ts, wallet_id, asset) DO UPDATE SET
                    position_szi = EXCLUDED.position_szi,
                    entry_px = EXCLUDED.entry_px,
                    liq_px = EXCLUDED.liq_px,
                    leverage = EXCLUDED.leverage,
                    margin_used = EXCLUDED.margin_used,
                    created_at = NOW()
                "#,
            )
            .bind(row.snapshot_ts)
            .bind(&row.wallet_id)
            .bind(row.asset.as_str())
            .bind(row.szi)
            .bind(row.entry_px)
            .bind(row.liq_px)
            .bind(row.leverage)
            .bind(row.margin_used)
            .execute(&mut *tx)
            .await
            .context("Failed to upsert snapshot row")?;
        }

        sqlx::query(
            r#"
            INSERT INTO ingest_runs (
                snapshot_ts, status,
                wallets_expected, wallets_succeeded, wallets_failed,
                rows_expected, rows_written,
                coverage_pct, duration_ms, error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (snapshot_ts) DO UPDATE SET
                status = EXCLUDED.status,
                wallets_expected = EXCLUDED.wallets_expected,
                wallets_succeeded = EXCLUDED.wallets_succeeded,
                wallets_failed = EXCLUDED.wallets_failed,
                rows_expected = EXCLUDED.rows_expected,
                rows_written = EXCLUDED.rows_written,
                coverage_pct = EXCLUDED.coverage_pct,
                duration_ms = EXCLUDED.duration_ms,
                error = EXCLUDED.error
            "#,
        )
        .bind(run.snapshot_ts)
        .bind(run.status.as_str())
        .bind(run.wallets_expected)
        .bind(run.wallets_succeeded)
        .bind(run.wallets_failed)
        .bind(run.rows_expected)
        .bind(run.rows_written)
        .bind(run.coverage_pct)
        .bind(run.duration_ms)
        .bind(run.error.clone())
        .execute(&mut *tx)
        .await
        .context("Failed to upsert ingest run")?;

        // Most recent success, this run included, read in the same
        // transaction the health row derives from.
        let last_success: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT snapshot_ts
            FROM ingest_runs
            WHERE status = 'success'
            ORDER BY snapshot_ts DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read last successful run")?;

        let health = HealthRecord::derive(run, last_success, stale_after, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO ingest_health (
                health_ts, last_success_snapshot_ts, snapshot_status,
                coverage_pct, health_state, error
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (health_ts) DO UPDATE SET
                last_success_snapshot_ts = EXCLUDED.last_success_snapshot_ts,
                snapshot_status = EXCLUDED.snapshot_status,
                coverage_pct = EXCLUDED.coverage_pct,
                health_state = EXCLUDED.health_state,
                error = EXCLUDED.error
            "#,
        )
        .bind(health.health_ts)
        .bind(health.last_success_snapshot_ts)
        .bind(health.snapshot_status.as_str())
        .bind(health.coverage_pct)
        .bind(health.health_state.as_str())
        .bind(health.error.clone())
        .execute(&mut *tx)
        .await
        .context("Failed to upsert health row")?;

        tx.commit()
            .await
            .context("Failed to commit ingest cycle")?;

        Ok(health)
    }

    async fn latest_in_window(
        &self,
        asset: Asset,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<HashMap<String, WindowPosition>> {
        let rows = sqlx::query_as::<_, (String, f64, DateTime<Utc>)>(
            r#"
            SELECT DISTINCT ON (wallet_id)
                wallet_id, position_szi, snapshot_ts
            FROM wallet_snapshots
            WHERE asset = $1
              AND snapshot_ts > $2
              AND snapshot_ts <= $3
              AND is_dirty = FALSE
            ORDER BY wallet_id, snapshot_ts DESC
            "#,
        )
        .bind(asset.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to load window snapshots")?;

        Ok(rows
            .into_iter()
            .map(|(wallet_id, szi, snapshot_ts)| {
                (wallet_id, WindowPosition { szi, snapshot_ts })
            })
            .collect())
    }

    async fn median_abs_szi(
        &self,
        asset: Asset,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, f64>> {
        let rows = sqlx::query_as::<_, (String, f64)>(
            r#"
            SELECT wallet_id,
                   PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY ABS(position_szi))
            FROM wallet_snapshots
            WHERE asset = $1
              AND snapshot_ts > $2
              AND is_dirty = FALSE
            GROUP BY wallet_id
            "#,
        )
        .bind(asset.as_str())
        .bind(since)
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to compute 24h medians")?;

        Ok(rows.into_iter().collect())
    }

    async fn latest_health(&self) -> Result<Option<HealthRecord>> {
        let row = sqlx::query_as::<
            _,
            (
                DateTime<Utc>,
                Option<DateTime<Utc>>,
                String,
                f64,
                String,
                Option<String>,
            ),
        >(
            r#"
            SELECT health_ts, last_success_snapshot_ts, snapshot_status,
                   coverage_pct, health_state, error
            FROM ingest_health
            ORDER BY health_ts DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.database.pool)
        .await
        .context("Failed to read latest health")?;

        let Some((health_ts, last_success_snapshot_ts, status, coverage_pct, state, error)) = row
        else {
            return Ok(None);
        };

        Ok(Some(HealthRecord {
            health_ts,
            last_success_snapshot_ts,
            snapshot_status: status.parse::<IngestStatus>()?,
            coverage_pct,
            health_state: state.parse::<HealthState>()?,
            error,
        }))
    }
}
