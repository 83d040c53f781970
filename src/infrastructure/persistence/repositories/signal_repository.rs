use crate::domain::repositories::SignalRepository;
use crate::domain::types::{Asset, ContributorBreakdown, SignalRecord};
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub struct PgSignalRepository {
    database: Database,
}

impl PgSignalRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl SignalRepository for PgSignalRepository {
    /// Scores strictly before `before` so recomputing an existing
    /// boundary sees the same history it saw the first time.
    async fn alignment_history(
        &self,
        asset: Asset,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<f64>> {
        let scores = sqlx::query_scalar::<_, f64>(
            r#"
            SELECT alignment_score
            FROM signals
            WHERE asset = $1 AND signal_ts < $2
            ORDER BY signal_ts DESC
            LIMIT $3
            "#,
        )
        .bind(asset.as_str())
        .bind(before)
        .bind(limit)
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to load alignment history")?;

        Ok(scores)
    }

    async fn upsert_signal(&self, record: &SignalRecord) -> Result<()> {
        let s = &record.signals;
        sqlx::query(
            r#"
            INSERT INTO signals (
                signal_ts, asset,
                alignment_score, alignment_trend,
                dispersion_index, exit_cluster_score,
                allowed_playbook, risk_mode,
                add_exposure, tighten_stops,
                wallet_count, missing_count, computation_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (signal_ts, asset) DO UPDATE SET
                alignment_score = EXCLUDED.alignment_score,
                alignment_trend = EXCLUDED.alignment_trend,
                dispersion_index = EXCLUDED.dispersion_index,
                exit_cluster_score = EXCLUDED.exit_cluster_score,
                allowed_playbook = EXCLUDED.allowed_playbook,
                risk_mode = EXCLUDED.risk_mode,
                add_exposure = EXCLUDED.add_exposure,
                tighten_stops = EXCLUDED.tighten_stops,
                wallet_count = EXCLUDED.wallet_count,
                missing_count = EXCLUDED.missing_count,
                computation_ms = EXCLUDED.computation_ms,
                created_at = NOW()
            "#,
        )
        .bind(record.signal_ts)
        .bind(record.asset.as_str())
        .bind(s.alignment_score)
        .bind(s.alignment_trend.as_str())
        .bind(s.dispersion_index)
        .bind(s.exit_cluster_score)
        .bind(s.allowed_playbook.as_str())
        .bind(s.risk_mode.as_str())
        .bind(s.add_exposure)
        .bind(s.tighten_stops)
        .bind(record.wallet_count)
        .bind(record.missing_count)
        .bind(record.computation_ms)
        .execute(&self.database.pool)
        .await
        .context("Failed to upsert signal")?;

        Ok(())
    }

    async fn upsert_contributors(&self, contributors: &ContributorBreakdown) -> Result<()> {
        let counts = &contributors.counts;
        let pct = contributors.percentages;
        sqlx::query(
            r#"
            INSERT INTO signal_contributors (
                signal_ts, asset,
                pct_add_long, pct_add_short, pct_reducers, pct_flat,
                count_add_long, count_add_short, count_reducers, count_flat,
                total_wallets
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (signal_ts, asset) DO UPDATE SET
                pct_add_long = EXCLUDED.pct_add_long,
                pct_add_short = EXCLUDED.pct_add_short,
                pct_reducers = EXCLUDED.pct_reducers,
                pct_flat = EXCLUDED.pct_flat,
                count_add_long = EXCLUDED.count_add_long,
                count_add_short = EXCLUDED.count_add_short,
                count_reducers = EXCLUDED.count_reducers,
                count_flat = EXCLUDED.count_flat,
                total_wallets = EXCLUDED.total_wallets,
                created_at = NOW()
            "#,
        )
        .bind(contributors.signal_ts)
        .bind(contributors.asset.as_str())
        .bind(pct.add_long)
        .bind(pct.add_short)
        .bind(pct.reducers)
        .bind(pct.flat)
        .bind(counts.adder_long as i64)
        .bind(counts.adder_short as i64)
        .bind(counts.reducer as i64)
        .bind(counts.flat as i64)
        .bind(counts.total() as i64)
        .execute(&self.database.pool)
        .await
        .context("Failed to upsert signal contributors")?;

        Ok(())
    }
}
