use crate::domain::repositories::UniverseRepository;
use crate::domain::types::{UniverseMember, UniverseRun};
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;

pub struct PgUniverseRepository {
    database: Database,
}

impl PgUniverseRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

async fn insert_run<'e, E>(executor: E, run: &UniverseRun) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let run_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO wallet_universe_runs (
            as_of_ts, status, source,
            n_requested, n_received,
            entered_count, exited_count,
            duration_ms, error
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING run_id
        "#,
    )
    .bind(run.as_of_ts)
    .bind(run.status.as_str())
    .bind(run.source.as_str())
    .bind(run.n_requested)
    .bind(run.n_received)
    .bind(run.entered_count)
    .bind(run.exited_count)
    .bind(run.duration_ms)
    .bind(run.error.clone())
    .fetch_one(executor)
    .await
    .context("Failed to insert universe run")?;

    Ok(run_id)
}

#[async_trait]
impl UniverseRepository for PgUniverseRepository {
    async fn current(&self) -> Result<Vec<UniverseMember>> {
        let rows = sqlx::query_as::<_, (String, i32, f64, f64, Option<f64>)>(
            r#"
            SELECT wallet_id, rank, month_pnl, month_roi, account_value
            FROM wallet_universe_current
            ORDER BY rank
            "#,
        )
        .fetch_all(&self.database.pool)
        .await
        .context("Failed to load current universe")?;

        Ok(rows
            .into_iter()
            .map(
                |(wallet_id, rank, month_pnl, month_roi, account_value)| UniverseMember {
                    wallet_id,
                    rank,
                    month_pnl,
                    month_roi,
                    account_value,
                },
            )
            .collect())
    }

    async fn record_run(&self, run: &UniverseRun) -> Result<i64> {
        insert_run(&self.database.pool, run).await
    }

    /// Record the run, its member list, and the new current universe in
    /// one transaction so readers never see a half-replaced cohort.
    async fn replace(&self, run: &UniverseRun, members: &[UniverseMember]) -> Result<i64> {
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .context("Failed to begin universe transaction")?;

        let run_id = insert_run(&mut *tx, run).await?;

        for member in members {
            sqlx::query(
                r#"
                INSERT INTO wallet_universe_members (
                    run_id, wallet_id, rank, month_pnl, month_roi, account_value
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(run_id)
            .bind(&member.wallet_id)
            .bind(member.rank)
            .bind(member.month_pnl)
            .bind(member.month_roi)
            .bind(member.account_value)
            .execute(&mut *tx)
            .await
            .context("Failed to insert universe member")?;
        }

        sqlx::query("DELETE FROM wallet_universe_current")
            .execute(&mut *tx)
            .await
            .context("Failed to clear current universe")?;

        for member in members {
            sqlx::query(
                r#"
                INSERT INTO wallet_universe_current (
                    wallet_id, rank, month_pnl, month_roi, account_value, as_of_ts
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&member.wallet_id)
            .bind(member.rank)
            .bind(member.month_pnl)
            .bind(member.month_roi)
            .bind(member.account_value)
            .bind(run.as_of_ts)
            .execute(&mut *tx)
            .await
            .context("Failed to insert current universe member")?;
        }

        tx.commit()
            .await
            .context("Failed to commit universe replacement")?;

        Ok(run_id)
    }
}
