use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Shared connection pool. Opened once at process start, closed on
/// shutdown; every repository clones this handle.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;

        info!("Connected to database");

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }

    /// Initialize database schema.
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_universe_runs (
                run_id BIGSERIAL PRIMARY KEY,
                as_of_ts TIMESTAMPTZ NOT NULL,
                status TEXT NOT NULL,
                source TEXT NOT NULL,
                n_requested BIGINT NOT NULL,
                n_received BIGINT NOT NULL,
                entered_count BIGINT NOT NULL,
                exited_count BIGINT NOT NULL,
                duration_ms BIGINT NOT NULL,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create wallet_universe_runs table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_universe_members (
                run_id BIGINT NOT NULL REFERENCES wallet_universe_runs (run_id),
                wallet_id TEXT NOT NULL,
                rank INT NOT NULL,
                month_pnl DOUBLE PRECISION NOT NULL,
                month_roi DOUBLE PRECISION NOT NULL,
                account_value DOUBLE PRECISION,
                PRIMARY KEY (run_id, wallet_id)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create wallet_universe_members table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_universe_current (
                wallet_id TEXT PRIMARY KEY,
                rank INT NOT NULL,
                month_pnl DOUBLE PRECISION NOT NULL,
                month_roi DOUBLE PRECISION NOT NULL,
                account_value DOUBLE PRECISION,
                as_of_ts TIMESTAMPTZ NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create wallet_universe_current table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_snapshots (
                snapshot_ts TIMESTAMPTZ NOT NULL,
                wallet_id TEXT NOT NULL,
                asset TEXT NOT NULL,
                position_szi DOUBLE PRECISION NOT NULL,
                entry_px DOUBLE PRECISION,
                liq_px DOUBLE PRECISION,
                leverage DOUBLE PRECISION,
                margin_used DOUBLE PRECISION,
                is_dirty BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (snapshot_ts, wallet_id, asset)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create wallet_snapshots table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_snapshots_asset_time
            ON wallet_snapshots (asset, snapshot_ts);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create snapshot asset index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_snapshots_wallet_asset_time
            ON wallet_snapshots (wallet_id, asset, snapshot_ts);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create snapshot wallet index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingest_runs (
                snapshot_ts TIMESTAMPTZ PRIMARY KEY,
                status TEXT NOT NULL,
                wallets_expected BIGINT NOT NULL,
                wallets_succeeded BIGINT NOT NULL,
                wallets_failed BIGINT NOT NULL,
                rows_expected BIGINT NOT NULL,
                rows_written BIGINT NOT NULL,
                coverage_pct DOUBLE PRECISION NOT NULL,
                duration_ms BIGINT NOT NULL,
                error TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create ingest_runs table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_ingest_runs_status_time
            ON ingest_runs (status, snapshot_ts);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create ingest_runs index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingest_health (
                health_ts TIMESTAMPTZ PRIMARY KEY,
                last_success_snapshot_ts TIMESTAMPTZ,
                snapshot_status TEXT NOT NULL,
                coverage_pct DOUBLE PRECISION NOT NULL,
                health_state TEXT NOT NULL,
                error TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create ingest_health table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                signal_ts TIMESTAMPTZ NOT NULL,
                asset TEXT NOT NULL,
                alignment_score DOUBLE PRECISION NOT NULL,
                alignment_trend TEXT NOT NULL,
                dispersion_index DOUBLE PRECISION NOT NULL,
                exit_cluster_score DOUBLE PRECISION NOT NULL,
                allowed_playbook TEXT NOT NULL,
                risk_mode TEXT NOT NULL,
                add_exposure BOOLEAN NOT NULL,
                tighten_stops BOOLEAN NOT NULL,
                wallet_count BIGINT NOT NULL,
                missing_count BIGINT NOT NULL,
                computation_ms BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (signal_ts, asset)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signals table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_signals_asset_time
            ON signals (asset, signal_ts);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signals index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_contributors (
                signal_ts TIMESTAMPTZ NOT NULL,
                asset TEXT NOT NULL,
                pct_add_long DOUBLE PRECISION NOT NULL,
                pct_add_short DOUBLE PRECISION NOT NULL,
                pct_reducers DOUBLE PRECISION NOT NULL,
                pct_flat DOUBLE PRECISION NOT NULL,
                count_add_long BIGINT NOT NULL,
                count_add_short BIGINT NOT NULL,
                count_reducers BIGINT NOT NULL,
                count_flat BIGINT NOT NULL,
                total_wallets BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (signal_ts, asset)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create signal_contributors table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_state (
                asset TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                last_triggered_ts TIMESTAMPTZ,
                cooldown_until TIMESTAMPTZ,
                previous_playbook TEXT,
                pending_playbook TEXT,
                pending_periods INT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (asset, alert_type)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create alert_state table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id BIGSERIAL PRIMARY KEY,
                alert_ts TIMESTAMPTZ NOT NULL,
                asset TEXT,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                signal_snapshot JSONB NOT NULL,
                cooldown_until TIMESTAMPTZ NOT NULL,
                suppressed BOOLEAN NOT NULL DEFAULT FALSE
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create alerts table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_alerts_asset_time
            ON alerts (asset, alert_ts);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create alerts index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
