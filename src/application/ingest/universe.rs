//! Universe refresh: rebuild the tracked cohort from the leaderboard.

use crate::domain::ports::ExchangeService;
use crate::domain::repositories::UniverseRepository;
use crate::domain::types::{
    IngestStatus, LeaderboardSource, UniverseMember, UniverseRun,
};
use anyhow::Result;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Fraction of the requested cohort size that must parse for a refresh
/// to replace the universe.
const MIN_VALID_FRACTION: f64 = 0.9;

pub struct UniverseRefresher {
    exchange: Arc<dyn ExchangeService>,
    universe: Arc<dyn UniverseRepository>,
    universe_size: usize,
}

impl UniverseRefresher {
    pub fn new(
        exchange: Arc<dyn ExchangeService>,
        universe: Arc<dyn UniverseRepository>,
        universe_size: usize,
    ) -> Self {
        Self {
            exchange,
            universe,
            universe_size,
        }
    }

    /// Run one refresh cycle. Guardrail failures and leaderboard outages
    /// are recorded as failed runs and leave the current universe
    /// untouched; only repository errors propagate.
    pub async fn refresh(&self) -> Result<UniverseRun> {
        let as_of_ts = Utc::now();
        let timer = Instant::now();

        info!("Fetching leaderboard for universe refresh...");

        let (mut wallets, source) = match self.exchange.fetch_leaderboard().await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!("Universe refresh failed: {:#}", e);
                let run = UniverseRun {
                    as_of_ts,
                    status: IngestStatus::Failed,
                    source: LeaderboardSource::Unknown,
                    n_requested: self.universe_size as i64,
                    n_received: 0,
                    entered_count: 0,
                    exited_count: 0,
                    duration_ms: timer.elapsed().as_millis() as i64,
                    error: Some(format!("{e:#}")),
                };
                self.universe.record_run(&run).await?;
                return Ok(run);
            }
        };

        // Rank by 30-day PnL, best first, and keep the top N.
        wallets.sort_by(|a, b| {
            b.month_pnl
                .partial_cmp(&a.month_pnl)
                .unwrap_or(Ordering::Equal)
        });
        wallets.truncate(self.universe_size);

        let n_received = wallets.len();
        let min_required = (self.universe_size as f64 * MIN_VALID_FRACTION) as usize;

        if n_received < min_required {
            let message = format!(
                "Insufficient valid wallets: {} < {}. Keeping existing universe.",
                n_received, min_required
            );
            warn!("{}", message);
            let run = UniverseRun {
                as_of_ts,
                status: IngestStatus::Failed,
                source,
                n_requested: self.universe_size as i64,
                n_received: n_received as i64,
                entered_count: 0,
                exited_count: 0,
                duration_ms: timer.elapsed().as_millis() as i64,
                error: Some(message),
            };
            self.universe.record_run(&run).await?;
            return Ok(run);
        }

        // Diff against the cohort being replaced.
        let previous = self.universe.current().await?;
        let previous_ids: HashSet<&str> = previous.iter().map(|m| m.wallet_id.as_str()).collect();
        let new_ids: HashSet<&str> = wallets.iter().map(|w| w.wallet_id.as_str()).collect();
        let entered_count = new_ids.difference(&previous_ids).count() as i64;
        let exited_count = previous_ids.difference(&new_ids).count() as i64;

        let members: Vec<UniverseMember> = wallets
            .iter()
            .enumerate()
            .map(|(index, wallet)| UniverseMember {
                wallet_id: wallet.wallet_id.clone(),
                rank: index as i32 + 1,
                month_pnl: wallet.month_pnl,
                month_roi: wallet.month_roi,
                account_value: wallet.account_value,
            })
            .collect();

        let run = UniverseRun {
            as_of_ts,
            status: IngestStatus::Success,
            source,
            n_requested: self.universe_size as i64,
            n_received: n_received as i64,
            entered_count,
            exited_count,
            duration_ms: timer.elapsed().as_millis() as i64,
            error: None,
        };

        let run_id = self.universe.replace(&run, &members).await?;

        info!(
            "Universe refresh complete (run {}): {} wallets, {} entered, {} exited, {}ms via {}",
            run_id,
            n_received,
            entered_count,
            exited_count,
            run.duration_ms,
            source.as_str()
        );

        Ok(run)
    }
}
