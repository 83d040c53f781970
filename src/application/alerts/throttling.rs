//! Alert throttling: per-type cooldowns and a rolling daily quota.

use crate::domain::repositories::AlertRepository;
use crate::domain::types::{AlertScope, AlertType};
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

/// Non-suppressed alerts allowed per scope in any rolling 24h window.
pub const DAILY_ALERT_LIMIT: i64 = 4;

/// Whether a fire is allowed right now for (scope, type). Checks the
/// cooldown first, then the rolling quota. A suppressed fire is still
/// logged to the alerts table by the caller; it just never counts
/// against the quota.
pub async fn should_fire(
    repo: &dyn AlertRepository,
    scope: AlertScope,
    alert_type: AlertType,
    now: DateTime<Utc>,
) -> Result<bool> {
    if let Some(state) = repo.state(scope, alert_type).await?
        && let Some(until) = state.cooldown_until
        && now < until
    {
        info!(
            "Alert suppressed (cooldown, {}s remaining): {} for {}",
            (until - now).num_seconds(),
            alert_type.as_str(),
            scope
        );
        return Ok(false);
    }

    let window_start = now - chrono::Duration::hours(24);
    let fired = repo.fired_count_since(scope, window_start).await?;
    if fired >= DAILY_ALERT_LIMIT {
        info!(
            "Alert suppressed (daily limit, {} in last 24h): {} for {}",
            fired,
            alert_type.as_str(),
            scope
        );
        return Ok(false);
    }

    Ok(true)
}
