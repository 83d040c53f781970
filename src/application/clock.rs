//! Boundary alignment for the two scheduler loops.

use chrono::{DateTime, DurationRound, Utc};

/// Floor a timestamp to an interval boundary. The intervals used here
/// (60s, 300s) always truncate cleanly; the identity fallback only
/// guards against a degenerate zero interval.
pub fn floor(ts: DateTime<Utc>, interval: chrono::Duration) -> DateTime<Utc> {
    ts.duration_trunc(interval).unwrap_or(ts)
}

/// First boundary strictly after `ts`.
pub fn next_boundary(ts: DateTime<Utc>, interval: chrono::Duration) -> DateTime<Utc> {
    floor(ts, interval) + interval
}
