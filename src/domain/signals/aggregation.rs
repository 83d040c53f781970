//! Merging the two aggregation windows into per-wallet deltas.
//!
//! The window queries themselves (latest non-dirty snapshot per wallet)
//! live in the snapshot repository; this is the pure merge.

use crate::domain::types::WalletDelta;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::warn;

/// Latest observed position of one wallet within a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPosition {
    pub szi: f64,
    pub snapshot_ts: DateTime<Utc>,
}

/// Combine the current and previous window maps into per-wallet deltas.
///
/// Wallets seen only in the previous window have gone dark mid-period;
/// they are logged and omitted. Wallets seen only in the current window
/// are kept with a null previous (and therefore a null delta).
pub fn build_wallet_deltas(
    current: &HashMap<String, WindowPosition>,
    previous: &HashMap<String, WindowPosition>,
) -> HashMap<String, WalletDelta> {
    let mut deltas = HashMap::with_capacity(current.len());

    for wallet_id in previous.keys() {
        if !current.contains_key(wallet_id) {
            warn!("Wallet {} missing from current window", wallet_id);
        }
    }

    for (wallet_id, now) in current {
        let prior = previous.get(wallet_id);
        deltas.insert(
            wallet_id.clone(),
            WalletDelta {
                szi_current: now.szi,
                szi_previous: prior.map(|p| p.szi),
                delta: prior.map(|p| now.szi - p.szi),
                ts_current: now.snapshot_ts,
                ts_previous: prior.map(|p| p.snapshot_ts),
            },
        );
    }

    deltas
}

/// (wallets with a computable delta, wallets lacking a previous value).
pub fn delta_counts(deltas: &HashMap<String, WalletDelta>) -> (usize, usize) {
    let valid = deltas.values().filter(|d| d.delta.is_some()).count();
    (valid, deltas.len() - valid)
}
