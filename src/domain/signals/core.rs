//! The four scalar signals.
//!
//! Exit-cluster is computed first because the alignment score carries a
//! de-risking penalty once it crosses its threshold. Everything here is
//! synchronous and deterministic; history comes in as a slice.

use crate::domain::types::{Trend, WalletClassification};
use statrs::statistics::Statistics;
use std::collections::HashMap;

/// Exit-cluster share above which the alignment score is capped.
pub const EXIT_CLUSTER_PENALTY_PCT: f64 = 25.0;
/// Alignment cap applied under an elevated exit cluster.
const ALIGNMENT_PENALTY_CAP: f64 = 60.0;
/// Dead-zone around the rolling average for trend detection.
const TREND_DEAD_ZONE: f64 = 5.0;
/// Periods of history required before a trend is called.
pub const TREND_HISTORY_PERIODS: usize = 3;
/// Change ratios are clamped to ±200% before the spread is measured.
const RATIO_CLAMP: f64 = 2.0;
/// Below this many ratios the dispersion index defaults to medium.
const DISPERSION_MIN_SAMPLES: usize = 5;

/// Share of the cohort actively reducing exposure, 0..=100.
pub fn exit_cluster_score(n_reducer: usize, n_total: usize) -> f64 {
    if n_total == 0 {
        return 0.0;
    }
    n_reducer as f64 / n_total as f64 * 100.0
}

/// Consensus alignment score, 0..=100, 50 = neutral.
///
/// CAS = 50 + 50·(n_long − n_short)/n_total, capped at 60 while the
/// exit cluster is elevated, clamped to [0, 100]. An empty cohort is
/// neutral by definition.
pub fn alignment_score(
    n_adder_long: usize,
    n_adder_short: usize,
    n_total: usize,
    exit_cluster: f64,
) -> f64 {
    if n_total == 0 {
        return 50.0;
    }

    let net = n_adder_long as f64 - n_adder_short as f64;
    let mut cas = 50.0 + net / n_total as f64 * 50.0;

    if exit_cluster > EXIT_CLUSTER_PENALTY_PCT {
        cas = cas.min(ALIGNMENT_PENALTY_CAP);
    }

    cas.clamp(0.0, 100.0)
}

/// Trend of the alignment score against its 3-period rolling average,
/// with a ±5 dead-zone. `history` holds previously persisted scores,
/// most recent first; fewer than three periods reads as flat.
pub fn alignment_trend(current_cas: f64, history: &[f64]) -> Trend {
    if history.len() < TREND_HISTORY_PERIODS {
        return Trend::Flat;
    }

    let average = history[..TREND_HISTORY_PERIODS].iter().mean();

    if current_cas > average + TREND_DEAD_ZONE {
        Trend::Rising
    } else if current_cas < average - TREND_DEAD_ZONE {
        Trend::Falling
    } else {
        Trend::Flat
    }
}

/// Dispersion index: how much the cohort disagrees about magnitude and
/// direction, 0..=100.
///
/// Per-wallet change ratios delta/max(|previous|, ε) are clamped to ±2;
/// fewer than five samples defaults to 50 (medium), identical samples
/// read as 0, otherwise min(σ·100, 100) with σ the sample standard
/// deviation.
pub fn dispersion_index(classifications: &HashMap<String, WalletClassification>) -> f64 {
    let ratios: Vec<f64> = classifications
        .values()
        .map(|c| {
            let denominator = c.szi_previous.abs().max(c.epsilon);
            (c.delta / denominator).clamp(-RATIO_CLAMP, RATIO_CLAMP)
        })
        .collect();

    if ratios.len() < DISPERSION_MIN_SAMPLES {
        return 50.0;
    }

    if ratios.windows(2).all(|pair| pair[0] == pair[1]) {
        return 0.0;
    }

    let sigma = ratios.iter().std_dev();
    (sigma * 100.0).min(100.0)
}
