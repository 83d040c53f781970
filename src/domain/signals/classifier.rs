//! Per-wallet noise floors and behavioral classification.

use crate::domain::types::{
    Asset, StateCounts, WalletClassification, WalletDelta, WalletState,
};
use std::collections::HashMap;

/// Fraction of the 24h median |szi| used as the relative noise floor.
const RELATIVE_EPSILON_FACTOR: f64 = 0.02;

/// Noise floor for one wallet: the asset's absolute floor, or 2% of the
/// wallet's 24h median absolute size, whichever is larger. Missing or
/// zero history falls back to the absolute floor.
pub fn epsilon(asset: Asset, median_abs_szi_24h: Option<f64>) -> f64 {
    let floor = asset.epsilon_floor();
    match median_abs_szi_24h {
        Some(median) if median > 0.0 => floor.max(RELATIVE_EPSILON_FACTOR * median),
        _ => floor,
    }
}

/// Classify one wallet. Rules are evaluated top-down, first match wins;
/// a wallet without a previous observation is Flat by definition.
pub fn classify(szi_current: f64, szi_previous: Option<f64>, epsilon: f64) -> WalletState {
    let Some(szi_previous) = szi_previous else {
        return WalletState::Flat;
    };

    let delta = szi_current - szi_previous;

    if delta > epsilon && szi_current > 0.0 {
        WalletState::AdderLong
    } else if delta < -epsilon && szi_current < 0.0 {
        WalletState::AdderShort
    } else if szi_current.abs() < szi_previous.abs() - epsilon {
        WalletState::Reducer
    } else {
        WalletState::Flat
    }
}

/// Classify every wallet with a computable delta. `medians` carries each
/// wallet's 24h median |szi| (absent for wallets with no history).
pub fn classify_cohort(
    deltas: &HashMap<String, WalletDelta>,
    asset: Asset,
    medians: &HashMap<String, f64>,
) -> HashMap<String, WalletClassification> {
    let mut classifications = HashMap::new();

    for (wallet_id, delta) in deltas {
        let (Some(szi_previous), Some(delta_szi)) = (delta.szi_previous, delta.delta) else {
            continue;
        };

        let eps = epsilon(asset, medians.get(wallet_id).copied());
        let state = classify(delta.szi_current, Some(szi_previous), eps);

        classifications.insert(
            wallet_id.clone(),
            WalletClassification {
                state,
                szi_current: delta.szi_current,
                szi_previous,
                delta: delta_szi,
                epsilon: eps,
            },
        );
    }

    classifications
}

pub fn count_states(classifications: &HashMap<String, WalletClassification>) -> StateCounts {
    let mut counts = StateCounts::default();
    for classification in classifications.values() {
        match classification.state {
            WalletState::AdderLong => counts.adder_long += 1,
            WalletState::AdderShort => counts.adder_short += 1,
            WalletState::Reducer => counts.reducer += 1,
            WalletState::Flat => counts.flat += 1,
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_epsilon_floor_per_asset() {
        assert_eq!(epsilon(Asset::Hype, None), 0.01);
        assert_eq!(epsilon(Asset::Btc, None), 0.0001);
        assert_eq!(epsilon(Asset::Eth, None), 0.001);
    }

    #[test]
    fn test_epsilon_relative_dominates_large_wallets() {
        // 2% of median 10.0 = 0.2 > HYPE floor 0.01.
        assert_eq!(epsilon(Asset::Hype, Some(10.0)), 0.2);
        // Tiny median falls back to the floor.
        assert_eq!(epsilon(Asset::Hype, Some(0.1)), 0.01);
        // Zero median (all-flat history) is treated as no history.
        assert_eq!(epsilon(Asset::Hype, Some(0.0)), 0.01);
    }

    #[test]
    fn test_adder_long() {
        assert_eq!(classify(2.0, Some(1.0), 0.5), WalletState::AdderLong);
    }

    #[test]
    fn test_adder_short() {
        assert_eq!(classify(-2.0, Some(-1.0), 0.5), WalletState::AdderShort);
    }

    #[test]
    fn test_reducer_long_side() {
        assert_eq!(classify(0.2, Some(2.0), 0.5), WalletState::Reducer);
    }

    #[test]
    fn test_reducer_short_side() {
        assert_eq!(classify(-0.2, Some(-2.0), 0.5), WalletState::Reducer);
    }

    #[test]
    fn test_noise_is_flat() {
        // Delta inside epsilon in both directions.
        assert_eq!(classify(1.3, Some(1.0), 0.5), WalletState::Flat);
        assert_eq!(classify(0.8, Some(1.0), 0.5), WalletState::Flat);
    }

    #[test]
    fn test_missing_previous_is_flat() {
        assert_eq!(classify(5.0, None, 0.5), WalletState::Flat);
    }

    #[test]
    fn test_flip_through_zero_growing_short_is_adder_short() {
        // 1.0 -> -2.0: delta -3, current negative.
        assert_eq!(classify(-2.0, Some(1.0), 0.5), WalletState::AdderShort);
    }

    #[test]
    fn test_rule_order_adder_wins_over_reducer() {
        // -3.0 -> 2.0: delta +5 with positive current (adder-long), even
        // though |current| < |previous| - eps would also match.
        assert_eq!(classify(2.0, Some(-3.0), 0.5), WalletState::AdderLong);
    }

    #[test]
    fn test_classify_cohort_skips_null_deltas() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut deltas = HashMap::new();
        deltas.insert(
            "0xa".to_string(),
            WalletDelta {
                szi_current: 2.0,
                szi_previous: Some(1.0),
                delta: Some(1.0),
                ts_current: ts,
                ts_previous: Some(ts),
            },
        );
        deltas.insert(
            "0xnew".to_string(),
            WalletDelta {
                szi_current: 9.0,
                szi_previous: None,
                delta: None,
                ts_current: ts,
                ts_previous: None,
            },
        );

        let classifications = classify_cohort(&deltas, Asset::Hype, &HashMap::new());
        assert_eq!(classifications.len(), 1);
        assert_eq!(classifications["0xa"].state, WalletState::AdderLong);

        let counts = count_states(&classifications);
        assert_eq!(counts.adder_long, 1);
        assert_eq!(counts.total(), 1);
    }
}
