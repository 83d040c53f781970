//! Playbook resolution: override chain, decision matrix, derived flags.

use crate::domain::types::{Playbook, RiskMode, Trend};
use tracing::debug;

/// Dispersion at or above this forces No-trade/Defensive.
const DISPERSION_HIGH: f64 = 60.0;
/// Dispersion at or above this (below high) reads as medium.
const DISPERSION_MEDIUM: f64 = 40.0;
/// Exit cluster above this forces No-trade/Defensive.
const EXIT_CLUSTER_HIGH: f64 = 25.0;
/// Exit cluster at or above this (up to high) reads as medium.
const EXIT_CLUSTER_MEDIUM: f64 = 16.0;

/// Resolved stance for one (signal_ts, asset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub playbook: Playbook,
    pub risk_mode: RiskMode,
    pub add_exposure: bool,
    pub tighten_stops: bool,
}

/// Resolve the four signals into a playbook and risk mode.
///
/// Overrides are evaluated in strict order; only when none applies does
/// the decision matrix run, first matching row wins, with a
/// No-trade/Reduced safety fallback.
pub fn resolve(cas: f64, trend: Trend, dispersion: f64, exit_cluster: f64) -> Resolution {
    let (playbook, risk_mode) = stance(cas, trend, dispersion, exit_cluster);

    let add_exposure = trend == Trend::Rising
        && exit_cluster < EXIT_CLUSTER_MEDIUM
        && dispersion < DISPERSION_HIGH;

    let tighten_stops = exit_cluster > EXIT_CLUSTER_HIGH
        || trend == Trend::Falling
        || dispersion >= DISPERSION_HIGH;

    Resolution {
        playbook,
        risk_mode,
        add_exposure,
        tighten_stops,
    }
}

fn stance(cas: f64, trend: Trend, dispersion: f64, exit_cluster: f64) -> (Playbook, RiskMode) {
    // Override 1: the cohort disagrees too much to read anything.
    if dispersion >= DISPERSION_HIGH {
        debug!("Dispersion override: Di={:.1}", dispersion);
        return (Playbook::NoTrade, RiskMode::Defensive);
    }

    // Override 2: coordinated de-risking.
    if exit_cluster > EXIT_CLUSTER_HIGH {
        debug!("Exit cluster override: EC={:.1}", exit_cluster);
        return (Playbook::NoTrade, RiskMode::Defensive);
    }

    // Override 3: distribution pattern, conviction fading from a high.
    if trend == Trend::Falling && cas > 60.0 {
        debug!("Trend override: falling with CAS={:.1}", cas);
        return (Playbook::NoTrade, RiskMode::Reduced);
    }

    let di_low = dispersion < DISPERSION_MEDIUM;
    let di_medium = (DISPERSION_MEDIUM..DISPERSION_HIGH).contains(&dispersion);
    let ec_low = exit_cluster < EXIT_CLUSTER_MEDIUM;
    let ec_medium = (EXIT_CLUSTER_MEDIUM..=EXIT_CLUSTER_HIGH).contains(&exit_cluster);

    // Long side.
    if cas > 75.0 && trend == Trend::Rising && di_low && ec_low {
        return (Playbook::LongOnly, RiskMode::Normal);
    }
    if cas > 75.0 && trend == Trend::Rising && di_low && ec_medium {
        return (Playbook::LongOnly, RiskMode::Reduced);
    }
    if cas > 75.0 && trend == Trend::Flat && di_low && ec_low {
        return (Playbook::LongOnly, RiskMode::Reduced);
    }
    if (60.0..=75.0).contains(&cas) && trend == Trend::Rising && di_low && ec_low {
        return (Playbook::LongOnly, RiskMode::Reduced);
    }
    if (60.0..=75.0).contains(&cas) && di_medium && ec_low {
        return (Playbook::LongOnly, RiskMode::Reduced);
    }

    // Short side.
    if cas < 25.0 && trend == Trend::Falling && di_low && ec_low {
        return (Playbook::ShortOnly, RiskMode::Normal);
    }
    if cas < 25.0 && trend == Trend::Falling && di_low && ec_medium {
        return (Playbook::ShortOnly, RiskMode::Reduced);
    }
    if cas < 25.0 && trend == Trend::Flat && di_low && ec_low {
        return (Playbook::ShortOnly, RiskMode::Reduced);
    }
    if (25.0..40.0).contains(&cas) && trend == Trend::Falling && di_low && ec_low {
        return (Playbook::ShortOnly, RiskMode::Reduced);
    }
    if (25.0..40.0).contains(&cas) && di_medium && ec_low {
        return (Playbook::ShortOnly, RiskMode::Reduced);
    }

    // Neutral zone: stand aside regardless of the other signals.
    if (40.0..=60.0).contains(&cas) {
        return (Playbook::NoTrade, RiskMode::Defensive);
    }

    debug!(
        "No matrix row matched: CAS={:.1} trend={} Di={:.1} EC={:.1}",
        cas, trend, dispersion, exit_cluster
    );
    (Playbook::NoTrade, RiskMode::Reduced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispersion_override_beats_matrix() {
        // Would otherwise be row a (strong bullish).
        let r = resolve(90.0, Trend::Rising, 60.0, 2.0);
        assert_eq!(r.playbook, Playbook::NoTrade);
        assert_eq!(r.risk_mode, RiskMode::Defensive);
        assert!(!r.add_exposure);
        assert!(r.tighten_stops);
    }

    #[test]
    fn test_exit_cluster_override_beats_trend_override() {
        // Falling with CAS > 60 would hit override 3, but EC > 25 wins.
        let r = resolve(80.0, Trend::Falling, 10.0, 30.0);
        assert_eq!(r.playbook, Playbook::NoTrade);
        assert_eq!(r.risk_mode, RiskMode::Defensive);
    }

    #[test]
    fn test_trend_override_distribution() {
        let r = resolve(80.0, Trend::Falling, 10.0, 5.0);
        assert_eq!(r.playbook, Playbook::NoTrade);
        assert_eq!(r.risk_mode, RiskMode::Reduced);
        assert!(r.tighten_stops);
    }

    #[test]
    fn test_matrix_long_rows() {
        // a: strong bullish.
        let r = resolve(90.0, Trend::Rising, 15.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::LongOnly, RiskMode::Normal));
        assert!(r.add_exposure);
        assert!(!r.tighten_stops);

        // b: strong bullish, medium exit cluster.
        let r = resolve(90.0, Trend::Rising, 15.0, 20.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::LongOnly, RiskMode::Reduced));
        assert!(!r.add_exposure);

        // c: strong bullish, stable.
        let r = resolve(90.0, Trend::Flat, 15.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::LongOnly, RiskMode::Reduced));

        // d: moderate bullish, building.
        let r = resolve(70.0, Trend::Rising, 15.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::LongOnly, RiskMode::Reduced));

        // e: moderate bullish, mixed signals (any trend, medium Di).
        let r = resolve(70.0, Trend::Falling, 50.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::LongOnly, RiskMode::Reduced));
    }

    #[test]
    fn test_matrix_short_rows() {
        // f: strong bearish.
        let r = resolve(10.0, Trend::Falling, 15.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::ShortOnly, RiskMode::Normal));
        assert!(r.tighten_stops); // falling trend

        // g: strong bearish, medium exit cluster.
        let r = resolve(10.0, Trend::Falling, 15.0, 20.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::ShortOnly, RiskMode::Reduced));

        // h: strong bearish, stable.
        let r = resolve(10.0, Trend::Flat, 15.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::ShortOnly, RiskMode::Reduced));

        // i: moderate bearish, building.
        let r = resolve(30.0, Trend::Falling, 15.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::ShortOnly, RiskMode::Reduced));

        // j: moderate bearish, mixed signals.
        let r = resolve(30.0, Trend::Rising, 50.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::ShortOnly, RiskMode::Reduced));
    }

    #[test]
    fn test_matrix_neutral_zone() {
        // k: CAS 40..=60 stands aside whatever else says.
        let r = resolve(50.0, Trend::Rising, 15.0, 2.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::NoTrade, RiskMode::Defensive));
        // Rising trend with calm signals still allows adding elsewhere.
        assert!(r.add_exposure);
    }

    #[test]
    fn test_default_fallback() {
        // CAS 80 / flat / medium EC matches no override and no row.
        let r = resolve(80.0, Trend::Flat, 15.0, 20.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::NoTrade, RiskMode::Reduced));
    }

    #[test]
    fn test_boundary_values() {
        // CAS exactly 75 is the moderate band; exactly 60 is neutral zone.
        let r = resolve(75.0, Trend::Rising, 15.0, 2.0);
        assert_eq!(r.playbook, Playbook::LongOnly);
        let r = resolve(60.0, Trend::Flat, 15.0, 2.0);
        assert_eq!(r.playbook, Playbook::NoTrade);

        // Di exactly 40 is medium, 60 is the override.
        let r = resolve(70.0, Trend::Flat, 40.0, 2.0);
        assert_eq!(r.playbook, Playbook::LongOnly);

        // EC exactly 16 is medium, exactly 25 still medium (not override).
        let r = resolve(90.0, Trend::Rising, 15.0, 16.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::LongOnly, RiskMode::Reduced));
        let r = resolve(90.0, Trend::Rising, 15.0, 25.0);
        assert_eq!((r.playbook, r.risk_mode), (Playbook::LongOnly, RiskMode::Reduced));
    }
}
