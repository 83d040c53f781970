//! Regime-change detection with a two-period persistence requirement.
//!
//! The machine is a pure transition function; all of its memory lives in
//! the `alert_state` row, so behavior after a restart is identical to an
//! uninterrupted run.

use crate::domain::types::Playbook;

/// Periods a new playbook must persist before the change is confirmed.
pub const CONFIRMATION_PERIODS: i32 = 2;

/// Durable tracking state for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeTracking {
    /// Last confirmed playbook.
    pub previous: Playbook,
    /// Playbook waiting out the persistence window, if any.
    pub pending: Option<Playbook>,
    /// Consecutive periods the pending playbook has been observed.
    pub periods: i32,
}

/// Result of observing one signal period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeStep {
    /// Fire a regime-change alert for `next.previous` this period.
    pub fire: bool,
    /// State to persist.
    pub next: RegimeTracking,
}

/// Advance the machine by one observed playbook.
pub fn observe(tracking: Option<&RegimeTracking>, current: Playbook) -> RegimeStep {
    let Some(tracking) = tracking else {
        // First observation: adopt the playbook silently.
        return RegimeStep {
            fire: false,
            next: RegimeTracking {
                previous: current,
                pending: None,
                periods: 0,
            },
        };
    };

    if current != tracking.previous {
        if tracking.pending == Some(current) {
            let periods = tracking.periods + 1;
            if periods >= CONFIRMATION_PERIODS {
                // Persistence satisfied: confirm and reset.
                return RegimeStep {
                    fire: true,
                    next: RegimeTracking {
                        previous: current,
                        pending: None,
                        periods: 0,
                    },
                };
            }
            return RegimeStep {
                fire: false,
                next: RegimeTracking {
                    previous: tracking.previous,
                    pending: Some(current),
                    periods,
                },
            };
        }

        // A different candidate appeared: restart the persistence window.
        return RegimeStep {
            fire: false,
            next: RegimeTracking {
                previous: tracking.previous,
                pending: Some(current),
                periods: 1,
            },
        };
    }

    // Back on the confirmed playbook: cancel any pending change.
    RegimeStep {
        fire: false,
        next: RegimeTracking {
            previous: tracking.previous,
            pending: None,
            periods: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_initializes_silently() {
        let step = observe(None, Playbook::LongOnly);
        assert!(!step.fire);
        assert_eq!(step.next.previous, Playbook::LongOnly);
        assert_eq!(step.next.pending, None);
        assert_eq!(step.next.periods, 0);
    }

    #[test]
    fn test_change_confirms_on_second_period() {
        let step = observe(None, Playbook::LongOnly);

        // t1: flip to Short-only. Pending, no fire.
        let step = observe(Some(&step.next), Playbook::ShortOnly);
        assert!(!step.fire);
        assert_eq!(step.next.pending, Some(Playbook::ShortOnly));
        assert_eq!(step.next.periods, 1);

        // t2: still Short-only. Fire and reset.
        let step = observe(Some(&step.next), Playbook::ShortOnly);
        assert!(step.fire);
        assert_eq!(step.next.previous, Playbook::ShortOnly);
        assert_eq!(step.next.pending, None);
        assert_eq!(step.next.periods, 0);

        // t3: still Short-only. Stable, no re-fire.
        let step = observe(Some(&step.next), Playbook::ShortOnly);
        assert!(!step.fire);
    }

    #[test]
    fn test_one_period_blip_is_cancelled() {
        let step = observe(None, Playbook::LongOnly);
        let step = observe(Some(&step.next), Playbook::NoTrade);
        assert_eq!(step.next.periods, 1);

        // Reverts before confirmation: pending cleared, nothing fired.
        let step = observe(Some(&step.next), Playbook::LongOnly);
        assert!(!step.fire);
        assert_eq!(step.next.previous, Playbook::LongOnly);
        assert_eq!(step.next.pending, None);
        assert_eq!(step.next.periods, 0);
    }

    #[test]
    fn test_flapping_candidates_restart_the_window() {
        let step = observe(None, Playbook::LongOnly);
        let step = observe(Some(&step.next), Playbook::ShortOnly);
        assert_eq!(step.next.periods, 1);

        // Different candidate: window restarts at 1, still no fire.
        let step = observe(Some(&step.next), Playbook::NoTrade);
        assert!(!step.fire);
        assert_eq!(step.next.pending, Some(Playbook::NoTrade));
        assert_eq!(step.next.periods, 1);

        let step = observe(Some(&step.next), Playbook::NoTrade);
        assert!(step.fire);
        assert_eq!(step.next.previous, Playbook::NoTrade);
    }
}
