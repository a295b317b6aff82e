//! Equipment-count state machine with dwell debounce and cooldown.
//!
//! Runs after the controller for each group. The 10 s dwell prevents
//! chattering on transient limits; the 30 s cooldown lets the hydraulics
//! settle before the next topology change; the 8 Hz shed after adding a
//! unit compensates the capacity step.

use ccs_common::config::CountsConfig;
use ccs_common::group::{GroupEnvelope, GroupState};

/// Tolerance for "at the extremum" comparisons.
const EXTREMUM_EPS_HZ: f64 = 1e-9;

/// Count transition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountChange {
    pub from: u8,
    pub to: u8,
}

/// Result of one count-machine step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountOutcome {
    /// Possibly shed frequency [Hz].
    pub frequency_hz: f64,
    /// Count after the step.
    pub count: u8,
    /// Set when the count changed this step.
    pub change: Option<CountChange>,
}

/// Advance one group's count machine by `dt_s` at decided frequency
/// `frequency_hz`.
///
/// Mutates the dwell/cooldown timers and count in `state`; the caller
/// persists the returned frequency.
pub fn advance(
    cfg: &CountsConfig,
    envelope: &GroupEnvelope,
    state: &mut GroupState,
    frequency_hz: f64,
    dt_s: f64,
) -> CountOutcome {
    let mut frequency_hz = frequency_hz;
    let mut change = None;

    if state.cooldown_s > 0.0 {
        state.cooldown_s = (state.cooldown_s - dt_s).max(0.0);
        state.time_at_max_s = 0.0;
        state.time_at_min_s = 0.0;
    } else if frequency_hz >= envelope.frequency_max - EXTREMUM_EPS_HZ
        && state.count < envelope.count_max
    {
        state.time_at_min_s = 0.0;
        state.time_at_max_s += dt_s;
        if state.time_at_max_s >= cfg.dwell_s {
            let from = state.count;
            state.count += 1;
            state.time_at_max_s = 0.0;
            state.cooldown_s = cfg.cooldown_s;
            frequency_hz = (frequency_hz - cfg.shed_hz).max(envelope.frequency_min);
            change = Some(CountChange {
                from,
                to: state.count,
            });
        }
    } else if frequency_hz <= envelope.frequency_min + EXTREMUM_EPS_HZ
        && state.count > envelope.count_min
    {
        state.time_at_max_s = 0.0;
        state.time_at_min_s += dt_s;
        if state.time_at_min_s >= cfg.dwell_s {
            let from = state.count;
            state.count -= 1;
            state.time_at_min_s = 0.0;
            state.cooldown_s = cfg.cooldown_s;
            change = Some(CountChange {
                from,
                to: state.count,
            });
        }
    } else {
        state.time_at_max_s = 0.0;
        state.time_at_min_s = 0.0;
    }

    CountOutcome {
        frequency_hz,
        count: state.count,
        change,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 2.0;

    fn cfg() -> CountsConfig {
        CountsConfig::default()
    }

    fn fans() -> GroupEnvelope {
        GroupEnvelope::fans()
    }

    #[test]
    fn dwell_then_count_up_with_shed() {
        let env = fans();
        let mut state = GroupState::new(60.0, 3);
        // Four ticks at max: 8 s dwell, no change yet.
        for _ in 0..4 {
            let out = advance(&cfg(), &env, &mut state, 60.0, DT);
            assert!(out.change.is_none());
            assert_eq!(out.count, 3);
        }
        assert!((state.time_at_max_s - 8.0).abs() < 1e-9);

        // Fifth tick reaches the 10 s dwell: add a unit, shed 8 Hz.
        let out = advance(&cfg(), &env, &mut state, 60.0, DT);
        assert_eq!(out.change, Some(CountChange { from: 3, to: 4 }));
        assert_eq!(out.count, 4);
        assert!((out.frequency_hz - 52.0).abs() < 1e-9);
        assert_eq!(state.time_at_max_s, 0.0);
        assert!((state.cooldown_s - 30.0).abs() < 1e-9);
    }

    #[test]
    fn shed_respects_envelope_floor() {
        let env = GroupEnvelope {
            frequency_min: 55.0,
            frequency_max: 60.0,
            ..fans()
        };
        let mut state = GroupState::new(60.0, 2);
        state.time_at_max_s = 8.0;
        let out = advance(&cfg(), &env, &mut state, 60.0, DT);
        assert!(out.change.is_some());
        assert_eq!(out.frequency_hz, 55.0);
    }

    #[test]
    fn cooldown_blocks_changes_and_clears_timers() {
        let env = fans();
        let mut state = GroupState::new(60.0, 3);
        state.cooldown_s = 30.0;
        state.time_at_max_s = 9.0;

        // 14 ticks of continuous max: cooldown counts down, nothing changes.
        for _ in 0..14 {
            let out = advance(&cfg(), &env, &mut state, 60.0, DT);
            assert!(out.change.is_none());
            assert_eq!(out.count, 3);
            assert_eq!(state.time_at_max_s, 0.0);
        }
        assert!((state.cooldown_s - 2.0).abs() < 1e-9);

        // Cooldown expires; dwell starts from zero again.
        let out = advance(&cfg(), &env, &mut state, 60.0, DT);
        assert!(out.change.is_none());
        assert!(state.cooldown_s == 0.0 || state.time_at_max_s > 0.0);

        // Five more ticks complete a fresh dwell.
        let mut changed = false;
        for _ in 0..5 {
            if advance(&cfg(), &env, &mut state, 60.0, DT).change.is_some() {
                changed = true;
            }
        }
        assert!(changed);
        assert_eq!(state.count, 4);
    }

    #[test]
    fn dwell_then_count_down_keeps_frequency() {
        let env = fans();
        let mut state = GroupState::new(40.0, 3);
        for _ in 0..4 {
            assert!(advance(&cfg(), &env, &mut state, 40.0, DT).change.is_none());
        }
        let out = advance(&cfg(), &env, &mut state, 40.0, DT);
        assert_eq!(out.change, Some(CountChange { from: 3, to: 2 }));
        assert!((out.frequency_hz - 40.0).abs() < 1e-9);
        assert!((state.cooldown_s - 30.0).abs() < 1e-9);
    }

    #[test]
    fn no_count_up_at_count_max() {
        let env = fans();
        let mut state = GroupState::new(60.0, 4);
        for _ in 0..20 {
            let out = advance(&cfg(), &env, &mut state, 60.0, DT);
            assert!(out.change.is_none());
            assert_eq!(out.count, 4);
        }
        // Not at an actionable extremum: timers stay clear.
        assert_eq!(state.time_at_max_s, 0.0);
    }

    #[test]
    fn no_count_down_at_count_min() {
        let env = fans();
        let mut state = GroupState::new(40.0, 2);
        for _ in 0..20 {
            assert!(advance(&cfg(), &env, &mut state, 40.0, DT).change.is_none());
        }
        assert_eq!(state.count, 2);
    }

    #[test]
    fn mid_band_resets_both_timers() {
        let env = fans();
        let mut state = GroupState::new(60.0, 3);
        state.time_at_max_s = 8.0;
        advance(&cfg(), &env, &mut state, 50.0, DT);
        assert_eq!(state.time_at_max_s, 0.0);
        assert_eq!(state.time_at_min_s, 0.0);
    }

    #[test]
    fn interrupted_dwell_starts_over() {
        let env = fans();
        let mut state = GroupState::new(60.0, 3);
        for _ in 0..4 {
            advance(&cfg(), &env, &mut state, 60.0, DT);
        }
        // One tick off the extremum resets the dwell.
        advance(&cfg(), &env, &mut state, 55.0, DT);
        // Four more ticks at max: still no change (dwell restarted).
        for _ in 0..4 {
            assert!(advance(&cfg(), &env, &mut state, 60.0, DT).change.is_none());
        }
        assert_eq!(state.count, 3);
    }

    #[test]
    fn timers_stay_mutually_exclusive() {
        let env = fans();
        let mut state = GroupState::new(60.0, 3);
        advance(&cfg(), &env, &mut state, 60.0, DT);
        assert!(state.timers_exclusive());
        advance(&cfg(), &env, &mut state, 40.0, DT);
        assert!(state.timers_exclusive());
        advance(&cfg(), &env, &mut state, 40.0, DT);
        assert!(state.timers_exclusive());
    }
}
