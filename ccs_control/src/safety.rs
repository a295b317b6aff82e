//! Safety layer: ordered threshold rules over the latest frame.
//!
//! Pure function of (frame, stale-tick counter, thresholds); first match
//! wins per group; unmatched groups fall through to the controller.
//! Allocation-free: the verdict is a fixed array of small copies.

use ccs_common::config::SafetyConfig;
use ccs_common::decision::RuleFlags;
use ccs_common::group::{GROUP_COUNT, GroupId};
use ccs_common::telemetry::{TelemetryFrame, TempChannel};

// ─── Verdict ────────────────────────────────────────────────────────

/// Forced action for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyAction {
    /// Pin at the envelope maximum; controller skipped.
    ForceMax,
    /// Pin at the envelope minimum; controller skipped.
    ForceMin,
    /// Hold the previous tick's frequency; controller skipped.
    HoldPrevious,
    /// Controller still runs, but its output may not drop below the
    /// previous tick's frequency (energy saving inhibited).
    FloorPrevious,
}

/// Per-group rule hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupVerdict {
    pub action: SafetyAction,
    pub rule: RuleFlags,
    /// Count state machine skipped for this group (stale hold).
    pub pin_count: bool,
}

/// Complete safety verdict for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafetyVerdict {
    pub groups: [Option<GroupVerdict>; GROUP_COUNT],
}

impl SafetyVerdict {
    #[inline]
    pub fn group(&self, id: GroupId) -> Option<&GroupVerdict> {
        self.groups[id.index()].as_ref()
    }

    /// Any group covered by a safety rule this tick.
    #[inline]
    pub fn any(&self) -> bool {
        self.groups.iter().any(Option::is_some)
    }

    fn set_if_empty(&mut self, id: GroupId, verdict: GroupVerdict) {
        let slot = &mut self.groups[id.index()];
        if slot.is_none() {
            *slot = Some(verdict);
        }
    }
}

// ─── Evaluation ─────────────────────────────────────────────────────

/// Evaluate the rule table in order; first match wins per group.
pub fn evaluate(cfg: &SafetyConfig, frame: &TelemetryFrame, stale_ticks: u32) -> SafetyVerdict {
    let mut verdict = SafetyVerdict::default();

    let t2 = frame.temperature(TempChannel::T2);
    let t3 = frame.temperature(TempChannel::T3);
    let t4 = frame.temperature(TempChannel::T4);
    let t5 = frame.temperature(TempChannel::T5);
    let t6 = frame.temperature(TempChannel::T6);

    // S1: seawater-side overtemperature.
    if t2.max(t3) >= cfg.seawater_overtemp_c {
        verdict.set_if_empty(
            GroupId::SwPumps,
            GroupVerdict {
                action: SafetyAction::ForceMax,
                rule: RuleFlags::S1_SEAWATER_OVERTEMP,
                pin_count: false,
            },
        );
    }

    // S2: fresh-water return overtemperature.
    if t4 >= cfg.freshwater_overtemp_c {
        verdict.set_if_empty(
            GroupId::FwPumps,
            GroupVerdict {
                action: SafetyAction::ForceMax,
                rule: RuleFlags::S2_FRESHWATER_OVERTEMP,
                pin_count: false,
            },
        );
    }

    // S3: low suction pressure floors both pump groups.
    if frame.px1_bar < cfg.pressure_floor_bar {
        for id in [GroupId::SwPumps, GroupId::FwPumps] {
            verdict.set_if_empty(
                id,
                GroupVerdict {
                    action: SafetyAction::FloorPrevious,
                    rule: RuleFlags::S3_PRESSURE_FLOOR,
                    pin_count: false,
                },
            );
        }
    }

    // S4a/S4b: fresh-water outlet band.
    if t5 > cfg.outlet_hot_c {
        verdict.set_if_empty(
            GroupId::SwPumps,
            GroupVerdict {
                action: SafetyAction::ForceMax,
                rule: RuleFlags::S4A_OUTLET_HOT,
                pin_count: false,
            },
        );
    } else if t5 < cfg.outlet_cold_c {
        verdict.set_if_empty(
            GroupId::SwPumps,
            GroupVerdict {
                action: SafetyAction::ForceMin,
                rule: RuleFlags::S4B_OUTLET_COLD,
                pin_count: false,
            },
        );
    }

    // S5: engine-room emergency temperature.
    if t6 >= cfg.er_emergency_c {
        verdict.set_if_empty(
            GroupId::ErFans,
            GroupVerdict {
                action: SafetyAction::ForceMax,
                rule: RuleFlags::S5_ER_EMERGENCY,
                pin_count: false,
            },
        );
    }

    // S6: persistent telemetry staleness holds everything.
    if stale_ticks >= cfg.stale_hold_ticks {
        for id in GroupId::ALL {
            verdict.set_if_empty(
                id,
                GroupVerdict {
                    action: SafetyAction::HoldPrevious,
                    rule: RuleFlags::S6_STALE_HOLD,
                    pin_count: true,
                },
            );
        }
    }

    verdict
}

// ─── Tests ──────────────────────────────────────────────────────────
