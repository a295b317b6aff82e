//! Per-tick decisions: applied-rule flags, regulation modes, and the
//! decision record retained in the control-state store.
//!
//! Decisions serialize losslessly through serde_json; the dashboard reads
//! them back as-is.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::group::{GROUP_COUNT, GroupEnvelope, GroupId};
use crate::telemetry::{CommandFrame, GroupCommand};

// ─── Applied Rules ──────────────────────────────────────────────────

bitflags! {
    /// Identifiers of the rules that shaped a per-group sub-decision.
    ///
    /// S1..S6 are the safety-layer rules; the remaining flags record which
    /// non-safety path produced the output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleFlags: u16 {
        /// Seawater-side overtemperature, pumps forced to maximum.
        const S1_SEAWATER_OVERTEMP    = 0x0001;
        /// Fresh-water overtemperature, pumps forced to maximum.
        const S2_FRESHWATER_OVERTEMP  = 0x0002;
        /// Low suction pressure, frequency floored at the previous value.
        const S3_PRESSURE_FLOOR       = 0x0004;
        /// Fresh-water outlet hot, seawater pumps forced to maximum.
        const S4A_OUTLET_HOT          = 0x0008;
        /// Fresh-water outlet cold, seawater pumps forced to minimum.
        const S4B_OUTLET_COLD         = 0x0010;
        /// Engine-room emergency temperature, fans forced to maximum.
        const S5_ER_EMERGENCY         = 0x0020;
        /// Telemetry stale for two or more ticks, everything held.
        const S6_STALE_HOLD           = 0x0040;
        /// Predictive-feedback law produced the frequency.
        const FEEDBACK_V3             = 0x0080;
        /// Count state machine changed count or shed frequency.
        const COUNT_TRANSITION        = 0x0100;
        /// Degraded mode hold (repeated deadline misses or stale reads).
        const DEGRADED_HOLD           = 0x0200;
        /// Operator manual-fixed mode.
        const MANUAL_FIXED            = 0x0400;
        /// Operator safe-hold mode.
        const SAFE_HOLD               = 0x0800;
    }
}

impl RuleFlags {
    /// Mask of the safety-layer rules.
    pub const SAFETY_MASK: Self = Self::from_bits_truncate(
        Self::S1_SEAWATER_OVERTEMP.bits()
            | Self::S2_FRESHWATER_OVERTEMP.bits()
            | Self::S3_PRESSURE_FLOOR.bits()
            | Self::S4A_OUTLET_HOT.bits()
            | Self::S4B_OUTLET_COLD.bits()
            | Self::S5_ER_EMERGENCY.bits()
            | Self::S6_STALE_HOLD.bits(),
    );

    /// True if any safety rule is recorded.
    #[inline]
    pub const fn has_safety_rule(&self) -> bool {
        self.intersects(Self::SAFETY_MASK)
    }
}

impl Default for RuleFlags {
    fn default() -> Self {
        Self::empty()
    }
}

// Serialized as the raw bit pattern for compact event records.
impl Serialize for RuleFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for RuleFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u16::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown rule flag bits: {bits:#06x}"))
        })
    }
}

// ─── Modes ──────────────────────────────────────────────────────────

/// Per-group regulation mode classified from the combined error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulationMode {
    /// Combined error within the stable band.
    Stable,
    /// Positive error: ramping up to remove heat.
    Cooling,
    /// Negative error: ramping down to save energy.
    EnergySaving,
}

impl RegulationMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Cooling => "cooling",
            Self::EnergySaving => "energy_saving",
        }
    }
}

/// Operator-selectable operating mode, observed at tick boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum OperatingMode {
    /// Closed-loop control (default).
    Auto = 0,
    /// All groups pinned at the envelope maximum, counts held.
    ManualFixed = 1,
    /// Frequencies and counts frozen; safety layer still evaluated.
    SafeHold = 2,
}

impl OperatingMode {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Auto),
            1 => Some(Self::ManualFixed),
            2 => Some(Self::SafeHold),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::ManualFixed => "manual_fixed_60hz",
            Self::SafeHold => "safe_hold",
        }
    }
}

impl Default for OperatingMode {
    fn default() -> Self {
        Self::Auto
    }
}

// ─── Decision Records ───────────────────────────────────────────────

/// Sub-decision for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDecision {
    /// Target frequency [Hz], always inside the group envelope.
    pub frequency_hz: f64,
    /// Target running count, always inside the group envelope.
    pub count: u8,
    /// Short reason text for operators.
    pub reason: String,
    /// Rules applied while producing this sub-decision.
    pub rules: RuleFlags,
    /// Regulation mode classification.
    pub mode: RegulationMode,
    /// Cubic-law electrical power estimate [kW].
    pub estimated_power_kw: f64,
}

/// Complete per-tick decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Tick index.
    pub tick: u64,
    /// Per-group sub-decisions, indexed by [`GroupId::index`].
    pub groups: [GroupDecision; GROUP_COUNT],
    /// At least one group bypassed the controller via a safety rule.
    pub safety_override: bool,
    /// The predictive path contributed to at least one group.
    pub used_prediction: bool,
}

impl Decision {
    #[inline]
    pub fn group(&self, id: GroupId) -> &GroupDecision {
        &self.groups[id.index()]
    }

    /// Build the actuation command for this decision.
    pub fn command(&self) -> CommandFrame {
        let groups = [
            self.group_command(GroupId::SwPumps),
            self.group_command(GroupId::FwPumps),
            self.group_command(GroupId::ErFans),
        ];
        CommandFrame {
            tick: self.tick,
            groups,
            safety_override: self.safety_override,
        }
    }

    fn group_command(&self, id: GroupId) -> GroupCommand {
        let g = self.group(id);
        GroupCommand {
            frequency_hz: g.frequency_hz,
            count: g.count,
            reason: g.reason.clone(),
        }
    }

    /// Check envelope invariants against the configured envelopes.
    pub fn validate(&self, envelopes: &[GroupEnvelope; GROUP_COUNT]) -> Result<(), String> {
        for id in GroupId::ALL {
            let g = self.group(id);
            let env = &envelopes[id.index()];
            if !env.contains_frequency(g.frequency_hz) {
                return Err(format!(
                    "{id}: frequency {} outside envelope [{}, {}]",
                    g.frequency_hz, env.frequency_min, env.frequency_max
                ));
            }
            if !env.contains_count(g.count) {
                return Err(format!(
                    "{id}: count {} outside envelope [{}, {}]",
                    g.count, env.count_min, env.count_max
                ));
            }
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
