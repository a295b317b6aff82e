//! VFD group identifiers, frequency/count envelopes, and persistent
//! per-group state.
//!
//! A group is a set of identical units (pumps or fans) sharing one target
//! frequency and one running count. Group identity is a closed enum so that
//! per-group data can live in fixed arrays indexed by [`GroupId::index`].

use serde::{Deserialize, Serialize};

use crate::telemetry::TempChannel;

// ─── Group Identity ─────────────────────────────────────────────────

/// One of the three VFD groups under supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GroupId {
    /// Seawater cooling pumps.
    SwPumps = 0,
    /// Fresh-water (low-temperature circuit) pumps.
    FwPumps = 1,
    /// Engine-room supply fans.
    ErFans = 2,
}

/// Number of supervised groups.
pub const GROUP_COUNT: usize = 3;

impl GroupId {
    /// All groups in storage order.
    pub const ALL: [GroupId; GROUP_COUNT] = [Self::SwPumps, Self::FwPumps, Self::ErFans];

    /// Stable array index for per-group storage.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Wire/display label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::SwPumps => "sw_pumps",
            Self::FwPumps => "fw_pumps",
            Self::ErFans => "er_fans",
        }
    }

    /// The temperature channel this group regulates.
    ///
    /// Seawater pumps hold the fresh-water outlet (T5), fresh-water pumps
    /// hold the fresh-water return (T4), fans hold engine-room air (T6).
    pub const fn feedback_channel(self) -> TempChannel {
        match self {
            Self::SwPumps => TempChannel::T5,
            Self::FwPumps => TempChannel::T4,
            Self::ErFans => TempChannel::T6,
        }
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ─── Envelope ───────────────────────────────────────────────────────

/// Immutable per-group actuation envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupEnvelope {
    /// Lowest permitted drive frequency [Hz].
    pub frequency_min: f64,
    /// Highest permitted drive frequency [Hz].
    pub frequency_max: f64,
    /// Minimum running unit count.
    pub count_min: u8,
    /// Maximum running unit count.
    pub count_max: u8,
    /// Rated electrical power per unit at nominal frequency [kW].
    pub rated_kw_per_unit: f64,
}

impl GroupEnvelope {
    /// Default seawater/fresh-water pump envelope (two units, 40–60 Hz).
    pub const fn pumps() -> Self {
        Self {
            frequency_min: 40.0,
            frequency_max: 60.0,
            count_min: 1,
            count_max: 2,
            rated_kw_per_unit: 45.0,
        }
    }

    /// Default engine-room fan envelope (four units, 40–60 Hz).
    pub const fn fans() -> Self {
        Self {
            frequency_min: 40.0,
            frequency_max: 60.0,
            count_min: 2,
            count_max: 4,
            rated_kw_per_unit: 15.0,
        }
    }

    /// Clamp a frequency into the envelope.
    #[inline]
    pub fn clamp_frequency(&self, hz: f64) -> f64 {
        hz.clamp(self.frequency_min, self.frequency_max)
    }

    #[inline]
    pub fn contains_frequency(&self, hz: f64) -> bool {
        hz.is_finite() && hz >= self.frequency_min && hz <= self.frequency_max
    }

    #[inline]
    pub const fn contains_count(&self, count: u8) -> bool {
        count >= self.count_min && count <= self.count_max
    }

    /// Cubic-law electrical power estimate [kW].
    ///
    /// Drives follow P ∝ f³; the estimate is recorded on each decision for
    /// the energy ledger.
    #[inline]
    pub fn estimated_power_kw(&self, frequency_hz: f64, count: u8) -> f64 {
        let ratio = frequency_hz / self.frequency_max;
        f64::from(count) * self.rated_kw_per_unit * ratio * ratio * ratio
    }

    /// Validate envelope bounds.
    pub fn validate(&self, group: GroupId) -> Result<(), String> {
        if !self.frequency_min.is_finite() || !self.frequency_max.is_finite() {
            return Err(format!("{group}: frequency bounds must be finite"));
        }
        if self.frequency_min < 10.0 || self.frequency_max > 100.0 {
            return Err(format!(
                "{group}: frequency envelope [{}, {}] outside plausible drive range [10, 100] Hz",
                self.frequency_min, self.frequency_max
            ));
        }
        if self.frequency_min >= self.frequency_max {
            return Err(format!(
                "{group}: frequency_min {} must be below frequency_max {}",
                self.frequency_min, self.frequency_max
            ));
        }
        if self.count_min == 0 {
            return Err(format!("{group}: count_min must be at least 1"));
        }
        if self.count_min > self.count_max {
            return Err(format!(
                "{group}: count_min {} above count_max {}",
                self.count_min, self.count_max
            ));
        }
        if self.count_max > 8 {
            return Err(format!(
                "{group}: count_max {} above register limit 8",
                self.count_max
            ));
        }
        if !self.rated_kw_per_unit.is_finite() || self.rated_kw_per_unit <= 0.0 {
            return Err(format!("{group}: rated_kw_per_unit must be positive"));
        }
        Ok(())
    }
}

// ─── Persistent Per-Group State ─────────────────────────────────────

/// Mutable per-group state carried across ticks.
///
/// Invariants: all timers non-negative; at most one of `time_at_max_s` /
/// `time_at_min_s` is non-zero; no count change while `cooldown_s > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupState {
    /// Target frequency decided in the previous tick [Hz].
    pub frequency_hz: f64,
    /// Running unit count decided in the previous tick.
    pub count: u8,
    /// Seconds spent continuously at the envelope maximum.
    pub time_at_max_s: f64,
    /// Seconds spent continuously at the envelope minimum.
    pub time_at_min_s: f64,
    /// Remaining cooldown after the last count change [s].
    pub cooldown_s: f64,
}

impl GroupState {
    /// Fresh state at a given operating point, timers cleared.
    pub const fn new(frequency_hz: f64, count: u8) -> Self {
        Self {
            frequency_hz,
            count,
            time_at_max_s: 0.0,
            time_at_min_s: 0.0,
            cooldown_s: 0.0,
        }
    }

    /// Start-up state: envelope minimum frequency, minimum count.
    pub const fn startup(envelope: &GroupEnvelope) -> Self {
        Self::new(envelope.frequency_min, envelope.count_min)
    }

    /// Dwell-timer exclusivity invariant.
    #[inline]
    pub fn timers_exclusive(&self) -> bool {
        self.time_at_max_s == 0.0 || self.time_at_min_s == 0.0
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_indices_are_stable() {
        assert_eq!(GroupId::SwPumps.index(), 0);
        assert_eq!(GroupId::FwPumps.index(), 1);
        assert_eq!(GroupId::ErFans.index(), 2);
        for (i, g) in GroupId::ALL.iter().enumerate() {
            assert_eq!(g.index(), i);
        }
    }

    #[test]
    fn feedback_channels() {
        assert_eq!(GroupId::SwPumps.feedback_channel(), TempChannel::T5);
        assert_eq!(GroupId::FwPumps.feedback_channel(), TempChannel::T4);
        assert_eq!(GroupId::ErFans.feedback_channel(), TempChannel::T6);
    }

    #[test]
    fn default_envelopes_validate() {
        GroupEnvelope::pumps().validate(GroupId::SwPumps).unwrap();
        GroupEnvelope::fans().validate(GroupId::ErFans).unwrap();
    }

    #[test]
    fn envelope_rejects_inverted_bounds() {
        let mut env = GroupEnvelope::pumps();
        env.frequency_min = 61.0;
        assert!(env.validate(GroupId::SwPumps).is_err());

        let mut env = GroupEnvelope::fans();
        env.count_min = 5;
        assert!(env.validate(GroupId::ErFans).is_err());
    }

    #[test]
    fn clamp_frequency_respects_envelope() {
        let env = GroupEnvelope::pumps();
        assert_eq!(env.clamp_frequency(30.0), 40.0);
        assert_eq!(env.clamp_frequency(75.0), 60.0);
        assert_eq!(env.clamp_frequency(50.0), 50.0);
    }

    #[test]
    fn cubic_power_law() {
        let env = GroupEnvelope::fans();
        let full = env.estimated_power_kw(60.0, 4);
        assert!((full - 60.0).abs() < 1e-9); // 4 × 15 kW at rated speed

        // Half frequency → one eighth of rated power per unit.
        let half = env.estimated_power_kw(30.0, 4);
        assert!((half - full / 8.0).abs() < 1e-9);
    }

    #[test]
    fn startup_state_sits_at_envelope_floor() {
        let env = GroupEnvelope::fans();
        let state = GroupState::startup(&env);
        assert_eq!(state.frequency_hz, 40.0);
        assert_eq!(state.count, 2);
        assert!(state.timers_exclusive());
    }
}
