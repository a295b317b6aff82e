//! Telemetry and command frames exchanged with the PLC.
//!
//! Frames are immutable per tick. Validation lives here so the adapter,
//! the simulator, and the tests all reject the same inputs: any NaN or
//! out-of-range sensor invalidates the whole frame.

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::group::{GROUP_COUNT, GroupId};

// ─── Physical Ranges ────────────────────────────────────────────────

/// Valid sensor temperature range [°C].
pub const TEMP_MIN_C: f64 = -50.0;
pub const TEMP_MAX_C: f64 = 120.0;

/// Valid seawater pressure range [bar].
pub const PRESSURE_MIN_BAR: f64 = 0.0;
pub const PRESSURE_MAX_BAR: f64 = 10.0;

/// Valid engine load range [%].
pub const LOAD_MIN_PCT: f64 = 0.0;
pub const LOAD_MAX_PCT: f64 = 100.0;

/// Number of temperature channels carried per frame.
pub const TEMP_CHANNEL_COUNT: usize = 7;

// ─── Channels ───────────────────────────────────────────────────────

/// Named temperature channel.
///
/// Physical placements (seawater inlet, fresh-water outlet, engine-room
/// air, ...) are carried as channel labels only; the control laws bind to
/// channels, not placements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TempChannel {
    T1 = 0,
    T2 = 1,
    T3 = 2,
    T4 = 3,
    T5 = 4,
    T6 = 5,
    T7 = 6,
}

impl TempChannel {
    pub const ALL: [TempChannel; TEMP_CHANNEL_COUNT] = [
        Self::T1,
        Self::T2,
        Self::T3,
        Self::T4,
        Self::T5,
        Self::T6,
        Self::T7,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::T1 => "T1",
            Self::T2 => "T2",
            Self::T3 => "T3",
            Self::T4 => "T4",
            Self::T5 => "T5",
            Self::T6 => "T6",
            Self::T7 => "T7",
        }
    }
}

impl std::fmt::Display for TempChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ─── Telemetry Frame ────────────────────────────────────────────────

/// One sensor image read from the PLC.
///
/// Timestamps are monotonic nanoseconds and strictly increasing across
/// frames; the adapter enforces this when stamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Temperatures T1..T7 [°C], indexed by [`TempChannel::index`].
    pub temps_c: [f64; TEMP_CHANNEL_COUNT],
    /// Seawater pressure PX1 [bar].
    pub px1_bar: f64,
    /// Engine load [%].
    pub engine_load_pct: f64,
    /// Monotonic capture timestamp [ns].
    pub timestamp_ns: u64,
    /// Set when this frame is a reused copy of the last good read.
    pub is_stale: bool,
}

impl TelemetryFrame {
    #[inline]
    pub fn temperature(&self, channel: TempChannel) -> f64 {
        self.temps_c[channel.index()]
    }

    /// Range and NaN validation over every sensor field.
    ///
    /// The first offending field is reported; a frame with any bad sensor
    /// is rejected as a whole.
    pub fn validate(&self) -> Result<(), TransportError> {
        for ch in TempChannel::ALL {
            let v = self.temperature(ch);
            if !v.is_finite() || !(TEMP_MIN_C..=TEMP_MAX_C).contains(&v) {
                return Err(TransportError::OutOfRange {
                    field: ch.label(),
                    value: v,
                });
            }
        }
        if !self.px1_bar.is_finite() || !(PRESSURE_MIN_BAR..=PRESSURE_MAX_BAR).contains(&self.px1_bar)
        {
            return Err(TransportError::OutOfRange {
                field: "PX1",
                value: self.px1_bar,
            });
        }
        if !self.engine_load_pct.is_finite()
            || !(LOAD_MIN_PCT..=LOAD_MAX_PCT).contains(&self.engine_load_pct)
        {
            return Err(TransportError::OutOfRange {
                field: "engine_load",
                value: self.engine_load_pct,
            });
        }
        Ok(())
    }

    /// Synthesize a stale copy of this frame with a fresh timestamp.
    #[inline]
    pub fn as_stale(&self, timestamp_ns: u64) -> Self {
        Self {
            timestamp_ns,
            is_stale: true,
            ..*self
        }
    }
}

// ─── Command Frame ──────────────────────────────────────────────────

/// Per-group actuation command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCommand {
    /// Target drive frequency [Hz].
    pub frequency_hz: f64,
    /// Running unit count.
    pub count: u8,
    /// Short human-readable reason for the dashboard/event stream.
    pub reason: String,
}

/// One actuation image written to the PLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    /// Tick index that produced the command.
    pub tick: u64,
    /// Per-group commands, indexed by [`GroupId::index`].
    pub groups: [GroupCommand; GROUP_COUNT],
    /// Set when the decision behind this command bypassed the controller.
    pub safety_override: bool,
}

impl CommandFrame {
    #[inline]
    pub fn group(&self, id: GroupId) -> &GroupCommand {
        &self.groups[id.index()]
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
