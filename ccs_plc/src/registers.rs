//! PLC register map and fixed-point codec.
//!
//! Input registers carry the sensor image, holding registers the actuation
//! image. Temperatures are signed tenths of a degree, pressure is
//! hundredths of a bar, load and frequency are tenths. Counts are raw.
//! The PLC uptime counter [ms] is the capture-time reference for every
//! frame; the adapter converts it to a strictly increasing timestamp.
//!
//! | Input reg | Field | Scale |
//! |-----------|-------|-------|
//! | 0..=6     | T1..T7 [°C]        | ×10, i16 |
//! | 7         | PX1 [bar]          | ×100, u16 |
//! | 8         | engine load [%]    | ×10, u16 |
//! | 9, 10     | PLC uptime [ms]    | u32 big-half/low-half |
//!
//! | Holding reg | Field | Scale |
//! |-------------|-------|-------|
//! | 0, 2, 4     | group frequency [Hz] | ×10, u16 |
//! | 1, 3, 5     | group count          | raw, u16 |

use ccs_common::group::GroupId;
use ccs_common::telemetry::{CommandFrame, TEMP_CHANNEL_COUNT};

/// Number of input registers in the sensor image.
pub const INPUT_REGISTER_COUNT: usize = 11;

/// Number of holding registers in the actuation image.
pub const HOLDING_REGISTER_COUNT: usize = 6;

/// Index of the pressure register.
pub const REG_PX1: usize = 7;

/// Index of the engine-load register.
pub const REG_ENGINE_LOAD: usize = 8;

/// Indices of the PLC uptime counter halves.
pub const REG_UPTIME_HI: usize = 9;
pub const REG_UPTIME_LO: usize = 10;

// ─── Scaling ────────────────────────────────────────────────────────

#[inline]
fn temp_to_reg(celsius: f64) -> u16 {
    (celsius * 10.0).round() as i16 as u16
}

#[inline]
fn reg_to_temp(reg: u16) -> f64 {
    f64::from(reg as i16) / 10.0
}

#[inline]
fn pressure_to_reg(bar: f64) -> u16 {
    (bar * 100.0).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

#[inline]
fn reg_to_pressure(reg: u16) -> f64 {
    f64::from(reg) / 100.0
}

#[inline]
fn tenths_to_reg(value: f64) -> u16 {
    (value * 10.0).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

#[inline]
fn reg_to_tenths(reg: u16) -> f64 {
    f64::from(reg) / 10.0
}

// ─── Telemetry Image ────────────────────────────────────────────────

/// Decoded sensor image in engineering units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorImage {
    pub temps_c: [f64; TEMP_CHANNEL_COUNT],
    pub px1_bar: f64,
    pub engine_load_pct: f64,
    /// PLC uptime counter [ms], wraps at `u32::MAX`.
    pub uptime_ms: u32,
}

/// Encode a sensor image (simulator side).
pub fn encode_telemetry(image: &SensorImage) -> [u16; INPUT_REGISTER_COUNT] {
    let mut regs = [0u16; INPUT_REGISTER_COUNT];
    for (i, t) in image.temps_c.iter().enumerate() {
        regs[i] = temp_to_reg(*t);
    }
    regs[REG_PX1] = pressure_to_reg(image.px1_bar);
    regs[REG_ENGINE_LOAD] = tenths_to_reg(image.engine_load_pct);
    regs[REG_UPTIME_HI] = (image.uptime_ms >> 16) as u16;
    regs[REG_UPTIME_LO] = (image.uptime_ms & 0xffff) as u16;
    regs
}

/// Decode a sensor image into engineering units (adapter side).
///
/// Range validation happens on the assembled frame, not here.
pub fn decode_telemetry(regs: &[u16; INPUT_REGISTER_COUNT]) -> SensorImage {
    let mut temps_c = [0.0; TEMP_CHANNEL_COUNT];
    for (i, t) in temps_c.iter_mut().enumerate() {
        *t = reg_to_temp(regs[i]);
    }
    SensorImage {
        temps_c,
        px1_bar: reg_to_pressure(regs[REG_PX1]),
        engine_load_pct: reg_to_tenths(regs[REG_ENGINE_LOAD]),
        uptime_ms: (u32::from(regs[REG_UPTIME_HI]) << 16) | u32::from(regs[REG_UPTIME_LO]),
    }
}

// ─── Actuation Image ────────────────────────────────────────────────

/// Encode an actuation image (adapter side).
pub fn encode_command(cmd: &CommandFrame) -> [u16; HOLDING_REGISTER_COUNT] {
    let mut regs = [0u16; HOLDING_REGISTER_COUNT];
    for id in GroupId::ALL {
        let g = cmd.group(id);
        regs[id.index() * 2] = tenths_to_reg(g.frequency_hz);
        regs[id.index() * 2 + 1] = u16::from(g.count);
    }
    regs
}

/// Decode an actuation image into per-group (frequency, count)
/// (simulator side).
pub fn decode_command(regs: &[u16; HOLDING_REGISTER_COUNT]) -> [(f64, u8); 3] {
    let mut out = [(0.0, 0u8); 3];
    for id in GroupId::ALL {
        out[id.index()] = (
            reg_to_tenths(regs[id.index() * 2]),
            regs[id.index() * 2 + 1].min(u16::from(u8::MAX)) as u8,
        );
    }
    out
}

// ─── Tests ──────────────────────────────────────────────────────────
