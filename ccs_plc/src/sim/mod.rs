//! Deterministic simulated transport.
//!
//! Produces register images from the physics model and closes the loop on
//! written commands. Simulated time advances by one tick per read, so the
//! uptime counter (and with it the window stride) runs on simulated time.
//! The paired [`SimHandle`] lets tests and the certification scenarios
//! script sensor overrides and transport faults without touching the
//! adapter interface.

pub mod physics;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ccs_common::error::TransportError;
use ccs_common::telemetry::{TEMP_CHANNEL_COUNT, TempChannel};

use crate::adapter::FrameTransport;
use crate::registers::{
    HOLDING_REGISTER_COUNT, INPUT_REGISTER_COUNT, SensorImage, decode_command, encode_telemetry,
};

use physics::PlantModel;

#[derive(Debug, Default)]
struct Overrides {
    temps_c: [Option<f64>; TEMP_CHANNEL_COUNT],
    px1_bar: Option<f64>,
    engine_load_pct: Option<f64>,
}

struct SimState {
    plant: PlantModel,
    /// Simulated seconds advanced per read (one tick).
    dt_s: f64,
    /// Simulated PLC uptime [ms].
    time_ms: u64,
    overrides: Overrides,
    fail_reads: u32,
    fail_writes: u32,
    reads: u64,
    writes: u64,
}

/// Simulated PLC transport.
pub struct SimTransport {
    shared: Arc<Mutex<SimState>>,
}

/// Script/inspection handle paired with a [`SimTransport`].
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<Mutex<SimState>>,
}

impl SimTransport {
    /// Create a transport advancing the plant by `dt_s` per read, plus its
    /// script handle.
    pub fn new(dt_s: f64) -> (Self, SimHandle) {
        let shared = Arc::new(Mutex::new(SimState {
            plant: PlantModel::new(),
            dt_s,
            time_ms: 0,
            overrides: Overrides::default(),
            fail_reads: 0,
            fail_writes: 0,
            reads: 0,
            writes: 0,
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            SimHandle { shared },
        )
    }
}

impl FrameTransport for SimTransport {
    fn read_registers(
        &mut self,
        deadline: Duration,
    ) -> Result<[u16; INPUT_REGISTER_COUNT], TransportError> {
        let mut s = self.shared.lock().expect("sim state poisoned");
        let dt = s.dt_s;
        // Plant and simulated time advance even across injected faults.
        s.plant.step(dt);
        s.time_ms += (dt * 1_000.0) as u64;
        s.reads += 1;
        if s.fail_reads > 0 {
            s.fail_reads -= 1;
            return Err(TransportError::Timeout(deadline.as_millis() as u64));
        }
        let mut temps_c = s.plant.temps_c();
        for (t, o) in temps_c.iter_mut().zip(s.overrides.temps_c.iter()) {
            if let Some(v) = o {
                *t = *v;
            }
        }
        let image = SensorImage {
            temps_c,
            px1_bar: s.overrides.px1_bar.unwrap_or_else(|| s.plant.px1_bar()),
            engine_load_pct: s
                .overrides
                .engine_load_pct
                .unwrap_or_else(|| s.plant.engine_load_pct()),
            uptime_ms: (s.time_ms & u64::from(u32::MAX)) as u32,
        };
        Ok(encode_telemetry(&image))
    }

    fn write_registers(
        &mut self,
        regs: &[u16; HOLDING_REGISTER_COUNT],
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let mut s = self.shared.lock().expect("sim state poisoned");
        s.writes += 1;
        if s.fail_writes > 0 {
            s.fail_writes -= 1;
            return Err(TransportError::Timeout(deadline.as_millis() as u64));
        }
        let commanded = decode_command(regs);
        s.plant.set_commanded(commanded);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulation"
    }
}

impl SimHandle {
    fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let mut s = self.shared.lock().expect("sim state poisoned");
        f(&mut s)
    }

    /// Pin a temperature channel to a fixed value on the wire.
    pub fn set_temperature(&self, channel: TempChannel, celsius: f64) {
        self.with(|s| s.overrides.temps_c[channel.index()] = Some(celsius));
    }

    /// Release a pinned temperature channel back to the plant.
    pub fn clear_temperature(&self, channel: TempChannel) {
        self.with(|s| s.overrides.temps_c[channel.index()] = None);
    }

    pub fn set_pressure(&self, bar: f64) {
        self.with(|s| s.overrides.px1_bar = Some(bar));
    }

    pub fn clear_pressure(&self) {
        self.with(|s| s.overrides.px1_bar = None);
    }

    pub fn set_engine_load(&self, pct: f64) {
        self.with(|s| s.plant.set_engine_load(pct));
    }

    pub fn set_sea_inlet(&self, celsius: f64) {
        self.with(|s| s.plant.set_sea_inlet(celsius));
    }

    /// Make the next `n` reads fail with a timeout.
    pub fn fail_reads(&self, n: u32) {
        self.with(|s| s.fail_reads = n);
    }

    /// Make the next `n` writes fail with a timeout.
    pub fn fail_writes(&self, n: u32) {
        self.with(|s| s.fail_writes = n);
    }

    /// Current plant temperature (pre-override), for assertions.
    pub fn plant_temperature(&self, channel: TempChannel) -> f64 {
        self.with(|s| s.plant.temps_c()[channel.index()])
    }

    /// Simulated time so far [s].
    pub fn sim_time_s(&self) -> f64 {
        self.with(|s| s.time_ms as f64 / 1_000.0)
    }

    /// Exchange counters (reads, writes), for ordering assertions.
    pub fn exchange_counts(&self) -> (u64, u64) {
        self.with(|s| (s.reads, s.writes))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::decode_telemetry;

    #[test]
    fn read_produces_plausible_image_with_advancing_uptime() {
        let (mut t, _h) = SimTransport::new(2.0);
        let a = decode_telemetry(&t.read_registers(Duration::from_millis(200)).unwrap());
        let b = decode_telemetry(&t.read_registers(Duration::from_millis(200)).unwrap());
        assert!(a.temps_c.iter().all(|v| (-50.0..=120.0).contains(v)));
        assert!((0.0..=10.0).contains(&a.px1_bar));
        assert!((0.0..=100.0).contains(&a.engine_load_pct));
        assert_eq!(b.uptime_ms - a.uptime_ms, 2_000);
    }

    #[test]
    fn overrides_pin_the_wire_value() {
        let (mut t, h) = SimTransport::new(2.0);
        h.set_temperature(TempChannel::T6, 46.5);
        let image = decode_telemetry(&t.read_registers(Duration::from_millis(200)).unwrap());
        assert!((image.temps_c[TempChannel::T6.index()] - 46.5).abs() < 0.051);

        h.clear_temperature(TempChannel::T6);
        let image = decode_telemetry(&t.read_registers(Duration::from_millis(200)).unwrap());
        assert!((image.temps_c[TempChannel::T6.index()] - 46.5).abs() > 0.5);
    }

    #[test]
    fn injected_faults_expire_and_time_still_advances() {
        let (mut t, h) = SimTransport::new(2.0);
        h.fail_reads(2);
        assert!(t.read_registers(Duration::from_millis(200)).is_err());
        assert!(t.read_registers(Duration::from_millis(200)).is_err());
        let image = decode_telemetry(&t.read_registers(Duration::from_millis(200)).unwrap());
        assert_eq!(image.uptime_ms, 6_000);
    }

    #[test]
    fn written_commands_reach_the_plant() {
        let (mut t, h) = SimTransport::new(2.0);
        let mut regs = [0u16; HOLDING_REGISTER_COUNT];
        // sw pumps 60.0 Hz × 2 units.
        regs[0] = 600;
        regs[1] = 2;
        regs[2] = 480;
        regs[3] = 1;
        regs[4] = 480;
        regs[5] = 3;
        t.write_registers(&regs, Duration::from_millis(200)).unwrap();
        let (_, writes) = h.exchange_counts();
        assert_eq!(writes, 1);

        // Full pump authority lifts suction pressure on the next image.
        let image = decode_telemetry(&t.read_registers(Duration::from_millis(200)).unwrap());
        assert!(image.px1_bar > 2.2, "px1 {} should reflect full pump speed", image.px1_bar);
    }
}
