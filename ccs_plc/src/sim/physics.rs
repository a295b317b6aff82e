//! First-order thermal model of the cooling plant.
//!
//! Each controlled temperature relaxes toward an equilibrium set by engine
//! load and the effective actuation of the relevant group. Actuation
//! authority lags commanded speed with a single time constant, covering
//! motor ramp and duct/heat-exchanger redistribution. The model is fully
//! deterministic.

/// Normalised full-scale actuation denominators (count × Hz).
const SW_FULL: f64 = 2.0 * 60.0;
const FW_FULL: f64 = 2.0 * 60.0;
const FAN_FULL: f64 = 4.0 * 60.0;

/// Actuation authority time constant [s].
const TAU_ACT_S: f64 = 90.0;

/// Thermal time constants [s].
const TAU_SEAWATER_S: f64 = 60.0;
const TAU_FRESHWATER_S: f64 = 120.0;
const TAU_ENGINE_ROOM_S: f64 = 300.0;

/// Deterministic cooling-plant simulator state.
#[derive(Debug, Clone)]
pub struct PlantModel {
    /// Seawater inlet temperature [°C].
    sea_inlet_c: f64,
    /// Engine load [%].
    engine_load_pct: f64,
    /// Commanded (frequency, count) per group: sw, fw, fans.
    commanded: [(f64, u8); 3],
    /// Effective (lagged) actuation fraction per group.
    u_eff: [f64; 3],
    /// Temperatures T1..T7 [°C].
    temps_c: [f64; 7],
}

impl PlantModel {
    /// Plant settled at its equilibrium for a moderate operating point.
    pub fn new() -> Self {
        let mut plant = Self {
            sea_inlet_c: 28.0,
            engine_load_pct: 60.0,
            commanded: [(48.0, 1), (48.0, 1), (48.0, 3)],
            u_eff: [0.0; 3],
            temps_c: [0.0; 7],
        };
        plant.u_eff = plant.u_commanded();
        plant.settle();
        plant
    }

    /// Commanded actuation fractions.
    fn u_commanded(&self) -> [f64; 3] {
        let (sw_f, sw_n) = self.commanded[0];
        let (fw_f, fw_n) = self.commanded[1];
        let (fan_f, fan_n) = self.commanded[2];
        [
            (sw_f * f64::from(sw_n) / SW_FULL).clamp(0.0, 1.0),
            (fw_f * f64::from(fw_n) / FW_FULL).clamp(0.0, 1.0),
            (fan_f * f64::from(fan_n) / FAN_FULL).clamp(0.0, 1.0),
        ]
    }

    fn equilibria(&self) -> [f64; 7] {
        let load = self.engine_load_pct / 100.0;
        let [u_sw, u_fw, u_fan] = self.u_eff;
        let t1 = self.sea_inlet_c;
        [
            t1,
            t1 + 2.0 + 8.0 * load - 4.0 * u_sw,
            t1 + 3.0 + 10.0 * load - 5.0 * u_sw,
            33.0 + 16.0 * load - 5.0 * u_fw,
            t1 + 2.0 + 12.0 * load - 8.0 * u_sw,
            30.0 + 26.0 * load - 12.0 * u_fan,
            25.0 + 3.0 * load,
        ]
    }

    fn taus() -> [f64; 7] {
        [
            TAU_SEAWATER_S,
            TAU_SEAWATER_S,
            TAU_SEAWATER_S,
            TAU_FRESHWATER_S,
            TAU_FRESHWATER_S,
            TAU_ENGINE_ROOM_S,
            TAU_SEAWATER_S,
        ]
    }

    /// Jump straight to the current equilibrium (start-up only).
    pub fn settle(&mut self) {
        self.u_eff = self.u_commanded();
        self.temps_c = self.equilibria();
    }

    /// Advance the plant by `dt_s` seconds.
    pub fn step(&mut self, dt_s: f64) {
        let u_cmd = self.u_commanded();
        let act_alpha = (dt_s / TAU_ACT_S).min(1.0);
        for (eff, cmd) in self.u_eff.iter_mut().zip(u_cmd.iter()) {
            *eff += (cmd - *eff) * act_alpha;
        }
        let eq = self.equilibria();
        let taus = Self::taus();
        for i in 0..7 {
            let alpha = (dt_s / taus[i]).min(1.0);
            self.temps_c[i] += (eq[i] - self.temps_c[i]) * alpha;
        }
    }

    /// Apply an actuation image written by the supervisor.
    pub fn set_commanded(&mut self, commanded: [(f64, u8); 3]) {
        self.commanded = commanded;
    }

    pub fn set_engine_load(&mut self, pct: f64) {
        self.engine_load_pct = pct.clamp(0.0, 100.0);
    }

    pub fn set_sea_inlet(&mut self, celsius: f64) {
        self.sea_inlet_c = celsius;
    }

    pub fn temps_c(&self) -> [f64; 7] {
        self.temps_c
    }

    pub fn engine_load_pct(&self) -> f64 {
        self.engine_load_pct
    }

    /// Suction pressure tracks commanded seawater pump speed directly.
    pub fn px1_bar(&self) -> f64 {
        1.6 + 0.8 * self.u_commanded()[0]
    }
}

impl Default for PlantModel {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
