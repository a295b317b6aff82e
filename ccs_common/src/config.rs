//! Configuration tree for the supervisor.
//!
//! Loaded from TOML at start-up and immutable afterwards. Unknown options
//! are rejected (`deny_unknown_fields`); missing required sections abort
//! start-up with a diagnostic. Numeric parameters are bounds-checked by
//! `validate()`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::group::{GROUP_COUNT, GroupEnvelope, GroupId};
use crate::telemetry::{TEMP_MAX_C, TEMP_MIN_C};

// ─── Defaults ───────────────────────────────────────────────────────

pub const TICK_PERIOD_MS_DEFAULT: u64 = 2_000;
pub const TICK_PERIOD_MS_MIN: u64 = 100;
pub const TICK_PERIOD_MS_MAX: u64 = 10_000;

pub const TRANSPORT_DEADLINE_MS_DEFAULT: u64 = 200;
pub const STRIDE_S_DEFAULT: f64 = 20.0;
pub const WINDOW_CAPACITY_DEFAULT: usize = 90;

/// Hard upper bound of the window ring; see `ccs_control::window`.
pub const WINDOW_SLOTS: usize = 90;

pub const DWELL_S_DEFAULT: f64 = 10.0;
pub const COOLDOWN_S_DEFAULT: f64 = 30.0;
pub const SHED_HZ_DEFAULT: f64 = 8.0;

// ─── Top-Level Config ───────────────────────────────────────────────

/// Top-level supervisor configuration.
///
/// Only `[groups]` is required; every other section carries defaults that
/// match the commissioning parameter sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub groups: GroupsConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub counts: CountsConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub vessel: VesselConfig,
}

impl SupervisorConfig {
    /// Complete default configuration on the simulated transport.
    ///
    /// Used by tests and the `--simulate` start-up path.
    pub fn simulation_default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            groups: GroupsConfig::default(),
            safety: SafetyConfig::default(),
            controller: ControllerConfig::default(),
            counts: CountsConfig::default(),
            predictor: PredictorConfig::default(),
            transport: TransportConfig::default(),
            events: EventsConfig::default(),
            vessel: VesselConfig::default(),
        }
    }

    /// Per-group envelopes in [`GroupId::index`] order.
    pub fn envelopes(&self) -> [GroupEnvelope; GROUP_COUNT] {
        [
            self.groups.sw_pumps.envelope(),
            self.groups.fw_pumps.envelope(),
            self.groups.er_fans.envelope(),
        ]
    }

    /// Per-group target temperatures in [`GroupId::index`] order [°C].
    pub fn targets_c(&self) -> [f64; GROUP_COUNT] {
        [
            self.groups.sw_pumps.target_c,
            self.groups.fw_pumps.target_c,
            self.groups.er_fans.target_c,
        ]
    }

    /// Validate the whole tree; the first violation aborts start-up.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler.validate()?;
        self.groups.validate()?;
        self.safety.validate()?;
        self.controller.validate()?;
        self.counts.validate()?;
        self.transport.validate()?;
        self.events.validate()?;
        Ok(())
    }
}

// ─── Scheduler ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Control tick period [ms] (default: 2000).
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Telemetry read deadline [ms] (default: 200).
    #[serde(default = "default_transport_deadline_ms")]
    pub read_deadline_ms: u64,

    /// Command write deadline [ms] (default: 200).
    #[serde(default = "default_transport_deadline_ms")]
    pub write_deadline_ms: u64,

    /// Window sample stride [s] (default: 20).
    #[serde(default = "default_stride_s")]
    pub stride_s: f64,

    /// Window ring capacity in samples (default: 90, hard cap 90).
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    /// Consecutive deadline misses before degraded mode (default: 3).
    #[serde(default = "default_deadline_miss_limit")]
    pub deadline_miss_limit: u32,
}

fn default_tick_period_ms() -> u64 {
    TICK_PERIOD_MS_DEFAULT
}
fn default_transport_deadline_ms() -> u64 {
    TRANSPORT_DEADLINE_MS_DEFAULT
}
fn default_stride_s() -> f64 {
    STRIDE_S_DEFAULT
}
fn default_window_capacity() -> usize {
    WINDOW_CAPACITY_DEFAULT
}
fn default_deadline_miss_limit() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: TICK_PERIOD_MS_DEFAULT,
            read_deadline_ms: TRANSPORT_DEADLINE_MS_DEFAULT,
            write_deadline_ms: TRANSPORT_DEADLINE_MS_DEFAULT,
            stride_s: STRIDE_S_DEFAULT,
            window_capacity: WINDOW_CAPACITY_DEFAULT,
            deadline_miss_limit: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_period_ms < TICK_PERIOD_MS_MIN || self.tick_period_ms > TICK_PERIOD_MS_MAX {
            return Err(format!(
                "tick_period_ms {} out of range [{}, {}]",
                self.tick_period_ms, TICK_PERIOD_MS_MIN, TICK_PERIOD_MS_MAX
            ));
        }
        if self.read_deadline_ms == 0 || self.read_deadline_ms >= self.tick_period_ms {
            return Err(format!(
                "read_deadline_ms {} must be in (0, tick_period_ms)",
                self.read_deadline_ms
            ));
        }
        if self.write_deadline_ms == 0 || self.write_deadline_ms >= self.tick_period_ms {
            return Err(format!(
                "write_deadline_ms {} must be in (0, tick_period_ms)",
                self.write_deadline_ms
            ));
        }
        let tick_s = self.tick_period_ms as f64 / 1_000.0;
        if !self.stride_s.is_finite() || self.stride_s < tick_s {
            return Err(format!(
                "stride_s {} must be finite and at least one tick period",
                self.stride_s
            ));
        }
        if self.window_capacity < 2 || self.window_capacity > WINDOW_SLOTS {
            return Err(format!(
                "window_capacity {} out of range [2, {WINDOW_SLOTS}]",
                self.window_capacity
            ));
        }
        if self.deadline_miss_limit == 0 {
            return Err("deadline_miss_limit must be at least 1".into());
        }
        Ok(())
    }

    #[inline]
    pub fn tick_period_s(&self) -> f64 {
        self.tick_period_ms as f64 / 1_000.0
    }
}

// ─── Groups ─────────────────────────────────────────────────────────

/// Envelope plus control target for one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    /// Lowest permitted drive frequency [Hz].
    pub frequency_min: f64,
    /// Highest permitted drive frequency [Hz].
    pub frequency_max: f64,
    /// Minimum running unit count.
    pub count_min: u8,
    /// Maximum running unit count.
    pub count_max: u8,
    /// Rated electrical power per unit [kW].
    pub rated_kw_per_unit: f64,
    /// Control target for the group's feedback channel [°C].
    pub target_c: f64,
}

impl GroupConfig {
    fn from_envelope(envelope: GroupEnvelope, target_c: f64) -> Self {
        Self {
            frequency_min: envelope.frequency_min,
            frequency_max: envelope.frequency_max,
            count_min: envelope.count_min,
            count_max: envelope.count_max,
            rated_kw_per_unit: envelope.rated_kw_per_unit,
            target_c,
        }
    }

    /// The actuation envelope slice of this config.
    pub fn envelope(&self) -> GroupEnvelope {
        GroupEnvelope {
            frequency_min: self.frequency_min,
            frequency_max: self.frequency_max,
            count_min: self.count_min,
            count_max: self.count_max,
            rated_kw_per_unit: self.rated_kw_per_unit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupsConfig {
    pub sw_pumps: GroupConfig,
    pub fw_pumps: GroupConfig,
    pub er_fans: GroupConfig,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            sw_pumps: GroupConfig::from_envelope(GroupEnvelope::pumps(), 35.0),
            fw_pumps: GroupConfig::from_envelope(GroupEnvelope::pumps(), 41.0),
            er_fans: GroupConfig::from_envelope(GroupEnvelope::fans(), 43.0),
        }
    }
}

impl GroupsConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (id, cfg) in [
            (GroupId::SwPumps, &self.sw_pumps),
            (GroupId::FwPumps, &self.fw_pumps),
            (GroupId::ErFans, &self.er_fans),
        ] {
            cfg.envelope().validate(id)?;
            if !cfg.target_c.is_finite() || !(TEMP_MIN_C..=TEMP_MAX_C).contains(&cfg.target_c) {
                return Err(format!("{id}: target_c {} out of range", cfg.target_c));
            }
        }
        Ok(())
    }
}

// ─── Safety Thresholds ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    /// Seawater-side overtemperature max(T2, T3) [°C].
    #[serde(default = "default_seawater_overtemp_c")]
    pub seawater_overtemp_c: f64,
    /// Fresh-water return overtemperature T4 [°C].
    #[serde(default = "default_freshwater_overtemp_c")]
    pub freshwater_overtemp_c: f64,
    /// Suction pressure floor PX1 [bar].
    #[serde(default = "default_pressure_floor_bar")]
    pub pressure_floor_bar: f64,
    /// Fresh-water outlet hot limit T5 [°C].
    #[serde(default = "default_outlet_hot_c")]
    pub outlet_hot_c: f64,
    /// Fresh-water outlet cold limit T5 [°C].
    #[serde(default = "default_outlet_cold_c")]
    pub outlet_cold_c: f64,
    /// Engine-room emergency temperature T6 [°C].
    #[serde(default = "default_er_emergency_c")]
    pub er_emergency_c: f64,
    /// Consecutive stale ticks before the hold rule engages.
    #[serde(default = "default_stale_hold_ticks")]
    pub stale_hold_ticks: u32,
}

fn default_seawater_overtemp_c() -> f64 {
    49.0
}
fn default_freshwater_overtemp_c() -> f64 {
    48.0
}
fn default_pressure_floor_bar() -> f64 {
    1.0
}
fn default_outlet_hot_c() -> f64 {
    40.0
}
fn default_outlet_cold_c() -> f64 {
    30.0
}
fn default_er_emergency_c() -> f64 {
    45.0
}
fn default_stale_hold_ticks() -> u32 {
    2
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            seawater_overtemp_c: default_seawater_overtemp_c(),
            freshwater_overtemp_c: default_freshwater_overtemp_c(),
            pressure_floor_bar: default_pressure_floor_bar(),
            outlet_hot_c: default_outlet_hot_c(),
            outlet_cold_c: default_outlet_cold_c(),
            er_emergency_c: default_er_emergency_c(),
            stale_hold_ticks: default_stale_hold_ticks(),
        }
    }
}

impl SafetyConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [
            ("seawater_overtemp_c", self.seawater_overtemp_c),
            ("freshwater_overtemp_c", self.freshwater_overtemp_c),
            ("outlet_hot_c", self.outlet_hot_c),
            ("outlet_cold_c", self.outlet_cold_c),
            ("er_emergency_c", self.er_emergency_c),
        ] {
            if !v.is_finite() || !(TEMP_MIN_C..=TEMP_MAX_C).contains(&v) {
                return Err(format!("{name} {v} out of range"));
            }
        }
        if self.outlet_cold_c >= self.outlet_hot_c {
            return Err(format!(
                "outlet_cold_c {} must be below outlet_hot_c {}",
                self.outlet_cold_c, self.outlet_hot_c
            ));
        }
        if !self.pressure_floor_bar.is_finite() || self.pressure_floor_bar <= 0.0 {
            return Err("pressure_floor_bar must be positive".into());
        }
        if self.stale_hold_ticks == 0 {
            return Err("stale_hold_ticks must be at least 1".into());
        }
        Ok(())
    }
}

// ─── Controller ─────────────────────────────────────────────────────

/// Error-weight table of the V3 law.
///
/// Each pair is (current weight, predicted weight) and must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightTable {
    /// Applied when |predicted error| exceeds `predicted_gate_c`.
    #[serde(default = "default_predicted_dominant")]
    pub predicted_dominant: [f64; 2],
    /// Applied when |current error| exceeds `current_gate_c`.
    #[serde(default = "default_current_dominant")]
    pub current_dominant: [f64; 2],
    /// Applied otherwise.
    #[serde(default = "default_balanced")]
    pub balanced: [f64; 2],
    /// Gate on |predicted error| [°C].
    #[serde(default = "default_predicted_gate_c")]
    pub predicted_gate_c: f64,
    /// Gate on |current error| [°C].
    #[serde(default = "default_current_gate_c")]
    pub current_gate_c: f64,
}

fn default_predicted_dominant() -> [f64; 2] {
    [0.2, 0.8]
}
fn default_current_dominant() -> [f64; 2] {
    [0.6, 0.4]
}
fn default_balanced() -> [f64; 2] {
    [0.4, 0.6]
}
fn default_predicted_gate_c() -> f64 {
    2.0
}
fn default_current_gate_c() -> f64 {
    1.0
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            predicted_dominant: default_predicted_dominant(),
            current_dominant: default_current_dominant(),
            balanced: default_balanced(),
            predicted_gate_c: default_predicted_gate_c(),
            current_gate_c: default_current_gate_c(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// Proportional gain [Hz/°C] (default: 3.0).
    #[serde(default = "default_kp")]
    pub kp_hz_per_c: f64,
    /// Maximum frequency change per tick [Hz] (default: 5.0).
    #[serde(default = "default_slew_max")]
    pub slew_max_hz: f64,
    /// Minimum prediction confidence for the predictive path (default: 0.5).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Stable-band half width on the combined error [°C] (default: 0.3).
    #[serde(default = "default_stable_band_c")]
    pub stable_band_c: f64,
    #[serde(default)]
    pub weights: WeightTable,
}

fn default_kp() -> f64 {
    3.0
}
fn default_slew_max() -> f64 {
    5.0
}
fn default_confidence_threshold() -> f64 {
    0.5
}
fn default_stable_band_c() -> f64 {
    0.3
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kp_hz_per_c: default_kp(),
            slew_max_hz: default_slew_max(),
            confidence_threshold: default_confidence_threshold(),
            stable_band_c: default_stable_band_c(),
            weights: WeightTable::default(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.kp_hz_per_c.is_finite() || self.kp_hz_per_c <= 0.0 {
            return Err("kp_hz_per_c must be positive".into());
        }
        if !self.slew_max_hz.is_finite() || self.slew_max_hz <= 0.0 {
            return Err("slew_max_hz must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold {} out of range [0, 1]",
                self.confidence_threshold
            ));
        }
        if !self.stable_band_c.is_finite() || self.stable_band_c <= 0.0 {
            return Err("stable_band_c must be positive".into());
        }
        for (name, pair) in [
            ("predicted_dominant", self.weights.predicted_dominant),
            ("current_dominant", self.weights.current_dominant),
            ("balanced", self.weights.balanced),
        ] {
            if pair.iter().any(|w| !(0.0..=1.0).contains(w)) {
                return Err(format!("weights.{name}: each weight must be in [0, 1]"));
            }
            if (pair[0] + pair[1] - 1.0).abs() > 1e-9 {
                return Err(format!("weights.{name}: weights must sum to 1"));
            }
        }
        if self.weights.predicted_gate_c <= 0.0 || self.weights.current_gate_c <= 0.0 {
            return Err("weight gates must be positive".into());
        }
        Ok(())
    }
}

// ─── Count State Machine ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountsConfig {
    /// Dwell at an envelope extremum before a count change [s].
    #[serde(default = "default_dwell_s")]
    pub dwell_s: f64,
    /// Settling time after any count change [s].
    #[serde(default = "default_cooldown_s")]
    pub cooldown_s: f64,
    /// Frequency shed after adding a unit [Hz].
    #[serde(default = "default_shed_hz")]
    pub shed_hz: f64,
}

fn default_dwell_s() -> f64 {
    DWELL_S_DEFAULT
}
fn default_cooldown_s() -> f64 {
    COOLDOWN_S_DEFAULT
}
fn default_shed_hz() -> f64 {
    SHED_HZ_DEFAULT
}

impl Default for CountsConfig {
    fn default() -> Self {
        Self {
            dwell_s: DWELL_S_DEFAULT,
            cooldown_s: COOLDOWN_S_DEFAULT,
            shed_hz: SHED_HZ_DEFAULT,
        }
    }
}

impl CountsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.dwell_s.is_finite() || self.dwell_s <= 0.0 {
            return Err("dwell_s must be positive".into());
        }
        if !self.cooldown_s.is_finite() || self.cooldown_s < 0.0 {
            return Err("cooldown_s must be non-negative".into());
        }
        if !self.shed_hz.is_finite() || self.shed_hz < 0.0 {
            return Err("shed_hz must be non-negative".into());
        }
        Ok(())
    }
}

// ─── Predictor ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorConfig {
    /// Path to the opaque model artefact; absent means null predictor.
    #[serde(default)]
    pub artefact_path: Option<PathBuf>,
    /// Inference latency budget [ms] (default: 10).
    #[serde(default = "default_inference_deadline_ms")]
    pub inference_deadline_ms: u64,
}

fn default_inference_deadline_ms() -> u64 {
    10
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            artefact_path: None,
            inference_deadline_ms: default_inference_deadline_ms(),
        }
    }
}

// ─── Transport ──────────────────────────────────────────────────────

/// Transport back-end selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportBackend {
    /// Deterministic physics simulator.
    Simulation,
    /// Live Modbus-TCP PLC.
    Modbus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Back-end selection (default: simulation).
    #[serde(default = "default_backend")]
    pub backend: TransportBackend,
    /// PLC socket address, required for the Modbus back-end.
    #[serde(default)]
    pub address: Option<String>,
    /// Modbus unit identifier (default: 1).
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
}

fn default_backend() -> TransportBackend {
    TransportBackend::Simulation
}
fn default_unit_id() -> u8 {
    1
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: TransportBackend::Simulation,
            address: None,
            unit_id: 1,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == TransportBackend::Modbus && self.address.is_none() {
            return Err("transport.address is required for the modbus back-end".into());
        }
        Ok(())
    }
}

// ─── Events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Bounded queue capacity before drop-oldest engages (default: 1024).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Optional JSON-lines event log path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

fn default_queue_capacity() -> usize {
    1_024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            log_path: None,
        }
    }
}

impl EventsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity < 16 {
            return Err(format!(
                "events.queue_capacity {} too small (minimum 16)",
                self.queue_capacity
            ));
        }
        Ok(())
    }
}

// ─── Vessel ─────────────────────────────────────────────────────────

/// Vessel-level parameters.
///
/// `region` is a forward-compatibility hook for region adaptation; no
/// control law reads it yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VesselConfig {
    #[serde(default)]
    pub region: Option<String>,
}

// ─── Tests ──────────────────────────────────────────────────────────
