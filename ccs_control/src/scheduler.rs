//! Two-second tick runner: telemetry → window → prediction → safety →
//! controller → counts → actuation, with deadline accounting and degraded
//! modes.
//!
//! All control computation happens on this single task; phases are
//! strictly sequential within a tick and the store is committed exactly
//! once at the end of each tick. The scheduler never unwinds: every
//! recoverable failure becomes an explicit state the next phase already
//! handles.
//!
//! Pacing: the portable loop sleeps the period remainder; with the `rt`
//! feature the loop uses `clock_nanosleep(TIMER_ABSTIME)` on
//! `CLOCK_MONOTONIC` for drift-free absolute-time pacing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use tracing::{error, info, warn};

use ccs_common::config::SupervisorConfig;
use ccs_common::decision::{Decision, GroupDecision, OperatingMode, RegulationMode, RuleFlags};
use ccs_common::events::{EventKind, EventRecord, TransportPhase};
use ccs_common::group::{GROUP_COUNT, GroupEnvelope, GroupId, GroupState};
use ccs_common::prediction::Prediction;
use ccs_common::telemetry::TelemetryFrame;

use ccs_plc::PlcAdapter;

use crate::api::ModeSwitch;
use crate::controller::{self, ControlInput};
use crate::counts;
use crate::events::EventSink;
use crate::predictor::{LoadOutcome, LoadReport, PredictOutcome, Predictor};
use crate::safety::{self, SafetyAction};
use crate::store::{ControlSnapshot, StoreWriter};
use crate::window::Window;

// ─── Tick Statistics ────────────────────────────────────────────────

/// O(1) per-tick timing statistics, no allocation.
#[derive(Debug, Clone)]
pub struct TickStats {
    /// Total ticks executed.
    pub tick_count: u64,
    /// Last tick body duration [ns].
    pub last_tick_ns: i64,
    /// Minimum tick body duration [ns].
    pub min_tick_ns: i64,
    /// Maximum tick body duration [ns].
    pub max_tick_ns: i64,
    /// Running sum for average computation.
    pub sum_tick_ns: i64,
    /// Deadline misses detected.
    pub misses: u64,
}

impl TickStats {
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_ns: 0,
            min_tick_ns: i64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            misses: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, duration_ns: i64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        if duration_ns < self.min_tick_ns {
            self.min_tick_ns = duration_ns;
        }
        if duration_ns > self.max_tick_ns {
            self.max_tick_ns = duration_ns;
        }
        self.sum_tick_ns += duration_ns;
    }

    /// Average tick duration [ns] (0 before the first tick).
    #[inline]
    pub fn avg_tick_ns(&self) -> i64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_ns / self.tick_count as i64
        }
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tick Runner ────────────────────────────────────────────────────

struct GroupOutcome {
    decision: GroupDecision,
    overridden: bool,
    used_prediction: bool,
}

/// The periodic control task.
///
/// Owns the adapter, the window, the predictor, all per-group state, and
/// the only write handle of the control-state store.
pub struct TickRunner {
    cfg: SupervisorConfig,
    envelopes: [GroupEnvelope; GROUP_COUNT],
    targets_c: [f64; GROUP_COUNT],
    adapter: PlcAdapter,
    window: Window,
    predictor: Predictor,
    loader_rx: Option<Receiver<LoadReport>>,
    writer: StoreWriter,
    sink: EventSink,
    mode: ModeSwitch,
    shutdown: Arc<AtomicBool>,

    states: [GroupState; GROUP_COUNT],
    active_mode: OperatingMode,
    last_good: Option<TelemetryFrame>,
    stale_ticks: u32,
    consecutive_misses: u32,
    degraded: bool,
    tick: u64,
    stats: TickStats,
}

impl TickRunner {
    pub fn new(
        cfg: SupervisorConfig,
        adapter: PlcAdapter,
        writer: StoreWriter,
        sink: EventSink,
        mode: ModeSwitch,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let envelopes = cfg.envelopes();
        let targets_c = cfg.targets_c();
        let window = Window::new(cfg.scheduler.window_capacity, cfg.scheduler.stride_s);
        let states = [
            GroupState::startup(&envelopes[0]),
            GroupState::startup(&envelopes[1]),
            GroupState::startup(&envelopes[2]),
        ];
        Self {
            cfg,
            envelopes,
            targets_c,
            adapter,
            window,
            predictor: Predictor::null(),
            loader_rx: None,
            writer,
            sink,
            mode,
            shutdown,
            states,
            active_mode: OperatingMode::Auto,
            last_good: None,
            stale_ticks: 0,
            consecutive_misses: 0,
            degraded: false,
            tick: 0,
            stats: TickStats::new(),
        }
    }

    /// Attach the artefact loader; the swap is observed at a tick boundary.
    pub fn attach_loader(&mut self, rx: Receiver<LoadReport>) {
        self.loader_rx = Some(rx);
    }

    /// Install a predictor directly (commissioning and tests).
    pub fn set_predictor(&mut self, predictor: Predictor) {
        self.predictor = predictor;
    }

    /// Seed a group's persistent state (commissioning and tests).
    pub fn set_group_state(&mut self, id: GroupId, state: GroupState) {
        self.states[id.index()] = state;
    }

    pub fn group_state(&self, id: GroupId) -> GroupState {
        self.states[id.index()]
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn active_mode(&self) -> OperatingMode {
        self.active_mode
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    pub fn tick_index(&self) -> u64 {
        self.tick
    }

    fn emit(&mut self, kind: EventKind) {
        let record = EventRecord {
            tick: self.tick,
            timestamp_ns: self.adapter.now_ns(),
            kind,
        };
        self.sink.publish(record);
    }

    // ── Tick Body ───────────────────────────────────────────────────

    /// Execute one complete tick. Returns the decision, or `None` when no
    /// frame has ever been received.
    pub fn run_tick(&mut self) -> Option<Decision> {
        self.tick += 1;

        // Artefact swap and mode request, both at the tick boundary.
        self.poll_loader();
        let requested = self.mode.requested();
        if requested != self.active_mode {
            self.emit(EventKind::ModeChanged {
                from: self.active_mode,
                to: requested,
            });
            info!(from = self.active_mode.label(), to = requested.label(), "operating mode changed");
            self.active_mode = requested;
        }

        // ═══ READ PHASE ═══
        let frame = match self.adapter.read_frame() {
            Ok(frame) => {
                self.stale_ticks = 0;
                self.last_good = Some(frame);
                frame
            }
            Err(e) => {
                self.stale_ticks = self.stale_ticks.saturating_add(1);
                self.emit(EventKind::TransportFailure {
                    phase: TransportPhase::Read,
                    detail: e.to_string(),
                });
                match self.last_good {
                    Some(good) => {
                        let ts = self.adapter.bump_timestamp();
                        good.as_stale(ts)
                    }
                    None => {
                        // Nothing to control on yet; keep trying.
                        warn!("telemetry unavailable before first good frame");
                        self.commit_snapshot(None, None);
                        return None;
                    }
                }
            }
        };

        if !frame.is_stale {
            self.window.append(&frame);
        }

        // Degraded-mode bookkeeping (transport staleness or deadline misses).
        self.update_degraded();

        // ═══ PREDICT PHASE ═══
        let prediction = self.predict_phase();

        // ═══ DECIDE PHASE ═══
        let verdict = safety::evaluate(&self.cfg.safety, &frame, self.stale_ticks);
        let outcomes: [GroupOutcome; GROUP_COUNT] = std::array::from_fn(|i| {
            self.decide_group(GroupId::ALL[i], &frame, prediction.as_ref(), &verdict)
        });

        let mut decision = Decision {
            tick: self.tick,
            safety_override: outcomes.iter().any(|o| o.overridden),
            used_prediction: outcomes.iter().any(|o| o.used_prediction),
            groups: outcomes.map(|o| o.decision),
        };

        // Invariant boundary: a violating decision is clamped into a safe
        // hold rather than propagated or panicked on.
        if let Err(detail) = decision.validate(&self.envelopes) {
            error!(detail = %detail, "decision invariant breach, clamping to safe hold");
            self.emit(EventKind::ControllerWarning {
                group: GroupId::SwPumps,
                detail: format!("invariant breach: {detail}"),
            });
            for id in GroupId::ALL {
                let env = &self.envelopes[id.index()];
                let g = &mut decision.groups[id.index()];
                g.frequency_hz = env.clamp_frequency(g.frequency_hz);
                g.count = g.count.clamp(env.count_min, env.count_max);
                g.rules |= RuleFlags::SAFE_HOLD;
                g.reason = "invariant breach: safe hold".into();
            }
        }

        // ═══ WRITE PHASE ═══
        if let Err(e) = self.adapter.write_command(&decision.command()) {
            self.emit(EventKind::TransportFailure {
                phase: TransportPhase::Write,
                detail: e.to_string(),
            });
        }

        // Rule activations and the decision event.
        for id in GroupId::ALL {
            let rules = decision.group(id).rules;
            if rules.has_safety_rule() {
                self.emit(EventKind::RuleActivated { group: id, rules });
            }
        }
        self.emit(EventKind::DecisionEmitted {
            safety_override: decision.safety_override,
            used_prediction: decision.used_prediction,
        });

        // ═══ PERSIST PHASE ═══
        self.commit_snapshot(Some(frame), Some(decision.clone()));

        Some(decision)
    }

    fn poll_loader(&mut self) {
        let Some(rx) = &self.loader_rx else { return };
        match rx.try_recv() {
            Ok(report) => {
                match report.outcome {
                    LoadOutcome::Loaded(model) => {
                        self.predictor = Predictor::with_model(model);
                        self.emit(EventKind::PredictorLoaded {
                            artefact_bytes: report.artefact_bytes,
                        });
                    }
                    LoadOutcome::Null => {
                        self.predictor = Predictor::null();
                        self.emit(EventKind::PredictorLoadFailed {
                            detail: report.detail,
                        });
                    }
                }
                self.loader_rx = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.loader_rx = None;
            }
        }
    }

    fn update_degraded(&mut self) {
        let transport_degraded = self.stale_ticks > self.cfg.safety.stale_hold_ticks;
        let miss_degraded = self.consecutive_misses >= self.cfg.scheduler.deadline_miss_limit;
        let now = transport_degraded || miss_degraded;
        if now && !self.degraded {
            let cause = if transport_degraded {
                "consecutive transport failures"
            } else {
                "consecutive deadline misses"
            };
            warn!(cause, "entering degraded mode");
            self.emit(EventKind::DegradedEntered {
                cause: cause.to_string(),
            });
        } else if !now && self.degraded {
            info!("degraded mode cleared");
            self.emit(EventKind::DegradedCleared);
        }
        self.degraded = now;
    }

    fn predict_phase(&mut self) -> Option<Prediction> {
        if self.degraded || self.active_mode != OperatingMode::Auto {
            return None;
        }
        match self.predictor.predict(&self.window) {
            PredictOutcome::Ready(p) => {
                let budget_us = self.cfg.predictor.inference_deadline_ms * 1_000;
                if p.latency_us > budget_us {
                    self.emit(EventKind::PredictorFault {
                        detail: format!("inference latency {} µs over budget", p.latency_us),
                    });
                }
                Some(p)
            }
            PredictOutcome::Unavailable => None,
            PredictOutcome::Fault(detail) => {
                self.emit(EventKind::PredictorFault {
                    detail: detail.to_string(),
                });
                None
            }
        }
    }

    fn decide_group(
        &mut self,
        id: GroupId,
        frame: &TelemetryFrame,
        prediction: Option<&Prediction>,
        verdict: &safety::SafetyVerdict,
    ) -> GroupOutcome {
        let env = self.envelopes[id.index()];
        let target_c = self.targets_c[id.index()];
        let prev = self.states[id.index()];
        let measured_c = frame.temperature(id.feedback_channel());

        let mut used_prediction = false;
        let mut overridden = false;
        let mut pin_count = false;

        let (mut frequency_hz, mut rules, mode, mut reason) = match verdict.group(id) {
            Some(v) => {
                overridden = true;
                pin_count = v.pin_count;
                match v.action {
                    SafetyAction::ForceMax => (
                        env.frequency_max,
                        v.rule,
                        RegulationMode::Cooling,
                        format!("{}: forced max", rule_name(v.rule)),
                    ),
                    SafetyAction::ForceMin => (
                        env.frequency_min,
                        v.rule,
                        RegulationMode::EnergySaving,
                        format!("{}: forced min", rule_name(v.rule)),
                    ),
                    SafetyAction::HoldPrevious => (
                        env.clamp_frequency(prev.frequency_hz),
                        v.rule,
                        RegulationMode::Stable,
                        format!("{}: hold", rule_name(v.rule)),
                    ),
                    SafetyAction::FloorPrevious => {
                        // Controller still runs; the floor only inhibits
                        // frequency reduction. Degraded and non-auto modes
                        // hold instead, which satisfies the floor trivially.
                        let floor = env.clamp_frequency(prev.frequency_hz);
                        if self.degraded || self.active_mode != OperatingMode::Auto {
                            (
                                floor,
                                v.rule,
                                RegulationMode::Stable,
                                format!("{}: hold", rule_name(v.rule)),
                            )
                        } else {
                            let out = self.run_controller(id, &env, target_c, measured_c, prev, prediction);
                            used_prediction = out.used_prediction;
                            (
                                out.frequency_hz.max(floor),
                                v.rule | RuleFlags::FEEDBACK_V3,
                                out.mode,
                                format!(
                                    "{}: floored at {:.1} Hz, e={:+.2}",
                                    rule_name(v.rule),
                                    floor,
                                    out.combined_error_c
                                ),
                            )
                        }
                    }
                }
            }
            None => {
                if self.degraded {
                    (
                        env.clamp_frequency(prev.frequency_hz),
                        RuleFlags::DEGRADED_HOLD,
                        RegulationMode::Stable,
                        "degraded: hold".to_string(),
                    )
                } else {
                    match self.active_mode {
                        OperatingMode::SafeHold => (
                            env.clamp_frequency(prev.frequency_hz),
                            RuleFlags::SAFE_HOLD,
                            RegulationMode::Stable,
                            "safe hold".to_string(),
                        ),
                        OperatingMode::ManualFixed => {
                            // Slew-limited ramp to the envelope maximum.
                            let next = env.clamp_frequency(
                                prev.frequency_hz + self.cfg.controller.slew_max_hz,
                            );
                            (
                                next,
                                RuleFlags::MANUAL_FIXED,
                                RegulationMode::Stable,
                                "manual: ramp to max".to_string(),
                            )
                        }
                        OperatingMode::Auto => {
                            let out = self.run_controller(id, &env, target_c, measured_c, prev, prediction);
                            used_prediction = out.used_prediction;
                            (
                                out.frequency_hz,
                                RuleFlags::FEEDBACK_V3,
                                out.mode,
                                format!("feedback: {} e={:+.2}", out.mode.label(), out.combined_error_c),
                            )
                        }
                    }
                }
            }
        };

        // ── Count state machine ──
        let counts_allowed = !pin_count && !self.degraded && self.active_mode == OperatingMode::Auto;
        if counts_allowed {
            let dt_s = self.cfg.scheduler.tick_period_s();
            let outcome = counts::advance(
                &self.cfg.counts,
                &env,
                &mut self.states[id.index()],
                frequency_hz,
                dt_s,
            );
            if let Some(change) = outcome.change {
                self.emit(EventKind::CountChanged {
                    group: id,
                    from: change.from,
                    to: change.to,
                });
                rules |= RuleFlags::COUNT_TRANSITION;
                reason.push_str(&format!("; count {}→{}", change.from, change.to));
            }
            frequency_hz = outcome.frequency_hz;
        }

        let state = &mut self.states[id.index()];
        state.frequency_hz = frequency_hz;
        let count = state.count;

        GroupOutcome {
            decision: GroupDecision {
                frequency_hz,
                count,
                reason,
                rules,
                mode,
                estimated_power_kw: env.estimated_power_kw(frequency_hz, count),
            },
            overridden,
            used_prediction,
        }
    }

    fn run_controller(
        &mut self,
        id: GroupId,
        env: &GroupEnvelope,
        target_c: f64,
        measured_c: f64,
        prev: GroupState,
        prediction: Option<&Prediction>,
    ) -> controller::ControlOutput {
        let out = controller::compute(
            &self.cfg.controller,
            env,
            &ControlInput {
                group: id,
                measured_c,
                target_c,
                prev_frequency_hz: prev.frequency_hz,
                prediction,
            },
        );
        if out.clamped_input {
            self.emit(EventKind::ControllerWarning {
                group: id,
                detail: format!("previous frequency {} outside envelope", prev.frequency_hz),
            });
        }
        out
    }

    fn commit_snapshot(&mut self, frame: Option<TelemetryFrame>, decision: Option<Decision>) {
        let snapshot = ControlSnapshot {
            tick: self.tick,
            frame: frame.or(self.last_good),
            decision,
            groups: self.states,
            window: self.window.summary(),
            operating_mode: self.active_mode,
            degraded: self.degraded,
            events_dropped: self.sink.dropped(),
        };
        self.writer.commit(snapshot);
    }

    // ── Deadline Accounting ─────────────────────────────────────────

    /// Record one tick body duration against the period.
    fn note_deadline(&mut self, elapsed: Duration, period: Duration) {
        self.stats.record(elapsed.as_nanos() as i64);
        if elapsed > period {
            self.stats.misses += 1;
            self.consecutive_misses += 1;
            self.emit(EventKind::DeadlineMiss {
                overrun_ms: (elapsed - period).as_millis() as u64,
                consecutive: self.consecutive_misses,
            });
        } else {
            self.consecutive_misses = 0;
        }
    }

    /// Deadline accounting entry for tests.
    #[doc(hidden)]
    pub fn note_tick_duration(&mut self, elapsed: Duration) {
        let period = Duration::from_millis(self.cfg.scheduler.tick_period_ms);
        self.note_deadline(elapsed, period);
    }

    // ── Main Loop ───────────────────────────────────────────────────

    /// Enter the periodic loop until the shutdown flag is raised, then
    /// write one final safe command.
    pub fn run(&mut self) {
        info!(
            transport = self.adapter.transport_name(),
            period_ms = self.cfg.scheduler.tick_period_ms,
            "control loop starting"
        );

        #[cfg(feature = "rt")]
        self.run_rt_loop();

        #[cfg(not(feature = "rt"))]
        self.run_portable_loop();

        self.final_safe_tick();
        info!("control loop stopped");
    }

    /// Portable pacing via `std::thread::sleep` of the period remainder.
    #[cfg(not(feature = "rt"))]
    fn run_portable_loop(&mut self) {
        let period = Duration::from_millis(self.cfg.scheduler.tick_period_ms);
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let started = std::time::Instant::now();
            self.run_tick();
            let elapsed = started.elapsed();
            self.note_deadline(elapsed, period);
            if let Some(remaining) = period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
    }

    /// Absolute-time pacing on `CLOCK_MONOTONIC` (drift-free).
    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self) {
        use nix::time::{ClockId, clock_gettime, clock_nanosleep, ClockNanosleepFlags};

        let clock = ClockId::CLOCK_MONOTONIC;
        let period = Duration::from_millis(self.cfg.scheduler.tick_period_ms);
        let period_ns = period.as_nanos() as i64;
        let Ok(mut next_wake) = clock_gettime(clock) else {
            error!("clock_gettime failed, cannot pace the rt loop");
            return;
        };

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            next_wake = timespec_add_ns(next_wake, period_ns);

            let started = std::time::Instant::now();
            self.run_tick();
            let elapsed = started.elapsed();
            self.note_deadline(elapsed, period);

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
    }

    /// One last command holding every group where it is: current
    /// frequencies, current counts, no controller involvement.
    fn final_safe_tick(&mut self) {
        self.tick += 1;
        let groups = std::array::from_fn(|i| {
            let env = &self.envelopes[i];
            let state = &self.states[i];
            GroupDecision {
                frequency_hz: env.clamp_frequency(state.frequency_hz),
                count: state.count.clamp(env.count_min, env.count_max),
                reason: "shutdown: safe hold".to_string(),
                rules: RuleFlags::SAFE_HOLD,
                mode: RegulationMode::Stable,
                estimated_power_kw: env.estimated_power_kw(state.frequency_hz, state.count),
            }
        });
        let decision = Decision {
            tick: self.tick,
            groups,
            safety_override: false,
            used_prediction: false,
        };
        if let Err(e) = self.adapter.write_command(&decision.command()) {
            self.emit(EventKind::TransportFailure {
                phase: TransportPhase::Write,
                detail: e.to_string(),
            });
        }
        self.emit(EventKind::DecisionEmitted {
            safety_override: false,
            used_prediction: false,
        });
        self.commit_snapshot(self.last_good, Some(decision));
    }
}

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

fn rule_name(rule: RuleFlags) -> &'static str {
    if rule == RuleFlags::S1_SEAWATER_OVERTEMP {
        "S1 seawater overtemp"
    } else if rule == RuleFlags::S2_FRESHWATER_OVERTEMP {
        "S2 freshwater overtemp"
    } else if rule == RuleFlags::S3_PRESSURE_FLOOR {
        "S3 low suction pressure"
    } else if rule == RuleFlags::S4A_OUTLET_HOT {
        "S4 outlet hot"
    } else if rule == RuleFlags::S4B_OUTLET_COLD {
        "S4 outlet cold"
    } else if rule == RuleFlags::S5_ER_EMERGENCY {
        "S5 engine-room emergency"
    } else if rule == RuleFlags::S6_STALE_HOLD {
        "S6 stale telemetry"
    } else {
        "safety"
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
