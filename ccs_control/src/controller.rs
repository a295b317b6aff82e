//! Predictive-feedback frequency law (controller V3).
//!
//! A weighted proportional controller on (current, predicted) error with a
//! per-tick slew limit. Runs only for groups not force-overridden by the
//! safety layer. Idempotent: identical inputs produce identical outputs.

use ccs_common::config::ControllerConfig;
use ccs_common::decision::RegulationMode;
use ccs_common::group::{GroupEnvelope, GroupId};
use ccs_common::prediction::Prediction;

/// Inputs for one group's control computation.
#[derive(Debug, Clone, Copy)]
pub struct ControlInput<'a> {
    pub group: GroupId,
    /// Measured value of the group's feedback channel [°C].
    pub measured_c: f64,
    /// Configured target [°C].
    pub target_c: f64,
    /// Frequency decided in the previous tick [Hz].
    pub prev_frequency_hz: f64,
    /// This tick's prediction, if any; confidence gating happens here.
    pub prediction: Option<&'a Prediction>,
}

/// Control law output for one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    /// New target frequency [Hz], inside the envelope and within slew.
    pub frequency_hz: f64,
    /// Combined weighted error [°C].
    pub combined_error_c: f64,
    /// Regulation mode classified from the combined error.
    pub mode: RegulationMode,
    /// The predictive path contributed to this output.
    pub used_prediction: bool,
    /// The previous frequency violated the envelope and was clamped.
    pub clamped_input: bool,
}

/// One evaluation of the V3 law.
pub fn compute(cfg: &ControllerConfig, envelope: &GroupEnvelope, input: &ControlInput) -> ControlOutput {
    // Violating inputs are clamped, never propagated.
    let clamped_input = !envelope.contains_frequency(input.prev_frequency_hz);
    let prev = envelope.clamp_frequency(if input.prev_frequency_hz.is_finite() {
        input.prev_frequency_hz
    } else {
        envelope.frequency_min
    });

    let e_c = input.measured_c - input.target_c;

    // Predictive error from the +5 min horizon, gated on confidence.
    let predicted = input.prediction.and_then(|p| {
        if p.confidence >= cfg.confidence_threshold {
            p.at(input.group.feedback_channel(), 0)
        } else {
            None
        }
    });
    let (e_p, used_prediction) = match predicted {
        Some(v) => (v - input.target_c, true),
        None => (e_c, false),
    };

    // Weight table: prediction dominates on large predicted error, the
    // current error on large measured error, balanced otherwise.
    let w = &cfg.weights;
    let [w_c, w_p] = if e_p.abs() > w.predicted_gate_c {
        w.predicted_dominant
    } else if e_c.abs() > w.current_gate_c {
        w.current_dominant
    } else {
        w.balanced
    };

    let e = w_c * e_c + w_p * e_p;
    let delta = (cfg.kp_hz_per_c * e).clamp(-cfg.slew_max_hz, cfg.slew_max_hz);
    let frequency_hz = envelope.clamp_frequency(prev + delta);

    let mode = if e.abs() < cfg.stable_band_c {
        RegulationMode::Stable
    } else if e > 0.0 {
        RegulationMode::Cooling
    } else {
        RegulationMode::EnergySaving
    };

    ControlOutput {
        frequency_hz,
        combined_error_c: e,
        mode,
        used_prediction,
        clamped_input,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
