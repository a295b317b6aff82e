//! Temperature predictor with opaque artefact loading and null fallback.
//!
//! `predict` is a pure function of the window: no state is carried across
//! calls. Load failure never raises — the outcome is an explicit
//! [`LoadOutcome::Null`] and the scheduler continues under feedback-only
//! control. The artefact loads on a helper thread; until it arrives the
//! null predictor is in force and the swap is observed at a tick boundary.

pub mod model;

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use tracing::{info, warn};

use ccs_common::prediction::{HORIZON_COUNT, Prediction};
use ccs_common::telemetry::TempChannel;

use crate::window::{Window, WindowChannel};

use model::Model;

/// Samples used for the recent-trend feature (two minutes at 20 s stride).
const RECENT_SLOPE_SAMPLES: usize = 6;

/// Contractual output channels in artefact order.
const OUTPUT_CHANNELS: [TempChannel; 3] = [TempChannel::T4, TempChannel::T5, TempChannel::T6];

// ─── Load Outcome ───────────────────────────────────────────────────

/// Explicit artefact-load outcome; never an error path.
pub enum LoadOutcome {
    Loaded(Model),
    Null,
}

/// Load report delivered from the loader thread.
pub struct LoadReport {
    pub outcome: LoadOutcome,
    pub detail: String,
    pub artefact_bytes: usize,
}

/// Load the artefact on a helper thread.
///
/// The receiver yields exactly one report. A missing or rejected artefact
/// yields [`LoadOutcome::Null`] with the reason in `detail`.
pub fn spawn_loader(path: PathBuf) -> mpsc::Receiver<LoadReport> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("ccs-model-loader".into())
        .spawn(move || {
            let report = match std::fs::read(&path) {
                Ok(bytes) => match Model::from_bytes(&bytes) {
                    Ok(model) => {
                        info!(path = %path.display(), bytes = bytes.len(), "prediction artefact loaded");
                        LoadReport {
                            outcome: LoadOutcome::Loaded(model),
                            detail: format!("loaded {}", path.display()),
                            artefact_bytes: bytes.len(),
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "prediction artefact rejected");
                        LoadReport {
                            outcome: LoadOutcome::Null,
                            detail: e,
                            artefact_bytes: bytes.len(),
                        }
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "prediction artefact unreadable");
                    LoadReport {
                        outcome: LoadOutcome::Null,
                        detail: e.to_string(),
                        artefact_bytes: 0,
                    }
                }
            };
            let _ = tx.send(report);
        })
        .expect("spawn model loader thread");
    rx
}

// ─── Predictor ──────────────────────────────────────────────────────

/// Explicit prediction outcome for one tick.
pub enum PredictOutcome {
    /// A usable record; the controller still gates on its confidence.
    Ready(Prediction),
    /// Cold window or null predictor.
    Unavailable,
    /// The model produced unusable output; treated as unavailable upstream
    /// after the fault is logged.
    Fault(&'static str),
}

/// Stateless predictor over the rolling window.
pub struct Predictor {
    model: Option<Model>,
}

impl Predictor {
    /// Null predictor: always unavailable.
    pub const fn null() -> Self {
        Self { model: None }
    }

    pub const fn with_model(model: Model) -> Self {
        Self { model: Some(model) }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.model.is_none()
    }

    /// Produce a prediction from the window.
    ///
    /// Returns [`PredictOutcome::Unavailable`] below 75 % window fill.
    pub fn predict(&self, window: &Window) -> PredictOutcome {
        let Some(model) = &self.model else {
            return PredictOutcome::Unavailable;
        };
        if !window.is_sufficient() {
            return PredictOutcome::Unavailable;
        }

        let started = Instant::now();
        let mut series = [[0.0; HORIZON_COUNT]; 3];
        for (ci, ch) in OUTPUT_CHANNELS.iter().enumerate() {
            let wch = WindowChannel::Temp(*ch);
            let Some(stats) = window.stats(wch) else {
                return PredictOutcome::Unavailable;
            };
            let slope = window.recent_slope_per_min(wch, RECENT_SLOPE_SAMPLES);
            for h in 0..HORIZON_COUNT {
                let v = model.evaluate(ci, h, stats.current, slope, stats.mean);
                if !v.is_finite() {
                    return PredictOutcome::Fault("non-finite model output");
                }
                series[ci][h] = v;
            }
        }

        PredictOutcome::Ready(Prediction {
            t4_c: series[0],
            t5_c: series[1],
            t6_c: series[2],
            confidence: model.base_confidence(),
            latency_us: started.elapsed().as_micros() as u64,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
