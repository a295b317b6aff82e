//! Short-horizon temperature prediction records.
//!
//! The predictor emits three temperatures (T4, T5, T6) at +5/+10/+15 min
//! plus an opaque confidence scalar. The controller only ever compares the
//! confidence against a threshold; its semantics belong to the model.

use serde::{Deserialize, Serialize};

use crate::telemetry::TempChannel;

/// Prediction horizons [min].
pub const HORIZONS_MIN: [u32; 3] = [5, 10, 15];

/// Number of prediction horizons.
pub const HORIZON_COUNT: usize = 3;

/// Prediction record for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Fresh-water return T4 at +5/+10/+15 min [°C].
    pub t4_c: [f64; HORIZON_COUNT],
    /// Fresh-water outlet T5 at +5/+10/+15 min [°C].
    pub t5_c: [f64; HORIZON_COUNT],
    /// Engine-room air T6 at +5/+10/+15 min [°C].
    pub t6_c: [f64; HORIZON_COUNT],
    /// Opaque confidence scalar in [0, 1].
    pub confidence: f64,
    /// Measured inference latency [µs].
    pub latency_us: u64,
}

impl Prediction {
    /// The record returned while no usable prediction exists
    /// (cold window, null predictor, degraded mode).
    pub const fn unavailable() -> Self {
        Self {
            t4_c: [0.0; HORIZON_COUNT],
            t5_c: [0.0; HORIZON_COUNT],
            t6_c: [0.0; HORIZON_COUNT],
            confidence: 0.0,
            latency_us: 0,
        }
    }

    /// Predicted value for a contractual channel at a horizon index.
    ///
    /// Returns `None` for channels outside the T4/T5/T6 contract.
    #[inline]
    pub fn at(&self, channel: TempChannel, horizon: usize) -> Option<f64> {
        let series = match channel {
            TempChannel::T4 => &self.t4_c,
            TempChannel::T5 => &self.t5_c,
            TempChannel::T6 => &self.t6_c,
            _ => return None,
        };
        series.get(horizon).copied()
    }
}
